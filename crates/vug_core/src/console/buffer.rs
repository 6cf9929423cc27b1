//! Bounded FIFO of display lines.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Callback invoked with each appended line, so the owner can refresh
/// a view (or mirror the line elsewhere) without polling.
pub type NotifyFn = Box<dyn Fn(&str) + Send + Sync>;

/// Thread-safe bounded FIFO of text lines.
///
/// Oldest entries are evicted once the capacity is reached, so the buffer
/// always holds the most recently appended `min(appended, capacity)`
/// lines in emission order. Appends happen from process-output readers
/// (off the main thread) while the UI thread drains snapshots.
pub struct ConsoleBuffer {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
    notify: Mutex<Option<NotifyFn>>,
}

impl ConsoleBuffer {
    /// Create a buffer holding at most `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
            notify: Mutex::new(None),
        }
    }

    /// Install the per-line notification callback.
    pub fn set_notify(&self, notify: NotifyFn) {
        *self.notify.lock() = Some(notify);
    }

    /// Append a line, evicting the oldest entries past capacity.
    pub fn push(&self, line: impl Into<String>) {
        let line = line.into();
        {
            let mut lines = self.lines.lock();
            while lines.len() >= self.capacity {
                lines.pop_front();
            }
            lines.push_back(line.clone());
        }
        if let Some(ref notify) = *self.notify.lock() {
            notify(&line);
        }
    }

    /// Current lines in emission order.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    /// All lines joined with newlines, for a text view.
    pub fn text(&self) -> String {
        self.snapshot().join("\n")
    }

    /// Number of lines currently held.
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// Maximum number of lines the buffer will hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove all lines.
    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn holds_lines_in_order() {
        let buffer = ConsoleBuffer::new(10);
        buffer.push("first");
        buffer.push("second");
        buffer.push("third");

        assert_eq!(buffer.snapshot(), vec!["first", "second", "third"]);
        assert_eq!(buffer.text(), "first\nsecond\nthird");
    }

    #[test]
    fn never_exceeds_capacity() {
        let buffer = ConsoleBuffer::new(5);

        for i in 0..37 {
            buffer.push(format!("line {}", i));
            assert!(buffer.len() <= 5);
        }

        // The most recent 5 lines survive, in order.
        let expected: Vec<String> = (32..37).map(|i| format!("line {}", i)).collect();
        assert_eq!(buffer.snapshot(), expected);
    }

    #[test]
    fn keeps_all_lines_below_capacity() {
        let buffer = ConsoleBuffer::new(100);
        for i in 0..7 {
            buffer.push(format!("line {}", i));
        }
        assert_eq!(buffer.len(), 7);
    }

    #[test]
    fn clear_empties_buffer() {
        let buffer = ConsoleBuffer::new(5);
        buffer.push("a");
        buffer.push("b");
        buffer.clear();

        assert!(buffer.is_empty());
        assert_eq!(buffer.text(), "");
    }

    #[test]
    fn notify_fires_per_append() {
        let buffer = ConsoleBuffer::new(5);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        buffer.set_notify(Box::new(move |_line| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        buffer.push("one");
        buffer.push("two");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
