//! Time-remaining estimation from a rolling window of progress samples.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Estimates time remaining from a rolling average of progress over time.
///
/// Samples older than the configured window are discarded (while keeping
/// at least `min_samples`), so the estimate tracks the current transfer
/// rate rather than the whole run's average.
pub struct EtaCalculator {
    min_samples: usize,
    window: Duration,
    started: Instant,
    /// (elapsed, progress fraction 0.0..=1.0), oldest first.
    samples: VecDeque<(Duration, f64)>,
}

impl EtaCalculator {
    /// Create a calculator requiring `min_samples` data points and keeping
    /// up to `window_secs` seconds of history.
    pub fn new(min_samples: usize, window_secs: f64) -> Self {
        Self {
            min_samples: min_samples.max(2),
            window: Duration::from_secs_f64(window_secs),
            started: Instant::now(),
            samples: VecDeque::new(),
        }
    }

    /// Discard all collected data and restart the clock.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.started = Instant::now();
    }

    /// Record the current progress (0.0..=1.0). Repeats of the last value
    /// are ignored.
    pub fn update(&mut self, progress: f64) {
        self.update_at(self.started.elapsed(), progress);
    }

    fn update_at(&mut self, elapsed: Duration, progress: f64) {
        if let Some(&(_, last)) = self.samples.back() {
            if last == progress {
                return;
            }
        }

        // Expire samples that fell out of the window.
        let cutoff = elapsed.saturating_sub(self.window);
        while self.samples.len() > self.min_samples {
            match self.samples.front() {
                Some(&(t, _)) if t < cutoff => {
                    self.samples.pop_front();
                }
                _ => break,
            }
        }

        self.samples.push_back((elapsed, progress));
    }

    /// Whether enough data has been collected to produce an estimate.
    pub fn is_available(&self) -> bool {
        if self.samples.len() < self.min_samples {
            return false;
        }
        match (self.samples.front(), self.samples.back()) {
            (Some(&(_, oldest)), Some(&(_, newest))) => oldest != newest,
            _ => false,
        }
    }

    /// Estimated time remaining, or `None` until enough data exists.
    pub fn remaining(&self) -> Option<Duration> {
        if !self.is_available() {
            return None;
        }

        let &(t0, p0) = self.samples.front()?;
        let &(t1, p1) = self.samples.back()?;
        let rate = (p1 - p0) / (t1 - t0).as_secs_f64();
        if rate <= 0.0 {
            return None;
        }

        Some(Duration::from_secs_f64((1.0 - p1).max(0.0) / rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn unavailable_without_enough_samples() {
        let mut eta = EtaCalculator::new(3, 30.0);
        assert!(!eta.is_available());
        eta.update_at(secs(1), 0.1);
        eta.update_at(secs(2), 0.2);
        assert!(!eta.is_available());
        assert!(eta.remaining().is_none());
    }

    #[test]
    fn estimates_from_constant_rate() {
        let mut eta = EtaCalculator::new(2, 60.0);
        // 10% per second: at 50% after 5s, 5 more seconds remain.
        for i in 1..=5u64 {
            eta.update_at(secs(i), i as f64 * 0.1);
        }
        assert!(eta.is_available());

        let remaining = eta.remaining().unwrap();
        assert!((remaining.as_secs_f64() - 5.0).abs() < 0.01);
    }

    #[test]
    fn ignores_repeated_progress() {
        let mut eta = EtaCalculator::new(2, 60.0);
        eta.update_at(secs(1), 0.5);
        eta.update_at(secs(2), 0.5);
        eta.update_at(secs(3), 0.5);
        // Only one distinct sample was recorded.
        assert!(!eta.is_available());
    }

    #[test]
    fn expires_old_samples() {
        let mut eta = EtaCalculator::new(2, 10.0);
        eta.update_at(secs(1), 0.1);
        eta.update_at(secs(2), 0.2);
        eta.update_at(secs(3), 0.3);
        // Well past the window: the oldest samples are dropped down to
        // min_samples, so the slope reflects recent progress only.
        eta.update_at(secs(60), 0.4);
        eta.update_at(secs(61), 0.5);
        assert!(eta.samples.len() <= 3);
    }

    #[test]
    fn reset_clears_history() {
        let mut eta = EtaCalculator::new(2, 30.0);
        eta.update_at(secs(1), 0.2);
        eta.update_at(secs(2), 0.4);
        assert!(eta.is_available());
        eta.reset();
        assert!(!eta.is_available());
    }
}
