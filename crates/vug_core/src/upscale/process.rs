//! Explicit tracking of the spawned process tree.
//!
//! The pipeline is built from individually spawned children wired
//! together by pipes, so the group below IS the whole tree: killing every
//! member leaves no orphaned external processes behind.

use std::process::ExitStatus;

use tokio::process::Child;
use tracing::debug;

use super::errors::UpscaleError;

/// The children belonging to one pipeline invocation.
pub struct ProcessGroup {
    members: Vec<(String, Child)>,
}

impl ProcessGroup {
    /// Create an empty group.
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
        }
    }

    /// Track a spawned child under a tool name (used in errors and logs).
    pub fn push(&mut self, tool: impl Into<String>, child: Child) {
        self.members.push((tool.into(), child));
    }

    /// Number of tracked children.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Send a kill to every member of the group.
    pub fn kill_all(&mut self) {
        for (tool, child) in &mut self.members {
            debug!("killing {}", tool);
            let _ = child.start_kill();
        }
    }

    /// Wait for every member and return `(tool, status)` pairs in spawn
    /// order.
    pub async fn wait_all(&mut self) -> Result<Vec<(String, ExitStatus)>, UpscaleError> {
        let mut statuses = Vec::with_capacity(self.members.len());
        for (tool, child) in &mut self.members {
            let status = child
                .wait()
                .await
                .map_err(|e| UpscaleError::io(format!("wait for {}", tool), e))?;
            statuses.push((tool.clone(), status));
        }
        Ok(statuses)
    }

    /// Error for the first member that exited non-zero, if any.
    pub fn first_failure(statuses: &[(String, ExitStatus)]) -> Option<UpscaleError> {
        statuses.iter().find(|(_, status)| !status.success()).map(
            |(tool, status)| UpscaleError::ToolFailed {
                tool: tool.clone(),
                exit_code: status.code().unwrap_or(-1),
            },
        )
    }
}

impl Default for ProcessGroup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    fn spawn_sleep() -> Child {
        Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn kill_all_terminates_every_member() {
        let mut group = ProcessGroup::new();
        group.push("first", spawn_sleep());
        group.push("second", spawn_sleep());
        assert_eq!(group.len(), 2);

        group.kill_all();
        let statuses = group.wait_all().await.unwrap();

        assert_eq!(statuses.len(), 2);
        for (_, status) in &statuses {
            // Killed, not exited normally.
            assert!(!status.success());
        }
    }

    #[tokio::test]
    async fn wait_all_reports_exit_codes_in_order() {
        let mut group = ProcessGroup::new();
        group.push(
            "true",
            Command::new("true").kill_on_drop(true).spawn().unwrap(),
        );
        group.push(
            "false",
            Command::new("false").kill_on_drop(true).spawn().unwrap(),
        );

        let statuses = group.wait_all().await.unwrap();
        assert!(statuses[0].1.success());
        assert!(!statuses[1].1.success());

        match ProcessGroup::first_failure(&statuses) {
            Some(UpscaleError::ToolFailed { tool, exit_code }) => {
                assert_eq!(tool, "false");
                assert_eq!(exit_code, 1);
            }
            other => panic!("expected ToolFailed, got {:?}", other.map(|e| e.to_string())),
        }
    }
}
