//! Error types for the upscale pipeline.
//!
//! Cancellation is deliberately not represented here: it is a normal
//! control-flow outcome (`RunOutcome::Cancelled`), not a failure.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from config generation and pipeline execution.
#[derive(Error, Debug)]
pub enum UpscaleError {
    /// An external tool exited non-zero.
    #[error("{tool} failed with exit code {exit_code}")]
    ToolFailed { tool: String, exit_code: i32 },

    /// An external tool could not be started.
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Local file error while preparing or running the pipeline.
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// A referenced model file could not be staged into the backend.
    #[error("failed to copy model {path}: {source}")]
    ModelCopy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The workflow failed validation; the messages are the validation
    /// report's.
    #[error("workflow is not ready to run: {reasons}")]
    NotReady { reasons: String },

    /// An upscale run is already active.
    #[error("an upscale is already running")]
    Busy,
}

impl UpscaleError {
    /// Create an I/O error with operation context.
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Create a tool-failure error.
    pub fn tool_failed(tool: impl Into<String>, exit_code: i32) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            exit_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_failure_displays_exit_code() {
        let err = UpscaleError::tool_failed("ffmpeg", 2);
        let msg = err.to_string();
        assert!(msg.contains("ffmpeg"));
        assert!(msg.contains("exit code 2"));
    }
}
