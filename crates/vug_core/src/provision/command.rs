//! Child-process invocation with line-streamed output capture.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::console::ConsoleBuffer;

use super::ProvisionError;

/// Run a command to completion, streaming every non-empty stdout/stderr
/// line into `sink` as it arrives.
///
/// Returns `CommandFailed` with the exit code when the process exits
/// non-zero.
pub(crate) async fn run_logged<I, S>(
    tool: &str,
    program: impl AsRef<OsStr>,
    args: I,
    cwd: &Path,
    sink: &ConsoleBuffer,
) -> Result<(), ProvisionError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ProvisionError::io(format!("launch {}", tool), e))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (status, _, _) = tokio::join!(child.wait(), pump(stdout, sink), pump(stderr, sink));

    let status = status.map_err(|e| ProvisionError::io(format!("wait for {}", tool), e))?;
    if !status.success() {
        return Err(ProvisionError::CommandFailed {
            tool: tool.to_string(),
            exit_code: status.code().unwrap_or(-1),
        });
    }

    Ok(())
}

/// Run a command to completion and return its trimmed stdout.
pub(crate) async fn run_capture<I, S>(
    tool: &str,
    program: impl AsRef<OsStr>,
    args: I,
    cwd: &Path,
) -> Result<String, ProvisionError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .map_err(|e| ProvisionError::io(format!("launch {}", tool), e))?;

    if !output.status.success() {
        return Err(ProvisionError::CommandFailed {
            tool: tool.to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

async fn pump<R: AsyncRead + Unpin>(reader: Option<R>, sink: &ConsoleBuffer) {
    let Some(reader) = reader else {
        return;
    };

    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.is_empty() {
            continue;
        }
        sink.push(line);
    }
}
