//! Resumable HTTP download with retry and progress reporting.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum number of attempts before a download fails for good.
pub const MAX_DOWNLOAD_RETRIES: u32 = 10;

/// Errors from [`download_file`].
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Server answered with a non-success status. Not retried.
    #[error("HTTP {status} fetching {url}")]
    Status { status: StatusCode, url: String },

    /// Connection, timeout, or mid-stream failure after all retries.
    #[error("network error downloading {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Local file error. Not retried.
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Download `url` to `dest`, appending to any partial file left by a
/// previous attempt (resume via byte-range request).
///
/// Transient network failures are retried up to [`MAX_DOWNLOAD_RETRIES`]
/// times with a backoff of `2 * attempt` seconds. `on_progress` receives
/// an integer percentage whenever it changes; it is never called when the
/// server does not report a content length.
///
/// The file is appended incrementally, not atomically: a crash leaves a
/// partial file that the next call resumes from.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    mut on_progress: impl FnMut(u8),
) -> Result<(), DownloadError> {
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match download_attempt(client, url, dest, &mut on_progress).await {
            Ok(()) => return Ok(()),
            Err(err @ (DownloadError::Status { .. } | DownloadError::Io { .. })) => {
                return Err(err);
            }
            Err(err) => {
                if attempt >= MAX_DOWNLOAD_RETRIES {
                    return Err(err);
                }
                let delay = Duration::from_secs(u64::from(2 * attempt));
                warn!(
                    "download attempt {}/{} failed ({}), retrying in {:?}",
                    attempt, MAX_DOWNLOAD_RETRIES, err, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn download_attempt(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    on_progress: &mut impl FnMut(u8),
) -> Result<(), DownloadError> {
    let mut offset = resume_offset(dest);

    let mut request = client.get(url);
    if offset > 0 {
        debug!("resuming download of {} at byte {}", url, offset);
        request = request.header(RANGE, format!("bytes={}-", offset));
    }

    let response = request.send().await.map_err(|e| DownloadError::Network {
        url: url.to_string(),
        source: e,
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Status {
            status,
            url: url.to_string(),
        });
    }

    // A 200 to a range request means the server restarted from scratch.
    if offset > 0 && status != StatusCode::PARTIAL_CONTENT {
        fs::remove_file(dest).map_err(|e| DownloadError::Io {
            path: dest.to_path_buf(),
            source: e,
        })?;
        offset = 0;
    }

    let total = response.content_length().map(|len| len + offset);

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dest)
        .map_err(|e| DownloadError::Io {
            path: dest.to_path_buf(),
            source: e,
        })?;

    let mut downloaded = offset;
    let mut last_percent: Option<u8> = None;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DownloadError::Network {
            url: url.to_string(),
            source: e,
        })?;
        file.write_all(&chunk).map_err(|e| DownloadError::Io {
            path: dest.to_path_buf(),
            source: e,
        })?;
        downloaded += chunk.len() as u64;

        if let Some(total) = total {
            if total > 0 {
                let percent = ((downloaded as f64 / total as f64) * 100.0).min(100.0) as u8;
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    on_progress(percent);
                }
            }
        }
    }

    Ok(())
}

/// Byte offset to resume from: the length of an existing partial file.
fn resume_offset(dest: &Path) -> u64 {
    fs::metadata(dest).map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resume_offset_of_missing_file_is_zero() {
        let dir = tempdir().unwrap();
        assert_eq!(resume_offset(&dir.path().join("missing.bin")), 0);
    }

    #[test]
    fn resume_offset_matches_partial_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.bin");
        fs::write(&path, b"12345").unwrap();
        assert_eq!(resume_offset(&path), 5);
    }
}
