//! Logging infrastructure.
//!
//! Application diagnostics go through the `tracing` ecosystem. Pipeline
//! process output is additionally emitted at debug level under the
//! `vug_core::pipeline::output` target; the file layer installed by
//! [`init_tracing_with_file`] captures it into a rolling on-disk log
//! while the stderr layer stays readable.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Tracing target pipeline process output is logged under.
pub const PIPELINE_OUTPUT_TARGET: &str = "vug_core::pipeline::output";

/// Initialize global tracing output to stderr only.
///
/// Respects `RUST_LOG`, falling back to the provided default filter.
/// Should be called once at application startup.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.to_string()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_filter(filter))
        .init();
}

/// Initialize global tracing with a stderr layer plus a rolling daily
/// log file that also captures pipeline process output.
///
/// The returned guard must be held for the lifetime of the application;
/// dropping it flushes and stops the background writer.
pub fn init_tracing_with_file(default_filter: &str, logs_dir: &Path) -> WorkerGuard {
    let stderr_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.to_string()));

    let file_appender = tracing_appender::rolling::daily(logs_dir, "pipeline.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter = EnvFilter::new(format!("info,{}=debug", PIPELINE_OUTPUT_TARGET));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_filter(stderr_filter))
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_target_matches_module_layout() {
        assert!(PIPELINE_OUTPUT_TARGET.starts_with("vug_core::"));
    }
}
