//! Backend provisioning workflow.
//!
//! An ordered, resumable sequence of install steps, each guarded by an
//! idempotence check against the filesystem. Re-running provisioning on a
//! fully installed backend performs no downloads and no extraction. A
//! failed step aborts the remaining steps; only the downloader retries
//! internally.

mod command;
mod report;
mod steps;

pub use report::{ProvisionReport, StepOutcome, StepRecord};

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{BackendEnv, DownloadError, ExtractError};
use crate::console::{ConsoleBuffer, SUB_STATUS_CAPACITY};
use crate::sync::{ActivityFlag, CancelToken};

/// Minimum ML-runtime script version the pipeline requires. An older
/// installed runtime triggers the self-healing re-provision on first run.
pub const MIN_VSMLRT_VERSION: (u32, u32, u32) = (15, 9, 0);

/// Status message shown when any provisioning step fails.
pub const SETUP_FAILURE_MESSAGE: &str =
    "Backend setup failed. Try reinstalling the backend or report the issue if it persists.";

/// Step names, in execution order.
pub const STEP_RUNTIME: &str = "Install VapourSynth runtime";
pub const STEP_DEPENDENCIES: &str = "Install Python dependencies";
pub const STEP_PLUGINS: &str = "Install VapourSynth plugins";
pub const STEP_FILTER_PLUGINS: &str = "Install auxiliary filter plugins";
pub const STEP_ML_RUNTIME: &str = "Install ML runtime";
pub const STEP_RIFE_MODELS: &str = "Install RIFE models";
pub const STEP_CLEANUP: &str = "Clean up install";
pub const STEP_MODELS: &str = "Install upscale models";
pub const STEP_FFMPEG: &str = "Install ffmpeg";

/// Steps that only run on a fresh runtime install.
const RUNTIME_STEPS: [&str; 7] = [
    STEP_RUNTIME,
    STEP_DEPENDENCIES,
    STEP_PLUGINS,
    STEP_FILTER_PLUGINS,
    STEP_ML_RUNTIME,
    STEP_RIFE_MODELS,
    STEP_CLEANUP,
];

/// Errors from the provisioning workflow.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("{tool} failed with exit code {exit_code}")]
    CommandFailed { tool: String, exit_code: i32 },

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("another install is already running")]
    Busy,

    #[error("backend setup was cancelled")]
    Cancelled,
}

impl ProvisionError {
    /// Create an I/O error with operation context.
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

/// Progress events emitted while provisioning runs.
#[derive(Debug, Clone)]
pub enum ProvisionEvent {
    /// A step's actions are starting.
    Step { name: &'static str },
    /// A download is in progress.
    Downloading { what: &'static str, percent: u8 },
    /// An archive is being extracted. Percent is entry-based and only
    /// available for zip archives.
    Extracting { what: &'static str, percent: Option<u8> },
    /// The backend is fully installed.
    Ready,
    /// Provisioning failed; `message` is the user-facing remediation text.
    Failed { message: String },
}

/// Callback type for [`ProvisionEvent`]s.
pub type ProgressFn = Box<dyn Fn(ProvisionEvent) + Send + Sync>;

/// Runs the backend provisioning workflow against a [`BackendEnv`].
pub struct Provisioner {
    env: BackendEnv,
    client: reqwest::Client,
    progress: ProgressFn,
    sub_status: Arc<ConsoleBuffer>,
    cancel: CancelToken,
    activity: ActivityFlag,
}

impl Provisioner {
    /// Create a provisioner for the given environment.
    pub fn new(env: BackendEnv) -> Self {
        Self {
            env,
            client: reqwest::Client::new(),
            progress: Box::new(|_| {}),
            sub_status: Arc::new(ConsoleBuffer::new(SUB_STATUS_CAPACITY)),
            cancel: CancelToken::new(),
            activity: ActivityFlag::new(),
        }
    }

    /// Install the progress callback.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = progress;
        self
    }

    /// The environment being provisioned.
    pub fn env(&self) -> &BackendEnv {
        &self.env
    }

    /// Sub-status log fed by captured installer output.
    pub fn sub_status(&self) -> Arc<ConsoleBuffer> {
        Arc::clone(&self.sub_status)
    }

    /// Token for cancelling an in-flight provisioning run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Busy flag for this provisioner (one active run at a time).
    pub fn activity(&self) -> ActivityFlag {
        self.activity.clone()
    }

    /// Run every missing install step, in order.
    ///
    /// `first_run` additionally checks an already-installed runtime's
    /// ML-runtime version and re-provisions the runtime wholesale when it
    /// is below [`MIN_VSMLRT_VERSION`].
    pub async fn ensure_backend(&self, first_run: bool) -> Result<ProvisionReport, ProvisionError> {
        let _permit = self.activity.try_acquire().ok_or(ProvisionError::Busy)?;

        self.sub_status.clear();
        let mut report = ProvisionReport::default();

        match self.provision(first_run, &mut report).await {
            Ok(()) => {
                self.emit(ProvisionEvent::Ready);
                Ok(report)
            }
            Err(ProvisionError::Cancelled) => Err(ProvisionError::Cancelled),
            Err(err) => {
                self.sub_status.push(err.to_string());
                let mut source = std::error::Error::source(&err);
                while let Some(cause) = source {
                    self.sub_status.push(format!("  caused by: {}", cause));
                    source = std::error::Error::source(cause);
                }
                self.emit(ProvisionEvent::Failed {
                    message: SETUP_FAILURE_MESSAGE.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Delete the runtime and ffmpeg directories wholesale and re-run the
    /// whole workflow (always re-downloads everything).
    ///
    /// `upscale` is the pipeline runner's busy flag; reinstalling while an
    /// upscale is active is refused.
    pub async fn reinstall(&self, upscale: &ActivityFlag) -> Result<ProvisionReport, ProvisionError> {
        if upscale.is_active() {
            return Err(ProvisionError::Busy);
        }

        for dir in [self.env.ffmpeg_dir(), self.env.runtime_dir()] {
            if dir.exists() {
                fs::remove_dir_all(&dir)
                    .map_err(|e| ProvisionError::io(format!("remove {}", dir.display()), e))?;
            }
        }

        self.ensure_backend(false).await
    }

    async fn provision(
        &self,
        first_run: bool,
        report: &mut ProvisionReport,
    ) -> Result<(), ProvisionError> {
        let mut check_version = first_run;

        loop {
            if !self.env.is_runtime_installed() {
                self.run_fresh_install(report).await?;
                break;
            }

            if check_version && self.runtime_outdated().await {
                info!("installed ML runtime is below the minimum version, re-provisioning");
                let runtime_dir = self.env.runtime_dir();
                fs::remove_dir_all(&runtime_dir).map_err(|e| {
                    ProvisionError::io(format!("remove {}", runtime_dir.display()), e)
                })?;
                check_version = false;
                continue;
            }

            for name in RUNTIME_STEPS {
                report.record_skipped(name, "runtime already installed");
            }
            break;
        }

        self.check_cancelled()?;
        if !self.env.are_models_installed() {
            self.step_begin(STEP_MODELS);
            self.install_models().await?;
            report.record_completed(STEP_MODELS);
        } else {
            report.record_skipped(STEP_MODELS, "models already installed");
        }

        self.check_cancelled()?;
        if !self.env.is_ffmpeg_installed() {
            self.step_begin(STEP_FFMPEG);
            self.install_ffmpeg().await?;
            report.record_completed(STEP_FFMPEG);
        } else {
            report.record_skipped(STEP_FFMPEG, "ffmpeg already installed");
        }

        Ok(())
    }

    async fn run_fresh_install(&self, report: &mut ProvisionReport) -> Result<(), ProvisionError> {
        self.check_cancelled()?;
        self.step_begin(STEP_RUNTIME);
        self.install_runtime().await?;
        report.record_completed(STEP_RUNTIME);

        self.check_cancelled()?;
        self.step_begin(STEP_DEPENDENCIES);
        self.install_dependencies().await?;
        report.record_completed(STEP_DEPENDENCIES);

        self.check_cancelled()?;
        self.step_begin(STEP_PLUGINS);
        self.install_plugins().await?;
        report.record_completed(STEP_PLUGINS);

        self.check_cancelled()?;
        self.step_begin(STEP_FILTER_PLUGINS);
        self.install_filter_plugins().await?;
        report.record_completed(STEP_FILTER_PLUGINS);

        self.check_cancelled()?;
        self.step_begin(STEP_ML_RUNTIME);
        self.install_ml_runtime().await?;
        report.record_completed(STEP_ML_RUNTIME);

        self.check_cancelled()?;
        self.step_begin(STEP_RIFE_MODELS);
        self.install_rife_models().await?;
        report.record_completed(STEP_RIFE_MODELS);

        self.check_cancelled()?;
        self.step_begin(STEP_CLEANUP);
        self.cleanup_install()?;
        report.record_completed(STEP_CLEANUP);

        Ok(())
    }

    /// Whether the installed ML-runtime script is older than the minimum.
    /// Version-query failures are treated as "not outdated" so a broken
    /// diagnostic cannot wedge startup into an install loop.
    async fn runtime_outdated(&self) -> bool {
        match self.vsmlrt_version().await {
            Ok(raw) => match parse_version(raw.trim()) {
                Some(installed) => installed < MIN_VSMLRT_VERSION,
                None => {
                    warn!("could not parse ML runtime version from {:?}", raw);
                    false
                }
            },
            Err(err) => {
                warn!("ML runtime version query failed: {}", err);
                false
            }
        }
    }

    /// Installed python packages, for the diagnostics view.
    pub async fn pip_list(&self) -> Result<String, ProvisionError> {
        command::run_capture(
            "pip",
            self.env.python_exe(),
            ["-m", "pip", "list"],
            &self.env.runtime_dir(),
        )
        .await
    }

    /// Installed ML-runtime script version, as reported by a probe script
    /// shipped with the backend.
    pub async fn vsmlrt_version(&self) -> Result<String, ProvisionError> {
        let probe: PathBuf = self.env.script_dir().join("core").join("vsmlrt_version.py");
        command::run_capture(
            "python",
            self.env.python_exe(),
            [probe.as_os_str()],
            &self.env.runtime_dir(),
        )
        .await
    }

    fn step_begin(&self, name: &'static str) {
        info!("provisioning: {}", name);
        self.emit(ProvisionEvent::Step { name });
    }

    fn emit(&self, event: ProvisionEvent) {
        (self.progress)(event);
    }

    fn check_cancelled(&self) -> Result<(), ProvisionError> {
        if self.cancel.is_cancelled() {
            Err(ProvisionError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Parse a dotted version string (`15.9` or `15.9.2`) into a comparable
/// triple.
fn parse_version(raw: &str) -> Option<(u32, u32, u32)> {
    let mut parts = raw.split('.');
    let major = parts.next()?.trim().parse().ok()?;
    let minor = parts.next().unwrap_or("0").trim().parse().ok()?;
    let patch = parts.next().unwrap_or("0").trim().parse().ok()?;
    Some((major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn installed_env(root: &std::path::Path) -> BackendEnv {
        let env = BackendEnv::new(root);
        fs::create_dir_all(env.runtime_dir()).unwrap();
        File::create(env.python_exe()).unwrap();
        fs::create_dir_all(env.models_dir()).unwrap();
        File::create(env.models_dir().join("2x_model.onnx")).unwrap();
        fs::create_dir_all(env.ffmpeg_dir()).unwrap();
        File::create(env.ffmpeg_exe()).unwrap();
        env
    }

    #[tokio::test]
    async fn fully_installed_backend_skips_every_step() {
        let dir = tempdir().unwrap();
        let provisioner = Provisioner::new(installed_env(dir.path()));

        let report = provisioner.ensure_backend(false).await.unwrap();

        // Every existence guard was satisfied: no downloads, no extraction.
        assert!(report.all_skipped());
        assert_eq!(report.steps.len(), 9);
        assert!(report.completed().is_empty());
    }

    #[tokio::test]
    async fn concurrent_runs_are_refused() {
        let dir = tempdir().unwrap();
        let provisioner = Provisioner::new(installed_env(dir.path()));

        let _permit = provisioner.activity().try_acquire().unwrap();
        let result = provisioner.ensure_backend(false).await;
        assert!(matches!(result, Err(ProvisionError::Busy)));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_before_any_step() {
        let dir = tempdir().unwrap();
        // Nothing installed: a run would normally start downloading.
        let provisioner = Provisioner::new(BackendEnv::new(dir.path()));
        provisioner.cancel_token().cancel();

        let result = provisioner.ensure_backend(false).await;
        assert!(matches!(result, Err(ProvisionError::Cancelled)));
    }

    #[tokio::test]
    async fn reinstall_refused_while_upscaling() {
        let dir = tempdir().unwrap();
        let provisioner = Provisioner::new(installed_env(dir.path()));

        let upscale = ActivityFlag::new();
        let _permit = upscale.try_acquire().unwrap();

        let result = provisioner.reinstall(&upscale).await;
        assert!(matches!(result, Err(ProvisionError::Busy)));
    }

    #[test]
    fn version_strings_parse() {
        assert_eq!(parse_version("15.9"), Some((15, 9, 0)));
        assert_eq!(parse_version("15.9.2"), Some((15, 9, 2)));
        assert_eq!(parse_version("16"), Some((16, 0, 0)));
        assert_eq!(parse_version("not a version"), None);
    }

    #[test]
    fn version_ordering_matches_minimum_check() {
        assert!(parse_version("15.8").unwrap() < MIN_VSMLRT_VERSION);
        assert!(parse_version("15.9").unwrap() >= MIN_VSMLRT_VERSION);
        assert!(parse_version("16.0").unwrap() >= MIN_VSMLRT_VERSION);
    }
}
