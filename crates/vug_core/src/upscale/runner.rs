//! External process pipeline runner.
//!
//! For each eligible input the runner spawns the pipe tool and ffmpeg as
//! separate children with the pipe wired natively (no shell), streams
//! their output into the console log, and waits. Cancellation is checked
//! between files and enforced mid-file by killing the whole process
//! group.

use std::fs;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tracing::{debug, info};

use crate::backend::BackendEnv;
use crate::console::{ConsoleBuffer, CONSOLE_CAPACITY};
use crate::models::{InferenceBackend, UpscaleWorkflow};
use crate::sync::{ActivityFlag, CancelToken};

use super::conf::write_config;
use super::errors::UpscaleError;
use super::files::output_path_for;
use super::process::ProcessGroup;
use super::validate::validate;

/// How a run ended. Cancellation is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// All eligible files were processed.
    Completed { processed: usize },
    /// The run was cancelled; `processed` files had finished by then.
    Cancelled { processed: usize },
}

/// Result of one pipeline invocation within a run.
enum StepRun {
    Done,
    Cancelled,
}

/// Runs upscale workflows against a provisioned backend.
pub struct UpscaleRunner {
    env: BackendEnv,
    console: Arc<ConsoleBuffer>,
    cancel: Mutex<CancelToken>,
    activity: ActivityFlag,
}

impl UpscaleRunner {
    /// Create a runner for the given environment.
    pub fn new(env: BackendEnv) -> Self {
        Self {
            env,
            console: Arc::new(ConsoleBuffer::new(CONSOLE_CAPACITY)),
            cancel: Mutex::new(CancelToken::new()),
            activity: ActivityFlag::new(),
        }
    }

    /// Console log fed by pipeline stdout/stderr.
    pub fn console(&self) -> Arc<ConsoleBuffer> {
        Arc::clone(&self.console)
    }

    /// Busy flag for this runner (one active run at a time). Also used to
    /// block reinstalls while an upscale is active.
    pub fn activity(&self) -> ActivityFlag {
        self.activity.clone()
    }

    /// Whether a run is currently active.
    pub fn is_running(&self) -> bool {
        self.activity.is_active()
    }

    /// Cancel the active run: the cooperative token stops the file loop
    /// and the in-flight process group is killed.
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }

    /// Run the workflow once per eligible input file.
    ///
    /// The eligible set is the same one validation counts, so files
    /// reported as "will be skipped" are really skipped. The busy permit
    /// is released on every exit path.
    pub async fn run(&self, workflow: &UpscaleWorkflow) -> Result<RunOutcome, UpscaleError> {
        let _permit = self.activity.try_acquire().ok_or(UpscaleError::Busy)?;

        let token = CancelToken::new();
        *self.cancel.lock() = token.clone();

        self.console.clear();

        let report = validate(workflow);
        if !report.valid {
            return Err(UpscaleError::NotReady {
                reasons: report.message_text().replace('\n', " "),
            });
        }

        write_config(workflow, &self.env)?;
        fs::create_dir_all(&workflow.output_folder).map_err(|e| {
            UpscaleError::io(format!("create {}", workflow.output_folder.display()), e)
        })?;

        let mut processed = 0;
        for input in &report.candidates {
            if token.is_cancelled() {
                info!("upscale cancelled after {} file(s)", processed);
                return Ok(RunOutcome::Cancelled { processed });
            }

            if workflow.backend == InferenceBackend::TensorRt {
                if let StepRun::Cancelled = self.generate_engines(workflow, input, &token).await? {
                    return Ok(RunOutcome::Cancelled { processed });
                }
            }

            let output =
                output_path_for(&workflow.output_folder, &workflow.output_filename, input);
            self.console.push(format!(
                "Upscaling {} -> {}",
                input.display(),
                output.display()
            ));

            match self.run_single(workflow, input, &output, &token).await? {
                StepRun::Done => processed += 1,
                StepRun::Cancelled => {
                    info!("upscale cancelled after {} file(s)", processed);
                    return Ok(RunOutcome::Cancelled { processed });
                }
            }
        }

        info!("upscale completed: {} file(s)", processed);
        Ok(RunOutcome::Completed { processed })
    }

    /// Build TensorRT engines for models that do not have one yet.
    ///
    /// The pipe tool is invoked with a two-frame range purely for its
    /// engine-building side effect. Models whose engine file already
    /// exists are skipped.
    async fn generate_engines(
        &self,
        workflow: &UpscaleWorkflow,
        input: &Path,
        token: &CancelToken,
    ) -> Result<StepRun, UpscaleError> {
        for step in &workflow.steps {
            if token.is_cancelled() {
                return Ok(StepRun::Cancelled);
            }

            let Some(stem) = step.model_path.file_stem() else {
                continue;
            };
            let engine = self
                .env
                .models_dir()
                .join(format!("{}.engine", stem.to_string_lossy()));
            if engine.is_file() {
                debug!("engine already built: {}", engine.display());
                continue;
            }

            self.console.push(format!(
                "Building TensorRT engine for {}",
                stem.to_string_lossy()
            ));

            let mut cmd = self.vspipe_base(input);
            cmd.arg("--start")
                .arg("0")
                .arg("--end")
                .arg("1")
                .arg("-p")
                .arg(self.env.encode_script())
                .arg(".");

            let mut vspipe = cmd
                .spawn()
                .map_err(|e| UpscaleError::Spawn {
                    tool: "vspipe".to_string(),
                    source: e,
                })?;
            let stdout = vspipe.stdout.take();
            let stderr = vspipe.stderr.take();

            let mut group = ProcessGroup::new();
            group.push("vspipe", vspipe);

            if let StepRun::Cancelled = self
                .execute(&mut group, stdout, stderr, None, None, token)
                .await?
            {
                return Ok(StepRun::Cancelled);
            }
        }

        Ok(StepRun::Done)
    }

    /// Run the vspipe-into-ffmpeg pipeline for one input file.
    async fn run_single(
        &self,
        workflow: &UpscaleWorkflow,
        input: &Path,
        output: &Path,
        token: &CancelToken,
    ) -> Result<StepRun, UpscaleError> {
        let mut vspipe_cmd = self.vspipe_base(input);
        vspipe_cmd.arg(self.env.encode_script()).arg("-");

        let mut vspipe = vspipe_cmd.spawn().map_err(|e| UpscaleError::Spawn {
            tool: "vspipe".to_string(),
            source: e,
        })?;
        let vs_stderr = vspipe.stderr.take();
        let vs_stdout = vspipe.stdout.take().expect("vspipe stdout is piped");
        let pipe: Stdio = vs_stdout
            .try_into()
            .map_err(|e| UpscaleError::io("wire vspipe stdout into ffmpeg", e))?;

        let mut ffmpeg_cmd = Command::new(self.env.ffmpeg_exe());
        ffmpeg_cmd.arg(if workflow.overwrite_existing { "-y" } else { "-n" });
        ffmpeg_cmd
            .arg("-i")
            .arg("pipe:")
            .arg("-i")
            .arg(input)
            .arg("-map")
            .arg("0:v")
            .arg("-c:v")
            .args(workflow.codec.ffmpeg_args())
            .arg("-max_interleave_delta")
            .arg("0")
            .arg("-map")
            .arg("1:t?")
            .arg("-map")
            .arg("1:a?")
            .arg("-map")
            .arg("1:s?")
            .arg("-c:t")
            .arg("copy")
            .arg("-c:a")
            .arg("copy")
            .arg("-c:s")
            .arg("copy")
            .arg(output)
            .current_dir(self.env.root())
            .stdin(pipe)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut ffmpeg = ffmpeg_cmd.spawn().map_err(|e| UpscaleError::Spawn {
            tool: "ffmpeg".to_string(),
            source: e,
        })?;
        let ff_stdout = ffmpeg.stdout.take();
        let ff_stderr = ffmpeg.stderr.take();

        let mut group = ProcessGroup::new();
        group.push("vspipe", vspipe);
        group.push("ffmpeg", ffmpeg);

        self.execute(&mut group, ff_stdout, vs_stderr, None, ff_stderr, token)
            .await
    }

    /// Wait for the group while pumping its output, killing everything if
    /// cancellation arrives first.
    async fn execute(
        &self,
        group: &mut ProcessGroup,
        out1: Option<ChildStdout>,
        err1: Option<ChildStderr>,
        out2: Option<ChildStdout>,
        err2: Option<ChildStderr>,
        token: &CancelToken,
    ) -> Result<StepRun, UpscaleError> {
        let console = &self.console;
        let pumps = async {
            tokio::join!(
                pump_lines(out1, console),
                pump_lines(err1, console),
                pump_lines(out2, console),
                pump_lines(err2, console),
            );
        };

        let mut finished = None;
        let cancelled = tokio::select! {
            biased;
            _ = token.cancelled() => true,
            statuses = async {
                let (statuses, _) = tokio::join!(group.wait_all(), pumps);
                statuses
            } => {
                finished = Some(statuses);
                false
            }
        };

        if cancelled {
            group.kill_all();
            let _ = group.wait_all().await;
            return Ok(StepRun::Cancelled);
        }

        let statuses = finished.expect("pipeline finished without statuses")?;
        if let Some(err) = ProcessGroup::first_failure(&statuses) {
            return Err(err);
        }
        Ok(StepRun::Done)
    }

    /// Common vspipe invocation prefix: y4m output with the slot and
    /// input path passed as script arguments.
    fn vspipe_base(&self, input: &Path) -> Command {
        let mut cmd = Command::new(self.env.vspipe_exe());
        cmd.arg("-c")
            .arg("y4m")
            .arg("--arg")
            .arg("slot=1")
            .arg("--arg")
            .arg(format!("video_path={}", input.display()))
            .current_dir(self.env.root())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

async fn pump_lines<R: AsyncRead + Unpin>(reader: Option<R>, console: &ConsoleBuffer) {
    let Some(reader) = reader else {
        return;
    };

    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        debug!(target: "vug_core::pipeline::output", "{}", line);
        console.push(line);
    }
}
