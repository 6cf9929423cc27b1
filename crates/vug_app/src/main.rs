//! Video Upscale GUI - headless driver
//!
//! Drives the core library without the GUI: loads settings, provisions
//! the backend (portable runtime, plugins, models, ffmpeg), validates
//! the selected workflow, and runs the upscale pipeline. Ctrl-C cancels
//! the active provisioning or upscale run and kills the child process
//! tree.
//!
//! Usage:
//!   video-upscale-gui [--config PATH] [--workflow N] [--backend-root PATH]
//!                     [--provision-only] [--reinstall]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;

use vug_core::backend::BackendEnv;
use vug_core::config::{ConfigManager, Settings};
use vug_core::console::EtaCalculator;
use vug_core::provision::{ProvisionEvent, Provisioner};
use vug_core::upscale::{validate, RunOutcome, UpscaleRunner};

const USAGE: &str = "Usage: video-upscale-gui [OPTIONS]

Options:
  --config PATH         Settings file (default: settings.toml)
  --workflow N          Workflow slot to run, 1-based (default: last selected)
  --backend-root PATH   Backend install directory override
  --provision-only      Install the backend and exit
  --reinstall           Delete the runtime and ffmpeg, then reinstall
  -h, --help            Show this help";

#[derive(Debug, PartialEq)]
struct Args {
    config: PathBuf,
    workflow: Option<usize>,
    backend_root: Option<PathBuf>,
    provision_only: bool,
    reinstall: bool,
    help: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: PathBuf::from("settings.toml"),
            workflow: None,
            backend_root: None,
            provision_only: false,
            reinstall: false,
            help: false,
        }
    }
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => parsed.help = true,
            "--provision-only" => parsed.provision_only = true,
            "--reinstall" => parsed.reinstall = true,
            "--config" => {
                let value = iter.next().ok_or("--config requires a path")?;
                parsed.config = PathBuf::from(value);
            }
            "--backend-root" => {
                let value = iter.next().ok_or("--backend-root requires a path")?;
                parsed.backend_root = Some(PathBuf::from(value));
            }
            "--workflow" => {
                let value = iter.next().ok_or("--workflow requires a slot number")?;
                let slot: usize = value
                    .parse()
                    .map_err(|_| format!("invalid workflow slot: {}", value))?;
                if slot == 0 {
                    return Err("workflow slots are numbered from 1".to_string());
                }
                parsed.workflow = Some(slot - 1);
            }
            other => return Err(format!("unknown argument: {}", other)),
        }
    }

    Ok(parsed)
}

/// Backend root: CLI override, then settings override, then a portable
/// `backend` folder if one exists, then the per-user data directory.
fn resolve_backend_root(args: &Args, settings: &Settings) -> PathBuf {
    if let Some(root) = &args.backend_root {
        return root.clone();
    }
    if !settings.paths.backend_root.is_empty() {
        return PathBuf::from(&settings.paths.backend_root);
    }

    let portable = PathBuf::from("backend");
    if portable.exists() {
        return portable;
    }

    match ProjectDirs::from("io.github", "videoupscale", "VideoUpscaleGui") {
        Some(dirs) => dirs.data_dir().join("backend"),
        None => portable,
    }
}

/// Provisioning progress printer with a rolling download ETA.
fn progress_printer() -> impl Fn(ProvisionEvent) + Send + Sync {
    let eta: Mutex<(String, EtaCalculator)> =
        Mutex::new((String::new(), EtaCalculator::new(4, 30.0)));

    move |event| match event {
        ProvisionEvent::Step { name } => println!("==> {}", name),
        ProvisionEvent::Downloading { what, percent } => {
            let mut state = eta.lock().expect("eta lock");
            if state.0 != what {
                state.0 = what.to_string();
                state.1.reset();
            }
            state.1.update(f64::from(percent) / 100.0);

            if percent % 5 != 0 && percent != 100 {
                return;
            }
            match state.1.remaining() {
                Some(left) => println!(
                    "    downloading {} ({}%, ~{}s left)",
                    what,
                    percent,
                    left.as_secs()
                ),
                None => println!("    downloading {} ({}%)", what, percent),
            }
        }
        ProvisionEvent::Extracting {
            what,
            percent: Some(percent),
        } => {
            if percent % 10 == 0 || percent == 100 {
                println!("    extracting {} ({}%)", what, percent);
            }
        }
        ProvisionEvent::Extracting { what, percent: None } => {
            println!("    extracting {} (this may take several minutes)", what);
        }
        ProvisionEvent::Ready => println!("Backend ready."),
        ProvisionEvent::Failed { message } => eprintln!("{}", message),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}\n\n{}", message, USAGE);
            std::process::exit(2);
        }
    };

    if args.help {
        println!("{}", USAGE);
        return Ok(());
    }

    // A missing settings file means this is the first run, which enables
    // the runtime version self-heal check during provisioning.
    let first_run = !args.config.exists();

    let mut config = ConfigManager::new(&args.config);
    config
        .load_or_create()
        .with_context(|| format!("loading settings from {}", args.config.display()))?;

    let logs_dir = PathBuf::from(&config.settings().paths.logs_folder);
    let _log_guard = vug_core::logging::init_tracing_with_file("info", &logs_dir);

    tracing::info!("Video Upscale GUI starting");
    tracing::info!("Core version: {}", vug_core::version());
    tracing::info!("Settings: {}", args.config.display());

    let backend_root = resolve_backend_root(&args, config.settings());
    tracing::info!("Backend root: {}", backend_root.display());

    let env = BackendEnv::new(&backend_root);
    let provisioner = Provisioner::new(env.clone()).with_progress(Box::new(progress_printer()));
    let runner = Arc::new(UpscaleRunner::new(env));
    runner
        .console()
        .set_notify(Box::new(|line| println!("{}", line)));

    // Ctrl-C cancels whichever operation is active and kills the child
    // process tree.
    {
        let provision_cancel = provisioner.cancel_token();
        let runner = Arc::clone(&runner);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Cancelling...");
                provision_cancel.cancel();
                runner.cancel();
            }
        });
    }

    if args.reinstall {
        provisioner
            .reinstall(&runner.activity())
            .await
            .context("reinstalling backend")?;
    } else {
        let report = provisioner
            .ensure_backend(first_run)
            .await
            .context("provisioning backend")?;
        if report.all_skipped() {
            tracing::info!("backend already installed, nothing to provision");
        }
    }

    if args.provision_only {
        return Ok(());
    }

    let slot = args
        .workflow
        .unwrap_or(config.settings().app.selected_workflow);
    let Some(workflow) = config.settings().workflows.get(slot) else {
        bail!(
            "no workflow slot {} (have {})",
            slot + 1,
            config.settings().workflows.len()
        );
    };

    let report = validate(workflow);
    println!("{} selected for upscaling.", report.input_status);
    if !report.valid {
        for message in &report.messages {
            eprintln!("{}", message);
        }
        bail!("workflow {} is not ready to run", slot + 1);
    }

    match runner.run(workflow).await? {
        RunOutcome::Completed { processed } => {
            println!("Finished: {} file(s) upscaled.", processed);
        }
        RunOutcome::Cancelled { processed } => {
            println!("Cancelled after {} file(s).", processed);
        }
    }

    Ok(())
}
