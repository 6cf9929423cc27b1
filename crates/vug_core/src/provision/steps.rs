//! Install-step actions for the provisioning workflow.
//!
//! Each step downloads into the backend root, extracts, moves what it
//! needs into place, and deletes its scratch files. Later steps assume
//! earlier ones succeeded; the orchestrator in `mod.rs` enforces order
//! and guards.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::backend::{download_file, extract_7z, extract_zip};

use super::{command, ProvisionError, ProvisionEvent, Provisioner};

const VAPOURSYNTH_INSTALLER_URL: &str =
    "https://github.com/vapoursynth/vapoursynth/releases/download/R69/Install-Portable-VapourSynth-R69.ps1";

const MISC_FILTERS_URL: &str =
    "https://github.com/vapoursynth/vs-miscfilters-obsolete/releases/download/R2/miscfilters-r2.7z";

const AKARIN_URL: &str =
    "https://github.com/AkarinVS/vapoursynth-plugin/releases/download/v0.96/akarin-release-lexpr-amd64-v0.96g3.7z";

const VSMLRT_BASE_URL: &str =
    "https://github.com/AmusementClub/vs-mlrt/releases/download/v15.9/";

const VSMLRT_PARTS: [&str; 2] = [
    "vsmlrt-windows-x64-cuda.v15.9.7z.001",
    "vsmlrt-windows-x64-cuda.v15.9.7z.002",
];

const RIFE_MODELS_BASE_URL: &str =
    "https://github.com/AmusementClub/vs-mlrt/releases/download/external-models/";

const RIFE_MODEL_ARCHIVES: [&str; 21] = [
    "rife_v4.7.7z",
    "rife_v4.8.7z",
    "rife_v4.9.7z",
    "rife_v4.10.7z",
    "rife_v4.11.7z",
    "rife_v4.12.7z",
    "rife_v4.12_lite.7z",
    "rife_v4.13.7z",
    "rife_v4.13_lite.7z",
    "rife_v4.14.7z",
    "rife_v4.14_lite.7z",
    "rife_v4.15.7z",
    "rife_v4.15_lite.7z",
    "rife_v4.16_lite.7z",
    "rife_v4.17.7z",
    "rife_v4.17_lite.7z",
    "rife_v4.18.7z",
    "rife_v4.19.7z",
    "rife_v4.20.7z",
    "rife_v4.21.7z",
    "rife_v4.22.7z",
];

const UPSCALE_MODELS_URL: &str =
    "https://github.com/the-database/mpv-upscale-2x_animejanai/releases/download/3.0.0/2x_AnimeJaNai_HD_V3_ModelsOnly.zip";

const FFMPEG_URL: &str = "https://www.gyan.dev/ffmpeg/builds/ffmpeg-git-essentials.7z";

/// Python packages installed on top of the bundled wheel.
const PYTHON_DEPENDENCIES: [&str; 1] = ["packaging"];

/// Plugins installed through the plugin repository.
const VS_PLUGINS: [&str; 1] = ["ffms2"];

/// Scratch directories left under the runtime by the installer, removed
/// after a fresh install.
const CLEANUP_DIRS: [&str; 5] = ["doc", "vs-temp-dl", "Scripts", "sdk", "wheel"];

impl Provisioner {
    /// Download the portable installer, run it unattended against the
    /// runtime directory, and delete the installer artifact.
    pub(super) async fn install_runtime(&self) -> Result<(), ProvisionError> {
        if !cfg!(windows) {
            return Err(ProvisionError::UnsupportedPlatform(
                "the portable VapourSynth installer only supports Windows".to_string(),
            ));
        }

        let root = self.env().root().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;

        let installer = root.join("install-vapoursynth.ps1");
        self.download("VapourSynth installer", VAPOURSYNTH_INSTALLER_URL, &installer)
            .await?;

        // A partial previous install confuses the unattended installer.
        let runtime_dir = self.env().runtime_dir();
        if runtime_dir.exists() {
            fs::remove_dir_all(&runtime_dir).map_err(|e| io_err(&runtime_dir, e))?;
        }

        let args: Vec<OsString> = vec![
            "-NoProfile".into(),
            "-ExecutionPolicy".into(),
            "Bypass".into(),
            "-File".into(),
            installer.clone().into(),
            "-Unattended".into(),
            "-TargetFolder".into(),
            runtime_dir.into(),
        ];
        command::run_logged("powershell", "powershell", args, &root, &self.sub_status()).await?;

        fs::remove_file(&installer).map_err(|e| io_err(&installer, e))?;
        Ok(())
    }

    /// Install the bundled VapourSynth wheel and the base python packages,
    /// capturing installer output into the sub-status log.
    pub(super) async fn install_dependencies(&self) -> Result<(), ProvisionError> {
        let python = self.env().python_exe();
        let runtime_dir = self.env().runtime_dir();
        let sink = self.sub_status();

        if let Some(wheel) = find_wheel(&runtime_dir.join("wheel")) {
            let args: Vec<OsString> =
                vec!["-m".into(), "pip".into(), "install".into(), wheel.into()];
            command::run_logged("pip", &python, args, &runtime_dir, &sink).await?;
        }

        let mut args: Vec<OsString> = vec!["-m".into(), "pip".into(), "install".into()];
        args.extend(PYTHON_DEPENDENCIES.iter().copied().map(OsString::from));
        command::run_logged("pip", &python, args, &runtime_dir, &sink).await
    }

    /// Update the plugin repository and install the required plugins.
    pub(super) async fn install_plugins(&self) -> Result<(), ProvisionError> {
        let python = self.env().python_exe();
        let vsrepo = self.env().vsrepo_script();
        let runtime_dir = self.env().runtime_dir();
        let sink = self.sub_status();

        let update: Vec<OsString> = vec![vsrepo.clone().into(), "-p".into(), "update".into()];
        command::run_logged("vsrepo", &python, update, &runtime_dir, &sink).await?;

        let mut install: Vec<OsString> = vec![vsrepo.into(), "-p".into(), "install".into()];
        install.extend(VS_PLUGINS.iter().copied().map(OsString::from));
        command::run_logged("vsrepo", &python, install, &runtime_dir, &sink).await
    }

    /// Install the auxiliary filter plugins: the misc-filters binary is
    /// fished out of a temp extraction, the expression plugin extracts
    /// straight into the plugin directory.
    pub(super) async fn install_filter_plugins(&self) -> Result<(), ProvisionError> {
        let root = self.env().root().to_path_buf();
        let plugins_dir = self.env().plugins_dir();
        let seven_zip = self.env().seven_zip_exe();

        // Misc filters: only MiscFilters.dll is wanted from the archive.
        let archive = root.join("miscfilters.7z");
        self.download("VapourSynth misc filters", MISC_FILTERS_URL, &archive)
            .await?;

        self.extracting("VapourSynth misc filters", None);
        let temp = plugins_dir.join("temp");
        fs::create_dir_all(&temp).map_err(|e| io_err(&temp, e))?;
        extract_7z(&seven_zip, &archive, &temp)?;

        let plugin = temp.join("win64").join("MiscFilters.dll");
        let target = plugins_dir.join("MiscFilters.dll");
        fs::copy(&plugin, &target).map_err(|e| io_err(&plugin, e))?;

        fs::remove_dir_all(&temp).map_err(|e| io_err(&temp, e))?;
        fs::remove_file(&archive).map_err(|e| io_err(&archive, e))?;

        // Expression plugin: the archive layout already matches.
        let archive = root.join("akarin.7z");
        self.download("VapourSynth akarin plugin", AKARIN_URL, &archive)
            .await?;

        self.extracting("VapourSynth akarin plugin", None);
        fs::create_dir_all(&plugins_dir).map_err(|e| io_err(&plugins_dir, e))?;
        extract_7z(&seven_zip, &archive, &plugins_dir)?;
        fs::remove_file(&archive).map_err(|e| io_err(&archive, e))?;

        Ok(())
    }

    /// Download the split ML-runtime archive, extract it with the external
    /// archiver (too large for in-process extraction), move the runtime
    /// script into place, and delete the parts.
    pub(super) async fn install_ml_runtime(&self) -> Result<(), ProvisionError> {
        let root = self.env().root().to_path_buf();
        let plugins_dir = self.env().plugins_dir();

        let parts: Vec<PathBuf> = VSMLRT_PARTS.iter().map(|name| root.join(name)).collect();
        for (name, part) in VSMLRT_PARTS.iter().zip(&parts) {
            let url = format!("{}{}", VSMLRT_BASE_URL, name);
            self.download("ML runtime", &url, part).await?;
        }

        self.extracting("ML runtime", None);
        fs::create_dir_all(&plugins_dir).map_err(|e| io_err(&plugins_dir, e))?;
        extract_7z(&self.env().seven_zip_exe(), &parts[0], &plugins_dir)?;

        let script = plugins_dir.join("vsmlrt.py");
        let target = self.env().runtime_dir().join("vsmlrt.py");
        fs::rename(&script, &target).map_err(|e| io_err(&script, e))?;

        for part in &parts {
            fs::remove_file(part).map_err(|e| io_err(part, e))?;
        }

        Ok(())
    }

    /// Download and extract each frame-interpolation model archive.
    pub(super) async fn install_rife_models(&self) -> Result<(), ProvisionError> {
        let root = self.env().root().to_path_buf();
        let models_dir = self.env().plugin_models_dir();
        let seven_zip = self.env().seven_zip_exe();

        fs::create_dir_all(&models_dir).map_err(|e| io_err(&models_dir, e))?;

        for name in RIFE_MODEL_ARCHIVES {
            self.check_cancelled()?;

            let url = format!("{}{}", RIFE_MODELS_BASE_URL, name);
            let archive = root.join(name);
            self.download("RIFE models", &url, &archive).await?;
            extract_7z(&seven_zip, &archive, &models_dir)?;
            fs::remove_file(&archive).map_err(|e| io_err(&archive, e))?;
        }

        Ok(())
    }

    /// Delete install scratch directories and prune plugin-model
    /// subdirectories that the pipeline does not use.
    pub(super) fn cleanup_install(&self) -> Result<(), ProvisionError> {
        for name in CLEANUP_DIRS {
            let dir = self.env().runtime_dir().join(name);
            if dir.exists() {
                debug!("cleanup: removing {}", dir.display());
                fs::remove_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
            }
        }

        let models_dir = self.env().plugin_models_dir();
        if let Ok(entries) = fs::read_dir(&models_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() && entry.file_name() != "rife" {
                    debug!("cleanup: pruning {}", path.display());
                    fs::remove_dir_all(&path).map_err(|e| io_err(&path, e))?;
                }
            }
        }

        Ok(())
    }

    /// Download the content models zip, extract with progress, and flatten
    /// the single level of nesting the release archive carries.
    pub(super) async fn install_models(&self) -> Result<(), ProvisionError> {
        let models_dir = self.env().models_dir();
        fs::create_dir_all(&models_dir).map_err(|e| io_err(&models_dir, e))?;

        let archive = models_dir.join("models.zip");
        self.download("upscale models", UPSCALE_MODELS_URL, &archive)
            .await?;

        extract_zip(&archive, &models_dir, |percent| {
            self.extracting("upscale models", Some(percent));
        })?;

        if let Some(nested) = first_subdirectory(&models_dir)? {
            move_files_up(&nested, &models_dir, Some("onnx"))?;
            fs::remove_dir_all(&nested).map_err(|e| io_err(&nested, e))?;
        }

        fs::remove_file(&archive).map_err(|e| io_err(&archive, e))?;
        Ok(())
    }

    /// Download and extract ffmpeg, lifting the archive's
    /// `<top folder>/bin` contents up into the ffmpeg directory.
    pub(super) async fn install_ffmpeg(&self) -> Result<(), ProvisionError> {
        let root = self.env().root().to_path_buf();
        let ffmpeg_dir = self.env().ffmpeg_dir();

        let archive = root.join("ffmpeg.7z");
        self.download("ffmpeg", FFMPEG_URL, &archive).await?;

        self.extracting("ffmpeg", None);
        fs::create_dir_all(&ffmpeg_dir).map_err(|e| io_err(&ffmpeg_dir, e))?;
        extract_7z(&self.env().seven_zip_exe(), &archive, &ffmpeg_dir)?;

        if let Some(nested) = first_subdirectory(&ffmpeg_dir)? {
            move_files_up(&nested.join("bin"), &ffmpeg_dir, None)?;
            fs::remove_dir_all(&nested).map_err(|e| io_err(&nested, e))?;
        }

        fs::remove_file(&archive).map_err(|e| io_err(&archive, e))?;
        Ok(())
    }

    async fn download(
        &self,
        what: &'static str,
        url: &str,
        dest: &Path,
    ) -> Result<(), ProvisionError> {
        self.emit(ProvisionEvent::Downloading { what, percent: 0 });
        download_file(&self.client, url, dest, |percent| {
            self.emit(ProvisionEvent::Downloading { what, percent });
        })
        .await?;
        Ok(())
    }

    fn extracting(&self, what: &'static str, percent: Option<u8>) {
        self.emit(ProvisionEvent::Extracting { what, percent });
    }
}

fn io_err(path: &Path, source: std::io::Error) -> ProvisionError {
    ProvisionError::io(path.display().to_string(), source)
}

/// First `.whl` file in the directory, if any.
fn find_wheel(dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut wheels: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .map(|ext| ext.eq_ignore_ascii_case("whl"))
                .unwrap_or(false)
        })
        .collect();
    wheels.sort();
    wheels.into_iter().next()
}

/// First subdirectory of `dir`, if any.
fn first_subdirectory(dir: &Path) -> Result<Option<PathBuf>, ProvisionError> {
    let entries = fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs.into_iter().next())
}

/// Move the files in `from` up into `to`, optionally filtering by
/// extension.
fn move_files_up(from: &Path, to: &Path, extension: Option<&str>) -> Result<(), ProvisionError> {
    let entries = fs::read_dir(from).map_err(|e| io_err(from, e))?;

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(wanted) = extension {
            let matches = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case(wanted))
                .unwrap_or(false);
            if !matches {
                continue;
            }
        }

        let target = to.join(entry.file_name());
        fs::rename(&path, &target).map_err(|e| io_err(&path, e))?;
    }

    Ok(())
}
