//! Canonical paths and install-state checks for the portable backend.
//!
//! Everything lives under a single root directory. State checks read the
//! filesystem on every call; nothing is cached, so the answer is always
//! current at call time.

use std::fs;
use std::path::{Path, PathBuf};

/// Resolves the on-disk layout of the backend installation.
#[derive(Debug, Clone)]
pub struct BackendEnv {
    root: PathBuf,
}

impl BackendEnv {
    /// Create a resolver rooted at the given backend directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the backend installation.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Portable runtime (embedded Python + VapourSynth) directory.
    pub fn runtime_dir(&self) -> PathBuf {
        self.root.join("python")
    }

    /// Runtime Python executable.
    pub fn python_exe(&self) -> PathBuf {
        #[cfg(windows)]
        {
            self.runtime_dir().join("python.exe")
        }
        #[cfg(not(windows))]
        {
            self.runtime_dir().join("python3")
        }
    }

    /// VapourSynth pipe tool executable.
    pub fn vspipe_exe(&self) -> PathBuf {
        #[cfg(windows)]
        {
            self.runtime_dir().join("VSPipe.exe")
        }
        #[cfg(not(windows))]
        {
            self.runtime_dir().join("vspipe")
        }
    }

    /// Plugin-repository install script shipped with the runtime.
    pub fn vsrepo_script(&self) -> PathBuf {
        self.runtime_dir().join("vsrepo.py")
    }

    /// 7-Zip executable shipped with the runtime, used for large archives.
    pub fn seven_zip_exe(&self) -> PathBuf {
        #[cfg(windows)]
        {
            self.runtime_dir().join("7z.exe")
        }
        #[cfg(not(windows))]
        {
            self.runtime_dir().join("7z")
        }
    }

    /// VapourSynth plugin directory.
    pub fn plugins_dir(&self) -> PathBuf {
        self.runtime_dir().join("vs-plugins")
    }

    /// Model directory used by the ML-runtime plugin.
    pub fn plugin_models_dir(&self) -> PathBuf {
        self.plugins_dir().join("models")
    }

    /// Frame-interpolation models below the plugin model directory.
    pub fn rife_models_dir(&self) -> PathBuf {
        self.plugin_models_dir().join("rife")
    }

    /// Directory holding the upscale script, generated config, and models.
    pub fn script_dir(&self) -> PathBuf {
        self.root.join("upscale")
    }

    /// The VapourSynth encode script the pipe tool executes.
    pub fn encode_script(&self) -> PathBuf {
        self.script_dir().join("core").join("encode.vpy")
    }

    /// Generated configuration file consumed by the encode script.
    pub fn conf_path(&self) -> PathBuf {
        self.script_dir().join("upscale.conf")
    }

    /// Content upscale model directory.
    pub fn models_dir(&self) -> PathBuf {
        self.script_dir().join("onnx")
    }

    /// ffmpeg install directory.
    pub fn ffmpeg_dir(&self) -> PathBuf {
        self.root.join("ffmpeg")
    }

    /// ffmpeg executable.
    pub fn ffmpeg_exe(&self) -> PathBuf {
        #[cfg(windows)]
        {
            self.ffmpeg_dir().join("ffmpeg.exe")
        }
        #[cfg(not(windows))]
        {
            self.ffmpeg_dir().join("ffmpeg")
        }
    }

    /// Whether the portable runtime is installed.
    pub fn is_runtime_installed(&self) -> bool {
        self.python_exe().is_file()
    }

    /// Whether the content model directory exists and is non-empty.
    pub fn are_models_installed(&self) -> bool {
        match fs::read_dir(self.models_dir()) {
            Ok(mut entries) => entries.next().is_some(),
            Err(_) => false,
        }
    }

    /// Whether ffmpeg is installed.
    pub fn is_ffmpeg_installed(&self) -> bool {
        self.ffmpeg_exe().is_file()
    }

    /// Sorted filenames of the installed content models.
    pub fn installed_models(&self) -> Vec<String> {
        let mut models: Vec<String> = match fs::read_dir(self.models_dir()) {
            Ok(entries) => entries
                .flatten()
                .filter(|e| e.path().is_file())
                .filter(|e| {
                    e.path()
                        .extension()
                        .map(|ext| ext.eq_ignore_ascii_case("onnx"))
                        .unwrap_or(false)
                })
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        models.sort();
        models
    }

    /// Display labels of the installed frame-interpolation models,
    /// newest version first.
    pub fn installed_rife_models(&self) -> Vec<String> {
        let mut versions: Vec<(u32, u32, bool)> = Vec::new();

        if let Ok(entries) = fs::read_dir(self.rife_models_dir()) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if let Some(version) = parse_rife_filename(&name) {
                    if !versions.contains(&version) {
                        versions.push(version);
                    }
                }
            }
        }

        versions.sort_by(|a, b| b.cmp(a));
        versions
            .into_iter()
            .map(|(major, minor, lite)| {
                let mut label = format!("RIFE {}.{}", major, minor);
                if lite {
                    label.push_str(" Lite");
                }
                label
            })
            .collect()
    }
}

/// Parse `rife_v{major}.{minor}[_lite][_ensemble].onnx` into
/// `(major, minor, lite)`.
fn parse_rife_filename(name: &str) -> Option<(u32, u32, bool)> {
    let rest = name.strip_prefix("rife_v")?.strip_suffix(".onnx")?;
    let rest = rest.strip_suffix("_ensemble").unwrap_or(rest);
    let (rest, lite) = match rest.strip_suffix("_lite") {
        Some(r) => (r, true),
        None => (rest, false),
    };

    let (major, minor) = rest.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?, lite))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn paths_nest_under_root() {
        let env = BackendEnv::new("/data/backend");
        assert!(env.runtime_dir().starts_with(env.root()));
        assert!(env.python_exe().starts_with(env.runtime_dir()));
        assert!(env.plugins_dir().starts_with(env.runtime_dir()));
        assert!(env.models_dir().starts_with(env.script_dir()));
        assert!(env.ffmpeg_exe().starts_with(env.ffmpeg_dir()));
        assert!(env.conf_path().starts_with(env.script_dir()));
    }

    #[test]
    fn install_state_reflects_filesystem() {
        let dir = tempdir().unwrap();
        let env = BackendEnv::new(dir.path());

        assert!(!env.is_runtime_installed());
        assert!(!env.are_models_installed());
        assert!(!env.is_ffmpeg_installed());

        fs::create_dir_all(env.runtime_dir()).unwrap();
        File::create(env.python_exe()).unwrap();
        assert!(env.is_runtime_installed());

        // An empty model directory still counts as not installed.
        fs::create_dir_all(env.models_dir()).unwrap();
        assert!(!env.are_models_installed());
        File::create(env.models_dir().join("2x_model.onnx")).unwrap();
        assert!(env.are_models_installed());

        fs::create_dir_all(env.ffmpeg_dir()).unwrap();
        File::create(env.ffmpeg_exe()).unwrap();
        assert!(env.is_ffmpeg_installed());
    }

    #[test]
    fn installed_models_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        let env = BackendEnv::new(dir.path());
        fs::create_dir_all(env.models_dir()).unwrap();

        File::create(env.models_dir().join("b_model.onnx")).unwrap();
        File::create(env.models_dir().join("a_model.onnx")).unwrap();
        File::create(env.models_dir().join("notes.txt")).unwrap();

        assert_eq!(env.installed_models(), vec!["a_model.onnx", "b_model.onnx"]);
    }

    #[test]
    fn rife_filenames_parse() {
        assert_eq!(parse_rife_filename("rife_v4.22.onnx"), Some((4, 22, false)));
        assert_eq!(
            parse_rife_filename("rife_v4.12_lite.onnx"),
            Some((4, 12, true))
        );
        assert_eq!(
            parse_rife_filename("rife_v4.12_lite_ensemble.onnx"),
            Some((4, 12, true))
        );
        assert_eq!(parse_rife_filename("model.onnx"), None);
    }

    #[test]
    fn installed_rife_models_newest_first() {
        let dir = tempdir().unwrap();
        let env = BackendEnv::new(dir.path());
        fs::create_dir_all(env.rife_models_dir()).unwrap();

        for name in [
            "rife_v4.9.onnx",
            "rife_v4.22.onnx",
            "rife_v4.12_lite.onnx",
            "rife_v4.22_ensemble.onnx",
        ] {
            File::create(env.rife_models_dir().join(name)).unwrap();
        }

        let labels = env.installed_rife_models();
        assert_eq!(labels[0], "RIFE 4.22");
        assert!(labels.contains(&"RIFE 4.12 Lite".to_string()));
        assert!(labels.contains(&"RIFE 4.9".to_string()));
        // The ensemble variant collapses into its base version.
        assert_eq!(labels.len(), 3);
    }
}
