//! Workflow and model-step definitions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::enums::{CodecProfile, InferenceBackend, InputMode, TensorRtEngine};

/// Placeholder in the output filename pattern replaced by the input
/// file's stem.
pub const FILENAME_TOKEN: &str = "%filename%";

/// One stage in the ordered chain of model applications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStep {
    /// Position-derived display header (`Model 1`, `Model 2`, ...).
    /// Recomputed whenever the step list mutates.
    #[serde(default)]
    pub header: String,

    /// Path to the ONNX model file. Must exist on disk for the workflow
    /// to validate.
    #[serde(default)]
    pub model_path: PathBuf,

    /// Resize the video to this height before upscaling; 0 disables.
    #[serde(default)]
    pub resize_height_before_upscale: u32,

    /// Resize by this percentage before upscaling; used when the height
    /// resize is disabled.
    #[serde(default = "default_resize_factor")]
    pub resize_factor_before_upscale: f64,
}

fn default_resize_factor() -> f64 {
    100.0
}

impl Default for ModelStep {
    fn default() -> Self {
        Self {
            header: String::new(),
            model_path: PathBuf::new(),
            resize_height_before_upscale: 0,
            resize_factor_before_upscale: default_resize_factor(),
        }
    }
}

impl ModelStep {
    /// The factor resize applies only while the height resize is disabled.
    pub fn resize_factor_enabled(&self) -> bool {
        self.resize_height_before_upscale == 0
    }

    /// Model filename without extension, as the config file wants it.
    pub fn model_name(&self) -> Option<String> {
        self.model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
    }
}

/// Frame-interpolation (RIFE) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RifeSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Display label, e.g. `RIFE 4.22` or `RIFE 4.12 Lite`.
    #[serde(default = "default_rife_model")]
    pub model: String,

    #[serde(default = "default_rife_numerator")]
    pub factor_numerator: u32,

    #[serde(default = "default_rife_denominator")]
    pub factor_denominator: u32,

    #[serde(default)]
    pub ensemble: bool,

    #[serde(default = "default_scene_detect_threshold")]
    pub scene_detect_threshold: f64,
}

fn default_rife_model() -> String {
    "RIFE 4.22".to_string()
}

fn default_rife_numerator() -> u32 {
    2
}

fn default_rife_denominator() -> u32 {
    1
}

fn default_scene_detect_threshold() -> f64 {
    0.15
}

impl Default for RifeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_rife_model(),
            factor_numerator: default_rife_numerator(),
            factor_denominator: default_rife_denominator(),
            ensemble: false,
            scene_detect_threshold: default_scene_detect_threshold(),
        }
    }
}

/// A named, independently configurable upscale job profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpscaleWorkflow {
    #[serde(default)]
    pub name: String,

    /// Slot index within the persisted workflow list.
    #[serde(default)]
    pub index: usize,

    #[serde(default)]
    pub input_mode: InputMode,

    #[serde(default)]
    pub input_file: PathBuf,

    #[serde(default)]
    pub input_folder: PathBuf,

    #[serde(default)]
    pub output_folder: PathBuf,

    /// Output filename pattern containing [`FILENAME_TOKEN`].
    #[serde(default = "default_output_filename")]
    pub output_filename: String,

    #[serde(default)]
    pub overwrite_existing: bool,

    #[serde(default)]
    pub codec: CodecProfile,

    #[serde(default)]
    pub backend: InferenceBackend,

    /// When set, the external tool picks engine-build settings itself and
    /// the config carries an empty settings string.
    #[serde(default = "default_true")]
    pub engine_auto: bool,

    #[serde(default)]
    pub engine: TensorRtEngine,

    /// Final resize target height; 0 disables.
    #[serde(default)]
    pub final_resize_height: u32,

    /// Final resize percentage; used when the height resize is disabled.
    #[serde(default = "default_final_resize_factor")]
    pub final_resize_factor: u32,

    /// Ordered model chain. Order here is order in the generated config.
    /// Kept after the scalar fields so the TOML rendering of a workflow
    /// stays valid (values before tables).
    #[serde(default)]
    pub steps: Vec<ModelStep>,

    #[serde(default)]
    pub rife: RifeSettings,
}

fn default_output_filename() -> String {
    format!("{}-upscale.mkv", FILENAME_TOKEN)
}

fn default_true() -> bool {
    true
}

fn default_final_resize_factor() -> u32 {
    100
}

impl Default for UpscaleWorkflow {
    fn default() -> Self {
        Self::default_slot(0)
    }
}

impl UpscaleWorkflow {
    /// Default workflow for the given slot, with a single empty model step.
    pub fn default_slot(index: usize) -> Self {
        let mut workflow = Self {
            name: format!("Workflow {}", index + 1),
            index,
            input_mode: InputMode::default(),
            input_file: PathBuf::new(),
            input_folder: PathBuf::new(),
            output_folder: PathBuf::new(),
            output_filename: default_output_filename(),
            overwrite_existing: false,
            codec: CodecProfile::default(),
            backend: InferenceBackend::default(),
            engine_auto: true,
            engine: TensorRtEngine::default(),
            steps: vec![ModelStep::default()],
            rife: RifeSettings::default(),
            final_resize_height: 0,
            final_resize_factor: default_final_resize_factor(),
        };
        workflow.renumber_steps();
        workflow
    }

    /// The input path for the active mode.
    pub fn input_path(&self) -> &Path {
        match self.input_mode {
            InputMode::File => &self.input_file,
            InputMode::Folder => &self.input_folder,
        }
    }

    /// Append an empty model step and renumber headers.
    pub fn add_step(&mut self) {
        self.steps.push(ModelStep::default());
        self.renumber_steps();
    }

    /// Remove the step at `index` (ignored if out of range) and renumber.
    pub fn remove_step(&mut self, index: usize) {
        if index < self.steps.len() {
            self.steps.remove(index);
        }
        self.renumber_steps();
    }

    /// Recompute the position-derived headers after a list mutation.
    pub fn renumber_steps(&mut self) {
        for (i, step) in self.steps.iter_mut().enumerate() {
            step.header = format!("Model {}", i + 1);
        }
    }

    /// Fill in an empty output folder from the selected input:
    /// the input file's parent, or `<input folder> upscale`.
    pub fn apply_default_output_folder(&mut self) {
        if !self.output_folder.as_os_str().is_empty() {
            return;
        }

        match self.input_mode {
            InputMode::File => {
                if let Some(parent) = self.input_file.parent() {
                    if !parent.as_os_str().is_empty() {
                        self.output_folder = parent.to_path_buf();
                    }
                }
            }
            InputMode::Folder => {
                if !self.input_folder.as_os_str().is_empty() {
                    let folder = self.input_folder.to_string_lossy();
                    self.output_folder = PathBuf::from(format!("{} upscale", folder));
                }
            }
        }
    }

    /// Engine settings string as the config file wants it: empty in auto
    /// mode, otherwise the selected preset's trtexec arguments.
    pub fn engine_settings(&self) -> &str {
        if self.engine_auto {
            ""
        } else {
            self.engine.trtexec_args()
        }
    }
}

/// Convert a RIFE display label to the numeric model code the external
/// tool expects: `RIFE 4.22` -> `422`, `RIFE 4.12 Lite` -> `4121`.
pub fn rife_label_to_code(label: &str) -> Option<String> {
    let rest = label.strip_prefix("RIFE ")?;
    let (version, lite) = match rest.strip_suffix(" Lite") {
        Some(v) => (v, true),
        None => (rest, false),
    };

    let (major, minor) = version.split_once('.')?;
    if major.is_empty()
        || minor.is_empty()
        || !major.bytes().all(|b| b.is_ascii_digit())
        || !minor.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let mut code = format!("{}{}", major, minor);
    if lite {
        code.push('1');
    }
    Some(code)
}

/// Convert a numeric RIFE model code back to its display label:
/// `422` -> `RIFE 4.22`, `4121` -> `RIFE 4.12 Lite`.
pub fn rife_code_to_label(code: &str) -> Option<String> {
    if code.len() < 2 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let major = &code[..1];
    let minor = if code.len() == 2 {
        &code[1..2]
    } else {
        &code[1..3]
    };

    let mut label = format!("RIFE {}.{}", major, minor);
    if code.len() >= 4 && code.ends_with('1') {
        label.push_str(" Lite");
    }
    Some(label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_slot_numbers_name_and_step() {
        let workflow = UpscaleWorkflow::default_slot(2);
        assert_eq!(workflow.name, "Workflow 3");
        assert_eq!(workflow.steps.len(), 1);
        assert_eq!(workflow.steps[0].header, "Model 1");
        assert_eq!(workflow.output_filename, "%filename%-upscale.mkv");
    }

    #[test]
    fn add_and_remove_steps_renumber_headers() {
        let mut workflow = UpscaleWorkflow::default_slot(0);
        workflow.add_step();
        workflow.add_step();

        let headers: Vec<&str> = workflow.steps.iter().map(|s| s.header.as_str()).collect();
        assert_eq!(headers, vec!["Model 1", "Model 2", "Model 3"]);

        workflow.remove_step(0);
        let headers: Vec<&str> = workflow.steps.iter().map(|s| s.header.as_str()).collect();
        assert_eq!(headers, vec!["Model 1", "Model 2"]);
    }

    #[test]
    fn remove_step_out_of_range_is_ignored() {
        let mut workflow = UpscaleWorkflow::default_slot(0);
        workflow.remove_step(5);
        assert_eq!(workflow.steps.len(), 1);
    }

    #[test]
    fn default_output_folder_from_input_file() {
        let mut workflow = UpscaleWorkflow::default_slot(0);
        workflow.input_mode = InputMode::File;
        workflow.input_file = PathBuf::from("/videos/show/clip.mkv");
        workflow.apply_default_output_folder();
        assert_eq!(workflow.output_folder, PathBuf::from("/videos/show"));
    }

    #[test]
    fn default_output_folder_from_input_folder() {
        let mut workflow = UpscaleWorkflow::default_slot(0);
        workflow.input_mode = InputMode::Folder;
        workflow.input_folder = PathBuf::from("/videos/show");
        workflow.apply_default_output_folder();
        assert_eq!(workflow.output_folder, PathBuf::from("/videos/show upscale"));
    }

    #[test]
    fn default_output_folder_does_not_overwrite() {
        let mut workflow = UpscaleWorkflow::default_slot(0);
        workflow.output_folder = PathBuf::from("/out");
        workflow.input_file = PathBuf::from("/videos/clip.mkv");
        workflow.apply_default_output_folder();
        assert_eq!(workflow.output_folder, PathBuf::from("/out"));
    }

    #[test]
    fn rife_label_round_trips() {
        assert_eq!(rife_label_to_code("RIFE 4.22").as_deref(), Some("422"));
        assert_eq!(rife_label_to_code("RIFE 4.9").as_deref(), Some("49"));
        assert_eq!(rife_label_to_code("RIFE 4.12 Lite").as_deref(), Some("4121"));

        assert_eq!(rife_code_to_label("422").as_deref(), Some("RIFE 4.22"));
        assert_eq!(rife_code_to_label("49").as_deref(), Some("RIFE 4.9"));
        assert_eq!(rife_code_to_label("4121").as_deref(), Some("RIFE 4.12 Lite"));
    }

    #[test]
    fn rife_conversion_rejects_garbage() {
        assert!(rife_label_to_code("not a model").is_none());
        assert!(rife_label_to_code("RIFE x.y").is_none());
        assert!(rife_code_to_label("x").is_none());
        assert!(rife_code_to_label("4").is_none());
    }

    #[test]
    fn engine_settings_empty_in_auto_mode() {
        let mut workflow = UpscaleWorkflow::default_slot(0);
        assert_eq!(workflow.engine_settings(), "");

        workflow.engine_auto = false;
        workflow.engine = TensorRtEngine::Dynamic;
        assert!(workflow.engine_settings().contains("--minShapes"));
    }
}
