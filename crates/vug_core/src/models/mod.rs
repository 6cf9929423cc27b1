//! Workflow data model.

mod enums;
mod workflow;

pub use enums::{CodecProfile, InferenceBackend, InputMode, TensorRtEngine};
pub use workflow::{
    rife_code_to_label, rife_label_to_code, ModelStep, RifeSettings, UpscaleWorkflow,
    FILENAME_TOKEN,
};
