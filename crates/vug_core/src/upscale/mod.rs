//! Upscale pipeline: config generation, input selection, validation, and
//! the external vspipe-into-ffmpeg process runner.

mod conf;
mod errors;
mod files;
mod process;
mod runner;
mod validate;

pub use conf::{render_config, write_config};
pub use errors::UpscaleError;
pub use files::{
    check_inputs, discover_videos, is_video_file, output_path_for, InputSelection,
    VIDEO_EXTENSIONS,
};
pub use process::ProcessGroup;
pub use runner::{RunOutcome, UpscaleRunner};
pub use validate::{validate, ValidationReport};
