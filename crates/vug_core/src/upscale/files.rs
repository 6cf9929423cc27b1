//! Input discovery, output naming, and skip counting.
//!
//! Validation and the pipeline runner both consume [`InputSelection`], so
//! the files counted are exactly the files run: an output that already
//! exists is skipped in both folder and single-file mode unless overwrite
//! is enabled.

use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{InputMode, UpscaleWorkflow, FILENAME_TOKEN};

/// Extensions treated as video inputs, matched case-insensitively.
pub const VIDEO_EXTENSIONS: [&str; 7] = ["mkv", "mp4", "mpg", "mpeg", "avi", "mov", "wmv"];

/// Whether the path carries one of the recognized video extensions.
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|candidate| ext.eq_ignore_ascii_case(candidate))
        })
        .unwrap_or(false)
}

/// Video files directly under `folder` (no recursion), sorted for a
/// deterministic processing order. A missing or unreadable folder yields
/// an empty list.
pub fn discover_videos(folder: &Path) -> Vec<PathBuf> {
    let mut videos: Vec<PathBuf> = match fs::read_dir(folder) {
        Ok(entries) => entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_video_file(p))
            .collect(),
        Err(_) => Vec::new(),
    };
    videos.sort();
    videos
}

/// Compute the output path for an input: the `%filename%` token in the
/// pattern is replaced with the input's file stem, joined onto the
/// output folder.
pub fn output_path_for(output_folder: &Path, pattern: &str, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_folder.join(pattern.replace(FILENAME_TOKEN, &stem))
}

/// The files a run would process, plus the status text describing them.
#[derive(Debug, Clone)]
pub struct InputSelection {
    /// Inputs eligible for processing, in processing order.
    pub candidates: Vec<PathBuf>,
    /// How many inputs already have an output file on disk.
    pub existing: usize,
    /// Human-readable summary, e.g.
    /// `2 video files (1 video file already exists and will be skipped)`.
    pub status_text: String,
}

impl InputSelection {
    fn empty() -> Self {
        Self {
            candidates: Vec::new(),
            existing: 0,
            status_text: "0 video files".to_string(),
        }
    }
}

/// Count the inputs a run would process, applying the existing-output
/// skip logic, and build the status text.
pub fn check_inputs(workflow: &UpscaleWorkflow) -> InputSelection {
    let overwrite_text = if workflow.overwrite_existing {
        "overwritten"
    } else {
        "skipped"
    };

    match workflow.input_mode {
        InputMode::File => {
            if !workflow.input_file.is_file() {
                return InputSelection::empty();
            }

            let output = output_path_for(
                &workflow.output_folder,
                &workflow.output_filename,
                &workflow.input_file,
            );
            let exists = output.is_file();
            let eligible = !exists || workflow.overwrite_existing;

            let candidates = if eligible {
                vec![workflow.input_file.clone()]
            } else {
                Vec::new()
            };

            let mut status = format!(
                "{} video file{}",
                candidates.len(),
                if candidates.len() == 1 { "" } else { "s" }
            );
            if exists {
                status.push_str(&format!(
                    " (1 video file already exists and will be {})",
                    overwrite_text
                ));
            }

            InputSelection {
                candidates,
                existing: usize::from(exists),
                status_text: status,
            }
        }
        InputMode::Folder => {
            let videos = discover_videos(&workflow.input_folder);
            let mut existing = 0;
            let mut candidates = Vec::new();

            for input in videos {
                let output =
                    output_path_for(&workflow.output_folder, &workflow.output_filename, &input);
                let exists = output.is_file();
                if exists {
                    existing += 1;
                }
                if !exists || workflow.overwrite_existing {
                    candidates.push(input);
                }
            }

            let status = format!(
                "{} video file{} ({} video file{} already exist{} and will be {})",
                candidates.len(),
                if candidates.len() == 1 { "" } else { "s" },
                existing,
                if existing == 1 { "" } else { "s" },
                if existing == 1 { "s" } else { "" },
                overwrite_text
            );

            InputSelection {
                candidates,
                existing,
                status_text: status,
            }
        }
    }
}
