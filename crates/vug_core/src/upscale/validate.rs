//! Workflow validation.
//!
//! Pure input checks plus one filesystem-touching side effect: counting
//! candidate files. Never fails; every rule is evaluated independently so
//! all problems are reported at once. Cheap enough to call on every field
//! change.

use std::path::PathBuf;

use crate::models::{InputMode, UpscaleWorkflow};

use super::files::{check_inputs, InputSelection};

/// Outcome of validating a workflow.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// Whether a run is allowed.
    pub valid: bool,
    /// Human-readable problems, in rule order. Empty when valid.
    pub messages: Vec<String>,
    /// Status line describing the selected inputs, e.g.
    /// `2 video files (1 video file already exists and will be skipped)`.
    pub input_status: String,
    /// The files a run would process, in processing order.
    pub candidates: Vec<PathBuf>,
}

impl ValidationReport {
    /// The messages joined into a single display string.
    pub fn message_text(&self) -> String {
        self.messages.join("\n")
    }
}

/// Validate the workflow and count its eligible input files.
pub fn validate(workflow: &UpscaleWorkflow) -> ValidationReport {
    let mut valid = true;
    let mut messages = Vec::new();

    match workflow.input_mode {
        InputMode::File => {
            if !workflow.input_file.is_file() {
                valid = false;
                messages.push("Input Video is required.".to_string());
            }
        }
        InputMode::Folder => {
            if !workflow.input_folder.is_dir() {
                valid = false;
                messages.push("Input Folder is required.".to_string());
            }
        }
    }

    if workflow.output_folder.as_os_str().is_empty() {
        valid = false;
        messages.push("Output Folder is required.".to_string());
    }

    if workflow.output_filename.trim().is_empty() {
        valid = false;
        messages.push("Output Filename is required.".to_string());
    }

    for step in &workflow.steps {
        if !step.model_path.is_file() {
            valid = false;
            messages.push("ONNX Model Path is required.".to_string());
        }
    }

    let InputSelection {
        candidates,
        status_text,
        ..
    } = check_inputs(workflow);

    if candidates.is_empty() {
        valid = false;
        messages.push(format!(
            "{} selected for upscaling. At least one file must be selected.",
            status_text
        ));
    }

    ValidationReport {
        valid,
        messages,
        input_status: status_text,
        candidates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    fn valid_workflow(dir: &std::path::Path) -> UpscaleWorkflow {
        let input = dir.join("clip.mkv");
        File::create(&input).unwrap();
        let model = dir.join("2x_model.onnx");
        File::create(&model).unwrap();
        let output = dir.join("out");
        fs::create_dir_all(&output).unwrap();

        let mut workflow = UpscaleWorkflow::default_slot(0);
        workflow.input_file = input;
        workflow.output_folder = output;
        workflow.steps[0].model_path = model;
        workflow
    }

    #[test]
    fn complete_workflow_validates() {
        let dir = tempdir().unwrap();
        let workflow = valid_workflow(dir.path());

        let report = validate(&workflow);
        assert!(report.valid, "unexpected messages: {:?}", report.messages);
        assert!(report.messages.is_empty());
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.input_status, "1 video file");
    }

    #[test]
    fn all_failing_rules_accumulate_messages() {
        let dir = tempdir().unwrap();
        let mut workflow = valid_workflow(dir.path());
        // Break two independent rules at once.
        workflow.output_folder = PathBuf::new();
        workflow.steps[0].model_path = PathBuf::from("/missing/model.onnx");

        let report = validate(&workflow);
        assert!(!report.valid);
        assert!(report
            .messages
            .contains(&"Output Folder is required.".to_string()));
        assert!(report
            .messages
            .contains(&"ONNX Model Path is required.".to_string()));
    }

    #[test]
    fn each_missing_model_reports_separately() {
        let dir = tempdir().unwrap();
        let mut workflow = valid_workflow(dir.path());
        workflow.add_step();
        workflow.add_step();
        // Steps 2 and 3 have no model path set.

        let report = validate(&workflow);
        let model_messages = report
            .messages
            .iter()
            .filter(|m| m.contains("ONNX Model Path"))
            .count();
        assert_eq!(model_messages, 2);
    }

    #[test]
    fn zero_eligible_files_invalidates() {
        let dir = tempdir().unwrap();
        let mut workflow = valid_workflow(dir.path());
        // Existing output with overwrite disabled leaves nothing to do.
        File::create(workflow.output_folder.join("clip-upscale.mkv")).unwrap();

        let report = validate(&workflow);
        assert!(!report.valid);
        assert!(report
            .messages
            .iter()
            .any(|m| m.contains("At least one file must be selected")));
    }

    #[test]
    fn validation_never_panics_on_blank_workflow() {
        let workflow = UpscaleWorkflow::default_slot(0);
        let report = validate(&workflow);
        assert!(!report.valid);
        assert!(!report.messages.is_empty());
    }
}
