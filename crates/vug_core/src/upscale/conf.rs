//! Generated configuration file for the external pipeline tool.
//!
//! Flat `[section]` / `key=value` text, overwritten in full on every run.
//! Numeric fields must render with a `.` decimal point regardless of host
//! locale; the consuming parser only understands the canonical format.
//! Rust's `Display` for numbers is locale-independent, which makes that
//! invariant hold by construction.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use crate::backend::BackendEnv;
use crate::models::{rife_label_to_code, UpscaleWorkflow};

use super::errors::UpscaleError;

/// Render the workflow into the config text. Pure: rendering the same
/// workflow twice produces byte-identical output.
pub fn render_config(workflow: &UpscaleWorkflow, env: &BackendEnv) -> String {
    let mut out = String::new();

    writeln!(out, "[global]").ok();
    writeln!(out, "logging=yes").ok();
    writeln!(out, "backend={}", workflow.backend.conf_name()).ok();
    writeln!(out, "backend_path={}", env.root().display()).ok();
    writeln!(out, "[slot_1]").ok();
    writeln!(out, "profile_name=encode").ok();

    for (i, step) in workflow.steps.iter().enumerate() {
        let n = i + 1;
        writeln!(
            out,
            "chain_1_model_{}_resize_height_before_upscale={}",
            n, step.resize_height_before_upscale
        )
        .ok();
        writeln!(
            out,
            "chain_1_model_{}_resize_factor_before_upscale={}",
            n, step.resize_factor_before_upscale
        )
        .ok();
        writeln!(
            out,
            "chain_1_model_{}_name={}",
            n,
            step.model_name().unwrap_or_default()
        )
        .ok();
    }

    let rife = &workflow.rife;
    writeln!(out, "chain_1_rife={}", yes_no(rife.enabled)).ok();
    writeln!(out, "chain_1_rife_factor_numerator={}", rife.factor_numerator).ok();
    writeln!(
        out,
        "chain_1_rife_factor_denominator={}",
        rife.factor_denominator
    )
    .ok();
    writeln!(
        out,
        "chain_1_rife_model={}",
        rife_label_to_code(&rife.model).unwrap_or_default()
    )
    .ok();
    writeln!(out, "chain_1_rife_ensemble={}", yes_no(rife.ensemble)).ok();
    writeln!(
        out,
        "chain_1_rife_scene_detect_threshold={}",
        rife.scene_detect_threshold
    )
    .ok();
    writeln!(
        out,
        "chain_1_final_resize_height={}",
        workflow.final_resize_height
    )
    .ok();
    writeln!(
        out,
        "chain_1_final_resize_factor={}",
        workflow.final_resize_factor
    )
    .ok();
    writeln!(
        out,
        "chain_1_tensorrt_engine_settings={}",
        workflow.engine_settings()
    )
    .ok();

    out
}

/// Stage the workflow's model files into the backend model directory and
/// overwrite the config file.
///
/// A model already inside the model directory (compared by absolute path)
/// is not copied onto itself. Returns the config file path.
pub fn write_config(workflow: &UpscaleWorkflow, env: &BackendEnv) -> Result<PathBuf, UpscaleError> {
    let models_dir = env.models_dir();
    fs::create_dir_all(&models_dir)
        .map_err(|e| UpscaleError::io(format!("create {}", models_dir.display()), e))?;

    for step in &workflow.steps {
        let Some(file_name) = step.model_path.file_name() else {
            continue;
        };
        let target = models_dir.join(file_name);

        let source_abs = std::path::absolute(&step.model_path).map_err(|e| {
            UpscaleError::ModelCopy {
                path: step.model_path.clone(),
                source: e,
            }
        })?;
        let target_abs = std::path::absolute(&target).map_err(|e| UpscaleError::ModelCopy {
            path: target.clone(),
            source: e,
        })?;

        if source_abs != target_abs {
            fs::copy(&step.model_path, &target).map_err(|e| UpscaleError::ModelCopy {
                path: step.model_path.clone(),
                source: e,
            })?;
        }
    }

    let conf_path = env.conf_path();
    if let Some(parent) = conf_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| UpscaleError::io(format!("create {}", parent.display()), e))?;
    }
    fs::write(&conf_path, render_config(workflow, env))
        .map_err(|e| UpscaleError::io(format!("write {}", conf_path.display()), e))?;

    Ok(conf_path)
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InferenceBackend;
    use std::fs::File;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn workflow_with_models() -> UpscaleWorkflow {
        let mut workflow = UpscaleWorkflow::default_slot(0);
        workflow.steps[0].model_path = PathBuf::from("/models/2x_AnimeJaNai_HD_V3_UltraCompact.onnx");
        workflow.add_step();
        workflow.steps[1].model_path = PathBuf::from("/models/2x_AnimeJaNai_HD_V3_Compact.onnx");
        workflow.steps[1].resize_factor_before_upscale = 100.5;
        workflow
    }

    #[test]
    fn render_is_idempotent() {
        let env = BackendEnv::new("/data/backend");
        let workflow = workflow_with_models();

        let first = render_config(&workflow, &env);
        let second = render_config(&workflow, &env);
        assert_eq!(first, second);
    }

    #[test]
    fn decimals_always_use_a_point() {
        let env = BackendEnv::new("/data/backend");
        let mut workflow = workflow_with_models();
        workflow.rife.scene_detect_threshold = 0.15;

        let text = render_config(&workflow, &env);
        assert!(text.contains("chain_1_model_2_resize_factor_before_upscale=100.5"));
        assert!(text.contains("chain_1_rife_scene_detect_threshold=0.15"));
        assert!(!text.contains("100,5"));
    }

    #[test]
    fn model_keys_follow_list_order_one_indexed() {
        let env = BackendEnv::new("/data/backend");
        let workflow = workflow_with_models();
        let text = render_config(&workflow, &env);

        let first = text
            .find("chain_1_model_1_name=2x_AnimeJaNai_HD_V3_UltraCompact")
            .expect("first model key missing");
        let second = text
            .find("chain_1_model_2_name=2x_AnimeJaNai_HD_V3_Compact")
            .expect("second model key missing");
        assert!(first < second);
    }

    #[test]
    fn header_shape_matches_consumer() {
        let env = BackendEnv::new("/data/backend");
        let mut workflow = workflow_with_models();
        workflow.backend = InferenceBackend::DirectMl;

        let text = render_config(&workflow, &env);
        assert!(text.starts_with("[global]\nlogging=yes\nbackend=DirectML\n"));
        assert!(text.contains("[slot_1]\nprofile_name=encode\n"));
        assert!(text.contains("chain_1_rife=no\n"));
        assert!(text.contains("chain_1_rife_model=422\n"));
    }

    #[test]
    fn engine_settings_empty_when_auto() {
        let env = BackendEnv::new("/data/backend");
        let mut workflow = workflow_with_models();
        workflow.engine_auto = true;

        let text = render_config(&workflow, &env);
        assert!(text.contains("chain_1_tensorrt_engine_settings=\n"));

        workflow.engine_auto = false;
        let text = render_config(&workflow, &env);
        assert!(text.contains("chain_1_tensorrt_engine_settings=--fp16"));
    }

    #[test]
    fn write_config_stages_models_and_overwrites() {
        let dir = tempdir().unwrap();
        let env = BackendEnv::new(dir.path().join("backend"));

        let model_src = dir.path().join("2x_model.onnx");
        fs::write(&model_src, b"weights").unwrap();

        let mut workflow = UpscaleWorkflow::default_slot(0);
        workflow.steps[0].model_path = model_src;

        let conf_path = write_config(&workflow, &env).unwrap();
        assert!(conf_path.is_file());
        assert!(env.models_dir().join("2x_model.onnx").is_file());

        // Overwritten unconditionally on the next run.
        workflow.final_resize_height = 1080;
        write_config(&workflow, &env).unwrap();
        let text = fs::read_to_string(&conf_path).unwrap();
        assert!(text.contains("chain_1_final_resize_height=1080"));
    }

    #[test]
    fn write_config_skips_copy_onto_itself() {
        let dir = tempdir().unwrap();
        let env = BackendEnv::new(dir.path().join("backend"));
        fs::create_dir_all(env.models_dir()).unwrap();

        let in_place = env.models_dir().join("2x_model.onnx");
        File::create(&in_place).unwrap();

        let mut workflow = UpscaleWorkflow::default_slot(0);
        workflow.steps[0].model_path = in_place.clone();

        write_config(&workflow, &env).unwrap();
        assert!(in_place.is_file());
    }
}
