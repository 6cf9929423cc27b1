//! Core enums used throughout the application.

use serde::{Deserialize, Serialize};

/// How the workflow selects its input: a single file or a folder scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    #[default]
    File,
    Folder,
}

/// Video codec profile for the ffmpeg side of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecProfile {
    /// Software H.265.
    X265,
    /// Software H.264.
    X264,
    /// NVIDIA hardware HEVC.
    #[default]
    HevcNvenc,
    /// Lossless FFV1.
    Lossless,
}

impl CodecProfile {
    /// Encoder arguments passed to ffmpeg after `-c:v`.
    ///
    /// `-max_interleave_delta 0` is appended once by the pipeline runner,
    /// not here.
    pub fn ffmpeg_args(&self) -> Vec<&'static str> {
        match self {
            CodecProfile::X265 => vec![
                "libx265",
                "-crf",
                "16",
                "-preset",
                "slow",
                "-x265-params",
                "sao=0:bframes=8:psy-rd=1.5:psy-rdoq=2:aq-mode=3:ref=6",
            ],
            CodecProfile::X264 => vec!["libx264", "-crf", "13", "-preset", "slow"],
            CodecProfile::HevcNvenc => vec![
                "hevc_nvenc",
                "-preset",
                "p7",
                "-profile:v",
                "main10",
                "-b:v",
                "50M",
            ],
            CodecProfile::Lossless => vec!["ffv1"],
        }
    }

    /// Display name for UI lists.
    pub fn name(&self) -> &'static str {
        match self {
            CodecProfile::X265 => "H.265 (x265)",
            CodecProfile::X264 => "H.264 (x264)",
            CodecProfile::HevcNvenc => "HEVC (NVENC)",
            CodecProfile::Lossless => "Lossless (FFV1)",
        }
    }
}

/// Inference backend the VapourSynth script runs the models on.
///
/// The selections are mutually exclusive; the generated config carries
/// exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceBackend {
    #[default]
    TensorRt,
    DirectMl,
    Ncnn,
}

impl InferenceBackend {
    /// Name the external pipeline tool expects in the config file.
    pub fn conf_name(&self) -> &'static str {
        match self {
            InferenceBackend::TensorRt => "TensorRT",
            InferenceBackend::DirectMl => "DirectML",
            InferenceBackend::Ncnn => "NCNN",
        }
    }
}

impl std::fmt::Display for InferenceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.conf_name())
    }
}

/// TensorRT engine build preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorRtEngine {
    /// Dynamic shapes up to 1080p.
    #[default]
    Dynamic,
    /// Static shapes matching the input resolution.
    Static,
    /// Static shapes, engine built straight from the ONNX.
    StaticOnnx,
    /// Static shapes with bf16 precision.
    StaticBf16,
}

impl TensorRtEngine {
    /// trtexec argument string for this preset.
    ///
    /// `%video_resolution%` is substituted by the external tool.
    pub fn trtexec_args(&self) -> &'static str {
        match self {
            TensorRtEngine::Dynamic => {
                "--fp16 --minShapes=input:1x3x8x8 --optShapes=input:1x3x1080x1920 --maxShapes=input:1x3x1080x1920 --inputIOFormats=fp16:chw --outputIOFormats=fp16:chw --tacticSources=+CUDNN,-CUBLAS,-CUBLAS_LT --skipInference"
            }
            TensorRtEngine::Static => {
                "--fp16 --optShapes=input:%video_resolution% --inputIOFormats=fp16:chw --outputIOFormats=fp16:chw --tacticSources=+CUDNN,-CUBLAS,-CUBLAS_LT --skipInference"
            }
            TensorRtEngine::StaticOnnx => {
                "--fp16 --inputIOFormats=fp16:chw --outputIOFormats=fp16:chw --tacticSources=+CUDNN,-CUBLAS,-CUBLAS_LT --skipInference"
            }
            TensorRtEngine::StaticBf16 => {
                "--bf16 --optShapes=input:%video_resolution% --inputIOFormats=fp16:chw --outputIOFormats=fp16:chw --tacticSources=+CUDNN,-CUBLAS,-CUBLAS_LT --skipInference"
            }
        }
    }
}
