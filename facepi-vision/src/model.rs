use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ort::{
    ep::{self, ExecutionProvider},
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
};

pub const DETECTOR_FILE: &str = "face_detection_yunet_2023mar.onnx";
pub const RECOGNIZER_FILE: &str = "face_recognition_sface_2021dec.onnx";

/// Locations of the ONNX models on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
}

impl ModelPaths {
    /// Both models under one directory, using their upstream file names.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detector: dir.join(DETECTOR_FILE),
            recognizer: dir.join(RECOGNIZER_FILE),
        }
    }

    pub fn exist(&self) -> bool {
        self.detector.is_file() && self.recognizer.is_file()
    }
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self::in_dir("models")
    }
}

pub fn session_builder(intra_threads: usize) -> Result<SessionBuilder> {
    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads.max(1))?;

    #[cfg(feature = "openvino")]
    {
        let ep = ep::OpenVINO::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("openvino feature is enabled, onnx runtime not compiled with openvino")
        }
    }

    #[cfg(feature = "cuda")]
    {
        let ep = ep::CUDA::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("cuda feature is enabled, onnx runtime not compiled with cuda")
        }
    }

    Ok(builder)
}

fn load(path: &Path, intra_threads: usize) -> Result<Session> {
    if !path.is_file() {
        anyhow::bail!("model file not found: {}", path.display());
    }
    session_builder(intra_threads)?
        .commit_from_file(path)
        .with_context(|| format!("load model {}", path.display()))
}

pub fn recog_session(paths: &ModelPaths, intra_threads: usize) -> Result<Session> {
    load(&paths.recognizer, intra_threads).context("load recognition model")
}

pub fn detector_session(paths: &ModelPaths, intra_threads: usize) -> Result<Session> {
    load(&paths.detector, intra_threads).context("load detector model")
}
