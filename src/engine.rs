use std::sync::Mutex;

use anyhow::{Context, Result};
use facepi_vision::{DetectionParams, ModelPaths, Pipeline};
use image::{DynamicImage, GenericImageView};
use log::info;

use crate::face::{FaceDetector, FaceEncoder, FaceLandmarker, Landmarks, Region, Vector};

/// ONNX-backed face capability shared by a rayon worker pool.
///
/// Holds one [`Pipeline`] per worker. A worker always picks the pipeline at
/// its own pool index, so sessions are never contended inside the pool;
/// calls from outside a pool share slot 0.
pub struct OrtEngine {
    slots: Vec<Mutex<Pipeline>>,
}

impl OrtEngine {
    pub fn new(paths: &ModelPaths, params: DetectionParams, workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        info!(
            "Loading face models ({} pipeline(s)): {} / {}",
            workers,
            paths.detector.display(),
            paths.recognizer.display()
        );
        let slots = (0..workers)
            .map(|_| Pipeline::new(paths, params, 1).map(Mutex::new))
            .collect::<Result<Vec<_>>>()
            .context("Failed to initialize face recognition pipeline")?;
        Ok(Self { slots })
    }

    fn with_pipeline<T>(&self, f: impl FnOnce(&mut Pipeline) -> Result<T>) -> Result<T> {
        let idx = rayon::current_thread_index().unwrap_or(0) % self.slots.len();
        let mut pipeline = self.slots[idx]
            .lock()
            .map_err(|_| anyhow::anyhow!("face pipeline {} poisoned", idx))?;
        f(&mut pipeline)
    }
}

impl FaceDetector for OrtEngine {
    fn detect(&self, img: &DynamicImage) -> Result<Vec<Region>> {
        let (w, h) = img.dimensions();
        let detections = self.with_pipeline(|p| p.detect(img))?;
        Ok(detections
            .iter()
            .filter_map(|d| Region::clipped(d.bbox, w, h))
            .collect())
    }
}

impl FaceEncoder for OrtEngine {
    fn encode(&self, img: &DynamicImage) -> Result<Vec<Vector>> {
        let embeddings = self.with_pipeline(|p| p.embed_all(img))?;
        Ok(embeddings.into_iter().map(|e| e.into_vec()).collect())
    }
}

impl FaceLandmarker for OrtEngine {
    fn landmarks(&self, img: &DynamicImage) -> Result<Vec<Landmarks>> {
        let detections = self.with_pipeline(|p| p.detect(img))?;
        Ok(detections
            .iter()
            .map(|d| d.landmarks.chunks_exact(2).map(|p| (p[0], p[1])).collect())
            .collect())
    }
}
