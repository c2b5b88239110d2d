use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;

use crate::face::{self, Detection, Embedding, ALIGNED_SIZE};
use crate::model::{self, ModelPaths};

/// Detector tuning shared by every pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            score_threshold: 0.6,
            nms_threshold: 0.3,
        }
    }
}

/// Full pipeline: detect faces → align → encode
pub struct Pipeline {
    pub detector: Session,
    pub encoder: Session,
    pub params: DetectionParams,
}

impl Pipeline {
    /// `intra_threads` is the ONNX Runtime thread count of each session;
    /// callers running several pipelines side by side keep it at 1.
    pub fn new(paths: &ModelPaths, params: DetectionParams, intra_threads: usize) -> Result<Self> {
        Ok(Self {
            detector: model::detector_session(paths, intra_threads)?,
            encoder: model::recog_session(paths, intra_threads)?,
            params,
        })
    }

    /// All faces in the image, best score first.
    pub fn detect(&mut self, img: &DynamicImage) -> Result<Vec<Detection>> {
        face::detect_faces(
            &mut self.detector,
            img,
            self.params.score_threshold,
            self.params.nms_threshold,
        )
        .context("detecting faces")
    }

    /// One embedding per detected face, in detection order.
    ///
    /// An empty vector means the image holds no usable face.
    pub fn embed_all(&mut self, img: &DynamicImage) -> Result<Vec<Embedding>> {
        let detections = self.detect(img)?;
        let mut embeddings = Vec::with_capacity(detections.len());
        for detection in &detections {
            let aligned = match face::align_face(img, detection, ALIGNED_SIZE) {
                Ok(aligned) => aligned,
                Err(e) => {
                    log::debug!("skipping face at {:?}: {}", detection.bbox, e);
                    continue;
                }
            };
            embeddings.push(face::encode_face(&mut self.encoder, &aligned).context("encoding face")?);
        }
        Ok(embeddings)
    }
}
