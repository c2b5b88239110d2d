pub mod blur;
pub mod classifier;
pub mod config;
pub mod crop;
pub mod engine;
pub mod error;
pub mod face;
pub mod gallery;
pub mod matcher;
pub mod pose;
pub mod report;
pub mod scan;
pub mod storage;
pub mod video;

#[cfg(test)]
mod testutil;

pub use classifier::{BatchClassifier, ClassifyOptions, DeletePolicy, Outcome, ProbeResult};
pub use error::{Error, Result};
pub use face::{FaceDetector, FaceEncoder, FaceLandmarker, Landmarks, Region, Vector};
pub use gallery::{Gallery, GalleryBuilder};
pub use matcher::{Match, MatchPolicy, Matcher};
pub use report::Report;

// Re-export vision types for convenience
pub use facepi_vision::{DetectionParams, ModelPaths};
