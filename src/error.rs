use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The image holds no face the engine can embed.
    #[error("no face detected in {}", .0.display())]
    NoFaceDetected(PathBuf),

    /// Two embeddings of different length were compared.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Distance thresholds must be finite and non-negative.
    #[error("invalid distance threshold {0}: must be a finite number >= 0")]
    InvalidThreshold(f32),

    #[error("corrupt snapshot {}: {reason}", .path.display())]
    CorruptSnapshot { path: PathBuf, reason: String },

    #[error("directory not found: {} (see --help)", .0.display())]
    MissingDirectory(PathBuf),

    #[error("parsing config {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("face engine: {0:#}")]
    Engine(#[from] anyhow::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
