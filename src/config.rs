use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use facepi_vision::{DetectionParams, ModelPaths};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::matcher::{self, MatchPolicy};

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| {
    if let Some(path) = option_env!("FACEPI_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    ProjectDirs::from("", "", "facepi")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("facepi.toml"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum embedding distance accepted as a match (strict `<`).
    pub threshold: f32,
    /// Worker threads; 0 means one per CPU.
    pub workers: usize,
    /// Gallery snapshot file.
    pub snapshot: PathBuf,
    pub policy: MatchPolicy,
    /// Lower-case image file extensions considered by every stage.
    pub extensions: Vec<String>,
    /// Crops smaller than this on either side are discarded.
    pub min_face_size: u32,
    pub models: ModelConfig,
    pub detection: DetectionConfig,
    pub extract: ExtractConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: 0.50,
            workers: 0,
            snapshot: PathBuf::from("faces.json"),
            policy: MatchPolicy::default(),
            extensions: ["jpg", "jpeg", "png"].map(String::from).to_vec(),
            min_face_size: 100,
            models: ModelConfig::default(),
            detection: DetectionConfig::default(),
            extract: ExtractConfig::default(),
        }
    }
}

impl Config {
    /// Resolved worker count, never zero.
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let paths = ModelPaths::default();
        Self {
            detector: paths.detector,
            recognizer: paths.recognizer,
        }
    }
}

impl From<&ModelConfig> for ModelPaths {
    fn from(cfg: &ModelConfig) -> Self {
        ModelPaths {
            detector: cfg.detector.clone(),
            recognizer: cfg.recognizer.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        let params = DetectionParams::default();
        Self {
            score_threshold: params.score_threshold,
            nms_threshold: params.nms_threshold,
        }
    }
}

impl From<DetectionConfig> for DetectionParams {
    fn from(cfg: DetectionConfig) -> Self {
        DetectionParams {
            score_threshold: cfg.score_threshold,
            nms_threshold: cfg.nms_threshold,
        }
    }
}

/// ffmpeg sampling window for frame extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub fps: u32,
    pub start: String,
    pub duration: String,
    pub max_threads: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            fps: 1,
            start: "00:00:30".to_string(),
            duration: "00:02:30".to_string(),
            max_threads: 6,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(CONFIG_PATH.as_path());
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config = toml::from_str(&raw).map_err(|source| crate::Error::Config {
        path: path.to_path_buf(),
        source,
    })?;
    matcher::check_threshold(cfg.threshold)
        .with_context(|| format!("in config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(CONFIG_PATH.as_path());
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
