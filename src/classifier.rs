use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::Config;
use crate::face::FaceEncoder;
use crate::gallery::Gallery;
use crate::matcher::{Match, MatchPolicy, Matcher};
use crate::{scan, Error, Result};

/// Final decision for one probe image.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Matched { identity: String, distance: f32 },
    /// No embeddable face, or the file could not be decoded.
    NoFace,
    /// Faces were found but none is close enough to a known identity.
    NoMatch,
}

impl Outcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, Outcome::Matched { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub path: PathBuf,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyOptions {
    pub threshold: f32,
    pub policy: MatchPolicy,
    pub workers: usize,
    pub extensions: Vec<String>,
}

impl From<&Config> for ClassifyOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            threshold: cfg.threshold,
            policy: cfg.policy,
            workers: cfg.worker_count(),
            extensions: cfg.extensions.clone(),
        }
    }
}

/// Which unmatched probe files get removed after a run.
///
/// Both default to off; nothing is ever deleted unless asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletePolicy {
    pub no_face: bool,
    pub unmatched: bool,
}

impl DeletePolicy {
    pub fn applies_to(&self, outcome: &Outcome) -> bool {
        match outcome {
            Outcome::Matched { .. } => false,
            Outcome::NoFace => self.no_face,
            Outcome::NoMatch => self.unmatched,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifyStats {
    pub probes: usize,
    pub matched: usize,
    pub no_face: usize,
    pub no_match: usize,
    pub deleted: usize,
}

impl ClassifyStats {
    pub fn from_results(results: &[ProbeResult]) -> Self {
        let mut stats = Self {
            probes: results.len(),
            ..Self::default()
        };
        for r in results {
            match r.outcome {
                Outcome::Matched { .. } => stats.matched += 1,
                Outcome::NoFace => stats.no_face += 1,
                Outcome::NoMatch => stats.no_match += 1,
            }
        }
        stats
    }
}

/// Classifies a folder of probe images against a fixed gallery.
pub struct BatchClassifier<E> {
    encoder: E,
    gallery: Arc<Gallery>,
    matcher: Matcher,
    workers: usize,
    extensions: Vec<String>,
}

impl<E: FaceEncoder> BatchClassifier<E> {
    pub fn new(encoder: E, gallery: Arc<Gallery>, options: ClassifyOptions) -> Self {
        Self {
            encoder,
            gallery,
            matcher: Matcher::new(options.threshold, options.policy),
            workers: options.workers.max(1),
            extensions: options.extensions,
        }
    }

    /// Classify every image under `root` (recursively).
    ///
    /// Returns once every image has been processed, in discovery order.
    /// Per-image failures become [`Outcome::NoFace`]; an embedding whose
    /// length disagrees with the gallery aborts the run.
    pub fn classify_dir(&self, root: &Path) -> Result<Vec<ProbeResult>> {
        let start = Instant::now();
        let paths = scan::list_images(root, &self.extensions, true)?;
        info!(
            "Classifying {} image(s) from {} against {} identities with {} worker(s)",
            paths.len(),
            root.display(),
            self.gallery.len(),
            self.workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()?;
        let results = pool.install(|| {
            paths
                .par_iter()
                .map(|path| -> Result<ProbeResult> {
                    Ok(ProbeResult {
                        path: path.clone(),
                        outcome: self.classify_image(path)?,
                    })
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let stats = ClassifyStats::from_results(&results);
        info!(
            "Classified {} image(s) in {:.2}s: {} matched, {} without face, {} unmatched",
            stats.probes,
            start.elapsed().as_secs_f64(),
            stats.matched,
            stats.no_face,
            stats.no_match
        );
        Ok(results)
    }

    /// Embed and match a single probe image.
    pub fn classify_image(&self, path: &Path) -> Result<Outcome> {
        let img = match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                warn!("Unreadable image {}: {}", path.display(), e);
                return Ok(Outcome::NoFace);
            }
        };
        let faces = match self.encoder.encode(&img) {
            Ok(faces) => faces,
            Err(e) => {
                warn!("Failed to embed {}: {:#}", path.display(), e);
                return Ok(Outcome::NoFace);
            }
        };
        if faces.is_empty() {
            debug!("{}", Error::NoFaceDetected(path.to_path_buf()));
            return Ok(Outcome::NoFace);
        }

        let outcome = match self.matcher.classify(&faces, &self.gallery)? {
            Match::Matched { identity, distance } => Outcome::Matched { identity, distance },
            Match::Unmatched => Outcome::NoMatch,
        };
        debug!("{}: {:?}", path.display(), outcome);
        Ok(outcome)
    }
}

/// Remove the probe files selected by `policy`. Run only on final outcomes.
///
/// Failures are logged and skipped. Returns the number of files removed.
pub fn apply_deletions(results: &[ProbeResult], policy: DeletePolicy) -> usize {
    let mut deleted = 0;
    for r in results.iter().filter(|r| policy.applies_to(&r.outcome)) {
        match std::fs::remove_file(&r.path) {
            Ok(()) => {
                info!("Deleted {}", r.path.display());
                deleted += 1;
            }
            Err(e) => warn!("Failed to delete {}: {}", r.path.display(), e),
        }
    }
    deleted
}
