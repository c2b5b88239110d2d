//! Frontal-pose ranking.
//!
//! A face looking straight at the camera spreads its landmarks least around
//! their centroid, so a lower score ranks first.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::face::FaceLandmarker;
use crate::{scan, Result};

pub const DEFAULT_TOP: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct PoseScore {
    pub path: PathBuf,
    /// Mean absolute deviation of the landmarks from their centroid.
    pub score: f32,
}

/// Mean of `|x - cx| + |y - cy|` over `points`; `None` when empty.
pub fn landmark_spread(points: &[(f32, f32)]) -> Option<f32> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f32;
    let cx = points.iter().map(|p| p.0).sum::<f32>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f32>() / n;
    let total: f32 = points
        .iter()
        .map(|&(x, y)| (x - cx).abs() + (y - cy).abs())
        .sum();
    Some(total / n)
}

/// Score every image under `root` by its first face and keep the `top` lowest.
///
/// Images without a face or that fail to decode are left out.
pub fn rank<L: FaceLandmarker>(
    landmarker: &L,
    root: &Path,
    extensions: &[String],
    workers: usize,
    top: usize,
) -> Result<Vec<PoseScore>> {
    let paths = scan::list_images(root, extensions, true)?;
    info!("Scoring face pose of {} image(s)", paths.len());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()?;
    let mut scores: Vec<PoseScore> = pool.install(|| {
        paths
            .par_iter()
            .filter_map(|path| {
                let img = match image::open(path) {
                    Ok(img) => img,
                    Err(e) => {
                        warn!("Skipping unreadable image {}: {}", path.display(), e);
                        return None;
                    }
                };
                let faces = match landmarker.landmarks(&img) {
                    Ok(faces) => faces,
                    Err(e) => {
                        warn!("Failed to find landmarks in {}: {:#}", path.display(), e);
                        return None;
                    }
                };
                let score = faces.first().and_then(|points| landmark_spread(points));
                if score.is_none() {
                    debug!("No landmarks in {}", path.display());
                }
                score.map(|score| PoseScore {
                    path: path.clone(),
                    score,
                })
            })
            .collect()
    });

    scores.sort_by(|a, b| match a.score.total_cmp(&b.score) {
        Ordering::Equal => a.path.cmp(&b.path),
        other => other,
    });
    scores.truncate(top);
    Ok(scores)
}

/// Copy the ranked images into `output` under their file names.
pub fn copy_ranked(scores: &[PoseScore], output: &Path) -> Result<usize> {
    std::fs::create_dir_all(output)?;
    for s in scores {
        let target = output.join(scan::file_name(&s.path));
        std::fs::copy(&s.path, &target)?;
        info!("{} ({:.2}) -> {}", s.path.display(), s.score, target.display());
    }
    Ok(scores.len())
}
