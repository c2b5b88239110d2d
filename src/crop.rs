use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::face::FaceDetector;
use crate::{scan, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropOptions {
    /// Crops smaller than this on either side are discarded.
    pub min_face_size: u32,
    pub extensions: Vec<String>,
    pub workers: usize,
    /// Log every image in which no face was found.
    pub list_no_face: bool,
    /// Remove each source image once it has been processed.
    pub delete_source: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CropStats {
    pub images: usize,
    pub faces_saved: usize,
    pub too_small: usize,
    pub no_face: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct ImageCrops {
    saved: usize,
    too_small: usize,
    no_face: bool,
}

/// `<stem>_f<index>.png` next to the other crops of the same frame.
pub fn crop_file_name(source: &Path, index: usize) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame".to_string());
    format!("{}_f{}.png", stem, index)
}

/// Crops every detected face out of the frames in a folder.
pub struct FaceCropper<D> {
    detector: D,
    options: CropOptions,
}

impl<D: FaceDetector> FaceCropper<D> {
    pub fn new(detector: D, options: CropOptions) -> Self {
        Self { detector, options }
    }

    /// Process the images directly inside `input` and write crops to `output`.
    pub fn run(&self, input: &Path, output: &Path) -> Result<CropStats> {
        let start = Instant::now();
        let images = scan::list_images(input, &self.options.extensions, false)?;
        std::fs::create_dir_all(output)?;
        info!(
            "Cropping faces from {} image(s) in {} with {} worker(s)",
            images.len(),
            input.display(),
            self.options.workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers.max(1))
            .build()?;
        let outcomes: Vec<(PathBuf, Result<ImageCrops>)> = pool.install(|| {
            images
                .par_iter()
                .map(|path| (path.clone(), self.crop_image(path, output)))
                .collect()
        });

        let mut stats = CropStats {
            images: outcomes.len(),
            ..CropStats::default()
        };
        for (path, outcome) in outcomes {
            match outcome {
                Ok(crops) => {
                    stats.faces_saved += crops.saved;
                    stats.too_small += crops.too_small;
                    if crops.no_face {
                        stats.no_face += 1;
                        if self.options.list_no_face {
                            info!("No faces found in {}", path.display());
                        }
                    }
                    if self.options.delete_source {
                        match std::fs::remove_file(&path) {
                            Ok(()) => info!("Deleted {}", path.display()),
                            Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to process {}: {}", path.display(), e);
                    stats.failed += 1;
                }
            }
        }

        info!(
            "Saved {} face(s) from {} image(s) in {:.2}s ({} too small, {} without faces, {} failed)",
            stats.faces_saved,
            stats.images,
            start.elapsed().as_secs_f64(),
            stats.too_small,
            stats.no_face,
            stats.failed
        );
        Ok(stats)
    }

    fn crop_image(&self, path: &Path, output: &Path) -> Result<ImageCrops> {
        let img = image::open(path)?;
        let regions = self.detector.detect(&img)?;
        let mut crops = ImageCrops {
            no_face: regions.is_empty(),
            ..ImageCrops::default()
        };

        let min = self.options.min_face_size;
        for (i, region) in regions.iter().enumerate() {
            let face = region.crop(&img);
            if face.width() < min || face.height() < min {
                crops.too_small += 1;
                continue;
            }
            let target = output.join(crop_file_name(path, i + 1));
            face.to_rgb8().save(&target)?;
            debug!("Saved face from {} to {}", path.display(), target.display());
            crops.saved += 1;
        }
        Ok(crops)
    }
}
