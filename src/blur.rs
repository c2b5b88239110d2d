use std::cmp::Ordering;
use std::io::Write;
use std::path::{Path, PathBuf};

use image::GrayImage;
use log::{info, warn};
use rayon::prelude::*;

use crate::{scan, Result};

pub const DEFAULT_TOP: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct BlurScore {
    pub path: PathBuf,
    /// Name of the folder holding the image (the source video for crops).
    pub folder: String,
    pub file: String,
    /// Higher is sharper.
    pub score: f64,
}

// reflect-101 border: -1 -> 1, len -> len - 2
fn reflect(i: i64, len: i64) -> u32 {
    let r = if i < 0 {
        -i
    } else if i >= len {
        2 * len - i - 2
    } else {
        i
    };
    r.clamp(0, len - 1) as u32
}

/// Variance of the 4-neighbour Laplacian response.
pub fn laplacian_variance(img: &GrayImage) -> f64 {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return 0.0;
    }
    let (wi, hi) = (w as i64, h as i64);
    let at = |x: i64, y: i64| img.get_pixel(reflect(x, wi), reflect(y, hi))[0] as f64;

    let n = (w as f64) * (h as f64);
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 0..hi {
        for x in 0..wi {
            let v = at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            sum += v;
            sum_sq += v * v;
        }
    }
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Score every image under `root` and return the `top` sharpest.
pub fn rank(root: &Path, extensions: &[String], workers: usize, top: usize) -> Result<Vec<BlurScore>> {
    let paths = scan::list_images(root, extensions, true)?;
    info!("Scoring sharpness of {} image(s)", paths.len());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()?;
    let mut scores: Vec<BlurScore> = pool.install(|| {
        paths
            .par_iter()
            .filter_map(|path| match image::open(path) {
                Ok(img) => Some(BlurScore {
                    path: path.clone(),
                    folder: path.parent().map(scan::file_name).unwrap_or_default(),
                    file: scan::file_name(path),
                    score: laplacian_variance(&img.to_luma8()),
                }),
                Err(e) => {
                    warn!("Skipping unreadable image {}: {}", path.display(), e);
                    None
                }
            })
            .collect()
    });

    scores.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.path.cmp(&b.path),
        other => other,
    });
    scores.truncate(top);
    Ok(scores)
}

pub fn render_table<W: Write>(scores: &[BlurScore], out: &mut W) -> std::io::Result<()> {
    let folder_w = scores.iter().map(|s| s.folder.len()).chain([6]).max().unwrap_or(6);
    let file_w = scores.iter().map(|s| s.file.len()).chain([4]).max().unwrap_or(4);
    writeln!(out, "{:<folder_w$}  {:<file_w$}  {:>12}", "Folder", "File", "Blur score")?;
    for s in scores {
        writeln!(out, "{:<folder_w$}  {:<file_w$}  {:>12.2}", s.folder, s.file, s.score)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn checkerboard(size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn test_flat_image_has_zero_variance() {
        assert_eq!(laplacian_variance(&GrayImage::from_pixel(8, 8, Luma([90]))), 0.0);
        assert_eq!(laplacian_variance(&GrayImage::new(0, 0)), 0.0);
    }

    #[test]
    fn test_sharp_beats_smooth() {
        let gradient = GrayImage::from_fn(8, 8, |x, _| Luma([(x * 30) as u8]));
        assert!(laplacian_variance(&checkerboard(8)) > laplacian_variance(&gradient));
    }

    #[test]
    fn test_reflect_border() {
        assert_eq!(reflect(-1, 5), 1);
        assert_eq!(reflect(5, 5), 3);
        assert_eq!(reflect(2, 5), 2);
        assert_eq!(reflect(1, 1), 0);
    }

    #[test]
    fn test_rank_orders_and_truncates() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();
        std::fs::create_dir_all(root.join("clip1"))?;
        checkerboard(8).save(root.join("clip1/sharp.png"))?;
        GrayImage::from_fn(8, 8, |x, _| Luma([(x * 30) as u8])).save(root.join("clip1/soft.png"))?;
        GrayImage::from_pixel(8, 8, Luma([10])).save(root.join("flat.png"))?;
        std::fs::write(root.join("broken.png"), b"nope")?;

        let exts = vec!["png".to_string()];
        let all = rank(root, &exts, 2, DEFAULT_TOP)?;
        let files: Vec<&str> = all.iter().map(|s| s.file.as_str()).collect();
        assert_eq!(files, vec!["sharp.png", "soft.png", "flat.png"]);
        assert_eq!(all[0].folder, "clip1");

        assert_eq!(rank(root, &exts, 1, 1)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_render_table() -> anyhow::Result<()> {
        let scores = vec![BlurScore {
            path: PathBuf::from("faces/clip1/a.png"),
            folder: "clip1".to_string(),
            file: "a.png".to_string(),
            score: 1234.5,
        }];
        let mut out = Vec::new();
        render_table(&scores, &mut out)?;
        let text = String::from_utf8(out)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Folder  File "));
        assert!(lines[1].starts_with("clip1   a.png"));
        assert!(lines[1].ends_with("1234.50"));
        Ok(())
    }
}
