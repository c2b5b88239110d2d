//! Deterministic stand-ins for the face engine.

use std::path::Path;

use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

use crate::face::{FaceDetector, FaceEncoder, FaceLandmarker, Landmarks, Region, Vector};

/// Write a 4x4 PNG. `Some(v)` marks it as holding one face whose
/// [`PixelEncoder`] embedding is `[v, 0]`; `None` is a faceless image.
pub fn write_face(path: &Path, face: Option<u8>) -> anyhow::Result<()> {
    write_faces(path, face, None)
}

/// Like [`write_face`] with an optional second face `[second, 0]`.
pub fn write_faces(path: &Path, face: Option<u8>, second: Option<u8>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let px = match face {
        Some(v) => Rgb([v, 255, second.unwrap_or(0)]),
        None => Rgb([0, 0, 0]),
    };
    RgbImage::from_pixel(4, 4, px).save(path)?;
    Ok(())
}

/// Reads the embedding straight out of the top-left pixel.
pub struct PixelEncoder;

impl FaceEncoder for PixelEncoder {
    fn encode(&self, img: &DynamicImage) -> anyhow::Result<Vec<Vector>> {
        let px = img.get_pixel(0, 0);
        if px[1] != 255 {
            return Ok(vec![]);
        }
        let mut faces = vec![vec![px[0] as f32, 0.0]];
        if px[2] > 0 {
            faces.push(vec![px[2] as f32, 0.0]);
        }
        Ok(faces)
    }
}

/// Reports the same regions for every image.
pub struct FixedDetector(pub Vec<Region>);

impl FaceDetector for FixedDetector {
    fn detect(&self, _img: &DynamicImage) -> anyhow::Result<Vec<Region>> {
        Ok(self.0.clone())
    }
}

/// Five landmarks on a square whose side is the top-left red value.
pub struct PixelLandmarker;

impl FaceLandmarker for PixelLandmarker {
    fn landmarks(&self, img: &DynamicImage) -> anyhow::Result<Vec<Landmarks>> {
        let px = img.get_pixel(0, 0);
        if px[1] != 255 {
            return Ok(vec![]);
        }
        let s = px[0] as f32;
        Ok(vec![vec![(0.0, 0.0), (s, 0.0), (0.0, s), (s, s), (s / 2.0, s / 2.0)]])
    }
}
