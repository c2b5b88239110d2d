use std::path::Path;

use facepi::{FaceEncoder, Vector};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

/// Tiny PNG holding one face with embedding `[v, 0]`, or no face for `None`.
pub fn write_face(path: &Path, face: Option<u8>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let px = match face {
        Some(v) => Rgb([v, 255, 0]),
        None => Rgb([0, 0, 0]),
    };
    RgbImage::from_pixel(4, 4, px).save(path)?;
    Ok(())
}

/// Embeds the top-left pixel; green 255 marks a face.
pub struct PixelEncoder;

impl FaceEncoder for PixelEncoder {
    fn encode(&self, img: &DynamicImage) -> anyhow::Result<Vec<Vector>> {
        let px = img.get_pixel(0, 0);
        if px[1] != 255 {
            return Ok(vec![]);
        }
        Ok(vec![vec![px[0] as f32, 0.0]])
    }
}

pub fn png() -> Vec<String> {
    vec!["png".to_string()]
}
