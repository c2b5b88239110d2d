//! Face capabilities the batch stages are written against.
//!
//! The production implementation is [`crate::engine::OrtEngine`]; tests
//! substitute deterministic fakes.

use image::{DynamicImage, GenericImageView};

/// A face descriptor. Lower Euclidean distance means more similar.
pub type Vector = Vec<f32>;

/// Axis-aligned face bounding box in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Build a region from floating point `[x, y, w, h]`, clipped to the image.
    ///
    /// Returns `None` when nothing of the box lies inside the image.
    pub fn clipped(bbox: [f32; 4], image_width: u32, image_height: u32) -> Option<Self> {
        let x0 = bbox[0].max(0.0).floor() as u32;
        let y0 = bbox[1].max(0.0).floor() as u32;
        let x1 = ((bbox[0] + bbox[2]).max(0.0).ceil() as u32).min(image_width);
        let y1 = ((bbox[1] + bbox[3]).max(0.0).ceil() as u32).min(image_height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }

    pub fn crop(&self, img: &DynamicImage) -> DynamicImage {
        let (w, h) = img.dimensions();
        let width = self.width.min(w.saturating_sub(self.x));
        let height = self.height.min(h.saturating_sub(self.y));
        img.crop_imm(self.x, self.y, width, height)
    }
}

/// Locates faces in a full frame. Zero regions is a valid answer.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, img: &DynamicImage) -> anyhow::Result<Vec<Region>>;
}

/// Turns every face of an image into a [`Vector`].
///
/// An empty result means the image holds no embeddable face.
pub trait FaceEncoder: Send + Sync {
    fn encode(&self, img: &DynamicImage) -> anyhow::Result<Vec<Vector>>;
}

/// Landmark points of one face in source pixels.
pub type Landmarks = Vec<(f32, f32)>;

/// Finds the landmarks of every face, most confident face first.
pub trait FaceLandmarker: Send + Sync {
    fn landmarks(&self, img: &DynamicImage) -> anyhow::Result<Vec<Landmarks>>;
}

impl<T: FaceDetector + ?Sized> FaceDetector for &T {
    fn detect(&self, img: &DynamicImage) -> anyhow::Result<Vec<Region>> {
        (**self).detect(img)
    }
}

impl<T: FaceEncoder + ?Sized> FaceEncoder for &T {
    fn encode(&self, img: &DynamicImage) -> anyhow::Result<Vec<Vector>> {
        (**self).encode(img)
    }
}

impl<T: FaceLandmarker + ?Sized> FaceLandmarker for &T {
    fn landmarks(&self, img: &DynamicImage) -> anyhow::Result<Vec<Landmarks>> {
        (**self).landmarks(img)
    }
}
