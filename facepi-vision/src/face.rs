use crate::yunet;
use anyhow::Result;
use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::{Array1, Array4};
use ort::{session::Session, value::Value};

/// YuNet input side; images are letterboxed onto a square canvas.
pub const DETECTOR_INPUT: u32 = 640;
/// SFace input side.
pub const ALIGNED_SIZE: u32 = 112;

// ArcFace reference eye positions for a 112x112 crop
const REF_LEFT_EYE: (f32, f32) = (38.3, 51.7);
const REF_RIGHT_EYE: (f32, f32) = (73.5, 51.5);

/// Detection result from YuNet, in source image pixels
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // 5 points: x1,y1,x2,y2,...,x5,y5
}

/// L2-normalised face embedding (SFace output)
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Array1<f32>,
}

impl Embedding {
    pub fn into_vec(self) -> Vec<f32> {
        self.vector.to_vec()
    }
}

/// Planar BGR tensor `[1, 3, h, w]` with raw `0..=255` values.
fn bgr_tensor(img: &RgbImage) -> Result<Array4<f32>> {
    let (w, h) = img.dimensions();
    let plane = (w * h) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    for (i, px) in img.pixels().enumerate() {
        data[i] = px[2] as f32;
        data[plane + i] = px[1] as f32;
        data[2 * plane + i] = px[0] as f32;
    }
    Ok(Array4::from_shape_vec((1, 3, h as usize, w as usize), data)?)
}

/// Scale and offset that letterbox an image onto the detector canvas.
fn letterbox(width: u32, height: u32) -> (f32, u32, u32, u32, u32) {
    let scale = DETECTOR_INPUT as f32 / width.max(height) as f32;
    let new_w = ((width as f32 * scale) as u32).max(1);
    let new_h = ((height as f32 * scale) as u32).max(1);
    let off_x = (DETECTOR_INPUT - new_w) / 2;
    let off_y = (DETECTOR_INPUT - new_h) / 2;
    (scale, new_w, new_h, off_x, off_y)
}

/// Detect faces in an image using YuNet detector
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    let (orig_w, orig_h) = img.dimensions();
    if orig_w == 0 || orig_h == 0 {
        return Ok(vec![]);
    }
    let (scale, new_w, new_h, off_x, off_y) = letterbox(orig_w, orig_h);

    let resized = img.resize_exact(new_w, new_h, image::imageops::FilterType::Triangle);
    let mut canvas = DynamicImage::new_rgb8(DETECTOR_INPUT, DETECTOR_INPUT);
    image::imageops::overlay(&mut canvas, &resized, off_x as i64, off_y as i64);

    let input = Value::from_array(bgr_tensor(&canvas.to_rgb8())?)?;
    let outputs = session.run(ort::inputs![input])?;

    let mut raw: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        raw.push((shape.iter().copied().collect(), data.to_vec()));
    }
    let refs: Vec<(&[i64], &[f32])> = raw
        .iter()
        .map(|(s, d)| (s.as_slice(), d.as_slice()))
        .collect();

    let size = DETECTOR_INPUT as usize;
    let heads = yunet::parse_outputs(&refs, size)?;
    let decoded = yunet::decode(&heads, score_threshold, size)?;

    // Normalised canvas coordinates back to source pixels
    let canvas_px = DETECTOR_INPUT as f32;
    let to_x = |v: f32| (v * canvas_px - off_x as f32) / scale;
    let to_y = |v: f32| (v * canvas_px - off_y as f32) / scale;

    let detections: Vec<Detection> = decoded
        .into_iter()
        .map(|d| {
            let mut landmarks = [0.0f32; 10];
            for k in 0..5 {
                landmarks[k * 2] = to_x(d.landmarks[k * 2]);
                landmarks[k * 2 + 1] = to_y(d.landmarks[k * 2 + 1]);
            }
            Detection {
                bbox: [
                    to_x(d.bbox[0]),
                    to_y(d.bbox[1]),
                    d.bbox[2] * canvas_px / scale,
                    d.bbox[3] * canvas_px / scale,
                ],
                score: d.score,
                landmarks,
            }
        })
        .collect();

    if nms_threshold < 1.0 {
        Ok(nms(&detections, nms_threshold))
    } else {
        Ok(detections)
    }
}

/// Apply non-maximum suppression to remove overlapping detections
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for det in sorted {
        if keep
            .iter()
            .all(|k| compute_iou(&k.bbox, &det.bbox) <= iou_threshold)
        {
            keep.push(det);
        }
    }
    keep
}

fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}

/// Rotate, scale and translate the face so the eyes land on the
/// reference positions of a `size` x `size` crop.
pub fn align_face(img: &DynamicImage, detection: &Detection, size: u32) -> Result<DynamicImage> {
    let left = (detection.landmarks[0], detection.landmarks[1]);
    let right = (detection.landmarks[2], detection.landmarks[3]);
    let (dx, dy) = (right.0 - left.0, right.1 - left.1);
    let eye_dist = (dx * dx + dy * dy).sqrt();
    if eye_dist <= f32::EPSILON {
        anyhow::bail!("degenerate landmarks: eyes coincide");
    }

    let ratio = size as f32 / ALIGNED_SIZE as f32;
    let ref_dist = ((REF_RIGHT_EYE.0 - REF_LEFT_EYE.0).powi(2)
        + (REF_RIGHT_EYE.1 - REF_LEFT_EYE.1).powi(2))
    .sqrt();
    let scale = ratio * ref_dist / eye_dist;
    let angle = dy.atan2(dx);

    let center = ((left.0 + right.0) / 2.0, (left.1 + right.1) / 2.0);
    let ref_center = (
        (REF_LEFT_EYE.0 + REF_RIGHT_EYE.0) / 2.0 * ratio,
        (REF_LEFT_EYE.1 + REF_RIGHT_EYE.1) / 2.0 * ratio,
    );

    // output = M * input + t, with M = scale * R(-angle)
    let (a, b) = (scale * angle.cos(), scale * angle.sin());
    let (c, d) = (-b, a);
    let tx = ref_center.0 - (a * center.0 + b * center.1);
    let ty = ref_center.1 - (c * center.0 + d * center.1);
    let det = a * d - b * c;

    let src = img.to_rgb8();
    let (w, h) = src.dimensions();
    let mut output = RgbImage::new(size, size);

    for (ox, oy, px) in output.enumerate_pixels_mut() {
        let (u, v) = (ox as f32 - tx, oy as f32 - ty);
        let sx = (d * u - b * v) / det;
        let sy = (-c * u + a * v) / det;
        if sx < 0.0 || sy < 0.0 || sx >= w as f32 || sy >= h as f32 {
            continue;
        }

        // bilinear
        let (x0, y0) = (sx.floor() as u32, sy.floor() as u32);
        let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
        let (fx, fy) = (sx - x0 as f32, sy - y0 as f32);
        let weights = [
            (x0, y0, (1.0 - fx) * (1.0 - fy)),
            (x1, y0, fx * (1.0 - fy)),
            (x0, y1, (1.0 - fx) * fy),
            (x1, y1, fx * fy),
        ];
        for ch in 0..3 {
            let v: f32 = weights
                .iter()
                .map(|&(x, y, wt)| src.get_pixel(x, y)[ch] as f32 * wt)
                .sum();
            px[ch] = v.round().clamp(0.0, 255.0) as u8;
        }
    }

    Ok(DynamicImage::ImageRgb8(output))
}

/// Encode an aligned face crop into an L2-normalised embedding.
pub fn encode_face(session: &mut Session, face_img: &DynamicImage) -> Result<Embedding> {
    let face = face_img
        .resize_exact(
            ALIGNED_SIZE,
            ALIGNED_SIZE,
            image::imageops::FilterType::Triangle,
        )
        .to_rgb8();

    let input = Value::from_array(bgr_tensor(&face)?)?;
    let outputs = session.run(ort::inputs![input])?;
    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

    // [1, 128] for SFace
    let len = if shape.len() == 2 {
        shape[1] as usize
    } else {
        data.len()
    };
    let mut vector = Array1::from(data[..len].to_vec());
    l2_normalize(&mut vector);

    Ok(Embedding { vector })
}

pub fn l2_normalize(v: &mut Array1<f32>) {
    let norm = v.dot(&*v).sqrt();
    if norm > 0.0 {
        v.mapv_inplace(|x| x / norm);
    }
}
