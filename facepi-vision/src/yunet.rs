//! YuNet post-processing.
//!
//! YuNet is anchor-free: every cell of the stride 8/16/32 feature grids
//! predicts a score, a box and five landmarks relative to the cell itself.
//! The exported model emits twelve tensors in this order:
//!
//! `cls_8, cls_16, cls_32, obj_8, obj_16, obj_32, bbox_8, bbox_16, bbox_32, kps_8, kps_16, kps_32`
//!
//! Box decoding (all in input pixels, then normalised to `[0, 1]`):
//! `cx = (col + dx) * stride`, `cy = (row + dy) * stride`, `w = dw * stride`, `h = dh * stride`.

use anyhow::Result;
use ndarray::Array2;

pub const STRIDES: [usize; 3] = [8, 16, 32];

const CLS_OFFSET: usize = 0;
const OBJ_OFFSET: usize = 3;
const BBOX_OFFSET: usize = 6;
const KPS_OFFSET: usize = 9;

#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h (normalized [0,1])
    pub score: f32,
    pub landmarks: [f32; 10], // 5 points: x1,y1,...,x5,y5 (normalized [0,1])
}

/// Per-stride prediction heads, rows indexed by grid cell.
#[derive(Debug, Clone)]
pub struct Heads {
    pub scores: Vec<Array2<f32>>,
    pub bboxes: Vec<Array2<f32>>,
    pub landmarks: Vec<Array2<f32>>,
}

fn cells(input_size: usize, stride: usize) -> usize {
    (input_size / stride) * (input_size / stride)
}

/// Collect one head (`cols` values per cell) for every stride.
fn take_head(
    outputs: &[(&[i64], &[f32])],
    offset: usize,
    cols: usize,
    name: &str,
    input_size: usize,
) -> Result<Vec<Array2<f32>>> {
    STRIDES
        .iter()
        .enumerate()
        .map(|(i, &stride)| {
            let idx = offset + i;
            let expected = cells(input_size, stride);
            let (shape, data) = outputs
                .get(idx)
                .ok_or_else(|| anyhow::anyhow!("Missing {} output at index {}", name, idx))?;
            if shape.len() != 3 || shape[0] != 1 || shape[2] as usize != cols {
                anyhow::bail!(
                    "Unexpected {} shape at index {}: {:?}, expected [1, {}, {}]",
                    name,
                    idx,
                    shape,
                    expected,
                    cols
                );
            }
            if shape[1] as usize != expected {
                anyhow::bail!(
                    "Expected {} cells for {} at stride {}, got {}",
                    expected,
                    name,
                    stride,
                    shape[1]
                );
            }
            Ok(Array2::from_shape_vec((expected, cols), data.to_vec())?)
        })
        .collect()
}

/// Split the raw session outputs into per-stride heads.
///
/// The exported heads are already activated; the cell score is the
/// geometric mean of the clamped class and objectness scores.
pub fn parse_outputs(outputs: &[(&[i64], &[f32])], input_size: usize) -> Result<Heads> {
    let cls = take_head(outputs, CLS_OFFSET, 1, "cls", input_size)?;
    let obj = take_head(outputs, OBJ_OFFSET, 1, "obj", input_size)?;
    let scores = cls
        .into_iter()
        .zip(obj)
        .map(|(c, o)| (c.mapv(unit) * o.mapv(unit)).mapv(f32::sqrt))
        .collect();

    Ok(Heads {
        scores,
        bboxes: take_head(outputs, BBOX_OFFSET, 4, "bbox", input_size)?,
        landmarks: take_head(outputs, KPS_OFFSET, 10, "kps", input_size)?,
    })
}

/// Decode every grid cell whose score clears `score_threshold`.
pub fn decode(heads: &Heads, score_threshold: f32, input_size: usize) -> Result<Vec<RawDetection>> {
    let mut detections = Vec::new();
    let size = input_size as f32;

    for (s, &stride) in STRIDES.iter().enumerate() {
        let (scores, bboxes, kps) = match (
            heads.scores.get(s),
            heads.bboxes.get(s),
            heads.landmarks.get(s),
        ) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => anyhow::bail!("missing heads for stride {}", stride),
        };

        let side = input_size / stride;
        if scores.nrows() != side * side {
            anyhow::bail!(
                "Expected {} cells for stride {}, got {}",
                side * side,
                stride,
                scores.nrows()
            );
        }

        let step = stride as f32;
        for row in 0..side {
            for col in 0..side {
                let idx = row * side + col;
                let score = scores[[idx, 0]];
                if score < score_threshold {
                    continue;
                }

                let cx = (col as f32 + bboxes[[idx, 0]]) * step / size;
                let cy = (row as f32 + bboxes[[idx, 1]]) * step / size;
                let w = bboxes[[idx, 2]] * step / size;
                let h = bboxes[[idx, 3]] * step / size;

                let mut landmarks = [0.0f32; 10];
                for k in 0..5 {
                    landmarks[k * 2] = (col as f32 + kps[[idx, k * 2]]) * step / size;
                    landmarks[k * 2 + 1] = (row as f32 + kps[[idx, k * 2 + 1]]) * step / size;
                }

                detections.push(RawDetection {
                    bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                    score,
                    landmarks,
                });
            }
        }
    }

    Ok(detections)
}

fn unit(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}
