//! Decoding of YOLOv8-style detection heads and class-wise NMS.
//!
//! The head emits a `[4 + classes, anchors]` matrix in channel-major order:
//! rows 0..4 hold `cx, cy, w, h` in model-input pixels, the remaining rows
//! hold one score per class.

use crate::{detection::BoundingBox, detector::DetectError};

/// IoU above which a lower-scored box of the same class is suppressed.
pub const NMS_IOU_THRESHOLD: f32 = 0.45;
/// Upper bound on detections kept per frame.
pub const MAX_DETECTIONS: usize = 300;

/// Box surviving the confidence filter, before class names and latency are
/// attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub score: f32,
    pub class_id: i64,
}

/// Decode a channel-major head output, keeping anchors whose best class score
/// reaches `confidence_threshold`. Boxes are scaled by `(scale_x, scale_y)`
/// from model-input pixels back into frame pixels.
pub fn decode_head(
    output: &[f32],
    channels: usize,
    anchors: usize,
    confidence_threshold: f32,
    (scale_x, scale_y): (f32, f32),
) -> Result<Vec<Candidate>, DetectError> {
    if channels < 5 {
        return Err(DetectError::MalformedOutput(format!(
            "head requires at least 5 channels (x,y,w,h,score), got {channels}"
        )));
    }
    if output.len() != channels * anchors {
        return Err(DetectError::MalformedOutput(format!(
            "head holds {} values, expected {channels}x{anchors}",
            output.len()
        )));
    }

    let at = |channel: usize, anchor: usize| output[channel * anchors + anchor];
    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0usize;
        let mut best_score = f32::MIN;
        for class in 0..channels - 4 {
            let score = at(4 + class, anchor);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if best_score < confidence_threshold {
            continue;
        }
        let bbox = BoundingBox::from_center(
            at(0, anchor),
            at(1, anchor),
            at(2, anchor),
            at(3, anchor),
        )
        .scaled(scale_x, scale_y);
        candidates.push(Candidate {
            bbox,
            score: best_score,
            class_id: best_class as i64,
        });
    }
    Ok(candidates)
}

/// Greedy per-class non-maximum suppression. Output is sorted by descending
/// score and truncated to `max_detections`.
pub fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len().min(max_detections));
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
