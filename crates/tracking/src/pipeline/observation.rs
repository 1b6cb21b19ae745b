//! Per-detection attribute extraction: validation, throughput and centroid.

use ml_core::{BoundingBox, Detection};
use thiserror::Error;

use crate::pipeline::{calibration::Sighting, motor::Pixel};

#[derive(Debug, Error, PartialEq)]
pub enum ProcessingError {
    #[error("bounding box has non-finite coordinates: {0:?}")]
    NonFiniteBox(BoundingBox),
    #[error("bounding box corners are not ordered: {0:?}")]
    InvertedBox(BoundingBox),
    #[error("centroid ({cx},{cy}) does not fit a 16-bit pixel position")]
    CentroidOutOfRange { cx: f64, cy: f64 },
    #[error("negative class id {0}")]
    NegativeClass(i64),
    #[error("confidence {0} outside [0, 1]")]
    ScoreOutOfRange(f32),
    #[error("inference latency {0} ms cannot yield a throughput")]
    InvalidLatency(f32),
}

/// Validated view of one detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub centroid: Pixel,
    pub class_id: i64,
    pub class_name: String,
    pub score: f32,
    /// `1000 / latency_ms`.
    pub throughput_fps: f32,
    pub latency_ms: f32,
}

impl Observation {
    pub fn extract(detection: &Detection) -> Result<Self, ProcessingError> {
        let bbox = detection.bbox;
        if !bbox.is_finite() {
            return Err(ProcessingError::NonFiniteBox(bbox));
        }
        if !bbox.is_ordered() {
            return Err(ProcessingError::InvertedBox(bbox));
        }
        if detection.class_id < 0 {
            return Err(ProcessingError::NegativeClass(detection.class_id));
        }
        if !(0.0..=1.0).contains(&detection.score) {
            return Err(ProcessingError::ScoreOutOfRange(detection.score));
        }
        let throughput_fps = throughput(detection.latency_ms)?;

        Ok(Self {
            centroid: centroid(&bbox)?,
            class_id: detection.class_id,
            class_name: detection.class_name.clone(),
            score: detection.score,
            throughput_fps,
            latency_ms: detection.latency_ms,
        })
    }

    pub fn sighting(&self) -> Sighting {
        Sighting {
            centroid: self.centroid,
            class_id: self.class_id,
        }
    }
}

/// Frames per second implied by one inference call.
pub fn throughput(latency_ms: f32) -> Result<f32, ProcessingError> {
    if !latency_ms.is_finite() || latency_ms <= 0.0 {
        return Err(ProcessingError::InvalidLatency(latency_ms));
    }
    Ok(1000.0 / latency_ms)
}

/// `(floor((x1+x2)/2), floor((y1+y2)/2))`, flooring toward negative infinity.
pub fn centroid(bbox: &BoundingBox) -> Result<Pixel, ProcessingError> {
    let cx = ((bbox.x1 as f64 + bbox.x2 as f64) / 2.0).floor();
    let cy = ((bbox.y1 as f64 + bbox.y2 as f64) / 2.0).floor();
    let range = i16::MIN as f64..=i16::MAX as f64;
    if !range.contains(&cx) || !range.contains(&cy) {
        return Err(ProcessingError::CentroidOutOfRange { cx, cy });
    }
    Ok(Pixel::new(cx as i16, cy as i16))
}
