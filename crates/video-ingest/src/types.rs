use std::{fmt, sync::Arc};

use anyhow::Error;
use chrono::Utc;
use thiserror::Error;

/// Raw interleaved frame captured from a video source.
///
/// A `Frame` always owns its pixel buffer: whoever holds one can keep it for
/// as long as it likes without affecting the producer.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub channels: i32,
    pub format: FrameFormat,
    /// Publish order assigned by the sink, zero until published.
    pub sequence: u64,
    pub timestamp_ms: i64,
}

impl Frame {
    /// Wrap a freshly captured buffer, stamping it with the current time.
    pub fn new(data: Vec<u8>, width: i32, height: i32, format: FrameFormat) -> Self {
        Self {
            data,
            width,
            height,
            channels: format.channels(),
            format,
            sequence: 0,
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Number of bytes a buffer with this geometry should hold.
    pub fn expected_len(&self) -> usize {
        (self.width.max(0) as usize) * (self.height.max(0) as usize) * (self.channels.max(0) as usize)
    }

    /// Whether the buffer length agrees with width, height and channel count.
    pub fn is_consistent(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.expected_len()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("bytes", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("format", &self.format)
            .field("sequence", &self.sequence)
            .field("timestamp_ms", &self.timestamp_ms)
            .finish()
    }
}

/// Pixel layouts the capture side produces. Detectors read three-channel
/// frames as BGR.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
    Gray8,
}

impl FrameFormat {
    pub fn channels(self) -> i32 {
        match self {
            FrameFormat::Bgr8 => 3,
            FrameFormat::Gray8 => 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error(transparent)]
    Other(#[from] Error),
}

/// Destination for captured frames.
///
/// Implementations must not block the producer for long: the capture thread
/// calls `publish` once per frame at the device frame rate.
pub trait FrameSink: Send + Sync {
    fn publish(&self, frame: Frame);
}

impl<T: FrameSink + ?Sized> FrameSink for Arc<T> {
    fn publish(&self, frame: Frame) {
        (**self).publish(frame)
    }
}

impl<T: FrameSink + ?Sized> FrameSink for &T {
    fn publish(&self, frame: Frame) {
        (**self).publish(frame)
    }
}
