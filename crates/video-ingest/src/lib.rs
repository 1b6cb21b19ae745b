//! Frame types and camera capture for the turret rig.
//!
//! Capture publishes into any [`FrameSink`]; the tracking core provides the
//! single-slot exchange that the inference thread reads from.

#[cfg(feature = "camera")]
mod camera;
mod types;

#[cfg(feature = "camera")]
pub use camera::{CaptureSettings, CaptureStats, publish_camera_frames};
pub use types::{CaptureError, Frame, FrameFormat, FrameSink};

/// Parse a `/dev/videoX` style URI or bare index and return the device index.
pub fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            return stripped.parse::<i32>().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_index_from_bare_number_and_dev_path() {
        assert_eq!(parse_device_index("0"), Some(0));
        assert_eq!(parse_device_index("/dev/video2"), Some(2));
        assert_eq!(parse_device_index("/dev/video"), None);
        assert_eq!(parse_device_index("rtsp://cam/stream"), None);
    }

    #[test]
    fn frame_consistency_follows_geometry() {
        let frame = Frame::new(vec![0; 4 * 2 * 3], 4, 2, FrameFormat::Bgr8);
        assert_eq!(frame.channels, 3);
        assert!(frame.is_consistent());

        let short = Frame::new(vec![0; 5], 4, 2, FrameFormat::Bgr8);
        assert!(!short.is_consistent());

        let gray = Frame::new(vec![0; 8], 4, 2, FrameFormat::Gray8);
        assert!(gray.is_consistent());
    }
}
