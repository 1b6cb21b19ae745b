//! OpenCV-backed camera capture publishing into a [`FrameSink`].

use opencv::{
    core::{self, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait},
};
use tracing::{debug, info, warn};

use crate::{
    parse_device_index,
    types::{CaptureError, Frame, FrameFormat, FrameSink},
};

/// Requested capture geometry and rate.
#[derive(Clone, Copy, Debug)]
pub struct CaptureSettings {
    pub width: i32,
    pub height: i32,
    pub fps: f64,
}

/// Counters reported once the capture loop returns.
#[derive(Clone, Copy, Debug, Default)]
pub struct CaptureStats {
    pub published: u64,
    pub empty: u64,
}

/// Capture frames from `uri` and publish each one into `sink` until
/// `should_stop` returns true.
///
/// Frames are resized to the requested geometry when the device ignores the
/// requested size, so consumers always see `settings.width x settings.height`
/// BGR8 buffers. Empty reads are skipped with a warning.
pub fn publish_camera_frames<S, F>(
    uri: &str,
    settings: &CaptureSettings,
    sink: &S,
    mut should_stop: F,
) -> Result<CaptureStats, CaptureError>
where
    S: FrameSink + ?Sized,
    F: FnMut() -> bool,
{
    let mut cap = open_video_capture(uri)?;
    configure_camera(&mut cap, settings);
    report_negotiated(&cap);

    let mut frame = Mat::default();
    let mut scratch = Mat::default();
    let mut stats = CaptureStats::default();

    while !should_stop() {
        let grabbed = cap
            .read(&mut frame)
            .map_err(|e| CaptureError::Other(e.into()))?;
        let size = frame.size().map_err(|e| CaptureError::Other(e.into()))?;
        if !grabbed || size.width <= 0 {
            stats.empty = stats.empty.wrapping_add(1);
            warn!("Empty image captured from {uri}");
            continue;
        }

        let working = if size.width != settings.width || size.height != settings.height {
            opencv::imgproc::resize(
                &frame,
                &mut scratch,
                core::Size {
                    width: settings.width,
                    height: settings.height,
                },
                0.0,
                0.0,
                opencv::imgproc::INTER_LINEAR,
            )
            .map_err(|e| CaptureError::Other(e.into()))?;
            &scratch
        } else {
            &frame
        };

        let data = working
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();

        sink.publish(Frame::new(
            data,
            settings.width,
            settings.height,
            FrameFormat::Bgr8,
        ));
        stats.published = stats.published.wrapping_add(1);
    }

    debug!(
        "Capture from {uri} finished: {} published, {} empty",
        stats.published, stats.empty
    );
    Ok(stats)
}

/// Attempt to open a camera input either by index or URI.
fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
    if let Some(index) = parse_device_index(uri) {
        for backend in [videoio::CAP_V4L2, videoio::CAP_ANY] {
            match VideoCapture::new(index, backend) {
                Ok(cap) => {
                    if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                        return Ok(cap);
                    }
                }
                Err(err) => {
                    warn!("failed to open device #{index} with backend {backend}: {err}");
                }
            }
        }
    }

    for backend in [videoio::CAP_V4L2, videoio::CAP_ANY] {
        match VideoCapture::from_file(uri, backend) {
            Ok(cap) => {
                if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                    return Ok(cap);
                }
            }
            Err(err) => {
                warn!("failed to open {uri} with backend {backend}: {err}");
            }
        }
    }

    Err(CaptureError::Open {
        uri: uri.to_string(),
    })
}

/// Request MJPG at the configured geometry and rate.
fn configure_camera(cap: &mut VideoCapture, settings: &CaptureSettings) {
    if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
        let _ = cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64);
    }
    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, settings.width as f64);
    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, settings.height as f64);
    let _ = cap.set(videoio::CAP_PROP_FPS, settings.fps);
}

/// Log what the driver actually agreed to.
fn report_negotiated(cap: &VideoCapture) {
    let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or_default();
    let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or_default();
    let fps = cap.get(videoio::CAP_PROP_FPS).unwrap_or_default();
    let fourcc = cap.get(videoio::CAP_PROP_FOURCC).unwrap_or_default() as u32;
    info!(
        "Camera negotiated {} {}x{} @ {:.2} fps",
        fourcc_label(fourcc),
        width as i32,
        height as i32,
        fps
    );
}

fn fourcc_label(raw: u32) -> String {
    raw.to_le_bytes()
        .iter()
        .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
        .collect()
}
