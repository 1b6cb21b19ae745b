//! Configuration parsing for the tracking rig.
//!
//! This module owns translation of CLI arguments into a `TrackingConfig`
//! which the capture, inference and motor threads use without re-parsing
//! flags. Everything is fixed at startup.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;

use crate::pipeline::{
    calibration::DEFAULT_TARGET_CLASS,
    control::{CalibrationRetry, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_INPUT_SIZE, LoopSettings},
};

pub const DEFAULT_CAMERA_URI: &str = "0";
pub const DEFAULT_MODEL_PATH: &str = "models/yolov8n.torchscript";
pub const DEFAULT_FRAME_WIDTH: i32 = 320;
pub const DEFAULT_FRAME_HEIGHT: i32 = 240;
pub const DEFAULT_CAPTURE_FPS: f64 = 30.0;
pub const DEFAULT_EXIT_TIMEOUT_MS: u64 = 2_000;

#[derive(Clone, Debug)]
/// Canonical configuration shared by every thread of the rig.
pub struct TrackingConfig {
    /// Camera index, `/dev/videoN` path or stream URI.
    pub camera_uri: String,
    /// TorchScript detector.
    pub model_path: PathBuf,
    /// Optional newline-separated class labels.
    pub labels_path: Option<PathBuf>,
    pub width: i32,
    pub height: i32,
    pub capture_fps: f64,
    /// Square detector input edge in pixels.
    pub input_size: u32,
    pub confidence_threshold: f32,
    /// Class id tracked once calibrated.
    pub target_class: i64,
    pub calibration_retry: CalibrationRetry,
    /// How long to wait for exit acknowledgments before joining.
    pub exit_timeout_ms: u64,
    /// Force CPU inference.
    pub use_cpu: bool,
    pub verbose: bool,
    pub telemetry: TelemetryOptions,
}

#[derive(Clone, Debug, Default)]
/// Optional telemetry knobs.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing rig spans.
    pub chrome_trace_path: Option<PathBuf>,
}

/// CLI arguments accepted by the `track` subcommand.
#[derive(Debug, Default, Args)]
pub struct TrackingCliArgs {
    /// Camera index, /dev/videoN path or stream URI.
    #[arg(long = "source", value_name = "URI")]
    pub camera_uri: Option<String>,
    /// TorchScript model path.
    #[arg(long = "model", value_name = "PATH")]
    pub model_path: Option<PathBuf>,
    /// Class labels, one per line.
    #[arg(long = "labels", value_name = "PATH")]
    pub labels_path: Option<PathBuf>,
    /// Capture width in pixels.
    #[arg(long = "width", value_name = "PX")]
    pub width: Option<i32>,
    /// Capture height in pixels.
    #[arg(long = "height", value_name = "PX")]
    pub height: Option<i32>,
    /// Requested capture frame rate.
    #[arg(long = "fps", value_name = "FPS")]
    pub capture_fps: Option<f64>,
    /// Detector input edge in pixels (multiple of 32).
    #[arg(long = "input-size", value_name = "PX")]
    pub input_size: Option<u32>,
    /// Minimum detection confidence.
    #[arg(long = "confidence", value_name = "SCORE")]
    pub confidence_threshold: Option<f32>,
    /// Class id to track once calibrated.
    #[arg(long = "target-class", value_name = "ID")]
    pub target_class: Option<i64>,
    /// Where to look for the next calibration candidate after a rejection.
    #[arg(long = "calibration-retry", value_enum, value_name = "WHEN")]
    pub calibration_retry: Option<CalibrationRetry>,
    /// Time allowed for workers to acknowledge shutdown.
    #[arg(long = "exit-timeout-ms", value_name = "MS")]
    pub exit_timeout_ms: Option<u64>,
    /// Force CPU inference.
    #[arg(long = "cpu", action = clap::ArgAction::SetTrue)]
    pub use_cpu: bool,
    /// Enable verbose logging.
    #[arg(long = "verbose", action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
}

impl TryFrom<TrackingCliArgs> for TrackingConfig {
    type Error = anyhow::Error;

    fn try_from(args: TrackingCliArgs) -> Result<Self> {
        let width = args.width.unwrap_or(DEFAULT_FRAME_WIDTH);
        let height = args.height.unwrap_or(DEFAULT_FRAME_HEIGHT);
        if width <= 0 || height <= 0 {
            bail!("Capture width and height must be positive integers");
        }

        let capture_fps = args.capture_fps.unwrap_or(DEFAULT_CAPTURE_FPS);
        if !(capture_fps.is_finite() && capture_fps > 0.0) {
            bail!("--fps must be a positive number");
        }

        let input_size = args.input_size.unwrap_or(DEFAULT_INPUT_SIZE);
        if input_size < 32 || input_size % 32 != 0 {
            bail!("--input-size must be a multiple of 32 (got {input_size})");
        }

        let confidence_threshold = args
            .confidence_threshold
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);
        if !(confidence_threshold > 0.0 && confidence_threshold <= 1.0) {
            bail!("--confidence must be in (0, 1]");
        }

        let target_class = args.target_class.unwrap_or(DEFAULT_TARGET_CLASS);
        if target_class < 0 {
            bail!("--target-class must be a non-negative class id");
        }

        Ok(Self {
            camera_uri: args
                .camera_uri
                .unwrap_or_else(|| DEFAULT_CAMERA_URI.to_string()),
            model_path: args
                .model_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            labels_path: args.labels_path,
            width,
            height,
            capture_fps,
            input_size,
            confidence_threshold,
            target_class,
            calibration_retry: args.calibration_retry.unwrap_or_default(),
            exit_timeout_ms: args.exit_timeout_ms.unwrap_or(DEFAULT_EXIT_TIMEOUT_MS),
            use_cpu: args.use_cpu,
            verbose: args.verbose,
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
            },
        })
    }
}

impl TrackingConfig {
    /// Settings consumed by the inference loop.
    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            input_size: self.input_size,
            confidence_threshold: self.confidence_threshold,
            target_class: self.target_class,
            calibration_retry: self.calibration_retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: TrackingCliArgs,
    }

    fn parse(argv: &[&str]) -> Result<TrackingConfig> {
        let harness = Harness::try_parse_from(std::iter::once("turret").chain(argv.iter().copied()))?;
        TrackingConfig::try_from(harness.args)
    }

    #[test]
    fn defaults_match_the_rig() {
        let config = parse(&[]).unwrap();
        assert_eq!((config.width, config.height), (320, 240));
        assert_eq!(config.input_size, 224);
        assert!((config.confidence_threshold - 0.65).abs() < f32::EPSILON);
        assert_eq!(config.target_class, 0);
        assert_eq!(config.calibration_retry, CalibrationRetry::SameFrame);
        assert_eq!(config.camera_uri, "0");
        assert_eq!(config.loop_settings(), LoopSettings::default());
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--source",
            "/dev/video1",
            "--input-size",
            "320",
            "--confidence",
            "0.5",
            "--target-class",
            "2",
            "--calibration-retry",
            "next-frame",
            "--chrome-trace",
            "trace.json",
        ])
        .unwrap();
        assert_eq!(config.camera_uri, "/dev/video1");
        assert_eq!(config.input_size, 320);
        assert_eq!(config.target_class, 2);
        assert_eq!(config.calibration_retry, CalibrationRetry::NextFrame);
        assert_eq!(
            config.telemetry.chrome_trace_path,
            Some(PathBuf::from("trace.json"))
        );
    }

    #[test]
    fn motor_flags_are_not_tracking_flags() {
        assert!(parse(&["--step-size", "3"]).is_err());
        assert!(parse(&["--motor-poll-ms", "10"]).is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(parse(&["--width", "0"]).is_err());
        assert!(parse(&["--input-size", "100"]).is_err());
        assert!(parse(&["--confidence", "0"]).is_err());
        assert!(parse(&["--confidence", "1.5"]).is_err());
        assert!(parse(&["--target-class", "-1"]).is_err());
        assert!(parse(&["--fps", "0"]).is_err());
    }
}
