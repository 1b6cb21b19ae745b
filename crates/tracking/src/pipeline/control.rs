//! The inference thread's loop: acquire → detect → release → calibrate/track
//! → dispatch, until the stop flag is raised or detection fails.

use ml_core::{Detection, Detector, ImageView};
use tracing::{debug, error, info, trace, warn};

use crate::pipeline::{
    calibration::{Calibration, DEFAULT_TARGET_CLASS, Step},
    confirm::Confirm,
    error::{ControlError, Severity},
    exchange::FrameSource,
    motor::MotorDispatcher,
    observation::Observation,
    shutdown::ShutdownSignal,
};

pub const DEFAULT_INPUT_SIZE: u32 = 224;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.65;

/// What to do with the remaining detections of a frame after the operator
/// rejects a calibration candidate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum CalibrationRetry {
    /// Offer the next detection of the same frame.
    #[default]
    SameFrame,
    /// Ignore the rest of the frame; offer candidates again on the next one.
    NextFrame,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopSettings {
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub target_class: i64,
    pub calibration_retry: CalibrationRetry,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            target_class: DEFAULT_TARGET_CLASS,
            calibration_retry: CalibrationRetry::default(),
        }
    }
}

#[derive(Debug)]
pub enum ExitReason {
    Stopped,
    Fatal(ControlError),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: u64,
    pub idle_polls: u64,
    pub detections: u64,
    pub commands: u64,
    pub recoverable_errors: u64,
}

#[derive(Debug)]
pub struct LoopReport {
    pub exit: ExitReason,
    pub stats: LoopStats,
}

/// Result of a single iteration that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    NoFrame,
    Processed { detections: usize, commands: usize },
}

pub struct ControlLoop<S, D, C, M> {
    source: S,
    detector: D,
    confirmer: C,
    motor: M,
    calibration: Calibration,
    settings: LoopSettings,
    stats: LoopStats,
    last_sequence: Option<u64>,
}

impl<S, D, C, M> ControlLoop<S, D, C, M>
where
    S: FrameSource,
    D: Detector,
    C: Confirm,
    M: MotorDispatcher,
{
    pub fn new(source: S, detector: D, confirmer: C, motor: M, settings: LoopSettings) -> Self {
        Self {
            source,
            detector,
            confirmer,
            motor,
            calibration: Calibration::new(settings.target_class),
            settings,
            stats: LoopStats::default(),
            last_sequence: None,
        }
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Run until `shutdown` requests a stop or a fatal error occurs. Signals
    /// exit-ready exactly once before returning.
    pub fn run<H>(&mut self, shutdown: &H) -> LoopReport
    where
        H: ShutdownSignal + ?Sized,
    {
        info!(
            "Start inference loop (input {}px, confidence {:.2}, target class {})",
            self.settings.input_size, self.settings.confidence_threshold, self.settings.target_class
        );

        let exit = loop {
            if shutdown.is_stop_requested() {
                break ExitReason::Stopped;
            }
            if let Err(err) = self.step() {
                match err.severity() {
                    Severity::Recoverable => {
                        self.stats.recoverable_errors += 1;
                        metrics::counter!("tracking_recoverable_errors_total").increment(1);
                        warn!("{err}; continuing with next frame");
                    }
                    Severity::Fatal => {
                        error!("{err}; stopping inference loop");
                        break ExitReason::Fatal(err);
                    }
                }
            }
        };

        shutdown.signal_exit_ready();
        info!(
            "Stopping inference loop after {} frame(s), {} command(s)",
            self.stats.frames, self.stats.commands
        );
        LoopReport {
            exit,
            stats: self.stats.clone(),
        }
    }

    /// One iteration of the loop body.
    pub fn step(&mut self) -> Result<FrameOutcome, ControlError> {
        let Some(frame) = self.source.acquire_latest() else {
            self.stats.idle_polls += 1;
            return Ok(FrameOutcome::NoFrame);
        };

        let span = tracing::info_span!("tracking.frame", sequence = frame.sequence);
        let _guard = span.enter();
        if self.last_sequence == Some(frame.sequence) {
            trace!("frame #{} observed again", frame.sequence);
        }
        self.last_sequence = Some(frame.sequence);

        let result = self.detector.detect(
            ImageView::new(&frame.data, frame.width, frame.height, frame.channels),
            self.settings.input_size,
            self.settings.confidence_threshold,
        );
        self.source.release(frame);
        let detections = result.map_err(ControlError::Detection)?;

        self.stats.frames += 1;
        metrics::counter!("tracking_frames_total").increment(1);
        self.handle_detections(&detections)
    }

    fn handle_detections(&mut self, detections: &[Detection]) -> Result<FrameOutcome, ControlError> {
        let mut commands = 0;
        for (index, detection) in detections.iter().enumerate() {
            self.stats.detections += 1;
            metrics::counter!("tracking_detections_total").increment(1);

            let observation = Observation::extract(detection)
                .map_err(|source| ControlError::Processing { index, source })?;
            metrics::gauge!("tracking_inference_fps").set(observation.throughput_fps as f64);
            info!(
                "Detection at {:.2} ms ({:.2} FPS) class: {} ({}), conf: {:.2}, center: {}",
                observation.latency_ms,
                observation.throughput_fps,
                observation.class_name,
                observation.class_id,
                observation.score,
                observation.centroid
            );

            let step = self
                .calibration
                .observe(observation.sighting(), &mut self.confirmer)
                .map_err(|source| ControlError::Calibration { index, source })?;

            if let Some(command) = step.command() {
                self.motor.dispatch_absolute_position(command);
                self.stats.commands += 1;
                commands += 1;
                metrics::counter!("tracking_position_commands_total").increment(1);
            }

            if step == Step::Rejected && self.settings.calibration_retry == CalibrationRetry::NextFrame
            {
                debug!("Candidate rejected; waiting for the next frame");
                break;
            }
        }

        Ok(FrameOutcome::Processed {
            detections: detections.len(),
            commands,
        })
    }
}
