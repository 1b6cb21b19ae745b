//! Inference-side pipeline of the rig.
//!
//! The module is split into focused submodules:
//! - `exchange`: single-slot hand-off of the newest camera frame.
//! - `shutdown`: stop flag plus per-worker exit acknowledgments.
//! - `observation`: validation and centroid of one detection.
//! - `calibration`: calibrate-then-track state machine.
//! - `confirm`: operator confirmation of the calibration candidate.
//! - `control`: the loop tying the above to a detector and the motors.
//! - `error`: fatal vs recoverable error policy.
//! - `motor`: position commands and the dispatcher boundary.
//! - `config`: CLI configuration parsing.
//! - `telemetry`: tracing subscribers and the Prometheus recorder.

pub mod calibration;
pub mod config;
pub mod confirm;
pub mod control;
pub mod error;
pub mod exchange;
pub mod motor;
pub mod observation;
pub mod shutdown;
pub mod telemetry;

pub use calibration::{Calibration, CalibrationError, CalibrationState, Sighting, Step};
pub use config::{TelemetryOptions, TrackingCliArgs, TrackingConfig};
pub use confirm::{Confirm, ConfirmError, PromptConfirmer};
pub use control::{
    CalibrationRetry, ControlLoop, ExitReason, FrameOutcome, LoopReport, LoopSettings, LoopStats,
};
pub use error::{ControlError, Severity};
pub use exchange::{FrameExchange, FrameSource};
pub use motor::{MotorDispatcher, Pixel, PositionCommand};
pub use observation::{Observation, ProcessingError};
pub use shutdown::{Shutdown, ShutdownSignal, WorkerHandle};
