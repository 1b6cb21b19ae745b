use ml_core::DetectError;
use thiserror::Error;

use crate::pipeline::{calibration::CalibrationError, observation::ProcessingError};

/// How the control loop reacts to an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Release the frame, signal exit-ready, stop the loop. Never retried.
    Fatal,
    /// Skip the rest of the current frame and carry on with the next one.
    Recoverable,
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("detection failed: {0}")]
    Detection(#[source] DetectError),
    #[error("detection #{index} could not be processed: {source}")]
    Processing {
        index: usize,
        #[source]
        source: ProcessingError,
    },
    #[error("calibration step failed on detection #{index}: {source}")]
    Calibration {
        index: usize,
        #[source]
        source: CalibrationError,
    },
}

impl ControlError {
    /// Policy table for the control loop.
    pub fn severity(&self) -> Severity {
        match self {
            ControlError::Detection(_) => Severity::Fatal,
            ControlError::Processing { .. } => Severity::Recoverable,
            ControlError::Calibration { .. } => Severity::Recoverable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::confirm::ConfirmError;

    #[test]
    fn only_detector_failures_are_fatal() {
        let fatal = ControlError::Detection(DetectError::InvalidInput("empty".into()));
        assert_eq!(fatal.severity(), Severity::Fatal);

        let processing = ControlError::Processing {
            index: 2,
            source: ProcessingError::NegativeClass(-1),
        };
        assert_eq!(processing.severity(), Severity::Recoverable);
        assert!(processing.to_string().contains("#2"));

        let prompt = ControlError::Calibration {
            index: 0,
            source: CalibrationError::Confirmation(ConfirmError::Closed),
        };
        assert_eq!(prompt.severity(), Severity::Recoverable);
    }
}
