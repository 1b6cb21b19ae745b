//! Calibrate-then-track state machine.
//!
//! The first detection the operator confirms becomes the reference origin and
//! is sent to the motors so they can adopt it as their zero. From then on
//! every detection of the target class is forwarded as an absolute position.

use thiserror::Error;
use tracing::{debug, info};

use crate::pipeline::{
    confirm::{Confirm, ConfirmError},
    motor::{Pixel, PositionCommand},
};

/// Detection class tracked once calibrated.
pub const DEFAULT_TARGET_CLASS: i64 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationState {
    Uncalibrated,
    AwaitingConfirmation { candidate: Pixel },
    Calibrated { origin: Pixel },
}

impl CalibrationState {
    pub fn label(&self) -> &'static str {
        match self {
            CalibrationState::Uncalibrated => "uncalibrated",
            CalibrationState::AwaitingConfirmation { .. } => "awaiting-confirmation",
            CalibrationState::Calibrated { .. } => "calibrated",
        }
    }
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("cannot {input} while {state}")]
    InvalidTransition {
        state: &'static str,
        input: &'static str,
    },
    #[error(transparent)]
    Confirmation(#[from] ConfirmError),
}

/// What the state machine is fed for each detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sighting {
    pub centroid: Pixel,
    pub class_id: i64,
}

/// Result of feeding one sighting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Candidate confirmed: origin set, command emitted.
    Calibrated(PositionCommand),
    /// Candidate rejected; still uncalibrated.
    Rejected,
    /// Tracking command for the target class.
    Track(PositionCommand),
    /// Nothing to do for this sighting.
    Ignored,
}

impl Step {
    pub fn command(&self) -> Option<PositionCommand> {
        match self {
            Step::Calibrated(cmd) | Step::Track(cmd) => Some(*cmd),
            Step::Rejected | Step::Ignored => None,
        }
    }
}

pub struct Calibration {
    state: CalibrationState,
    target_class: i64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_CLASS)
    }
}

impl Calibration {
    pub fn new(target_class: i64) -> Self {
        Self {
            state: CalibrationState::Uncalibrated,
            target_class,
        }
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn target_class(&self) -> i64 {
        self.target_class
    }

    pub fn origin(&self) -> Option<Pixel> {
        match self.state {
            CalibrationState::Calibrated { origin } => Some(origin),
            _ => None,
        }
    }

    /// `Uncalibrated` → `AwaitingConfirmation`.
    pub fn propose(&mut self, candidate: Pixel) -> Result<(), CalibrationError> {
        match self.state {
            CalibrationState::Uncalibrated => {
                self.state = CalibrationState::AwaitingConfirmation { candidate };
                Ok(())
            }
            other => Err(CalibrationError::InvalidTransition {
                state: other.label(),
                input: "propose a candidate",
            }),
        }
    }

    /// `AwaitingConfirmation` → `Calibrated` on accept, `Uncalibrated` on
    /// reject.
    pub fn resolve(&mut self, accepted: bool) -> Result<Step, CalibrationError> {
        let CalibrationState::AwaitingConfirmation { candidate } = self.state else {
            return Err(CalibrationError::InvalidTransition {
                state: self.state.label(),
                input: "resolve a confirmation",
            });
        };
        if accepted {
            self.state = CalibrationState::Calibrated { origin: candidate };
            info!("Reference position set to x0={}, y0={}", candidate.x, candidate.y);
            Ok(Step::Calibrated(candidate.into()))
        } else {
            self.state = CalibrationState::Uncalibrated;
            info!("Retry calibration, moving to next detection");
            Ok(Step::Rejected)
        }
    }

    /// Forward target-class sightings once calibrated.
    pub fn track(&self, sighting: Sighting) -> Result<Step, CalibrationError> {
        match self.state {
            CalibrationState::Calibrated { .. } if sighting.class_id == self.target_class => {
                Ok(Step::Track(sighting.centroid.into()))
            }
            CalibrationState::Calibrated { .. } => Ok(Step::Ignored),
            other => Err(CalibrationError::InvalidTransition {
                state: other.label(),
                input: "track",
            }),
        }
    }

    /// Feed one sighting, asking `confirmer` when uncalibrated.
    ///
    /// A failing confirmer leaves the machine `Uncalibrated`.
    pub fn observe<C>(
        &mut self,
        sighting: Sighting,
        confirmer: &mut C,
    ) -> Result<Step, CalibrationError>
    where
        C: Confirm + ?Sized,
    {
        match self.state {
            CalibrationState::Uncalibrated => {
                self.propose(sighting.centroid)?;
                debug!("Calibration candidate {}", sighting.centroid);
                match confirmer.confirm(sighting.centroid) {
                    Ok(accepted) => self.resolve(accepted),
                    Err(err) => {
                        self.state = CalibrationState::Uncalibrated;
                        Err(err.into())
                    }
                }
            }
            CalibrationState::AwaitingConfirmation { .. } => {
                Err(CalibrationError::InvalidTransition {
                    state: self.state.label(),
                    input: "observe",
                })
            }
            CalibrationState::Calibrated { .. } => self.track(sighting),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sighting(x: i16, y: i16, class_id: i64) -> Sighting {
        Sighting {
            centroid: Pixel::new(x, y),
            class_id,
        }
    }

    fn answer(accept: bool) -> impl FnMut(Pixel) -> Result<bool, ConfirmError> {
        move |_| Ok(accept)
    }

    #[test]
    fn accepted_candidate_becomes_origin() {
        let mut calibration = Calibration::default();
        let mut seen = Vec::new();
        let mut confirmer = |p: Pixel| -> Result<bool, ConfirmError> {
            seen.push(p);
            Ok(true)
        };
        let step = calibration.observe(sighting(20, 30, 5), &mut confirmer).unwrap();
        assert_eq!(step, Step::Calibrated(PositionCommand::new(20, 30)));
        assert_eq!(seen, vec![Pixel::new(20, 30)]);
        assert_eq!(
            calibration.state(),
            CalibrationState::Calibrated {
                origin: Pixel::new(20, 30)
            }
        );
    }

    #[test]
    fn rejected_candidate_stays_uncalibrated() {
        let mut calibration = Calibration::default();
        let step = calibration
            .observe(sighting(20, 30, 5), &mut answer(false))
            .unwrap();
        assert_eq!(step, Step::Rejected);
        assert_eq!(step.command(), None);
        assert_eq!(calibration.state(), CalibrationState::Uncalibrated);
    }

    #[test]
    fn calibrated_tracks_only_target_class() {
        let mut calibration = Calibration::new(0);
        calibration.observe(sighting(1, 1, 0), &mut answer(true)).unwrap();

        let mut never = |_: Pixel| -> Result<bool, ConfirmError> { panic!("no prompt once calibrated") };
        let tracked = calibration.observe(sighting(110, 60, 0), &mut never).unwrap();
        assert_eq!(tracked.command(), Some(PositionCommand::new(110, 60)));
        let other = calibration.observe(sighting(110, 60, 3), &mut never).unwrap();
        assert_eq!(other, Step::Ignored);
        assert_eq!(calibration.origin(), Some(Pixel::new(1, 1)));
    }

    #[test]
    fn explicit_transitions_reject_wrong_state() {
        let mut calibration = Calibration::default();
        assert!(calibration.resolve(true).is_err());
        assert!(calibration.track(sighting(0, 0, 0)).is_err());

        calibration.propose(Pixel::new(4, 5)).unwrap();
        assert_eq!(
            calibration.state(),
            CalibrationState::AwaitingConfirmation {
                candidate: Pixel::new(4, 5)
            }
        );
        assert!(calibration.propose(Pixel::new(6, 7)).is_err());
        assert!(calibration.observe(sighting(0, 0, 0), &mut answer(true)).is_err());

        calibration.resolve(true).unwrap();
        assert!(calibration.propose(Pixel::new(6, 7)).is_err());
        assert_eq!(calibration.origin(), Some(Pixel::new(4, 5)));
    }

    #[test]
    fn failing_confirmer_reverts_to_uncalibrated() {
        let mut calibration = Calibration::default();
        let mut closed = |_: Pixel| -> Result<bool, ConfirmError> { Err(ConfirmError::Closed) };
        let err = calibration.observe(sighting(3, 3, 0), &mut closed).unwrap_err();
        assert!(matches!(err, CalibrationError::Confirmation(ConfirmError::Closed)));
        assert_eq!(calibration.state(), CalibrationState::Uncalibrated);
    }
}
