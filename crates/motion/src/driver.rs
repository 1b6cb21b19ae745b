//! Step drivers: the last hop between an axis worker and the hardware.

use std::io;

use thiserror::Error;
use tracing::{debug, info};

use crate::axis::{Axis, StepDirection, StepPlan};

/// Pulse frequency of the stepper signal.
pub const DEFAULT_PULSE_FREQUENCY_HZ: u32 = 350;

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("pulse frequency must be non-zero")]
    ZeroFrequency,
    #[error("driver I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Hardware side of one axis.
pub trait StepDriver: Send {
    /// Emit `plan.steps` pulses in `plan.direction`.
    fn execute(&mut self, plan: StepPlan) -> Result<(), DriveError>;
    /// Stop the pulse output. Called once when the axis worker exits.
    fn disable(&mut self) -> Result<(), DriveError>;
}

impl<D: StepDriver + ?Sized> StepDriver for Box<D> {
    fn execute(&mut self, plan: StepPlan) -> Result<(), DriveError> {
        (**self).execute(plan)
    }

    fn disable(&mut self) -> Result<(), DriveError> {
        (**self).disable()
    }
}

/// Driver that only logs what it would pulse. Keeps the executed plans so a
/// caller can inspect the motion after the worker returns.
#[derive(Debug)]
pub struct LogDriver {
    axis: Axis,
    frequency_hz: u32,
    executed: Vec<StepPlan>,
    position_steps: i64,
    enabled: bool,
}

impl LogDriver {
    pub fn new(axis: Axis) -> Self {
        Self::with_frequency(axis, DEFAULT_PULSE_FREQUENCY_HZ)
    }

    pub fn with_frequency(axis: Axis, frequency_hz: u32) -> Self {
        Self {
            axis,
            frequency_hz,
            executed: Vec::new(),
            position_steps: 0,
            enabled: true,
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn executed(&self) -> &[StepPlan] {
        &self.executed
    }

    /// Signed step count accumulated since creation.
    pub fn position_steps(&self) -> i64 {
        self.position_steps
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl StepDriver for LogDriver {
    fn execute(&mut self, plan: StepPlan) -> Result<(), DriveError> {
        if self.frequency_hz == 0 {
            return Err(DriveError::ZeroFrequency);
        }
        let signed = match plan.direction {
            StepDirection::Positive => i64::from(plan.steps),
            StepDirection::Negative => -i64::from(plan.steps),
        };
        self.position_steps += signed;
        self.executed.push(plan);
        debug!(
            "{}-stepper: {} step(s) {:?} at {} Hz",
            self.axis, plan.steps, plan.direction, self.frequency_hz
        );
        Ok(())
    }

    fn disable(&mut self) -> Result<(), DriveError> {
        self.enabled = false;
        info!(
            "{}-stepper disabled after {} move(s)",
            self.axis,
            self.executed.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::plan_move;

    #[test]
    fn log_driver_tracks_signed_position() {
        let mut driver = LogDriver::new(Axis::X);
        driver.execute(plan_move(10, 2)).unwrap();
        driver.execute(plan_move(-4, 2)).unwrap();
        assert_eq!(driver.position_steps(), 3);
        assert_eq!(driver.executed().len(), 2);
        driver.disable().unwrap();
        assert!(!driver.is_enabled());
    }

    #[test]
    fn zero_frequency_is_refused() {
        let mut driver = LogDriver::with_frequency(Axis::Y, 0);
        assert!(matches!(
            driver.execute(plan_move(4, 2)),
            Err(DriveError::ZeroFrequency)
        ));
        assert!(driver.executed().is_empty());
    }
}
