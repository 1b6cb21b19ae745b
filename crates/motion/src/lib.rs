//! Stepper motion for the turret: step planning, axis workers, drivers and
//! the circle demo.

pub mod axis;
pub mod demo;
pub mod driver;
pub mod stepper;
pub mod wait;

pub use axis::{Axis, StepDirection, StepPlan, plan_move};
pub use demo::{circle_points, run_circle};
pub use driver::{DriveError, LogDriver, StepDriver};
pub use stepper::{
    AxisWorker, MotionError, StepperDispatcher, StepperSettings, Steppers, spawn_steppers,
};
pub use wait::wait_interruptible;
