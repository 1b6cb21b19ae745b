//! Axis workers and the dispatcher that feeds them.
//!
//! Each axis runs on its own thread and owns its driver. The first position
//! an axis receives becomes its reference; every later one moves the axis by
//! the difference and becomes the new reference.

use std::{io, thread, time::Duration};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use thiserror::Error;
use tracing::{debug, info, warn};
use tracking::{
    MotorDispatcher, PositionCommand, Shutdown, ShutdownSignal, pipeline::telemetry::spawn_thread,
};

use crate::{
    axis::{Axis, DEFAULT_STEP_SIZE_PX, plan_move},
    driver::StepDriver,
};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;
/// Pending positions per axis before `dispatch_absolute_position` blocks.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepperSettings {
    pub step_size_px: u16,
    /// How long an idle worker waits for a command before re-checking the
    /// stop flag.
    pub poll_interval: Duration,
    pub queue_capacity: usize,
}

impl Default for StepperSettings {
    fn default() -> Self {
        Self {
            step_size_px: DEFAULT_STEP_SIZE_PX,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Error)]
pub enum MotionError {
    #[error("failed to spawn {axis}-stepper thread: {source}")]
    Spawn {
        axis: Axis,
        #[source]
        source: io::Error,
    },
    #[error("{0}-stepper thread panicked")]
    WorkerPanicked(Axis),
}

/// Consumes positions for one axis until stopped or disconnected.
pub struct AxisWorker<D> {
    axis: Axis,
    driver: D,
    commands: Receiver<i16>,
    settings: StepperSettings,
    reference: Option<i16>,
}

impl<D: StepDriver> AxisWorker<D> {
    pub fn new(axis: Axis, driver: D, commands: Receiver<i16>, settings: StepperSettings) -> Self {
        Self {
            axis,
            driver,
            commands,
            settings,
            reference: None,
        }
    }

    pub fn reference(&self) -> Option<i16> {
        self.reference
    }

    /// Run the worker loop, then disable the driver, signal exit-ready and
    /// hand the driver back.
    pub fn run<H>(mut self, shutdown: &H) -> D
    where
        H: ShutdownSignal + ?Sized,
    {
        info!("Start {}-stepper motor task", self.axis);
        info!("{}-stepper waiting for calibration", self.axis);

        while !shutdown.is_stop_requested() {
            match self.commands.recv_timeout(self.settings.poll_interval) {
                Ok(position) => self.apply(position),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("{}-stepper command queue closed", self.axis);
                    break;
                }
            }
        }

        if let Err(err) = self.driver.disable() {
            warn!("failed to disable {}-stepper: {err}", self.axis);
        }
        shutdown.signal_exit_ready();
        info!("Stopping {}-stepper motor task", self.axis);
        self.driver
    }

    /// Apply one absolute position.
    pub fn apply(&mut self, position: i16) {
        let Some(reference) = self.reference else {
            self.reference = Some(position);
            info!("Set {}-stepper reference to {}", self.axis, position);
            return;
        };

        let delta = i32::from(position) - i32::from(reference);
        debug!("{}-stepper received {} (delta {})", self.axis, position, delta);
        let plan = plan_move(delta, self.settings.step_size_px);
        if let Err(err) = self.driver.execute(plan) {
            warn!("{}-stepper move of {} step(s) failed: {err}", self.axis, plan.steps);
        } else {
            metrics::counter!("motion_steps_total", "axis" => self.axis.label())
                .increment(u64::from(plan.steps));
        }
        self.reference = Some(position);
    }
}

/// Splits each position command into its axis queues.
#[derive(Clone)]
pub struct StepperDispatcher {
    x: Sender<i16>,
    y: Sender<i16>,
}

impl StepperDispatcher {
    pub fn new(x: Sender<i16>, y: Sender<i16>) -> Self {
        Self { x, y }
    }

    fn send(&self, axis: Axis, queue: &Sender<i16>, value: i16) {
        if queue.send(value).is_err() {
            metrics::counter!("motion_commands_dropped_total", "axis" => axis.label())
                .increment(1);
            debug!("{axis}-stepper is gone; dropping position {value}");
        }
    }
}

impl MotorDispatcher for StepperDispatcher {
    fn dispatch_absolute_position(&self, command: PositionCommand) {
        self.send(Axis::X, &self.x, command.x);
        self.send(Axis::Y, &self.y, command.y);
        debug!("sent x={}, y={}", command.x, command.y);
    }
}

/// Join handles of the two axis threads.
pub struct Steppers<D> {
    x: thread::JoinHandle<D>,
    y: thread::JoinHandle<D>,
}

impl<D> Steppers<D> {
    /// Wait for both workers and return their drivers as `(x, y)`.
    pub fn join(self) -> Result<(D, D), MotionError> {
        let x = self.x.join().map_err(|_| MotionError::WorkerPanicked(Axis::X))?;
        let y = self.y.join().map_err(|_| MotionError::WorkerPanicked(Axis::Y))?;
        Ok((x, y))
    }
}

/// Register both axes with `shutdown` and start their threads.
pub fn spawn_steppers<D>(
    shutdown: &Shutdown,
    settings: StepperSettings,
    x_driver: D,
    y_driver: D,
) -> Result<(StepperDispatcher, Steppers<D>), MotionError>
where
    D: StepDriver + 'static,
{
    let (x_tx, x_rx) = bounded(settings.queue_capacity);
    let (y_tx, y_rx) = bounded(settings.queue_capacity);

    let x = spawn_axis(shutdown, Axis::X, x_driver, x_rx, settings)?;
    let y = spawn_axis(shutdown, Axis::Y, y_driver, y_rx, settings)?;

    Ok((StepperDispatcher::new(x_tx, y_tx), Steppers { x, y }))
}

fn spawn_axis<D>(
    shutdown: &Shutdown,
    axis: Axis,
    driver: D,
    commands: Receiver<i16>,
    settings: StepperSettings,
) -> Result<thread::JoinHandle<D>, MotionError>
where
    D: StepDriver + 'static,
{
    let handle = shutdown.register(format!("{axis}-stepper"));
    let worker = AxisWorker::new(axis, driver, commands, settings);
    spawn_thread(format!("{axis}-stepper"), move || worker.run(&handle))
        .map_err(|source| MotionError::Spawn { axis, source })
}
