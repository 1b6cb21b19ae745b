//! `turret circle`: exercise the steppers without camera or detector.

use std::time::Duration;

use anyhow::{Context, Result};
use motion::{Axis, LogDriver, run_circle, spawn_steppers};
use tracing::{debug, info, warn};
use tracking::{Shutdown, pipeline::telemetry};

use crate::{cli::CircleConfig, signals::install_ctrlc};

const EXIT_TIMEOUT: Duration = Duration::from_secs(2);

pub fn run(config: CircleConfig) -> Result<()> {
    let _telemetry_guard = telemetry::enter_runtime(&config.telemetry, config.verbose);
    if let Err(err) = telemetry::init_metrics_recorder() {
        warn!("metrics disabled: {err}");
    }
    let _span = tracing::info_span!(
        "turret.circle",
        radius = config.radius,
        points = config.points
    )
    .entered();

    let shutdown = Shutdown::new();
    install_ctrlc(&shutdown);

    let (dispatcher, steppers) = spawn_steppers(
        &shutdown,
        config.steppers,
        LogDriver::new(Axis::X),
        LogDriver::new(Axis::Y),
    )
    .context("failed to start stepper workers")?;

    let sent = run_circle(
        &dispatcher,
        &shutdown,
        config.radius,
        config.points,
        config.delay,
    );
    info!("Circle demo dispatched {sent}/{} point(s)", config.points);

    shutdown.request_stop();
    if !shutdown.wait_for_exit(EXIT_TIMEOUT) {
        warn!(
            "Workers still running after {:?}: {:?}",
            EXIT_TIMEOUT,
            shutdown.pending_workers()
        );
    }
    let (x, y) = steppers.join()?;
    info!(
        "Final position: x={} step(s), y={} step(s)",
        x.position_steps(),
        y.position_steps()
    );
    if let Some(snapshot) = telemetry::render_metrics() {
        debug!("metrics snapshot:\n{snapshot}");
    }
    Ok(())
}
