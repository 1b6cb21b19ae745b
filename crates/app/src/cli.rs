use std::{path::PathBuf, time::Duration};

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use motion::{StepperSettings, axis::DEFAULT_STEP_SIZE_PX, stepper::DEFAULT_POLL_INTERVAL_MS};
use tracking::{TelemetryOptions, TrackingCliArgs, TrackingConfig};

use crate::{demo, rig};

#[derive(Debug, Parser)]
#[command(name = "turret", version, about = "Vision-guided turret rig")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Capture, detect, calibrate against the operator and track.
    Track(TrackArgs),
    /// Drive the steppers around a circle without camera or detector.
    Circle(CircleArgs),
}

#[derive(Debug, Args)]
pub struct TrackArgs {
    #[command(flatten)]
    pub tracking: TrackingCliArgs,
    #[command(flatten)]
    pub steppers: StepperArgs,
}

/// Stepper knobs shared by every subcommand that drives the axes.
#[derive(Debug, Args)]
pub struct StepperArgs {
    /// Pixels covered by one motor step.
    #[arg(long = "step-size", value_name = "PX", default_value_t = DEFAULT_STEP_SIZE_PX)]
    pub step_size_px: u16,
    /// Stop-flag polling interval of idle motor workers.
    #[arg(long = "motor-poll-ms", value_name = "MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub motor_poll_ms: u64,
}

impl TryFrom<StepperArgs> for StepperSettings {
    type Error = anyhow::Error;

    fn try_from(args: StepperArgs) -> Result<Self> {
        if args.step_size_px == 0 {
            bail!("--step-size must be at least 1");
        }
        if args.motor_poll_ms == 0 {
            bail!("--motor-poll-ms must be at least 1");
        }
        Ok(Self {
            step_size_px: args.step_size_px,
            poll_interval: Duration::from_millis(args.motor_poll_ms),
            ..Self::default()
        })
    }
}

#[derive(Debug, Args)]
pub struct CircleArgs {
    /// Circle radius in pixels.
    #[arg(long, default_value_t = 50)]
    pub radius: i16,
    /// Number of points on the circle.
    #[arg(long, default_value_t = 36)]
    pub points: u8,
    /// Pause between points.
    #[arg(long = "delay-ms", default_value_t = 200)]
    pub delay_ms: u64,
    #[command(flatten)]
    pub steppers: StepperArgs,
    /// Enable verbose logging.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
}

/// Validated circle demo settings.
#[derive(Clone, Debug)]
pub struct CircleConfig {
    pub radius: i16,
    pub points: u8,
    pub delay: Duration,
    pub steppers: StepperSettings,
    pub verbose: bool,
    pub telemetry: TelemetryOptions,
}

impl TryFrom<CircleArgs> for CircleConfig {
    type Error = anyhow::Error;

    fn try_from(args: CircleArgs) -> Result<Self> {
        if args.radius <= 0 {
            bail!("--radius must be positive");
        }
        if args.points == 0 {
            bail!("--points must be at least 1");
        }
        Ok(Self {
            radius: args.radius,
            points: args.points,
            delay: Duration::from_millis(args.delay_ms),
            steppers: StepperSettings::try_from(args.steppers)?,
            verbose: args.verbose,
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
            },
        })
    }
}

pub fn handle_command(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Track(args) => rig::run(
            TrackingConfig::try_from(args.tracking)?,
            StepperSettings::try_from(args.steppers)?,
        ),
        Command::Circle(args) => demo::run(CircleConfig::try_from(args)?),
    }
}
