use std::time::Duration;

use motion::{
    Axis, LogDriver, StepDirection, StepPlan, StepperSettings, run_circle, spawn_steppers,
};
use tracking::{MotorDispatcher, PositionCommand, Shutdown};

fn rendezvous() -> StepperSettings {
    StepperSettings {
        poll_interval: Duration::from_millis(5),
        queue_capacity: 0,
        ..StepperSettings::default()
    }
}

#[test]
fn calibration_then_tracking_moves_by_delta() {
    let shutdown = Shutdown::new();
    let (dispatcher, steppers) = spawn_steppers(
        &shutdown,
        rendezvous(),
        LogDriver::new(Axis::X),
        LogDriver::new(Axis::Y),
    )
    .unwrap();

    dispatcher.dispatch_absolute_position(PositionCommand::new(20, 30));
    dispatcher.dispatch_absolute_position(PositionCommand::new(110, 60));

    shutdown.request_stop();
    assert!(shutdown.wait_for_exit(Duration::from_secs(5)));
    let (x, y) = steppers.join().unwrap();

    assert_eq!(
        x.executed(),
        &[StepPlan {
            direction: StepDirection::Positive,
            steps: 45
        }]
    );
    assert_eq!(
        y.executed(),
        &[StepPlan {
            direction: StepDirection::Positive,
            steps: 15
        }]
    );
    assert!(!x.is_enabled() && !y.is_enabled());
}

#[test]
fn idle_workers_acknowledge_stop() {
    let shutdown = Shutdown::new();
    let (_dispatcher, steppers) = spawn_steppers(
        &shutdown,
        rendezvous(),
        LogDriver::new(Axis::X),
        LogDriver::new(Axis::Y),
    )
    .unwrap();
    assert_eq!(shutdown.registered(), 2);

    shutdown.request_stop();
    assert!(shutdown.wait_for_exit(Duration::from_secs(5)));
    let (x, y) = steppers.join().unwrap();
    assert!(x.executed().is_empty() && y.executed().is_empty());
}

#[test]
fn circle_demo_returns_to_its_start() {
    let shutdown = Shutdown::new();
    let (dispatcher, steppers) = spawn_steppers(
        &shutdown,
        rendezvous(),
        LogDriver::new(Axis::X),
        LogDriver::new(Axis::Y),
    )
    .unwrap();

    let sent = run_circle(&dispatcher, &shutdown, 100, 4, Duration::from_millis(1));
    assert_eq!(sent, 4);

    shutdown.request_stop();
    assert!(shutdown.wait_for_exit(Duration::from_secs(5)));
    let (x, y) = steppers.join().unwrap();

    // x: 0 -> -100 -> 0 -> 100, y: 100 -> 0 -> -100 -> 0
    assert_eq!(x.position_steps(), 50);
    assert_eq!(y.position_steps(), -50);
    assert_eq!(x.executed().len(), 3);
}

#[test]
fn dispatch_after_workers_exit_is_dropped() {
    let shutdown = Shutdown::new();
    let (dispatcher, steppers) = spawn_steppers(
        &shutdown,
        rendezvous(),
        LogDriver::new(Axis::X),
        LogDriver::new(Axis::Y),
    )
    .unwrap();
    shutdown.request_stop();
    steppers.join().unwrap();

    // Receivers are gone, so this must not block.
    dispatcher.dispatch_absolute_position(PositionCommand::new(1, 1));
    assert!(shutdown.all_exited());
}
