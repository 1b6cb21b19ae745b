//! Circle demo: walks the rig through points on a circle without a camera.

use std::{f64::consts::PI, time::Duration};

use tracing::info;
use tracking::{MotorDispatcher, PositionCommand, ShutdownSignal};

use crate::wait::wait_interruptible;

/// Stop-flag check interval while waiting between points.
pub const DEMO_WAIT_SLICE: Duration = Duration::from_millis(1);

/// `points` positions on a circle of `radius` pixels around the origin,
/// starting one angular step past 0 and truncated toward zero.
pub fn circle_points(radius: i16, points: u8) -> Vec<PositionCommand> {
    if points == 0 {
        return Vec::new();
    }
    let da = 2.0 * PI / f64::from(points);
    let r = f64::from(radius);
    (0..points)
        .map(|i| {
            let a = da * f64::from(i) + da;
            PositionCommand::new((r * a.cos()) as i16, (r * a.sin()) as i16)
        })
        .collect()
}

/// Dispatch the circle's points one by one with `delay` between them.
///
/// On fresh axis workers the first point becomes the reference. Returns how
/// many points were dispatched before a stop was requested.
pub fn run_circle<M, H>(motor: &M, shutdown: &H, radius: i16, points: u8, delay: Duration) -> usize
where
    M: MotorDispatcher + ?Sized,
    H: ShutdownSignal + ?Sized,
{
    let mut sent = 0;
    for (i, point) in circle_points(radius, points).into_iter().enumerate() {
        if shutdown.is_stop_requested() {
            break;
        }
        info!("Point {i}: dx={}, dy={}", point.x, point.y);
        motor.dispatch_absolute_position(point);
        sent += 1;
        if wait_interruptible(delay, DEMO_WAIT_SLICE, || shutdown.is_stop_requested()) {
            break;
        }
    }
    sent
}
