use std::{fmt, sync::Arc};

/// Integer pixel position in frame coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pixel {
    pub x: i16,
    pub y: i16,
}

impl Pixel {
    pub fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Pixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Absolute position sent to the motors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PositionCommand {
    pub x: i16,
    pub y: i16,
}

impl PositionCommand {
    pub fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

impl From<Pixel> for PositionCommand {
    fn from(pixel: Pixel) -> Self {
        Self::new(pixel.x, pixel.y)
    }
}

/// Motor boundary. Fire-and-forget: no acknowledgment comes back.
pub trait MotorDispatcher {
    fn dispatch_absolute_position(&self, command: PositionCommand);
}

impl<T: MotorDispatcher + ?Sized> MotorDispatcher for &T {
    fn dispatch_absolute_position(&self, command: PositionCommand) {
        (**self).dispatch_absolute_position(command)
    }
}

impl<T: MotorDispatcher + ?Sized> MotorDispatcher for Arc<T> {
    fn dispatch_absolute_position(&self, command: PositionCommand) {
        (**self).dispatch_absolute_position(command)
    }
}

impl<T: MotorDispatcher + ?Sized> MotorDispatcher for Box<T> {
    fn dispatch_absolute_position(&self, command: PositionCommand) {
        (**self).dispatch_absolute_position(command)
    }
}
