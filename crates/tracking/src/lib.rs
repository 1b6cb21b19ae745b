//! Frame hand-off, shutdown handshake and the calibrate-then-track control
//! loop of the turret rig.

pub mod pipeline;

pub use pipeline::*;
