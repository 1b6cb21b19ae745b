//! Detection capability consumed by the tracking loop.
//!
//! The [`Detector`] trait is the only thing the rest of the workspace relies
//! on. Enable the `with-tch` feature to pull in the `tch` crate and the
//! TorchScript-backed [`TorchDetector`].

pub mod detection;
pub mod detector;
pub mod labels;
pub mod postprocess;
#[cfg(feature = "with-tch")]
mod torch;

pub use detection::{BoundingBox, Detection};
pub use detector::{DetectError, Detector, ImageView};
pub use labels::ClassNames;
#[cfg(feature = "with-tch")]
pub use tch;
#[cfg(feature = "with-tch")]
pub use torch::TorchDetector;
