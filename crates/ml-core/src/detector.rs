use thiserror::Error;

use crate::detection::Detection;

/// Borrowed interleaved image handed to a detector.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    pub data: &'a [u8],
    pub width: i32,
    pub height: i32,
    pub channels: i32,
}

impl<'a> ImageView<'a> {
    pub fn new(data: &'a [u8], width: i32, height: i32, channels: i32) -> Self {
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    /// Reject buffers whose length disagrees with the declared geometry.
    pub fn validate(&self) -> Result<(), DetectError> {
        if self.width <= 0 || self.height <= 0 {
            return Err(DetectError::InvalidInput(format!(
                "non-positive image size {}x{}",
                self.width, self.height
            )));
        }
        if !matches!(self.channels, 1 | 3) {
            return Err(DetectError::InvalidInput(format!(
                "unsupported channel count {}",
                self.channels
            )));
        }
        let expected = (self.width as usize) * (self.height as usize) * (self.channels as usize);
        if self.data.len() != expected {
            return Err(DetectError::InvalidInput(format!(
                "unexpected frame buffer size: got {} bytes, expected {}",
                self.data.len(),
                expected
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("invalid input image: {0}")]
    InvalidInput(String),
    #[error("detector input size {0} must be a positive multiple of 32")]
    InputSize(u32),
    #[error("malformed detector output: {0}")]
    MalformedOutput(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Object detection capability: image in, ordered detections out.
///
/// Detections are returned in the order the model ranks them and every
/// detection carries the latency of the call that produced it.
pub trait Detector {
    fn detect(
        &mut self,
        image: ImageView<'_>,
        input_size: u32,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>, DetectError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(
        &mut self,
        image: ImageView<'_>,
        input_size: u32,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>, DetectError> {
        (**self).detect(image, input_size, confidence_threshold)
    }
}

/// Shared check for the square model input edge.
pub fn validate_input_size(input_size: u32) -> Result<(), DetectError> {
    if input_size == 0 || input_size % 32 != 0 {
        return Err(DetectError::InputSize(input_size));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_rejects_mismatched_buffer() {
        let data = vec![0u8; 10];
        let err = ImageView::new(&data, 4, 2, 3).validate().unwrap_err();
        assert!(matches!(err, DetectError::InvalidInput(_)));
        assert!(ImageView::new(&data[..8], 4, 2, 1).validate().is_ok());
    }

    #[test]
    fn input_size_must_be_aligned() {
        assert!(validate_input_size(224).is_ok());
        assert!(matches!(
            validate_input_size(0),
            Err(DetectError::InputSize(0))
        ));
        assert!(validate_input_size(100).is_err());
    }
}
