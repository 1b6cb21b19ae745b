use std::{path::Path, time::Instant};

use anyhow::anyhow;
use image::{RgbImage, imageops::FilterType};
use tch::{Device, Kind, Tensor};
use tracing::trace;

use crate::{
    detection::Detection,
    detector::{DetectError, Detector, ImageView, validate_input_size},
    labels::ClassNames,
    postprocess::{MAX_DETECTIONS, NMS_IOU_THRESHOLD, decode_head, non_max_suppression},
};

/// TorchScript-backed YOLO detector.
pub struct TorchDetector {
    module: tch::CModule,
    device: Device,
    names: ClassNames,
}

impl TorchDetector {
    /// Load a TorchScript module onto `device`.
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        device: Device,
        names: ClassNames,
    ) -> Result<Self, DetectError> {
        let path = model_path.as_ref();
        let module = tch::CModule::load_on_device(path, device).map_err(|err| {
            DetectError::Backend(anyhow!("failed to load {}: {err}", path.display()))
        })?;
        Ok(Self {
            module,
            device,
            names,
        })
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Stretch the frame to `input_size` square, convert to RGB and normalise
    /// into a `[1, 3, S, S]` float tensor.
    fn to_tensor(&self, image: &ImageView<'_>, input_size: u32) -> Result<Tensor, DetectError> {
        let rgb = to_rgb(image);
        let rgb = RgbImage::from_raw(image.width as u32, image.height as u32, rgb)
            .ok_or_else(|| DetectError::InvalidInput("frame does not fit an RGB image".into()))?;
        let resized = image::imageops::resize(&rgb, input_size, input_size, FilterType::Triangle);
        let edge = input_size as i64;

        let tensor = Tensor::from_slice(resized.as_raw())
            .to_device(self.device)
            .to_kind(Kind::Float)
            .view([1, edge, edge, 3])
            .permute([0, 3, 1, 2])
            / 255.0;
        Ok(tensor)
    }
}

impl Detector for TorchDetector {
    fn detect(
        &mut self,
        image: ImageView<'_>,
        input_size: u32,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>, DetectError> {
        image.validate()?;
        validate_input_size(input_size)?;

        let input = self.to_tensor(&image, input_size)?;
        let started = Instant::now();
        let output = tch::no_grad(|| self.module.forward_ts(&[input]))
            .map_err(|err| DetectError::Backend(anyhow!("forward pass failed: {err}")))?;
        let latency_ms = started.elapsed().as_secs_f32() * 1_000.0;

        let shape = output.size();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(DetectError::MalformedOutput(format!(
                "unexpected detector output shape: {shape:?}"
            )));
        }
        let (channels, anchors) = (shape[1] as usize, shape[2] as usize);
        let flat = output
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .contiguous()
            .view([-1]);
        let values = Vec::<f32>::try_from(&flat)
            .map_err(|err| DetectError::Backend(anyhow!("failed to read output: {err}")))?;

        let scale = (
            image.width as f32 / input_size as f32,
            image.height as f32 / input_size as f32,
        );
        let candidates = decode_head(&values, channels, anchors, confidence_threshold, scale)?;
        let kept = non_max_suppression(candidates, NMS_IOU_THRESHOLD, MAX_DETECTIONS);
        trace!("{} detection(s) in {latency_ms:.2} ms", kept.len());

        Ok(kept
            .into_iter()
            .map(|c| Detection {
                bbox: c.bbox,
                score: c.score,
                class_id: c.class_id,
                class_name: self.names.name(c.class_id).into_owned(),
                latency_ms,
            })
            .collect())
    }
}

/// Copy a BGR or grayscale buffer into packed RGB.
fn to_rgb(image: &ImageView<'_>) -> Vec<u8> {
    match image.channels {
        1 => image.data.iter().flat_map(|&v| [v, v, v]).collect(),
        _ => image
            .data
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect(),
    }
}
