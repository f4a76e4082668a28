use std::{convert::TryFrom, path::Path};

use anyhow::{Result, bail};
use image::{ImageBuffer, Rgb, imageops};
use tch::{Device, Kind, Tensor};
use video_ingest::Frame;

use crate::draw::{Canvas, GLYPH_HEIGHT, GREEN};

/// Upper bound on boxes kept per frame.
const MAX_DETECTIONS: usize = 512;

/// Single detection in frame pixel coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    /// Centre x, centre y, width, height.
    pub bbox_xywh: [f32; 4],
    pub score: f32,
    pub class_id: i64,
}

impl Detection {
    /// Left, top, right, bottom.
    pub fn corners(&self) -> [f32; 4] {
        let [cx, cy, w, h] = self.bbox_xywh;
        [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
    }
}

/// TorchScript detector producing `[1, C, N]` predictions with rows
/// `x, y, w, h, conf[, class]` in model input coordinates.
pub struct Detector {
    module: tch::CModule,
    device: Device,
    input_size: (i64, i64),
    confidence_threshold: f32,
}

impl Detector {
    pub fn new<P: AsRef<Path>>(model_path: P, device: Device, input_size: (i64, i64)) -> Result<Self> {
        let module = tch::CModule::load_on_device(model_path, device)?;
        Ok(Self {
            module,
            device,
            input_size,
            confidence_threshold: 0.25,
        })
    }

    pub fn with_confidence_threshold(mut self, confidence: f32) -> Self {
        self.confidence_threshold = confidence;
        self
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Resize a BGR frame to the model input and convert to a normalised
    /// `[1, 3, H, W]` RGB tensor.
    pub fn frame_to_tensor(&self, frame: &Frame) -> Result<Tensor> {
        let (in_w, in_h) = self.input_size;
        let image = ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(frame.width, frame.height, &frame.data[..])
            .ok_or_else(|| anyhow::anyhow!("frame #{} buffer does not match its size", frame.sequence))?;
        let resized = imageops::resize(&image, in_w as u32, in_h as u32, imageops::FilterType::Triangle);

        let tensor = Tensor::from_slice(resized.as_raw().as_slice())
            .to_device(self.device)
            .to_kind(Kind::Float)
            .view([1, in_h, in_w, 3])
            .permute([0, 3, 1, 2])
            .flip([1])
            / 255.0;
        Ok(tensor)
    }

    /// Run the model and keep predictions above the confidence threshold,
    /// scaled back to `frame_size`.
    pub fn infer(&self, input: &Tensor, frame_size: (u32, u32)) -> Result<Vec<Detection>> {
        let output = self.module.forward_ts(&[input])?;
        let shape = output.size();
        if shape.len() != 3 {
            bail!("unexpected detector output shape: {shape:?}");
        }
        if shape[0] != 1 {
            bail!("detector expected batch=1 but received {}", shape[0]);
        }
        if shape[1] < 5 {
            bail!(
                "detector output requires at least 5 channels (x,y,w,h,conf), got {}",
                shape[1]
            );
        }

        let preds = output
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .squeeze_dim(0)
            .permute([1, 0])
            .contiguous();
        let rows = Vec::<Vec<f32>>::try_from(&preds)?;

        let sx = frame_size.0 as f32 / self.input_size.0 as f32;
        let sy = frame_size.1 as f32 / self.input_size.1 as f32;
        let detections = rows
            .into_iter()
            .filter(|row| row.len() >= 5 && row[4] >= self.confidence_threshold)
            .take(MAX_DETECTIONS)
            .map(|row| Detection {
                bbox_xywh: [row[0] * sx, row[1] * sy, row[2] * sx, row[3] * sy],
                score: row[4],
                class_id: row.get(5).map_or(0, |&c| c as i64),
            })
            .collect();
        Ok(detections)
    }

    /// Detect and draw boxes with `class score%` labels onto the frame.
    pub fn annotate(&self, frame: &mut Frame) -> Result<usize> {
        let input = self.frame_to_tensor(frame)?;
        let detections = tch::no_grad(|| self.infer(&input, (frame.width, frame.height)))?;
        let (width, height) = (frame.width, frame.height);
        let Some(mut canvas) = Canvas::new(&mut frame.data, width, height) else {
            bail!("frame #{} buffer does not match its size", frame.sequence);
        };
        for detection in &detections {
            let corners = detection.corners().map(|v| v.round() as i32);
            let Some([l, t, r, b]) = canvas.clamp_box(corners) else {
                continue;
            };
            canvas.outline(l, t, r, b, GREEN);
            let label = format!("{} {:.0}%", detection.class_id, detection.score * 100.0);
            canvas.label(l + 1, (t - GLYPH_HEIGHT - 2).max(1), &label, GREEN);
        }
        Ok(detections.len())
    }
}
