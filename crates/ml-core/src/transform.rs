use std::{fmt, path::PathBuf, str::FromStr};

use frame_pipeline::Transform;
use tracing::debug;
use video_ingest::Frame;

use crate::{TransformError, ops};

/// Which operation each worker applies, plus its parameters.
///
/// Cheap to clone and shareable across threads; every worker turns it into its
/// own [`FrameTransform`] with [`build`](Self::build).
#[derive(Clone, Debug, PartialEq)]
pub enum TransformSpec {
    Passthrough,
    Grayscale,
    Invert,
    Blur { sigma: f32 },
    Stamp,
    Detect(DetectorConfig),
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectorConfig {
    pub model: PathBuf,
    /// Run inference on the CPU even when CUDA is available.
    pub cpu: bool,
    /// Model input width and height.
    pub input_size: (i64, i64),
    pub confidence: f32,
}

impl DetectorConfig {
    pub fn new(model: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            cpu: false,
            input_size: (640, 640),
            confidence: 0.25,
        }
    }
}

/// Operation names accepted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformKind {
    Passthrough,
    Grayscale,
    Invert,
    Blur,
    Stamp,
    Detect,
}

impl TransformKind {
    pub const ALL: [TransformKind; 6] = [
        TransformKind::Passthrough,
        TransformKind::Grayscale,
        TransformKind::Invert,
        TransformKind::Blur,
        TransformKind::Stamp,
        TransformKind::Detect,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TransformKind::Passthrough => "passthrough",
            TransformKind::Grayscale => "grayscale",
            TransformKind::Invert => "invert",
            TransformKind::Blur => "blur",
            TransformKind::Stamp => "stamp",
            TransformKind::Detect => "detect",
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown transform {s:?}, expected one of {}", names.join(", "))
            })
    }
}

impl TransformSpec {
    pub fn kind(&self) -> TransformKind {
        match self {
            TransformSpec::Passthrough => TransformKind::Passthrough,
            TransformSpec::Grayscale => TransformKind::Grayscale,
            TransformSpec::Invert => TransformKind::Invert,
            TransformSpec::Blur { .. } => TransformKind::Blur,
            TransformSpec::Stamp => TransformKind::Stamp,
            TransformSpec::Detect(_) => TransformKind::Detect,
        }
    }

    /// Check parameters without building anything.
    pub fn validate(&self) -> Result<(), TransformError> {
        match self {
            TransformSpec::Blur { sigma } if !(sigma.is_finite() && *sigma > 0.0) => {
                Err(TransformError::InvalidSigma(*sigma))
            }
            TransformSpec::Detect(config) if config.model.as_os_str().is_empty() => {
                Err(TransformError::MissingModel)
            }
            #[cfg(not(feature = "with-tch"))]
            TransformSpec::Detect(_) => Err(TransformError::DetectorUnavailable),
            _ => Ok(()),
        }
    }

    /// Build the transform owned by `worker`. Detection loads its own copy of
    /// the model here, on the worker's thread.
    pub fn build(&self, worker: usize) -> Result<FrameTransform, TransformError> {
        self.validate()?;
        let op = match self {
            TransformSpec::Passthrough => Op::Passthrough,
            TransformSpec::Grayscale => Op::Grayscale,
            TransformSpec::Invert => Op::Invert,
            TransformSpec::Blur { sigma } => Op::Blur(*sigma),
            TransformSpec::Stamp => Op::Stamp,
            #[cfg(feature = "with-tch")]
            TransformSpec::Detect(config) => Op::Detect(Box::new(load_detector(config, worker)?)),
            #[cfg(not(feature = "with-tch"))]
            TransformSpec::Detect(_) => return Err(TransformError::DetectorUnavailable),
        };
        debug!(worker, transform = %self.kind(), "transform ready");
        Ok(FrameTransform { worker, op })
    }
}

#[cfg(feature = "with-tch")]
fn load_detector(config: &DetectorConfig, worker: usize) -> Result<crate::Detector, TransformError> {
    let device = if config.cpu {
        tch::Device::Cpu
    } else {
        tch::Device::cuda_if_available()
    };
    let detector = crate::Detector::new(&config.model, device, config.input_size)
        .map_err(|source| TransformError::ModelLoad {
            path: config.model.clone(),
            source,
        })?
        .with_confidence_threshold(config.confidence);
    tracing::info!(worker, device = ?detector.device(), model = %config.model.display(), "detector loaded");
    Ok(detector)
}

enum Op {
    Passthrough,
    Grayscale,
    Invert,
    Blur(f32),
    Stamp,
    #[cfg(feature = "with-tch")]
    Detect(Box<crate::Detector>),
}

/// Per-worker frame transform.
pub struct FrameTransform {
    worker: usize,
    op: Op,
}

impl FrameTransform {
    pub fn worker(&self) -> usize {
        self.worker
    }
}

impl Transform<Frame> for FrameTransform {
    type Output = Frame;

    fn apply(&mut self, mut frame: Frame) -> anyhow::Result<Frame> {
        ops::check_frame(&frame)?;
        match &self.op {
            Op::Passthrough => {}
            Op::Grayscale => ops::grayscale(&mut frame),
            Op::Invert => ops::invert(&mut frame),
            Op::Blur(sigma) => ops::blur(&mut frame, *sigma),
            Op::Stamp => ops::stamp(&mut frame),
            #[cfg(feature = "with-tch")]
            Op::Detect(detector) => {
                let found = detector.annotate(&mut frame)?;
                tracing::trace!(worker = self.worker, frame = frame.sequence, found, "detections drawn");
            }
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use video_ingest::FrameSize;

    use super::*;

    #[test]
    fn parses_kind_names() {
        assert_eq!("Blur".parse::<TransformKind>().unwrap(), TransformKind::Blur);
        let err = "sharpen".parse::<TransformKind>().unwrap_err();
        assert!(err.contains("passthrough, grayscale"));
    }

    #[test]
    fn passthrough_returns_frame_unchanged() {
        let frame = Frame::black(FrameSize::new(4, 4)).with_sequence(9);
        let mut transform = TransformSpec::Passthrough.build(0).unwrap();
        assert_eq!(transform.apply(frame.clone()).unwrap(), frame);
    }

    #[test]
    fn malformed_frame_is_an_item_error() {
        let mut frame = Frame::black(FrameSize::new(4, 4));
        frame.data.pop();
        let mut transform = TransformSpec::Invert.build(1).unwrap();
        let err = transform.apply(frame).unwrap_err();
        assert!(err.downcast_ref::<TransformError>().is_some());
    }

    #[test]
    fn invalid_blur_is_rejected_at_build() {
        assert!(matches!(
            TransformSpec::Blur { sigma: 0.0 }.build(0),
            Err(TransformError::InvalidSigma(_))
        ));
    }

    #[cfg(not(feature = "with-tch"))]
    #[test]
    fn detect_without_torch_fails_init() {
        let spec = TransformSpec::Detect(DetectorConfig::new("yolov8n.torchscript"));
        assert!(matches!(spec.build(0), Err(TransformError::DetectorUnavailable)));
    }
}
