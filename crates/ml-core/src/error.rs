use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("frame #{sequence} holds {actual} bytes, {width}x{height} BGR needs {expected}")]
    BadBuffer {
        sequence: u64,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("blur sigma must be a positive number, got {0}")]
    InvalidSigma(f32),
    #[error("detection needs a model path (--model)")]
    MissingModel,
    #[error("failed to load model {path:?}")]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("detection is not available: ml-core was built without the `with-tch` feature")]
    DetectorUnavailable,
}
