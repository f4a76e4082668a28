//! Per-frame transforms run by the worker pool.
//!
//! [`TransformSpec`] describes the operation; each worker builds its own
//! [`FrameTransform`] from it. Detection needs the `with-tch` feature, which
//! pulls in `tch` and a libtorch install.

pub mod draw;
pub mod error;
pub mod ops;
pub mod transform;

#[cfg(feature = "with-tch")]
pub mod detector;

pub use error::TransformError;
pub use transform::{DetectorConfig, FrameTransform, TransformKind, TransformSpec};

#[cfg(feature = "with-tch")]
pub use detector::{Detection, Detector};
#[cfg(feature = "with-tch")]
pub use tch;
