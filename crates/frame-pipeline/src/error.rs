use thiserror::Error;

/// Structural failures that abort a pipeline run.
///
/// Per-item transform errors are not represented here; they travel through the
/// pipeline as [`ItemFailure`](crate::ItemFailure) entries at their index.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("worker pool size must be at least 1 (got {0})")]
    InvalidWorkerCount(usize),
    #[error("failed to spawn worker thread #{worker}")]
    Spawn {
        worker: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("worker #{worker} failed to build its transform")]
    WorkerInit {
        worker: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("a worker exited before reporting initialisation")]
    WorkerLost,
    #[error("worker #{worker} panicked")]
    WorkerPanicked { worker: usize },
    #[error("intake queue is closed; no worker is accepting frames")]
    IntakeClosed,
    #[error("result for frame #{0} arrived twice")]
    DuplicateIndex(u64),
    #[error("result for frame #{index} is outside the expected range 0..{expected}")]
    UnexpectedIndex { index: u64, expected: u64 },
    #[error("result for frame #{0} never arrived")]
    MissingIndex(u64),
    #[error("sink rejected frame #{index}")]
    Sink {
        index: u64,
        #[source]
        source: anyhow::Error,
    },
    #[error("sink failed to finish after {frames} frame(s)")]
    SinkFinish {
        frames: u64,
        #[source]
        source: anyhow::Error,
    },
    #[error("input ended early after {frames} frame(s): {reason}")]
    SourceTruncated { frames: u64, reason: String },
    #[error("pipeline was cancelled")]
    Cancelled,
    #[error("pipeline already ran (state: {0:?})")]
    NotIdle(crate::PipelineState),
}
