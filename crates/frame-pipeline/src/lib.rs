//! Ordered fan-out / fan-in pipeline for expensive per-frame transforms.
//!
//! Frames are pulled from a [`FrameReader`], tagged with a monotonically
//! increasing index and pushed onto an unbounded intake queue. A fixed pool of
//! worker threads, each owning a private transform built once by a
//! [`TransformFactory`], pulls from that queue and pushes indexed results onto
//! an output queue. The [`Reassembler`] restores input order before results
//! reach the [`ResultSink`].
//!
//! ```text
//! FrameReader → WorkSource → intake ─┬─ worker 0 ─┐
//!                                    ├─ worker 1 ─┼─ output → Reassembler → ResultSink
//!                                    └─ worker N ─┘
//! ```
//!
//! The module is split into focused submodules:
//! - `item`: indexed work/result records and the per-item failure marker.
//! - `queue`: intake/output channels and the tagged termination message.
//! - `source`: the indexing `WorkSource` over a `FrameReader`.
//! - `transform`: per-worker transform and factory seams.
//! - `pool`: worker threads, init hand-shake, termination and join.
//! - `reassembly`: index-keyed reorder buffer.
//! - `controller`: the `Pipeline` state machine wiring everything together.
//! - `latest`: single-slot overwrite cell used for progress sampling.

pub mod controller;
pub mod error;
pub mod item;
pub mod latest;
pub mod pool;
pub mod queue;
pub mod reassembly;
pub mod sink;
pub mod source;
pub mod transform;

pub use controller::{DrainMode, Pipeline, PipelineConfig, PipelineReport, PipelineState, Progress};
pub use error::PipelineError;
pub use item::{ItemFailure, Outcome, ResultItem, WorkItem};
pub use latest::LatestCell;
pub use pool::{Cancellation, ExitReason, WorkerExit, WorkerPool, spawn_thread};
pub use queue::{IntakeSender, Message, intake_queue, output_queue};
pub use reassembly::Reassembler;
pub use sink::ResultSink;
pub use source::{EndReason, FrameReader, IterReader, WorkSource};
pub use transform::{FnTransform, Transform, TransformFactory, from_fn};
