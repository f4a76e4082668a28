//! Pipeline controller tying together the source, worker pool, reorder buffer
//! and sink.
//!
//! The controller owns the calling thread: it reads frames, enqueues them,
//! drains results and writes them to the sink. Workers are the only other
//! threads involved. Whatever happens, every worker is joined before
//! [`Pipeline::run`] returns.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam_channel::Receiver;
use tracing::{debug, error, info, warn};

use crate::{
    Cancellation, EndReason, FrameReader, IntakeSender, LatestCell, Outcome, PipelineError,
    Reassembler, ResultItem, ResultSink, Transform, TransformFactory, WorkSource, WorkerExit,
    WorkerPool, intake_queue, output_queue,
};

/// Frames between debug heartbeats.
const HEARTBEAT_FRAMES: u64 = 30;

/// When results are pulled off the output queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DrainMode {
    /// Drain while frames are still being enqueued and hand every contiguous
    /// run of results to the sink as soon as it is complete.
    #[default]
    Streaming,
    /// Leave results on the output queue until the source is exhausted, then
    /// collect everything and write it in one ordered pass.
    Deferred,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Number of worker threads, at least 1.
    pub workers: usize,
    pub drain: DrainMode,
    /// Treat a reader error as a failure instead of end-of-stream.
    pub strict_input: bool,
}

impl PipelineConfig {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            drain: DrainMode::default(),
            strict_input: false,
        }
    }

    pub fn with_drain(mut self, drain: DrainMode) -> Self {
        self.drain = drain;
        self
    }

    pub fn with_strict_input(mut self, strict: bool) -> Self {
        self.strict_input = strict;
        self
    }
}

/// Lifecycle of a [`Pipeline`]. `Finalized` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Finalized,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Finalized | PipelineState::Failed)
    }

    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Idle, Running) | (Running, Draining) | (Draining, Finalized) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Snapshot published while a run is in progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    /// Frames read from the source and enqueued.
    pub read: u64,
    /// Results written to the sink.
    pub emitted: u64,
    /// Of the emitted results, how many were failure markers.
    pub failed: u64,
    /// Results waiting in the reorder buffer for an earlier frame.
    pub pending: usize,
}

/// Summary of a finalized run.
#[derive(Clone, Debug)]
pub struct PipelineReport {
    /// Frames read and written.
    pub frames: u64,
    /// Frames written as failure markers.
    pub failed: u64,
    pub end: EndReason,
    pub workers: Vec<WorkerExit>,
    pub elapsed: Duration,
}

/// Single-use pipeline controller.
pub struct Pipeline {
    config: PipelineConfig,
    cancel: Cancellation,
    progress: Option<Arc<LatestCell<Progress>>>,
    state: PipelineState,
}

struct RunState<Rd: FrameReader, R> {
    source: WorkSource<Rd>,
    reassembler: Reassembler<R>,
    emitted: u64,
    failed: u64,
}

impl<Rd: FrameReader, R> RunState<Rd, R> {
    fn progress(&self) -> Progress {
        Progress {
            read: self.source.produced(),
            emitted: self.emitted,
            failed: self.failed,
            pending: self.reassembler.pending(),
        }
    }

    fn emit<S>(&mut self, sink: &mut S, index: u64, outcome: Outcome<R>) -> Result<(), PipelineError>
    where
        S: ResultSink<R> + ?Sized,
    {
        if let Err(failure) = &outcome {
            debug!(frame = index, "writing failure marker: {failure}");
            self.failed += 1;
        }
        sink.write(index, outcome)
            .map_err(|source| PipelineError::Sink { index, source })?;
        self.emitted += 1;
        metrics::counter!("framepool_frames_emitted_total").increment(1);
        Ok(())
    }

    fn emit_ready<S>(&mut self, sink: &mut S) -> Result<(), PipelineError>
    where
        S: ResultSink<R> + ?Sized,
    {
        while let Some((index, outcome)) = self.reassembler.pop_ready() {
            self.emit(sink, index, outcome)?;
        }
        metrics::gauge!("framepool_reorder_pending").set(self.reassembler.pending() as f64);
        Ok(())
    }
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            cancel: Cancellation::new(),
            progress: None,
            state: PipelineState::Idle,
        }
    }

    /// Use an externally owned cancellation handle (e.g. wired to Ctrl+C).
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Publish [`Progress`] snapshots into `cell` while running.
    pub fn with_progress(mut self, cell: Arc<LatestCell<Progress>>) -> Self {
        self.progress = Some(cell);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn cancellation(&self) -> Cancellation {
        self.cancel.clone()
    }

    /// Process every frame from `reader` through per-worker transforms built by
    /// `factory`, writing results to `sink` in input order.
    pub fn run<Rd, F, S>(
        &mut self,
        reader: Rd,
        factory: F,
        sink: &mut S,
    ) -> Result<PipelineReport, PipelineError>
    where
        Rd: FrameReader,
        F: TransformFactory<Rd::Payload>,
        S: ResultSink<<F::Transform as Transform<Rd::Payload>>::Output> + ?Sized,
    {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::NotIdle(self.state));
        }

        let span = tracing::info_span!(
            "pipeline.run",
            workers = self.config.workers,
            drain = ?self.config.drain,
            strict = self.config.strict_input
        );
        let _span_guard = span.enter();
        let started = Instant::now();

        match self.execute(reader, factory, sink, started) {
            Ok(report) => {
                info!(
                    frames = report.frames,
                    failed = report.failed,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "pipeline finalized"
                );
                Ok(report)
            }
            Err(err) => {
                self.transition(PipelineState::Failed);
                error!("pipeline failed: {err}");
                Err(err)
            }
        }
    }

    fn execute<Rd, F, S>(
        &mut self,
        reader: Rd,
        factory: F,
        sink: &mut S,
        started: Instant,
    ) -> Result<PipelineReport, PipelineError>
    where
        Rd: FrameReader,
        F: TransformFactory<Rd::Payload>,
        S: ResultSink<<F::Transform as Transform<Rd::Payload>>::Output> + ?Sized,
    {
        let (intake, intake_rx) = intake_queue::<Rd::Payload>();
        let (output_tx, output_rx) =
            output_queue::<<F::Transform as Transform<Rd::Payload>>::Output>();
        let pool = WorkerPool::start(
            self.config.workers,
            factory,
            &intake,
            &intake_rx,
            &output_tx,
            &self.cancel,
        )?;
        // Workers hold the only remaining clones: once they all exit the
        // output queue disconnects.
        drop(intake_rx);
        drop(output_tx);
        self.transition(PipelineState::Running);

        let mut run = RunState {
            source: WorkSource::new(reader),
            reassembler: Reassembler::new(),
            emitted: 0,
            failed: 0,
        };

        let fed = self.feed(&mut run, &intake, &output_rx, sink);
        intake.terminate(pool.len());
        let drained = fed.and_then(|()| {
            self.transition(PipelineState::Draining);
            self.drain(&mut run, &output_rx, sink)
        });
        if drained.is_err() {
            // Stop the remaining workers early; they are joined below either way.
            self.cancel.cancel();
        }
        let joined = pool.join();
        drop(output_rx);

        let workers = match (drained, joined) {
            // Every worker died, so the intake lost its receivers; the crash is the cause.
            (Err(PipelineError::IntakeClosed), Err(panicked @ PipelineError::WorkerPanicked { .. })) => {
                return Err(panicked);
            }
            (Err(err), _) => return Err(err),
            (Ok(()), joined) => joined?,
        };

        let end = run.source.end_reason().cloned();
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let end = end.unwrap_or(EndReason::Exhausted);
        if let EndReason::Truncated(reason) = &end {
            if self.config.strict_input {
                return Err(PipelineError::SourceTruncated {
                    frames: run.source.produced(),
                    reason: reason.clone(),
                });
            }
        }

        let expected = run.source.produced();
        let remaining = std::mem::take(&mut run.reassembler).finalize(expected)?;
        for (index, outcome) in remaining {
            run.emit(sink, index, outcome)?;
        }
        sink.finish().map_err(|source| PipelineError::SinkFinish {
            frames: run.emitted,
            source,
        })?;
        self.publish(&run);
        self.transition(PipelineState::Finalized);

        Ok(PipelineReport {
            frames: expected,
            failed: run.failed,
            end,
            workers,
            elapsed: started.elapsed(),
        })
    }

    /// Running: pull the source dry, enqueueing every frame.
    fn feed<Rd, R, S>(
        &self,
        run: &mut RunState<Rd, R>,
        intake: &IntakeSender<Rd::Payload>,
        output: &Receiver<ResultItem<R>>,
        sink: &mut S,
    ) -> Result<(), PipelineError>
    where
        Rd: FrameReader,
        S: ResultSink<R> + ?Sized,
    {
        let enqueued = metrics::counter!("framepool_frames_enqueued_total");
        loop {
            if self.cancel.is_cancelled() {
                warn!(
                    frames = run.source.produced(),
                    "cancellation requested, no further frames will be read"
                );
                return Ok(());
            }
            let Some(item) = run.source.next() else {
                return Ok(());
            };
            let index = item.index;
            intake.push(item)?;
            enqueued.increment(1);

            if index > 0 && index % HEARTBEAT_FRAMES == 0 {
                debug!(
                    frame = index,
                    queued = intake.len(),
                    emitted = run.emitted,
                    pending = run.reassembler.pending(),
                    "feed heartbeat"
                );
            }

            if self.config.drain == DrainMode::Streaming {
                while let Ok(result) = output.try_recv() {
                    run.reassembler.accept(result)?;
                }
                run.emit_ready(sink)?;
            }
            self.publish(run);
        }
    }

    /// Draining: collect results until every worker has dropped its output
    /// sender.
    fn drain<Rd, R, S>(
        &self,
        run: &mut RunState<Rd, R>,
        output: &Receiver<ResultItem<R>>,
        sink: &mut S,
    ) -> Result<(), PipelineError>
    where
        Rd: FrameReader,
        S: ResultSink<R> + ?Sized,
    {
        for result in output.iter() {
            run.reassembler.accept(result)?;
            if self.config.drain == DrainMode::Streaming {
                run.emit_ready(sink)?;
            }
            self.publish(run);
        }
        Ok(())
    }

    fn publish<Rd: FrameReader, R>(&self, run: &RunState<Rd, R>) {
        if let Some(cell) = &self.progress {
            cell.publish(run.progress());
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid pipeline transition {:?} -> {next:?}",
            self.state
        );
        debug!(from = ?self.state, to = ?next, "pipeline state change");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_transitions() {
        use PipelineState::*;
        assert!(Idle.can_transition_to(Running));
        assert!(Running.can_transition_to(Draining));
        assert!(Draining.can_transition_to(Finalized));
        assert!(Idle.can_transition_to(Failed));
        assert!(Draining.can_transition_to(Failed));
        assert!(!Finalized.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Idle.can_transition_to(Draining));
        assert!(!Running.can_transition_to(Finalized));
    }
}
