//! Fixed-size worker pool.
//!
//! Every worker thread builds its own transform through the shared factory,
//! reports the outcome over an init channel, then loops on the intake queue
//! until it dequeues its termination token. Transform errors are recorded as
//! failed results and never stop the worker.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::{debug, error, warn};

use crate::{
    IntakeSender, ItemFailure, Message, PipelineError, ResultItem, Transform, TransformFactory,
};

/// Shared cancellation flag. Workers observe it at their next dequeue and
/// stop after finishing the item in hand.
#[derive(Clone, Debug, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a worker loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// Dequeued its termination token.
    Terminated,
    /// Observed cancellation at a dequeue.
    Cancelled,
    /// Intake queue disconnected without a token.
    IntakeClosed,
    /// Nobody is listening for results any more.
    OutputClosed,
    /// The factory failed; the loop never started.
    InitFailed,
}

/// Summary returned by each worker thread when it exits.
#[derive(Clone, Debug)]
pub struct WorkerExit {
    pub worker: usize,
    pub reason: ExitReason,
    /// Items taken off the intake queue and transformed.
    pub processed: u64,
    /// Of those, how many produced a failure marker.
    pub failed: u64,
}

type InitReport = Result<usize, (usize, anyhow::Error)>;

/// Handles to running worker threads.
pub struct WorkerPool {
    handles: Vec<(usize, thread::JoinHandle<WorkerExit>)>,
}

impl WorkerPool {
    /// Spawn `workers` threads and block until every one of them has built its
    /// transform.
    ///
    /// If any worker fails to initialise, the healthy ones are sent their
    /// termination tokens and joined before the error is returned, so no
    /// thread outlives a failed start.
    pub fn start<P, F>(
        workers: usize,
        factory: F,
        intake: &IntakeSender<P>,
        intake_rx: &Receiver<Message<P>>,
        output: &Sender<ResultItem<<F::Transform as Transform<P>>::Output>>,
        cancel: &Cancellation,
    ) -> Result<Self, PipelineError>
    where
        P: Send + 'static,
        F: TransformFactory<P>,
    {
        if workers == 0 {
            return Err(PipelineError::InvalidWorkerCount(workers));
        }

        let factory = Arc::new(factory);
        let (init_tx, init_rx) = bounded::<InitReport>(workers);
        let mut pool = Self {
            handles: Vec::with_capacity(workers),
        };

        for worker in 0..workers {
            let factory = factory.clone();
            let intake_rx = intake_rx.clone();
            let output = output.clone();
            let init_tx = init_tx.clone();
            let cancel = cancel.clone();
            let spawned = spawn_worker(worker, move || {
                run_worker(worker, &*factory, intake_rx, output, init_tx, cancel)
            });
            match spawned {
                Ok(handle) => pool.handles.push((worker, handle)),
                Err(source) => {
                    error!(worker, "failed to spawn worker thread: {source}");
                    intake.terminate(pool.handles.len());
                    let _ = pool.join();
                    return Err(PipelineError::Spawn { worker, source });
                }
            }
        }
        drop(init_tx);

        let mut failure = None;
        for _ in 0..workers {
            match init_rx.recv() {
                Ok(Ok(worker)) => debug!(worker, "worker transform ready"),
                Ok(Err((worker, source))) => {
                    failure = Some(PipelineError::WorkerInit { worker, source });
                    break;
                }
                Err(_) => {
                    failure = Some(PipelineError::WorkerLost);
                    break;
                }
            }
        }
        drop(init_rx);

        match failure {
            None => Ok(pool),
            Some(err) => {
                error!("worker pool failed to start: {err}");
                intake.terminate(workers);
                match pool.join() {
                    Err(panicked @ PipelineError::WorkerPanicked { .. })
                        if matches!(err, PipelineError::WorkerLost) =>
                    {
                        Err(panicked)
                    }
                    _ => Err(err),
                }
            }
        }
    }

    /// Number of worker threads that were started.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Enqueue one termination token per worker, then join them all.
    pub fn stop_and_join<P>(self, intake: &IntakeSender<P>) -> Result<Vec<WorkerExit>, PipelineError> {
        intake.terminate(self.len());
        self.join()
    }

    /// Wait for every worker thread to exit.
    ///
    /// Only returns once all threads are joined; a panicked worker is reported
    /// after the remaining ones have been collected.
    pub fn join(self) -> Result<Vec<WorkerExit>, PipelineError> {
        let mut exits = Vec::with_capacity(self.handles.len());
        let mut panicked = None;
        for (worker, handle) in self.handles {
            match handle.join() {
                Ok(exit) => {
                    debug!(
                        worker,
                        reason = ?exit.reason,
                        processed = exit.processed,
                        failed = exit.failed,
                        "worker joined"
                    );
                    exits.push(exit);
                }
                Err(_) => {
                    error!(worker, "worker thread panicked");
                    panicked.get_or_insert(PipelineError::WorkerPanicked { worker });
                }
            }
        }
        match panicked {
            Some(err) => Err(err),
            None => Ok(exits),
        }
    }
}

fn run_worker<P, F>(
    worker: usize,
    factory: &F,
    intake: Receiver<Message<P>>,
    output: Sender<ResultItem<<F::Transform as Transform<P>>::Output>>,
    init_tx: Sender<InitReport>,
    cancel: Cancellation,
) -> WorkerExit
where
    F: TransformFactory<P>,
{
    let span = tracing::info_span!("worker", worker);
    let _span_guard = span.enter();

    let mut exit = WorkerExit {
        worker,
        reason: ExitReason::InitFailed,
        processed: 0,
        failed: 0,
    };

    let mut transform = match factory.build(worker) {
        Ok(transform) => {
            let _ = init_tx.send(Ok(worker));
            transform
        }
        Err(err) => {
            error!("failed to build transform: {err:#}");
            let _ = init_tx.send(Err((worker, err)));
            return exit;
        }
    };
    drop(init_tx);

    let latency = metrics::histogram!("framepool_transform_seconds", "worker" => worker.to_string());
    let failures = metrics::counter!("framepool_item_failures_total");

    exit.reason = loop {
        let item = match intake.recv() {
            Ok(Message::Work(item)) => item,
            Ok(Message::Terminate) => break ExitReason::Terminated,
            Err(_) => break ExitReason::IntakeClosed,
        };
        if cancel.is_cancelled() {
            break ExitReason::Cancelled;
        }

        let index = item.index;
        let started = Instant::now();
        let outcome = transform.apply(item.payload).map_err(|err| {
            warn!(frame = index, "transform failed: {err:#}");
            ItemFailure::new(worker, &err)
        });
        latency.record(started.elapsed().as_secs_f64());

        exit.processed += 1;
        if outcome.is_err() {
            exit.failed += 1;
            failures.increment(1);
        }

        if output.send(ResultItem { index, outcome }).is_err() {
            warn!(frame = index, "output queue closed, stopping worker");
            break ExitReason::OutputClosed;
        }
    };

    exit
}

fn spawn_worker<F, T>(worker: usize, f: F) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    #[cfg(test)]
    if tests::REFUSE_SPAWN_AT.with(|at| at.get()) == Some(worker) {
        return Err(io::Error::other("thread limit reached"));
    }
    spawn_thread(format!("frame-worker-{worker}"), f)
}

/// Spawn a named thread that inherits the current tracing dispatcher.
pub fn spawn_thread<F, T>(name: impl Into<String>, f: F) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name.into())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}
