use std::{
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use frame_pipeline::{LatestCell, Progress, spawn_thread};
use tracing::{info, warn};

/// Time without a new progress snapshot before a stall is reported.
pub(crate) const STALL_THRESHOLD: Duration = Duration::from_secs(10);

#[derive(Debug, PartialEq)]
pub(crate) enum Observation {
    Advanced { progress: Progress, fps: f64 },
    /// First sample past the threshold since the last advance.
    Stalled(Duration),
    Quiet,
}

/// Turns periodic samples of the progress cell into advance/stall events.
pub(crate) struct StallDetector {
    threshold: Duration,
    last_change: Instant,
    last_emitted: u64,
    reported: bool,
}

impl StallDetector {
    pub(crate) fn new(threshold: Duration, now: Instant) -> Self {
        Self {
            threshold,
            last_change: now,
            last_emitted: 0,
            reported: false,
        }
    }

    pub(crate) fn observe(&mut self, sample: Option<Progress>, now: Instant) -> Observation {
        if let Some(progress) = sample {
            let elapsed = now.saturating_duration_since(self.last_change).as_secs_f64();
            let written = progress.emitted.saturating_sub(self.last_emitted);
            let fps = if elapsed > 0.0 { written as f64 / elapsed } else { 0.0 };
            self.last_change = now;
            self.last_emitted = progress.emitted;
            self.reported = false;
            return Observation::Advanced { progress, fps };
        }

        let idle = now.saturating_duration_since(self.last_change);
        if idle >= self.threshold && !self.reported {
            self.reported = true;
            return Observation::Stalled(idle);
        }
        Observation::Quiet
    }
}

/// Background thread logging pipeline progress and warning on stalls.
pub(crate) struct ProgressMonitor {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressMonitor {
    pub(crate) fn spawn(
        cell: Arc<LatestCell<Progress>>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = spawn_thread("progress-monitor", move || {
            let mut detector = StallDetector::new(STALL_THRESHOLD, Instant::now());
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                match detector.observe(cell.take(), Instant::now()) {
                    Observation::Advanced { progress, fps } => info!(
                        read = progress.read,
                        written = progress.emitted,
                        failed = progress.failed,
                        pending = progress.pending,
                        fps = format_args!("{fps:.1}"),
                        "progress"
                    ),
                    Observation::Stalled(idle) => warn!(
                        idle_secs = idle.as_secs(),
                        "no pipeline progress; a worker or the decoder may be stuck"
                    ),
                    Observation::Quiet => {}
                }
            }
        })?;
        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    pub(crate) fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(emitted: u64) -> Progress {
        Progress {
            read: emitted,
            emitted,
            failed: 0,
            pending: 0,
        }
    }

    #[test]
    fn stall_is_reported_once_until_progress_resumes() {
        let start = Instant::now();
        let mut detector = StallDetector::new(Duration::from_secs(2), start);
        let at = |secs: u64| start + Duration::from_secs(secs);

        assert!(matches!(
            detector.observe(Some(progress(10)), at(1)),
            Observation::Advanced { fps, .. } if (fps - 10.0).abs() < 1e-9
        ));
        assert_eq!(detector.observe(None, at(2)), Observation::Quiet);
        assert_eq!(
            detector.observe(None, at(3)),
            Observation::Stalled(Duration::from_secs(2))
        );
        assert_eq!(detector.observe(None, at(6)), Observation::Quiet);

        assert!(matches!(
            detector.observe(Some(progress(20)), at(7)),
            Observation::Advanced { .. }
        ));
        assert_eq!(detector.observe(None, at(8)), Observation::Quiet);
    }

    #[test]
    fn monitor_stops_promptly() {
        let cell = Arc::new(LatestCell::new());
        cell.publish(progress(1));
        let monitor = ProgressMonitor::spawn(cell, Duration::from_secs(60)).unwrap();
        let started = Instant::now();
        monitor.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
