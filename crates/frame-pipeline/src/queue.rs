//! Intake and output queues shared between the controller and the workers.
//!
//! Both queues are unbounded crossbeam channels. The intake carries a tagged
//! [`Message`] so the termination token can never be confused with a frame,
//! and the [`IntakeSender`] refuses frames once tokens have been sent.

use std::cell::Cell;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::{PipelineError, ResultItem, WorkItem};

/// Element type of the intake queue.
#[derive(Debug)]
pub enum Message<P> {
    Work(WorkItem<P>),
    /// Tells exactly one worker to stop pulling.
    Terminate,
}

/// Producer half of the intake queue, owned by the controller.
pub struct IntakeSender<P> {
    tx: Sender<Message<P>>,
    terminated: Cell<bool>,
}

/// Create the intake queue.
pub fn intake_queue<P>() -> (IntakeSender<P>, Receiver<Message<P>>) {
    let (tx, rx) = unbounded();
    (
        IntakeSender {
            tx,
            terminated: Cell::new(false),
        },
        rx,
    )
}

/// Create the output queue.
pub fn output_queue<R>() -> (Sender<ResultItem<R>>, Receiver<ResultItem<R>>) {
    unbounded()
}

impl<P> IntakeSender<P> {
    /// Enqueue a frame. Fails once termination tokens have been sent or when
    /// every worker has gone away.
    pub fn push(&self, item: WorkItem<P>) -> Result<(), PipelineError> {
        if self.terminated.get() {
            return Err(PipelineError::IntakeClosed);
        }
        self.tx
            .send(Message::Work(item))
            .map_err(|_| PipelineError::IntakeClosed)
    }

    /// Enqueue `count` termination tokens, after which [`push`](Self::push)
    /// is rejected. Calling it again is a no-op.
    pub fn terminate(&self, count: usize) {
        if self.terminated.replace(true) {
            return;
        }
        for _ in 0..count {
            // Workers that already exited leave their receivers dropped; the
            // remaining ones still need their token.
            if self.tx.send(Message::Terminate).is_err() {
                break;
            }
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.get()
    }

    /// Messages currently waiting in the queue.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_follow_work_in_fifo_order() {
        let (tx, rx) = intake_queue::<u8>();
        tx.push(WorkItem { index: 0, payload: 7 }).unwrap();
        tx.push(WorkItem { index: 1, payload: 8 }).unwrap();
        tx.terminate(2);

        assert!(matches!(rx.recv(), Ok(Message::Work(WorkItem { index: 0, .. }))));
        assert!(matches!(rx.recv(), Ok(Message::Work(WorkItem { index: 1, .. }))));
        assert!(matches!(rx.recv(), Ok(Message::Terminate)));
        assert!(matches!(rx.recv(), Ok(Message::Terminate)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn push_after_terminate_is_rejected() {
        let (tx, rx) = intake_queue::<u8>();
        tx.terminate(1);
        let err = tx.push(WorkItem { index: 0, payload: 1 }).unwrap_err();
        assert!(matches!(err, PipelineError::IntakeClosed));
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn terminate_twice_sends_tokens_once() {
        let (tx, rx) = intake_queue::<u8>();
        tx.terminate(3);
        tx.terminate(3);
        assert_eq!(rx.len(), 3);
    }

    #[test]
    fn push_fails_when_all_receivers_dropped() {
        let (tx, rx) = intake_queue::<u8>();
        drop(rx);
        assert!(tx.push(WorkItem { index: 0, payload: 1 }).is_err());
    }
}
