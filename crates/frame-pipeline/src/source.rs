//! Indexed frame source.

use std::iter::FusedIterator;

use tracing::{debug, warn};

use crate::WorkItem;

/// Capability to pull the next raw frame from a capture collaborator.
///
/// `Ok(None)` means the input is exhausted. An `Err` means the input could not
/// be read any further; [`WorkSource`] treats it as end-of-stream but records
/// it as [`EndReason::Truncated`].
pub trait FrameReader {
    type Payload: Send + 'static;

    fn read_next(&mut self) -> anyhow::Result<Option<Self::Payload>>;
}

impl<T: FrameReader + ?Sized> FrameReader for Box<T> {
    type Payload = T::Payload;

    fn read_next(&mut self) -> anyhow::Result<Option<Self::Payload>> {
        (**self).read_next()
    }
}

/// Adapts any iterator into a [`FrameReader`] that never fails.
pub struct IterReader<I>(I);

impl<I> IterReader<I> {
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self(iter.into_iter())
    }
}

impl<I> FrameReader for IterReader<I>
where
    I: Iterator,
    I::Item: Send + 'static,
{
    type Payload = I::Item;

    fn read_next(&mut self) -> anyhow::Result<Option<Self::Payload>> {
        Ok(self.0.next())
    }
}

/// Why a [`WorkSource`] stopped producing items.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// The reader reported natural end of input.
    Exhausted,
    /// The reader failed before natural end; carries the rendered error.
    Truncated(String),
}

/// Lazy, finite, non-restartable sequence of [`WorkItem`]s with indices
/// `0, 1, 2, …`. Yields `None` forever once the reader ends.
pub struct WorkSource<R> {
    reader: R,
    next_index: u64,
    end: Option<EndReason>,
}

impl<R: FrameReader> WorkSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            next_index: 0,
            end: None,
        }
    }

    /// Number of items produced so far.
    pub fn produced(&self) -> u64 {
        self.next_index
    }

    /// `None` while the source is still live.
    pub fn end_reason(&self) -> Option<&EndReason> {
        self.end.as_ref()
    }

    pub fn into_reader(self) -> R {
        self.reader
    }
}

impl<R: FrameReader> Iterator for WorkSource<R> {
    type Item = WorkItem<R::Payload>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.end.is_some() {
            return None;
        }
        match self.reader.read_next() {
            Ok(Some(payload)) => {
                let index = self.next_index;
                self.next_index += 1;
                Some(WorkItem { index, payload })
            }
            Ok(None) => {
                debug!(frames = self.next_index, "source exhausted");
                self.end = Some(EndReason::Exhausted);
                None
            }
            Err(err) => {
                warn!(
                    frames = self.next_index,
                    "source read failed, treating as end of stream: {err:#}"
                );
                self.end = Some(EndReason::Truncated(format!("{err:#}")));
                None
            }
        }
    }
}

impl<R: FrameReader> FusedIterator for WorkSource<R> {}
