use std::fmt;

/// A frame tagged with its position in the input stream.
#[derive(Debug)]
pub struct WorkItem<P> {
    pub index: u64,
    pub payload: P,
}

/// Result of transforming one [`WorkItem`], carrying the originating index.
#[derive(Debug)]
pub struct ResultItem<R> {
    pub index: u64,
    pub outcome: Outcome<R>,
}

/// Either the transformed value or the marker left by a failed transform.
pub type Outcome<R> = Result<R, ItemFailure>;

/// Failure marker recorded in place of a result when a transform errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemFailure {
    /// Worker that attempted the item.
    pub worker: usize,
    /// Rendered error chain.
    pub message: String,
}

impl ItemFailure {
    pub fn new(worker: usize, err: &anyhow::Error) -> Self {
        Self {
            worker,
            message: format!("{err:#}"),
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker #{}: {}", self.worker, self.message)
    }
}

impl std::error::Error for ItemFailure {}
