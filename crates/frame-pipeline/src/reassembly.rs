//! Index-keyed reorder buffer.

use std::collections::BTreeMap;

use crate::{Outcome, PipelineError, ResultItem};

/// Collects results arriving in any order and releases them in index order.
///
/// Results can be drained incrementally with [`pop_ready`](Self::pop_ready),
/// which yields the contiguous prefix starting at the next unreleased index,
/// or all at once with [`finalize`](Self::finalize). Both may be combined: the
/// buffer remembers what it already released.
#[derive(Debug)]
pub struct Reassembler<R> {
    pending: BTreeMap<u64, Outcome<R>>,
    next: u64,
}

impl<R> Default for Reassembler<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Reassembler<R> {
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            next: 0,
        }
    }

    /// Record a result. An index that is already buffered or already released
    /// means the same frame was processed twice.
    pub fn accept(&mut self, item: ResultItem<R>) -> Result<(), PipelineError> {
        if item.index < self.next || self.pending.contains_key(&item.index) {
            return Err(PipelineError::DuplicateIndex(item.index));
        }
        self.pending.insert(item.index, item.outcome);
        Ok(())
    }

    /// Release the next result if it has arrived.
    pub fn pop_ready(&mut self) -> Option<(u64, Outcome<R>)> {
        let outcome = self.pending.remove(&self.next)?;
        let index = self.next;
        self.next += 1;
        Some((index, outcome))
    }

    /// Index of the next result to be released.
    pub fn next_index(&self) -> u64 {
        self.next
    }

    /// Results buffered but not yet released.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Release every remaining result up to `expected_count`.
    ///
    /// Fails with [`PipelineError::MissingIndex`] on the first gap and with
    /// [`PipelineError::UnexpectedIndex`] if anything beyond the expected range
    /// was accepted.
    pub fn finalize(mut self, expected_count: u64) -> Result<Vec<(u64, Outcome<R>)>, PipelineError> {
        if let Some((&index, _)) = self.pending.last_key_value() {
            if index >= expected_count {
                return Err(PipelineError::UnexpectedIndex {
                    index,
                    expected: expected_count,
                });
            }
        }
        if self.next > expected_count {
            return Err(PipelineError::UnexpectedIndex {
                index: self.next - 1,
                expected: expected_count,
            });
        }

        let mut ordered = Vec::with_capacity((expected_count - self.next) as usize);
        while self.next < expected_count {
            match self.pop_ready() {
                Some(entry) => ordered.push(entry),
                None => return Err(PipelineError::MissingIndex(self.next)),
            }
        }
        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ItemFailure;

    fn ok(index: u64, value: &'static str) -> ResultItem<&'static str> {
        ResultItem {
            index,
            outcome: Ok(value),
        }
    }

    #[test]
    fn out_of_order_results_finalize_in_order() {
        let mut reassembler = Reassembler::new();
        for (index, value) in [(3, "R3"), (1, "R1"), (0, "R0"), (4, "R4"), (2, "R2")] {
            reassembler.accept(ok(index, value)).unwrap();
        }
        let values: Vec<_> = reassembler
            .finalize(5)
            .unwrap()
            .into_iter()
            .map(|(_, outcome)| outcome.unwrap())
            .collect();
        assert_eq!(values, vec!["R0", "R1", "R2", "R3", "R4"]);
    }

    #[test]
    fn pop_ready_releases_only_contiguous_prefix() {
        let mut reassembler = Reassembler::new();
        reassembler.accept(ok(1, "R1")).unwrap();
        assert!(reassembler.pop_ready().is_none());

        reassembler.accept(ok(0, "R0")).unwrap();
        reassembler.accept(ok(3, "R3")).unwrap();
        let released: Vec<_> = std::iter::from_fn(|| reassembler.pop_ready())
            .map(|(index, _)| index)
            .collect();
        assert_eq!(released, vec![0, 1]);
        assert_eq!(reassembler.next_index(), 2);
        assert_eq!(reassembler.pending(), 1);
    }

    #[test]
    fn duplicate_buffered_index_is_rejected() {
        let mut reassembler = Reassembler::new();
        reassembler.accept(ok(2, "a")).unwrap();
        assert!(matches!(
            reassembler.accept(ok(2, "b")),
            Err(PipelineError::DuplicateIndex(2))
        ));
    }

    #[test]
    fn duplicate_released_index_is_rejected() {
        let mut reassembler = Reassembler::new();
        reassembler.accept(ok(0, "a")).unwrap();
        assert!(reassembler.pop_ready().is_some());
        assert!(matches!(
            reassembler.accept(ok(0, "again")),
            Err(PipelineError::DuplicateIndex(0))
        ));
    }

    #[test]
    fn gap_is_reported_as_missing() {
        let mut reassembler = Reassembler::new();
        reassembler.accept(ok(0, "a")).unwrap();
        reassembler.accept(ok(2, "c")).unwrap();
        assert!(matches!(
            reassembler.finalize(3),
            Err(PipelineError::MissingIndex(1))
        ));
    }

    #[test]
    fn result_beyond_expected_count_is_rejected() {
        let mut reassembler = Reassembler::new();
        reassembler.accept(ok(0, "a")).unwrap();
        reassembler.accept(ok(5, "f")).unwrap();
        assert!(matches!(
            reassembler.finalize(1),
            Err(PipelineError::UnexpectedIndex {
                index: 5,
                expected: 1
            })
        ));
    }

    #[test]
    fn failure_marker_keeps_its_slot() {
        let mut reassembler = Reassembler::new();
        reassembler.accept(ok(0, "a")).unwrap();
        reassembler
            .accept(ResultItem {
                index: 1,
                outcome: Err(ItemFailure {
                    worker: 0,
                    message: "boom".into(),
                }),
            })
            .unwrap();
        reassembler.accept(ok(2, "c")).unwrap();
        let entries = reassembler.finalize(3).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[1].1.is_err());
    }

    #[test]
    fn finalize_empty() {
        let reassembler = Reassembler::<()>::new();
        assert!(reassembler.finalize(0).unwrap().is_empty());
    }

    #[test]
    fn finalize_after_streaming_returns_remainder() {
        let mut reassembler = Reassembler::new();
        reassembler.accept(ok(0, "a")).unwrap();
        reassembler.accept(ok(1, "b")).unwrap();
        assert!(reassembler.pop_ready().is_some());
        let rest = reassembler.finalize(2).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].0, 1);
    }
}
