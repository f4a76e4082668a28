use crate::Outcome;

/// Consumer of reassembled results.
///
/// [`write`](Self::write) is called exactly once per input frame with strictly
/// increasing indices starting at 0. Failed frames arrive as `Err` so the sink
/// can substitute a placeholder instead of leaving a hole.
pub trait ResultSink<R> {
    fn write(&mut self, index: u64, outcome: Outcome<R>) -> anyhow::Result<()>;

    /// Called once after the last frame of a successful run.
    fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<R, S: ResultSink<R> + ?Sized> ResultSink<R> for Box<S> {
    fn write(&mut self, index: u64, outcome: Outcome<R>) -> anyhow::Result<()> {
        (**self).write(index, outcome)
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        (**self).finish()
    }
}

/// Collects outcomes in memory; the vector position is the frame index.
impl<R> ResultSink<R> for Vec<Outcome<R>> {
    fn write(&mut self, index: u64, outcome: Outcome<R>) -> anyhow::Result<()> {
        anyhow::ensure!(
            index == self.len() as u64,
            "frame #{index} written out of order (expected #{})",
            self.len()
        );
        self.push(outcome);
        Ok(())
    }
}
