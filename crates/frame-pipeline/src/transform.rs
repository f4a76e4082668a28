//! Per-worker transform seams.
//!
//! A [`TransformFactory`] is shared by every worker; each worker calls
//! [`TransformFactory::build`] exactly once on its own thread and keeps the
//! resulting [`Transform`] for its whole lifetime. Transforms are therefore
//! never shared between threads and do not need to be `Send` or `Sync`.

use std::marker::PhantomData;

/// Stateful per-frame operation owned by a single worker.
pub trait Transform<P> {
    type Output: Send + 'static;

    fn apply(&mut self, payload: P) -> anyhow::Result<Self::Output>;
}

/// Builds one private [`Transform`] per worker.
pub trait TransformFactory<P>: Send + Sync + 'static {
    type Transform: Transform<P>;

    /// Called once on the worker thread before it starts pulling frames.
    fn build(&self, worker: usize) -> anyhow::Result<Self::Transform>;
}

impl<P, T, F> TransformFactory<P> for F
where
    F: Fn(usize) -> anyhow::Result<T> + Send + Sync + 'static,
    T: Transform<P>,
{
    type Transform = T;

    fn build(&self, worker: usize) -> anyhow::Result<T> {
        self(worker)
    }
}

/// [`Transform`] backed by a closure, see [`from_fn`].
pub struct FnTransform<F, R> {
    f: F,
    _output: PhantomData<fn() -> R>,
}

/// Wrap a closure as a [`Transform`].
pub fn from_fn<P, R, F>(f: F) -> FnTransform<F, R>
where
    F: FnMut(P) -> anyhow::Result<R>,
{
    FnTransform {
        f,
        _output: PhantomData,
    }
}

impl<P, R, F> Transform<P> for FnTransform<F, R>
where
    F: FnMut(P) -> anyhow::Result<R>,
    R: Send + 'static,
{
    type Output = R;

    fn apply(&mut self, payload: P) -> anyhow::Result<R> {
        (self.f)(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_with<P, F: TransformFactory<P>>(factory: &F, worker: usize) -> F::Transform {
        factory.build(worker).unwrap()
    }

    #[test]
    fn closure_factory_builds_stateful_transform() {
        let factory = |worker: usize| -> anyhow::Result<_> {
            let mut calls = 0usize;
            Ok(from_fn(move |value: u32| {
                calls += 1;
                Ok((worker, calls, value * 2))
            }))
        };
        let mut transform = build_with::<u32, _>(&factory, 3);
        assert_eq!(transform.apply(5).unwrap(), (3, 1, 10));
        assert_eq!(transform.apply(6).unwrap(), (3, 2, 12));
    }
}
