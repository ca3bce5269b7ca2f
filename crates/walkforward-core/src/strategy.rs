use crate::models::{Bar, Signal};

/// A trading strategy consumed by the engine.
///
/// Implementations see each fold's training slice through `fit` (which may be
/// a no-op) and must emit exactly one signal per bar of the test slice from
/// `predict`. Failures bubble up as opaque causes and abort the run.
pub trait Strategy {
    fn fit(&mut self, train: &[Bar]) -> anyhow::Result<()>;

    /// One signal per bar of `test`; the engine rejects any other length.
    fn predict(&self, test: &[Bar]) -> anyhow::Result<Vec<Signal>>;
}

/// Advisory context a signal function can attach to its decision. Consumed at
/// the trade-open decision and not persisted.
#[derive(Debug, Clone, Default)]
pub struct SignalMeta {
    pub confidence: f64,
    pub reason: String,
}

/// Adapter lifting a plain causal signal function into [`Strategy`].
///
/// For each bar the function receives only the bars up to and including the
/// one it is asked about, so a closure cannot peek forward even by accident.
#[derive(Clone)]
pub struct FnStrategy<F> {
    f: F,
}

impl<F> FnStrategy<F>
where
    F: Fn(&[Bar], usize) -> (Signal, SignalMeta),
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Strategy for FnStrategy<F>
where
    F: Fn(&[Bar], usize) -> (Signal, SignalMeta),
{
    fn fit(&mut self, _train: &[Bar]) -> anyhow::Result<()> {
        Ok(())
    }

    fn predict(&self, test: &[Bar]) -> anyhow::Result<Vec<Signal>> {
        Ok((0..test.len())
            .map(|i| (self.f)(&test[..=i], i).0)
            .collect())
    }
}
