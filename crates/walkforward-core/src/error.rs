use thiserror::Error;

/// Errors surfaced by the walk-forward engine.
///
/// All variants are fatal for the run that raised them: the engine never
/// returns a partial result. Degenerate metric inputs (zero-variance returns,
/// no losing trades) are not errors, and an unavailable ATR at a would-be
/// entry is absorbed by the simulator as a skipped trade.
#[derive(Error, Debug)]
pub enum BacktestError {
    /// The series cannot hold even one (train, test) fold.
    #[error("insufficient data: need at least {required} bars, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// The injected strategy violated its contract: wrong signal count for
    /// the test slice, or a raw signal value outside {-1, 0, 1}.
    #[error("strategy contract violation: {0}")]
    StrategyContract(String),

    /// A failure inside the strategy's `fit`/`predict`, wrapping the original
    /// cause. Never retried: a broken strategy fails identically every time.
    #[error("strategy execution failed: {0}")]
    StrategyExecution(anyhow::Error),

    /// A configuration field violated its input constraints.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
