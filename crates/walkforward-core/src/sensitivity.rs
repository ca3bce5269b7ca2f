use std::collections::BTreeMap;

use rayon::prelude::*;
use rust_decimal::Decimal;
use tracing::info;

use crate::costs::CostModel;
use crate::engine::BacktestEngine;
use crate::error::BacktestError;
use crate::models::{BacktestResults, Bar};
use crate::strategy::Strategy;

/// Re-runs the full walk-forward pipeline across a range of slippage
/// assumptions, holding everything else fixed.
///
/// An edge that only exists at zero slippage is not an edge; the sweep shows
/// where it dies. Runs are independent and execute in parallel.
pub struct SensitivityRunner;

impl SensitivityRunner {
    pub fn run_slippage_sensitivity<S>(
        engine: &BacktestEngine,
        strategy: &S,
        series: &[Bar],
        slippage_range: &[Decimal],
    ) -> Result<BTreeMap<Decimal, BacktestResults>, BacktestError>
    where
        S: Strategy + Clone + Sync,
    {
        let runs: Result<Vec<(Decimal, BacktestResults)>, BacktestError> = slippage_range
            .par_iter()
            .map(|&slippage_bps| {
                let costs = CostModel {
                    slippage_bps,
                    ..engine.costs().clone()
                };
                let run = BacktestEngine::new(engine.config().clone(), costs);
                run.run_walk_forward(strategy, series)
                    .map(|results| (slippage_bps, results))
            })
            .collect();

        let runs = runs?;
        info!(points = runs.len(), "slippage sensitivity sweep complete");
        Ok(runs.into_iter().collect())
    }
}
