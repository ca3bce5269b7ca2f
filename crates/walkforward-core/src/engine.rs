use rayon::prelude::*;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::atr;
use crate::costs::CostModel;
use crate::error::BacktestError;
use crate::metrics;
use crate::models::{
    BacktestConfig, BacktestResults, Bar, EquityPoint, Fold, FoldResult, Signal, Trade,
};
use crate::simulator::TradeSimulator;
use crate::strategy::{SignalMeta, Strategy};
use crate::window::WindowPlanner;

/// Walk-forward backtest orchestrator.
///
/// Plans folds, fits/queries the injected strategy per fold, simulates the
/// test slices and aggregates the results. Folds are independent (each one
/// starts from `initial_capital` and only borrows the shared series), so they
/// run as a parallel map; aggregation happens single-threaded afterwards.
/// Identical inputs produce bit-identical results.
pub struct BacktestEngine {
    config: BacktestConfig,
    costs: CostModel,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig, costs: CostModel) -> Self {
        Self { config, costs }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn costs(&self) -> &CostModel {
        &self.costs
    }

    /// Run the full walk-forward pipeline with a `fit`/`predict` strategy.
    ///
    /// The strategy is cloned per fold so fold workers never share mutable
    /// state. A signal-count mismatch from `predict` is a contract error; any
    /// failure inside the strategy aborts the run with its original cause
    /// attached. No partial results are returned.
    pub fn run_walk_forward<S>(
        &self,
        strategy: &S,
        series: &[Bar],
    ) -> Result<BacktestResults, BacktestError>
    where
        S: Strategy + Clone + Sync,
    {
        let folds = self.plan_or_fail(series)?;
        let atr = atr::atr_series(series, self.config.atr_period);

        let fold_results: Result<Vec<FoldResult>, BacktestError> = folds
            .par_iter()
            .map(|fold| {
                let mut fitted = strategy.clone();
                let train = &series[fold.train_range()];
                let test = &series[fold.test_range()];
                fitted
                    .fit(train)
                    .map_err(BacktestError::StrategyExecution)?;
                let signals = fitted
                    .predict(test)
                    .map_err(BacktestError::StrategyExecution)?;
                if signals.len() != test.len() {
                    return Err(BacktestError::StrategyContract(format!(
                        "predict returned {} signals for {} test bars (fold {})",
                        signals.len(),
                        test.len(),
                        fold.fold_index
                    )));
                }
                Ok(self.run_fold(fold, series, &signals, &atr))
            })
            .collect();

        Ok(self.aggregate(fold_results?))
    }

    /// Run the pipeline with a bare signal function instead of a strategy.
    ///
    /// Causality is enforced at the call-site: for each test bar the function
    /// only ever sees the series prefix up to and including that bar.
    pub fn run_signal_backtest<F>(
        &self,
        signal_fn: F,
        series: &[Bar],
    ) -> Result<BacktestResults, BacktestError>
    where
        F: Fn(&[Bar], usize) -> (Signal, SignalMeta) + Sync,
    {
        let folds = self.plan_or_fail(series)?;
        let atr = atr::atr_series(series, self.config.atr_period);

        let fold_results: Vec<FoldResult> = folds
            .par_iter()
            .map(|fold| {
                let signals: Vec<Signal> = fold
                    .test_range()
                    .map(|i| signal_fn(&series[..=i], i).0)
                    .collect();
                self.run_fold(fold, series, &signals, &atr)
            })
            .collect();

        Ok(self.aggregate(fold_results))
    }

    fn plan_or_fail(&self, series: &[Bar]) -> Result<Vec<Fold>, BacktestError> {
        self.config.validate()?;
        let folds = WindowPlanner::plan(series.len(), &self.config);
        if folds.is_empty() {
            return Err(BacktestError::InsufficientData {
                required: self.config.min_train_size + self.config.test_window,
                actual: series.len(),
            });
        }
        Ok(folds)
    }

    fn run_fold(
        &self,
        fold: &Fold,
        series: &[Bar],
        signals: &[Signal],
        atr: &[Option<Decimal>],
    ) -> FoldResult {
        let simulator = TradeSimulator::new(&self.config, &self.costs);
        let start_equity = self.config.initial_capital;
        let run = simulator.run(
            series,
            fold.test_start,
            fold.test_end,
            signals,
            atr,
            start_equity,
        );
        let returns = metrics::equity_returns_from(start_equity, &run.equity_points);
        let fold_return = (run.end_equity / start_equity).to_f64().unwrap_or(1.0) - 1.0;
        let num_trades = run.trades.len();
        FoldResult {
            fold: fold.clone(),
            trades: run.trades,
            equity_points: run.equity_points,
            start_equity,
            end_equity: run.end_equity,
            fold_return,
            sharpe: metrics::sharpe_ratio(&returns, self.config.bars_per_year),
            num_trades,
            excluded: num_trades < self.config.require_min_trades,
        }
    }

    /// Merge fold results into one global result. Excluded folds stay
    /// visible in `folds` but contribute nothing to the aggregate curve or
    /// statistics. The global curve chains each included fold's equity
    /// ratios, since every fold simulated from the same starting capital.
    fn aggregate(&self, mut folds: Vec<FoldResult>) -> BacktestResults {
        let mut next_id = 0u64;
        for fold in folds.iter_mut() {
            for trade in fold.trades.iter_mut() {
                trade.trade_id = next_id;
                next_id += 1;
            }
        }

        let excluded = folds.iter().filter(|f| f.excluded).count();
        if excluded > 0 {
            warn!(
                excluded,
                min_trades = self.config.require_min_trades,
                "sparse folds excluded from aggregate"
            );
        }

        let initial = self.config.initial_capital;
        let mut all_trades: Vec<Trade> = Vec::new();
        let mut equity_curve: Vec<EquityPoint> = Vec::new();
        let mut equity = initial;
        let mut peak = initial;
        for fold in folds.iter().filter(|f| !f.excluded) {
            all_trades.extend(fold.trades.iter().cloned());
            let scale = equity / fold.start_equity;
            for point in &fold.equity_points {
                let scaled = point.equity * scale;
                peak = peak.max(scaled);
                let drawdown = if peak > Decimal::ZERO {
                    ((scaled / peak).to_f64().unwrap_or(1.0) - 1.0).min(0.0)
                } else {
                    0.0
                };
                equity_curve.push(EquityPoint {
                    timestamp: point.timestamp,
                    equity: scaled,
                    drawdown_pct: drawdown,
                });
            }
            equity *= fold.end_equity / fold.start_equity;
        }

        let final_equity = equity;
        let total_return = (final_equity / initial).to_f64().unwrap_or(1.0) - 1.0;
        let returns = metrics::equity_returns_from(initial, &equity_curve);
        let bars_per_year = self.config.bars_per_year;
        let annualized_return =
            metrics::annualized_return(total_return, equity_curve.len(), bars_per_year);
        let max_drawdown = metrics::max_drawdown(&equity_curve);
        let sharpe_ratio = metrics::sharpe_ratio(&returns, bars_per_year);

        info!(
            folds = folds.len(),
            trades = all_trades.len(),
            total_return,
            sharpe = sharpe_ratio,
            "walk-forward run complete"
        );

        BacktestResults {
            symbol: self.config.symbol.clone(),
            initial_capital: initial,
            final_equity,
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio: metrics::sortino_ratio(&returns, bars_per_year),
            max_drawdown,
            calmar_ratio: metrics::calmar_ratio(annualized_return, max_drawdown),
            win_rate: metrics::win_rate(&all_trades),
            profit_factor: metrics::profit_factor(&all_trades),
            total_trades: all_trades.len(),
            fold_sharpe_std: metrics::fold_sharpe_std(&folds),
            pct_profitable_folds: metrics::pct_profitable_folds(&folds),
            all_trades,
            equity_curve,
            folds,
        }
    }
}
