use rand::Rng;
use rayon::prelude::*;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Trade;

/// Distribution of outcomes from bootstrap-resampling a trade list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub simulations: usize,
    pub mean_return: f64,
    pub median_return: f64,
    pub std_dev_return: f64,
    pub percentile_5: f64,
    pub percentile_95: f64,
    pub probability_of_profit: f64,
    /// Probability of losing more than half the starting capital.
    pub probability_of_ruin: f64,
    /// Median of the per-simulation max drawdowns (zero-or-negative).
    pub median_max_drawdown: f64,
    pub median_sharpe: f64,
}

/// Bootstrap the trade sequence: sample `trades.len()` trades with
/// replacement per simulation and replay their fractional returns compounding
/// from `initial_capital`.
///
/// The sequence reshuffle answers a question the single backtest path cannot:
/// how much of the observed drawdown profile was luck of the ordering.
pub fn run_monte_carlo(
    trades: &[Trade],
    initial_capital: Decimal,
    num_simulations: usize,
) -> MonteCarloResult {
    if trades.is_empty() || num_simulations == 0 {
        return MonteCarloResult {
            simulations: 0,
            mean_return: 0.0,
            median_return: 0.0,
            std_dev_return: 0.0,
            percentile_5: 0.0,
            percentile_95: 0.0,
            probability_of_profit: 0.0,
            probability_of_ruin: 0.0,
            median_max_drawdown: 0.0,
            median_sharpe: 0.0,
        };
    }

    let trade_returns: Vec<f64> = trades.iter().map(|t| t.pnl_pct).collect();
    let initial = initial_capital.to_f64().unwrap_or(100_000.0);
    let n_trades = trade_returns.len();

    let outcomes: Vec<(f64, f64, f64)> = (0..num_simulations)
        .into_par_iter()
        .map(|_| {
            let mut rng = rand::thread_rng();
            let mut equity = initial;
            let mut step_returns = Vec::with_capacity(n_trades);
            let mut max_drawdown = 0.0f64;
            let mut peak = initial;

            for _ in 0..n_trades {
                let r = trade_returns[rng.gen_range(0..n_trades)];
                let prev = equity;
                equity *= 1.0 + r;
                peak = peak.max(equity);
                if peak > 0.0 {
                    max_drawdown = max_drawdown.min(equity / peak - 1.0);
                }
                step_returns.push(if prev > 0.0 { equity / prev - 1.0 } else { 0.0 });
            }

            let total_return = equity / initial - 1.0;
            let sharpe = per_trade_sharpe(&step_returns);
            (total_return, max_drawdown, sharpe)
        })
        .collect();

    let mut returns: Vec<f64> = outcomes.iter().map(|o| o.0).collect();
    let mut drawdowns: Vec<f64> = outcomes.iter().map(|o| o.1).collect();
    let mut sharpes: Vec<f64> = outcomes.iter().map(|o| o.2).collect();
    returns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    drawdowns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sharpes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let profitable = returns.iter().filter(|r| **r > 0.0).count();
    let ruined = returns.iter().filter(|r| **r < -0.5).count();

    MonteCarloResult {
        simulations: returns.len(),
        mean_return: mean,
        median_return: percentile_sorted(&returns, 50.0),
        std_dev_return: variance.sqrt(),
        percentile_5: percentile_sorted(&returns, 5.0),
        percentile_95: percentile_sorted(&returns, 95.0),
        probability_of_profit: profitable as f64 / n,
        probability_of_ruin: ruined as f64 / n,
        median_max_drawdown: percentile_sorted(&drawdowns, 50.0),
        median_sharpe: percentile_sorted(&sharpes, 50.0),
    }
}

fn per_trade_sharpe(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = variance.sqrt();
    if std > 0.0 {
        mean / std * n.sqrt()
    } else {
        0.0
    }
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
