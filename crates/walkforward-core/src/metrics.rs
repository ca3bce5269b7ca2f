//! Pure performance statistics over returns series, equity curves and trade
//! lists.
//!
//! Degenerate inputs (zero variance, no losing trades, empty trade lists) map
//! to sentinel results instead of errors, so a batch evaluating many
//! candidate strategies always gets a comparable value back.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

use crate::models::{EquityPoint, FoldResult, Trade};

/// Per-bar fractional returns of an equity curve.
pub fn equity_returns(curve: &[EquityPoint]) -> Vec<f64> {
    curve
        .windows(2)
        .map(|w| {
            let e0 = w[0].equity.to_f64().unwrap_or(1.0);
            let e1 = w[1].equity.to_f64().unwrap_or(1.0);
            if e0 > 0.0 {
                e1 / e0 - 1.0
            } else {
                0.0
            }
        })
        .collect()
}

/// Like [`equity_returns`], but anchored on a starting equity so the first
/// bar's return is included.
pub fn equity_returns_from(start: Decimal, curve: &[EquityPoint]) -> Vec<f64> {
    let mut returns = Vec::with_capacity(curve.len());
    let mut prev = start.to_f64().unwrap_or(1.0);
    for point in curve {
        let e = point.equity.to_f64().unwrap_or(1.0);
        returns.push(if prev > 0.0 { e / prev - 1.0 } else { 0.0 });
        prev = e;
    }
    returns
}

/// Annualized Sharpe ratio. Zero (not NaN) on fewer than two returns or zero
/// variance.
pub fn sharpe_ratio(returns: &[f64], bars_per_year: f64) -> f64 {
    if returns.len() < 2 || bars_per_year <= 0.0 {
        return 0.0;
    }
    let mean = mean(returns);
    let std = sample_std(returns, mean);
    if std <= 0.0 || !std.is_finite() {
        return 0.0;
    }
    mean / std * bars_per_year.sqrt()
}

/// Annualized Sortino ratio: downside deviation (negative returns only) in
/// the denominator. Zero under the same degenerate conditions as Sharpe.
pub fn sortino_ratio(returns: &[f64], bars_per_year: f64) -> f64 {
    if returns.len() < 2 || bars_per_year <= 0.0 {
        return 0.0;
    }
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.is_empty() {
        return 0.0;
    }
    let downside_dev =
        (downside.iter().map(|r| r * r).sum::<f64>() / downside.len() as f64).sqrt();
    if downside_dev <= 0.0 || !downside_dev.is_finite() {
        return 0.0;
    }
    mean(returns) / downside_dev * bars_per_year.sqrt()
}

/// Maximum peak-to-trough drawdown of an equity curve, as a zero-or-negative
/// fraction.
pub fn max_drawdown(curve: &[EquityPoint]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0f64;
    for point in curve {
        let e = point.equity.to_f64().unwrap_or(0.0);
        peak = peak.max(e);
        if peak > 0.0 {
            worst = worst.min(e / peak - 1.0);
        }
    }
    worst
}

/// Compound annualized growth over `total_bars` observations.
pub fn annualized_return(total_return: f64, total_bars: usize, bars_per_year: f64) -> f64 {
    if total_bars == 0 || bars_per_year <= 0.0 {
        return 0.0;
    }
    let ratio = 1.0 + total_return;
    if ratio <= 0.0 {
        return -1.0;
    }
    ratio.powf(bars_per_year / total_bars as f64) - 1.0
}

/// Annualized return over the magnitude of the max drawdown; zero when the
/// curve never drew down.
pub fn calmar_ratio(annualized_return: f64, max_drawdown: f64) -> f64 {
    if max_drawdown == 0.0 {
        return 0.0;
    }
    annualized_return / max_drawdown.abs()
}

/// Gross profit over gross loss. `None` when there are no losing trades, so
/// an all-winner run stays well-defined instead of dividing by zero.
pub fn profit_factor(trades: &[Trade]) -> Option<f64> {
    let (gross_profit, gross_loss) = gross_profit_loss(trades);
    if gross_loss > Decimal::ZERO {
        Some((gross_profit / gross_loss).to_f64().unwrap_or(0.0))
    } else {
        None
    }
}

/// Sum of winning pnl and absolute sum of losing pnl.
pub fn gross_profit_loss(trades: &[Trade]) -> (Decimal, Decimal) {
    let gross_profit: Decimal = trades
        .iter()
        .filter(|t| t.pnl > Decimal::ZERO)
        .map(|t| t.pnl)
        .sum();
    let gross_loss: Decimal = trades
        .iter()
        .filter(|t| t.pnl < Decimal::ZERO)
        .map(|t| t.pnl.abs())
        .sum();
    (gross_profit, gross_loss)
}

/// Fraction of trades with positive pnl; zero when there are no trades.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let wins = trades.iter().filter(|t| t.pnl > Decimal::ZERO).count();
    wins as f64 / trades.len() as f64
}

/// Longest winning and losing streaks, in trade order.
pub fn max_consecutive_streaks(trades: &[Trade]) -> (usize, usize) {
    let mut max_wins = 0;
    let mut max_losses = 0;
    let mut wins = 0;
    let mut losses = 0;
    for trade in trades {
        if trade.pnl > Decimal::ZERO {
            wins += 1;
            losses = 0;
            max_wins = max_wins.max(wins);
        } else if trade.pnl < Decimal::ZERO {
            losses += 1;
            wins = 0;
            max_losses = max_losses.max(losses);
        } else {
            wins = 0;
            losses = 0;
        }
    }
    (max_wins, max_losses)
}

/// Sample standard deviation of per-fold Sharpe ratios across included folds.
/// High dispersion flags an unstable edge even when the pooled Sharpe looks
/// good.
pub fn fold_sharpe_std(folds: &[FoldResult]) -> f64 {
    let sharpes: Vec<f64> = folds
        .iter()
        .filter(|f| !f.excluded)
        .map(|f| f.sharpe)
        .collect();
    if sharpes.len() < 2 {
        return 0.0;
    }
    let m = mean(&sharpes);
    sample_std(&sharpes, m)
}

/// Fraction of included folds with a positive test-window return.
pub fn pct_profitable_folds(folds: &[FoldResult]) -> f64 {
    let included: Vec<&FoldResult> = folds.iter().filter(|f| !f.excluded).collect();
    if included.is_empty() {
        return 0.0;
    }
    let profitable = included.iter().filter(|f| f.fold_return > 0.0).count();
    profitable as f64 / included.len() as f64
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std(values: &[f64], mean: f64) -> f64 {
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
        / (values.len() as f64 - 1.0);
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use crate::models::{Direction, ExitReason};

    fn curve(values: &[f64]) -> Vec<EquityPoint> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| EquityPoint {
                timestamp: start + Duration::days(i as i64),
                equity: Decimal::from_f64(*v).unwrap(),
                drawdown_pct: 0.0,
            })
            .collect()
    }

    fn trade(pnl: i64) -> Trade {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Trade {
            trade_id: 0,
            symbol: "TEST".into(),
            direction: Direction::Long,
            entry_time: t,
            exit_time: t,
            entry_price: Decimal::new(100, 0),
            exit_price: Decimal::new(100, 0),
            quantity: Decimal::ONE,
            pnl: Decimal::new(pnl, 0),
            pnl_pct: pnl as f64 / 100.0,
            holding_bars: 1,
            exit_reason: ExitReason::Signal,
            slippage_cost: Decimal::ZERO,
            commission_cost: Decimal::ZERO,
            funding_cost: Decimal::ZERO,
        }
    }

    #[test]
    fn anchored_returns_prepend_the_first_bar() {
        let c = curve(&[102.0, 104.04]);
        let plain = equity_returns(&c);
        assert_eq!(plain.len(), 1);
        assert!((plain[0] - 0.02).abs() < 1e-12);

        let anchored = equity_returns_from(Decimal::new(100, 0), &c);
        assert_eq!(anchored.len(), 2);
        assert!((anchored[0] - 0.02).abs() < 1e-12);
        assert!((anchored[1] - 0.02).abs() < 1e-12);
    }

    #[test]
    fn zero_variance_returns_give_zero_ratios() {
        let flat = vec![0.0; 50];
        assert_eq!(sharpe_ratio(&flat, 252.0), 0.0);
        assert_eq!(sortino_ratio(&flat, 252.0), 0.0);

        let constant = vec![0.01; 50];
        assert_eq!(sharpe_ratio(&constant, 252.0), 0.0);
        // No negative returns at all: downside deviation is undefined.
        assert_eq!(sortino_ratio(&constant, 252.0), 0.0);
    }

    #[test]
    fn sharpe_is_positive_for_drifting_returns() {
        let returns: Vec<f64> = (0..100)
            .map(|i| if i % 2 == 0 { 0.02 } else { -0.005 })
            .collect();
        assert!(sharpe_ratio(&returns, 252.0) > 0.0);
        assert!(sortino_ratio(&returns, 252.0) > 0.0);
    }

    #[test]
    fn max_drawdown_is_zero_or_negative() {
        assert_eq!(max_drawdown(&curve(&[100.0, 110.0, 121.0])), 0.0);

        let dd = max_drawdown(&curve(&[100.0, 120.0, 90.0, 95.0]));
        assert!((dd - (-0.25)).abs() < 1e-12);
    }

    #[test]
    fn profit_factor_sentinel_without_losers() {
        assert_eq!(profit_factor(&[]), None);
        assert_eq!(profit_factor(&[trade(10), trade(5)]), None);

        let pf = profit_factor(&[trade(30), trade(-10)]).unwrap();
        assert!((pf - 3.0).abs() < 1e-12);
    }

    #[test]
    fn win_rate_handles_empty_trade_list() {
        assert_eq!(win_rate(&[]), 0.0);
        let wr = win_rate(&[trade(10), trade(-5), trade(0), trade(7)]);
        assert!((wr - 0.5).abs() < 1e-12);
    }

    #[test]
    fn streaks_reset_on_flat_trades() {
        let trades = vec![trade(1), trade(2), trade(0), trade(3), trade(-1), trade(-2)];
        assert_eq!(max_consecutive_streaks(&trades), (2, 2));
    }

    #[test]
    fn annualized_return_degenerates_safely() {
        assert_eq!(annualized_return(0.5, 0, 252.0), 0.0);
        assert_eq!(annualized_return(-1.5, 252, 252.0), -1.0);
        let one_year = annualized_return(0.10, 252, 252.0);
        assert!((one_year - 0.10).abs() < 1e-12);
    }

    #[test]
    fn calmar_zero_when_no_drawdown() {
        assert_eq!(calmar_ratio(0.2, 0.0), 0.0);
        assert!((calmar_ratio(0.2, -0.1) - 2.0).abs() < 1e-12);
    }
}
