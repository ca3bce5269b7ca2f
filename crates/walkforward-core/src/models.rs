use std::ops::Range;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::BacktestError;
use crate::metrics;

/// A single OHLCV bar.
///
/// The engine assumes a strictly increasing time index; gap handling is the
/// data collaborator's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

/// Per-bar strategy output: long (+1), short (-1) or flat (0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Long,
    Short,
    Flat,
}

impl Signal {
    pub fn as_i8(self) -> i8 {
        match self {
            Signal::Long => 1,
            Signal::Short => -1,
            Signal::Flat => 0,
        }
    }

    /// Parse a raw {-1, 0, 1} value; anything else breaks the strategy contract.
    pub fn from_i8(raw: i8) -> Result<Self, BacktestError> {
        match raw {
            1 => Ok(Signal::Long),
            -1 => Ok(Signal::Short),
            0 => Ok(Signal::Flat),
            other => Err(BacktestError::StrategyContract(format!(
                "invalid signal value {other}, expected -1, 0 or 1"
            ))),
        }
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            Signal::Long => Some(Direction::Long),
            Signal::Short => Some(Direction::Short),
            Signal::Flat => None,
        }
    }
}

/// Side of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short, as a decimal multiplier for P&L math.
    pub fn sign(self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Walk-forward window mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    /// Train window grows monotonically from the series start.
    Expanding,
    /// Fixed-size train window slides forward.
    Rolling,
}

/// Resolution for a bar whose range crosses both the stop and the target.
///
/// Intrabar path order is unknowable from OHLC data, so the conservative
/// default assumes the stop filled first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    #[default]
    StopWins,
    TargetWins,
}

/// Configuration for one walk-forward run. Constructed once at the call
/// boundary and fully specified; there are no hidden module-level defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub symbol: String,
    /// Train window length in bars (fixed size under rolling windows).
    pub train_window: usize,
    /// Test window length in bars per fold.
    pub test_window: usize,
    pub window_type: WindowType,
    /// Smallest train window the planner will accept; seeds expanding windows.
    pub min_train_size: usize,
    pub initial_capital: Decimal,
    /// Cap on a single position's notional as a fraction of current equity.
    pub max_position_pct: f64,
    /// Fraction of current equity at risk between entry and stop.
    pub risk_per_trade_pct: f64,
    pub atr_stop_mult: f64,
    pub atr_target_mult: f64,
    /// ATR lookback used to size stop/target distances.
    pub atr_period: usize,
    /// Bars after which an open position is closed at the bar close.
    pub max_holding_bars: usize,
    /// Folds with fewer trades than this are excluded from the aggregate.
    pub require_min_trades: usize,
    /// Bars per year for annualization (252 for daily bars).
    pub bars_per_year: f64,
    #[serde(default)]
    pub tie_policy: TiePolicy,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            train_window: 252,
            test_window: 63,
            window_type: WindowType::Rolling,
            min_train_size: 126,
            initial_capital: Decimal::new(100_000, 0),
            max_position_pct: 0.25,
            risk_per_trade_pct: 0.01,
            atr_stop_mult: 2.0,
            atr_target_mult: 3.0,
            atr_period: 14,
            max_holding_bars: 20,
            require_min_trades: 3,
            bars_per_year: 252.0,
            tie_policy: TiePolicy::StopWins,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.train_window == 0 {
            return Err(BacktestError::InvalidConfig(
                "train_window must be positive".into(),
            ));
        }
        if self.test_window == 0 {
            return Err(BacktestError::InvalidConfig(
                "test_window must be positive".into(),
            ));
        }
        if self.min_train_size == 0 || self.min_train_size > self.train_window {
            return Err(BacktestError::InvalidConfig(format!(
                "min_train_size must be in 1..={}, got {}",
                self.train_window, self.min_train_size
            )));
        }
        if self.initial_capital <= Decimal::ZERO {
            return Err(BacktestError::InvalidConfig(
                "initial_capital must be positive".into(),
            ));
        }
        if !(self.max_position_pct > 0.0 && self.max_position_pct <= 1.0) {
            return Err(BacktestError::InvalidConfig(
                "max_position_pct must be in (0, 1]".into(),
            ));
        }
        if !(self.risk_per_trade_pct > 0.0 && self.risk_per_trade_pct <= 1.0) {
            return Err(BacktestError::InvalidConfig(
                "risk_per_trade_pct must be in (0, 1]".into(),
            ));
        }
        if self.atr_stop_mult <= 0.0 || self.atr_target_mult <= 0.0 {
            return Err(BacktestError::InvalidConfig(
                "ATR multipliers must be positive".into(),
            ));
        }
        if self.atr_period == 0 {
            return Err(BacktestError::InvalidConfig(
                "atr_period must be positive".into(),
            ));
        }
        if self.max_holding_bars == 0 {
            return Err(BacktestError::InvalidConfig(
                "max_holding_bars must be positive".into(),
            ));
        }
        if self.bars_per_year <= 0.0 {
            return Err(BacktestError::InvalidConfig(
                "bars_per_year must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// One (train, test) pair produced by the window planner.
///
/// Ranges are half-open bar-index ranges into the shared series; the train
/// range always ends where the test range begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub fold_index: usize,
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

impl Fold {
    pub fn train_range(&self) -> Range<usize> {
        self.train_start..self.train_end
    }

    pub fn test_range(&self) -> Range<usize> {
        self.test_start..self.test_end
    }

    pub fn train_len(&self) -> usize {
        self.train_end - self.train_start
    }

    pub fn test_len(&self) -> usize {
        self.test_end - self.test_start
    }
}

/// Why a trade left the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Target,
    Stop,
    Timeout,
    Signal,
}

/// A completed round-trip trade. Mutated only during its own lifecycle,
/// immutable once closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: u64,
    pub symbol: String,
    pub direction: Direction,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    /// Fill price after slippage and half-spread.
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    /// Net of commission and funding; slippage is embedded in the fill prices.
    pub pnl: Decimal,
    /// `pnl` as a fraction of entry notional.
    pub pnl_pct: f64,
    pub holding_bars: usize,
    pub exit_reason: ExitReason,
    pub slippage_cost: Decimal,
    pub commission_cost: Decimal,
    pub funding_cost: Decimal,
}

/// A point on an equity curve, marked at the bar close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: Decimal,
    /// Distance from the running peak, as a zero-or-negative fraction.
    pub drawdown_pct: f64,
}

/// Summary of one fold's out-of-sample run. Created once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold: Fold,
    pub trades: Vec<Trade>,
    pub equity_points: Vec<EquityPoint>,
    pub start_equity: Decimal,
    pub end_equity: Decimal,
    /// Fractional return over the fold's test window.
    pub fold_return: f64,
    pub sharpe: f64,
    pub num_trades: usize,
    /// True when the fold fell short of `require_min_trades` and contributes
    /// no weight to the aggregate statistics.
    pub excluded: bool,
}

/// Aggregate results over all folds of one walk-forward run. Read-only once
/// built; a zero-trade result is still a valid, comparable object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResults {
    pub symbol: String,
    pub initial_capital: Decimal,
    pub final_equity: Decimal,
    /// Fractional return over all included test windows.
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Zero-or-negative fraction.
    pub max_drawdown: f64,
    pub calmar_ratio: f64,
    /// Fraction of trades with positive pnl.
    pub win_rate: f64,
    /// `None` when there are no losing trades.
    pub profit_factor: Option<f64>,
    pub total_trades: usize,
    /// Dispersion of per-fold Sharpe ratios; a high value flags instability.
    pub fold_sharpe_std: f64,
    pub pct_profitable_folds: f64,
    pub all_trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub folds: Vec<FoldResult>,
}

impl BacktestResults {
    /// Flat key/value view for the reporting collaborator to serialize.
    pub fn summary(&self) -> serde_json::Value {
        let (gross_profit, gross_loss) = metrics::gross_profit_loss(&self.all_trades);
        let (max_win_streak, max_loss_streak) = metrics::max_consecutive_streaks(&self.all_trades);
        json!({
            "symbol": self.symbol,
            "initial_capital": self.initial_capital,
            "final_equity": self.final_equity,
            "total_return": self.total_return,
            "annualized_return": self.annualized_return,
            "sharpe_ratio": self.sharpe_ratio,
            "sortino_ratio": self.sortino_ratio,
            "max_drawdown": self.max_drawdown,
            "calmar_ratio": self.calmar_ratio,
            "win_rate": self.win_rate,
            "profit_factor": self.profit_factor,
            "total_trades": self.total_trades,
            "num_folds": self.folds.len(),
            "excluded_folds": self.folds.iter().filter(|f| f.excluded).count(),
            "fold_sharpe_std": self.fold_sharpe_std,
            "pct_profitable_folds": self.pct_profitable_folds,
            "gross_profit": gross_profit,
            "gross_loss": gross_loss,
            "max_consecutive_wins": max_win_streak,
            "max_consecutive_losses": max_loss_streak,
        })
    }

    /// All aggregated trades in execution order.
    pub fn trade_log(&self) -> &[Trade] {
        &self.all_trades
    }
}
