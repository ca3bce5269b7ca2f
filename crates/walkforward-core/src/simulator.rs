use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;

use crate::costs::CostModel;
use crate::models::{
    BacktestConfig, Bar, Direction, EquityPoint, ExitReason, Signal, TiePolicy, Trade,
};

/// Simulates trade lifecycles across one fold's test slice.
///
/// State machine per position: flat -> open -> closed by target, stop,
/// timeout or signal. At most one position is open at a time; an opposing or
/// flat signal closes it but never flips directly into a new one.
pub struct TradeSimulator<'a> {
    config: &'a BacktestConfig,
    costs: &'a CostModel,
}

/// Output of one fold simulation.
#[derive(Debug, Clone)]
pub struct SimRun {
    pub trades: Vec<Trade>,
    /// One mark-to-market point per test bar.
    pub equity_points: Vec<EquityPoint>,
    pub end_equity: Decimal,
}

struct OpenPosition {
    direction: Direction,
    entry_bar: usize,
    entry_time: DateTime<Utc>,
    entry_price: Decimal,
    quantity: Decimal,
    stop_price: Decimal,
    target_price: Decimal,
    max_exit_bar: usize,
    entry_slippage: Decimal,
    entry_commission: Decimal,
    funding_per_bar: Decimal,
    funding_accrued: Decimal,
}

impl<'a> TradeSimulator<'a> {
    pub fn new(config: &'a BacktestConfig, costs: &'a CostModel) -> Self {
        Self { config, costs }
    }

    /// Run the state machine over `test_start..test_end` of `series`.
    ///
    /// `signals[j]` belongs to absolute bar `test_start + j`; `atr[i]` is the
    /// ATR at absolute bar `i` (train history included, so stops computed at
    /// the first test bars still have lookback). A position left open at the
    /// fold boundary is closed at the last bar's close.
    pub fn run(
        &self,
        series: &[Bar],
        test_start: usize,
        test_end: usize,
        signals: &[Signal],
        atr: &[Option<Decimal>],
        start_equity: Decimal,
    ) -> SimRun {
        debug_assert_eq!(signals.len(), test_end - test_start);

        let mut cash = start_equity;
        let mut peak = start_equity;
        let mut position: Option<OpenPosition> = None;
        let mut pending: Option<(Direction, usize)> = None;
        let mut trades: Vec<Trade> = Vec::new();
        let mut equity_points = Vec::with_capacity(test_end - test_start);

        for i in test_start..test_end {
            let bar = &series[i];
            let signal = signals[i - test_start];
            let last_bar = i + 1 == test_end;
            let mut closed_this_bar = false;

            // 1. Exit checks, evaluated from the bar after entry. Priority:
            //    target, stop (tie per policy), timeout, then signal.
            if let Some(pos) = position.as_mut() {
                if i > pos.entry_bar {
                    pos.funding_accrued += pos.funding_per_bar;
                }
            }
            if position.as_ref().is_some_and(|p| i > p.entry_bar) {
                if let Some(pos) = position.take() {
                    match Self::exit_trigger(&pos, bar, i, signal, self.config.tie_policy) {
                        Some((reason, raw_price)) => {
                            trades.push(self.close(pos, bar, i, raw_price, reason, &mut cash));
                            closed_this_bar = true;
                        }
                        None => position = Some(pos),
                    }
                }
            }

            // 2. Fill a pending delayed entry at this bar's open.
            if let Some((direction, fill_bar)) = pending {
                if fill_bar == i && position.is_none() {
                    pending = None;
                    position = self.open(direction, series, i, atr, cash);
                }
            }

            // 3. A non-flat signal while flat schedules an entry at bar
            //    `i + delay_bars`'s open. The decision is committed once
            //    made; the bar that closed a position cannot also reopen.
            if position.is_none() && pending.is_none() && !closed_this_bar {
                if let Some(direction) = signal.direction() {
                    let fill_bar = i + self.costs.delay_bars;
                    if fill_bar < test_end {
                        if fill_bar == i {
                            position = self.open(direction, series, i, atr, cash);
                        } else {
                            pending = Some((direction, fill_bar));
                        }
                    }
                }
            }

            // 4. Fold boundary: whatever is still open goes out at the close.
            if last_bar {
                if let Some(pos) = position.take() {
                    trades.push(self.close(pos, bar, i, bar.close, ExitReason::Timeout, &mut cash));
                }
            }

            // 5. Mark-to-market at the close.
            let equity = cash
                + position
                    .as_ref()
                    .map_or(Decimal::ZERO, |p| Self::open_pnl(p, bar.close));
            peak = peak.max(equity);
            equity_points.push(EquityPoint {
                timestamp: bar.timestamp,
                equity,
                drawdown_pct: drawdown_fraction(equity, peak),
            });
        }

        SimRun {
            trades,
            equity_points,
            end_equity: cash,
        }
    }

    fn exit_trigger(
        pos: &OpenPosition,
        bar: &Bar,
        i: usize,
        signal: Signal,
        tie_policy: TiePolicy,
    ) -> Option<(ExitReason, Decimal)> {
        let (target_hit, stop_hit) = match pos.direction {
            Direction::Long => (bar.high >= pos.target_price, bar.low <= pos.stop_price),
            Direction::Short => (bar.low <= pos.target_price, bar.high >= pos.stop_price),
        };
        let target = (
            ExitReason::Target,
            gap_fill(bar.open, pos.target_price, pos.direction, true),
        );
        let stop = (
            ExitReason::Stop,
            gap_fill(bar.open, pos.stop_price, pos.direction, false),
        );
        match (target_hit, stop_hit) {
            (true, true) => Some(match tie_policy {
                TiePolicy::StopWins => stop,
                TiePolicy::TargetWins => target,
            }),
            (true, false) => Some(target),
            (false, true) => Some(stop),
            (false, false) => {
                if i >= pos.max_exit_bar {
                    Some((ExitReason::Timeout, bar.close))
                } else if signal.direction() != Some(pos.direction) {
                    Some((ExitReason::Signal, bar.close))
                } else {
                    None
                }
            }
        }
    }

    fn open(
        &self,
        direction: Direction,
        series: &[Bar],
        i: usize,
        atr: &[Option<Decimal>],
        equity: Decimal,
    ) -> Option<OpenPosition> {
        // No ATR yet means no stop distance: the signal degrades to flat.
        let atr_value = atr[i]?;
        if atr_value <= Decimal::ZERO || equity <= Decimal::ZERO {
            return None;
        }
        let stop_mult = Decimal::from_f64(self.config.atr_stop_mult)?;
        let target_mult = Decimal::from_f64(self.config.atr_target_mult)?;
        let risk_pct = Decimal::from_f64(self.config.risk_per_trade_pct)?;
        let max_pct = Decimal::from_f64(self.config.max_position_pct)?;

        let fill = self.costs.apply_entry(direction, series[i].open);
        let entry_price = fill.price;
        if entry_price <= Decimal::ZERO {
            return None;
        }
        let stop_distance = stop_mult * atr_value;
        let (stop_price, target_price) = match direction {
            Direction::Long => (
                entry_price - stop_distance,
                entry_price + target_mult * atr_value,
            ),
            Direction::Short => (
                entry_price + stop_distance,
                entry_price - target_mult * atr_value,
            ),
        };

        // Risk a fixed equity fraction against the stop distance, capped by
        // the position limit.
        let notional = (risk_pct * equity * entry_price / stop_distance).min(max_pct * equity);
        if notional <= Decimal::ZERO {
            return None;
        }
        let quantity = notional / entry_price;

        Some(OpenPosition {
            direction,
            entry_bar: i,
            entry_time: series[i].timestamp,
            entry_price,
            quantity,
            stop_price,
            target_price,
            max_exit_bar: i + self.config.max_holding_bars,
            entry_slippage: fill.slippage_per_unit * quantity,
            entry_commission: fill.commission_per_unit * quantity,
            funding_per_bar: self.costs.funding_per_bar(notional, self.config.bars_per_year),
            funding_accrued: Decimal::ZERO,
        })
    }

    fn close(
        &self,
        pos: OpenPosition,
        bar: &Bar,
        i: usize,
        raw_exit: Decimal,
        reason: ExitReason,
        cash: &mut Decimal,
    ) -> Trade {
        let fill = self.costs.apply_exit(pos.direction, raw_exit);
        let exit_commission = fill.commission_per_unit * pos.quantity;
        let exit_slippage = fill.slippage_per_unit * pos.quantity;
        let gross = pos.direction.sign() * (fill.price - pos.entry_price) * pos.quantity;
        let pnl = gross - pos.entry_commission - exit_commission - pos.funding_accrued;
        *cash += pnl;

        let entry_notional = pos.entry_price * pos.quantity;
        let pnl_pct = if entry_notional > Decimal::ZERO {
            (pnl / entry_notional).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };

        Trade {
            trade_id: 0, // renumbered during aggregation
            symbol: self.config.symbol.clone(),
            direction: pos.direction,
            entry_time: pos.entry_time,
            exit_time: bar.timestamp,
            entry_price: pos.entry_price,
            exit_price: fill.price,
            quantity: pos.quantity,
            pnl,
            pnl_pct,
            holding_bars: i - pos.entry_bar,
            exit_reason: reason,
            slippage_cost: pos.entry_slippage + exit_slippage,
            commission_cost: pos.entry_commission + exit_commission,
            funding_cost: pos.funding_accrued,
        }
    }

    /// Unrealized P&L of an open position marked at `close`, net of the entry
    /// commission and funding accrued so far.
    fn open_pnl(pos: &OpenPosition, close: Decimal) -> Decimal {
        pos.direction.sign() * (close - pos.entry_price) * pos.quantity
            - pos.entry_commission
            - pos.funding_accrued
    }
}

/// Fill price for a stop/target level, taking the bar's open instead when the
/// bar gapped through the level overnight.
fn gap_fill(open: Decimal, level: Decimal, direction: Direction, is_target: bool) -> Decimal {
    let beyond = match (direction, is_target) {
        // Levels above the market: long targets and short stops.
        (Direction::Long, true) | (Direction::Short, false) => open >= level,
        // Levels below: long stops and short targets.
        _ => open <= level,
    };
    if beyond {
        open
    } else {
        level
    }
}

fn drawdown_fraction(equity: Decimal, peak: Decimal) -> f64 {
    if peak <= Decimal::ZERO {
        return 0.0;
    }
    let ratio = (equity / peak).to_f64().unwrap_or(1.0);
    (ratio - 1.0).min(0.0)
}
