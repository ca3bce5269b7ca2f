use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Direction;

/// Parametric execution-cost model.
///
/// Immutable once constructed and shared by reference across every simulated
/// trade in a run. All price arithmetic stays in `Decimal`; no binary floats
/// touch the money path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostModel {
    pub slippage_bps: Decimal,
    pub commission_bps: Decimal,
    pub spread_bps: Decimal,
    /// Bars between the signal decision and the entry fill. Consumed by the
    /// trade simulator, not by the price adjustment itself.
    pub delay_bars: usize,
    pub funding_rate_daily_bps: Decimal,
}

/// One cost-adjusted fill. Cost components are per unit of quantity; the
/// simulator scales them once the position size is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    pub price: Decimal,
    pub slippage_per_unit: Decimal,
    pub commission_per_unit: Decimal,
}

const BPS_SCALE: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

impl CostModel {
    /// Frictionless model, useful as a baseline.
    pub fn zero() -> Self {
        Self {
            slippage_bps: Decimal::ZERO,
            commission_bps: Decimal::ZERO,
            spread_bps: Decimal::ZERO,
            delay_bars: 0,
            funding_rate_daily_bps: Decimal::ZERO,
        }
    }

    /// Entry fill: slippage plus half the spread shift the price against the
    /// trader, commission is charged on the adjusted notional.
    pub fn apply_entry(&self, direction: Direction, raw_price: Decimal) -> Fill {
        self.fill(direction, raw_price, true)
    }

    /// Exit fill: same adverse shift, on the opposite side of the book.
    pub fn apply_exit(&self, direction: Direction, raw_price: Decimal) -> Fill {
        self.fill(direction, raw_price, false)
    }

    fn fill(&self, direction: Direction, raw_price: Decimal, entry: bool) -> Fill {
        let adverse_bps = self.slippage_bps + self.spread_bps / Decimal::TWO;
        let shift = raw_price * adverse_bps / BPS_SCALE;
        // Entering long and exiting short are buys; buys fill higher,
        // sells fill lower.
        let buying = matches!(
            (direction, entry),
            (Direction::Long, true) | (Direction::Short, false)
        );
        let price = if buying {
            raw_price + shift
        } else {
            raw_price - shift
        };
        Fill {
            price,
            slippage_per_unit: shift,
            commission_per_unit: price * self.commission_bps / BPS_SCALE,
        }
    }

    /// Funding accrued per held bar on the entry notional.
    ///
    /// The daily rate is rescaled to the bar interval via `bars_per_year`
    /// (one bar of a 252-bar year carries ~1.45 calendar days of funding).
    pub fn funding_per_bar(&self, entry_notional: Decimal, bars_per_year: f64) -> Decimal {
        if self.funding_rate_daily_bps.is_zero() || bars_per_year <= 0.0 {
            return Decimal::ZERO;
        }
        let days_per_bar = Decimal::from_f64(365.0 / bars_per_year).unwrap_or(Decimal::ONE);
        entry_notional * self.funding_rate_daily_bps / BPS_SCALE * days_per_bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(slippage: i64, commission: i64, spread: i64) -> CostModel {
        CostModel {
            slippage_bps: Decimal::new(slippage, 0),
            commission_bps: Decimal::new(commission, 0),
            spread_bps: Decimal::new(spread, 0),
            delay_bars: 0,
            funding_rate_daily_bps: Decimal::ZERO,
        }
    }

    #[test]
    fn entry_slippage_is_adverse_both_directions() {
        let m = model(10, 0, 0);
        let raw = Decimal::new(100, 0);

        let long = m.apply_entry(Direction::Long, raw);
        assert!(long.price > raw, "long entry must fill above the raw price");

        let short = m.apply_entry(Direction::Short, raw);
        assert!(short.price < raw, "short entry must fill below the raw price");
    }

    #[test]
    fn exit_slippage_is_adverse_both_directions() {
        let m = model(10, 0, 0);
        let raw = Decimal::new(100, 0);

        // Long exit is a sell, short exit is a buy-to-cover.
        assert!(m.apply_exit(Direction::Long, raw).price < raw);
        assert!(m.apply_exit(Direction::Short, raw).price > raw);
    }

    #[test]
    fn half_spread_applies_on_each_side() {
        let m = model(0, 0, 20);
        let raw = Decimal::new(100, 0);
        // 20 bps spread => 10 bps adverse shift per side => 0.10 on 100.
        let fill = m.apply_entry(Direction::Long, raw);
        assert_eq!(fill.price, Decimal::new(10010, 2));
        assert_eq!(fill.slippage_per_unit, Decimal::new(10, 2));
    }

    #[test]
    fn commission_is_direction_independent() {
        let m = model(0, 10, 0);
        let raw = Decimal::new(250, 0);
        let long = m.apply_entry(Direction::Long, raw);
        let short = m.apply_entry(Direction::Short, raw);
        assert_eq!(long.commission_per_unit, short.commission_per_unit);
        assert_eq!(long.commission_per_unit, Decimal::new(25, 2));
    }

    #[test]
    fn zero_model_passes_prices_through() {
        let m = CostModel::zero();
        let raw = Decimal::new(12345, 2);
        let fill = m.apply_entry(Direction::Short, raw);
        assert_eq!(fill.price, raw);
        assert_eq!(fill.slippage_per_unit, Decimal::ZERO);
        assert_eq!(fill.commission_per_unit, Decimal::ZERO);
    }

    #[test]
    fn funding_scales_with_bar_interval() {
        let mut m = CostModel::zero();
        m.funding_rate_daily_bps = Decimal::new(10, 0);
        let notional = Decimal::new(10_000, 0);
        // 365 bars/year => exactly one day of funding per bar => 10 bps of 10k.
        let per_bar = m.funding_per_bar(notional, 365.0);
        assert_eq!(per_bar, Decimal::new(10, 0));
    }
}
