use rust_decimal::Decimal;

use crate::models::Bar;

/// Wilder-smoothed Average True Range, aligned to `bars`.
///
/// Entry `i` is the ATR of the window ending at bar `i`, or `None` while
/// fewer than `period + 1` bars of history exist. The recurrence only looks
/// backwards, so a series-wide pass stays causal at every index.
pub fn atr_series(bars: &[Bar], period: usize) -> Vec<Option<Decimal>> {
    let mut out = vec![None; bars.len()];
    if period == 0 || bars.len() < period + 1 {
        return out;
    }

    let true_ranges: Vec<Decimal> = (1..bars.len())
        .map(|i| {
            let high_low = bars[i].high - bars[i].low;
            let high_close = (bars[i].high - bars[i - 1].close).abs();
            let low_close = (bars[i].low - bars[i - 1].close).abs();
            high_low.max(high_close).max(low_close)
        })
        .collect();

    let period_dec = Decimal::from(period as u64);
    let mut atr = true_ranges[..period].iter().copied().sum::<Decimal>() / period_dec;
    out[period] = Some(atr);
    for i in (period + 1)..bars.len() {
        atr = (atr * (period_dec - Decimal::ONE) + true_ranges[i - 1]) / period_dec;
        out[i] = Some(atr);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: usize, high: i64, low: i64, close: i64) -> Bar {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Bar {
            timestamp: start + Duration::days(i as i64),
            open: Decimal::new(close, 0),
            high: Decimal::new(high, 0),
            low: Decimal::new(low, 0),
            close: Decimal::new(close, 0),
            volume: 1_000,
        }
    }

    #[test]
    fn unavailable_until_enough_history() {
        let bars: Vec<Bar> = (0..5).map(|i| bar(i, 102, 98, 100)).collect();
        let atr = atr_series(&bars, 3);
        assert_eq!(atr[0], None);
        assert_eq!(atr[2], None);
        assert!(atr[3].is_some());
        assert!(atr[4].is_some());
    }

    #[test]
    fn constant_range_yields_constant_atr() {
        // Every bar spans exactly 4 points, so TR is 4 everywhere and the
        // Wilder smoothing is a fixed point.
        let bars: Vec<Bar> = (0..20).map(|i| bar(i, 102, 98, 100)).collect();
        for value in atr_series(&bars, 14).into_iter().flatten() {
            assert_eq!(value, Decimal::new(4, 0));
        }
    }

    #[test]
    fn gap_extends_true_range() {
        // A close-to-close gap wider than the bar range dominates the TR.
        let bars = vec![bar(0, 102, 98, 100), bar(1, 122, 118, 120)];
        let atr = atr_series(&bars, 1);
        // TR = max(122-118, |122-100|, |118-100|) = 22.
        assert_eq!(atr[1], Some(Decimal::new(22, 0)));
    }

    #[test]
    fn short_series_is_all_none() {
        let bars: Vec<Bar> = (0..10).map(|i| bar(i, 102, 98, 100)).collect();
        assert!(atr_series(&bars, 14).iter().all(Option::is_none));
        assert!(atr_series(&bars, 0).iter().all(Option::is_none));
    }
}
