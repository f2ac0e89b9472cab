//! Signal builder: flattens classified pivots into symbol-tagged records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::hits::ClassifiedPivot;
use crate::domain::Direction;

/// A pivot with at least one prior hit, ready for filtering and export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub date: NaiveDate,
    pub trade: Direction,
    pub prior_hits_count: usize,
    pub prior_hit_dates: Vec<NaiveDate>,
    pub recent_hits_count: usize,
    pub recent_hit_dates: Vec<NaiveDate>,
    pub recent_hits_on_greater_volume_count: usize,
    pub recent_hits_on_greater_volume_dates: Vec<NaiveDate>,
    pub absorption_volume: bool,
    pub all_recent_hits_decreasing: Option<bool>,
    pub below_avg_vol: bool,
    pub outer_pivot_on_lower_volume: bool,
    pub outer_pivot_on_lower_volume_date: Option<NaiveDate>,
    /// Pivot extreme: low for long, high for short.
    pub price: f64,
    pub volume: u64,
    pub trailing_avg_volume: Option<f64>,
    pub close: f64,
    pub next_day_close: Option<f64>,
}

impl Signal {
    fn from_pivot(symbol: &str, pivot: &ClassifiedPivot) -> Self {
        let dates = |hits: &[super::hits::Hit]| hits.iter().map(|h| h.date).collect::<Vec<_>>();
        Self {
            symbol: symbol.to_string(),
            date: pivot.date(),
            trade: pivot.direction,
            prior_hits_count: pivot.prior_hits_count(),
            prior_hit_dates: dates(&pivot.prior_hits),
            recent_hits_count: pivot.recent_hits_count(),
            recent_hit_dates: dates(&pivot.recent_hits),
            recent_hits_on_greater_volume_count: pivot.recent_hits_on_greater_volume_count(),
            recent_hits_on_greater_volume_dates: dates(&pivot.recent_hits_on_greater_volume),
            absorption_volume: pivot.absorption_volume,
            all_recent_hits_decreasing: pivot.all_recent_hits_decreasing,
            below_avg_vol: pivot.below_avg_vol,
            outer_pivot_on_lower_volume: pivot.outer_pivot_on_lower_volume,
            outer_pivot_on_lower_volume_date: pivot.outer_pivot_on_lower_volume_date,
            price: pivot.price(),
            volume: pivot.volume(),
            trailing_avg_volume: pivot.bar.trailing_avg_volume,
            close: pivot.bar.bar.close,
            next_day_close: pivot.bar.next_day_close,
        }
    }
}

/// Emit one signal per pivot that has prior hits, preserving pivot order.
///
/// Pivots classified for the other direction are skipped with a warning.
pub fn build_signals(direction: Direction, pivots: &[ClassifiedPivot], symbol: &str) -> Vec<Signal> {
    pivots
        .iter()
        .filter(|p| {
            if p.direction != direction {
                log::warn!("{symbol} - skipping {} pivot in {direction} scan", p.direction);
                return false;
            }
            p.prior_hits_count() > 0
        })
        .map(|p| Signal::from_pivot(symbol, p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{find_hits, mark_all_pivots, HitParams};
    use crate::domain::Bar;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn bar(day: u32, high: f64, low: f64, volume: u64) -> Bar {
        Bar::new(d(day), high, low, (high + low) / 2.0, volume)
    }

    /// Three pivot lows at the same level, the last on lower volume than the others.
    fn retest_series() -> Vec<Bar> {
        vec![
            bar(1, 12.0, 11.0, 100),
            bar(2, 11.5, 10.0, 900),
            bar(3, 12.0, 11.0, 100),
            bar(4, 11.5, 10.0, 600),
            bar(5, 12.0, 11.0, 100),
            bar(6, 11.5, 10.0, 200),
            bar(7, 12.0, 11.0, 100),
        ]
    }

    #[test]
    fn zero_prior_hit_pivots_are_dropped() {
        let series = mark_all_pivots(&retest_series(), 14);
        assert_eq!(series.pivot_lows, vec![1, 3, 5]);

        let pivots = find_hits("ABC", Direction::Long, &series.bars, &series.pivot_lows, &HitParams::default()).unwrap();
        let signals = build_signals(Direction::Long, &pivots, "ABC");

        assert_eq!(signals.len(), 2);
        assert!(signals.iter().all(|s| s.prior_hits_count > 0));
        assert_eq!(signals[0].date, d(4));
        assert_eq!(signals[1].date, d(6));
    }

    #[test]
    fn signal_carries_classifier_fields() {
        let series = mark_all_pivots(&retest_series(), 14);
        let pivots = find_hits("ABC", Direction::Long, &series.bars, &series.pivot_lows, &HitParams::default()).unwrap();
        let signals = build_signals(Direction::Long, &pivots, "ABC");
        let last = &signals[1];

        assert_eq!(last.symbol, "ABC");
        assert_eq!(last.trade, Direction::Long);
        assert_eq!(last.prior_hit_dates, vec![d(2), d(4)]);
        assert_eq!(last.recent_hits_on_greater_volume_count, 2);
        assert_eq!(last.all_recent_hits_decreasing, Some(true));
        assert_eq!(last.price, 10.0);
        assert_eq!(last.volume, 200);
        assert_eq!(last.close, 10.75);
        assert_eq!(last.next_day_close, Some(11.5));
        // Too few bars for a trailing average.
        assert_eq!(last.trailing_avg_volume, None);
        assert!(!last.absorption_volume);
    }

    #[test]
    fn most_recent_bar_has_unknown_next_close() {
        let mut bars = retest_series();
        bars.pop();
        let series = mark_all_pivots(&bars, 14);
        // The final low is compared only to its predecessor.
        assert_eq!(series.pivot_lows, vec![1, 3, 5]);

        let pivots = find_hits("ABC", Direction::Long, &series.bars, &series.pivot_lows, &HitParams::default()).unwrap();
        let signals = build_signals(Direction::Long, &pivots, "ABC");
        assert_eq!(signals.last().unwrap().next_day_close, None);
    }

    #[test]
    fn pivots_of_the_other_direction_are_skipped() {
        let series = mark_all_pivots(&retest_series(), 14);
        let longs = find_hits("ABC", Direction::Long, &series.bars, &series.pivot_lows, &HitParams::default()).unwrap();
        assert_eq!(build_signals(Direction::Long, &longs, "ABC").len(), 2);

        assert!(build_signals(Direction::Short, &longs, "ABC").is_empty());

        let mut mixed = longs.clone();
        mixed[2].direction = Direction::Short;
        let signals = build_signals(Direction::Long, &mixed, "ABC");
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].date, d(4));
    }

    #[test]
    fn empty_input_builds_nothing() {
        assert!(build_signals(Direction::Short, &[], "ABC").is_empty());
    }
}
