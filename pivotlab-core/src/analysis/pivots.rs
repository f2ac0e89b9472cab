//! Pivot marker.
//!
//! A pivot high is a bar whose high is strictly above both neighbours; a
//! pivot low is symmetric on lows. The most recent bar has no right-hand
//! neighbour yet and is judged against its predecessor only.
//!
//! Fields added per bar: `is_pivot_high`, `is_pivot_low`,
//! `trailing_avg_volume` (from index `lookback` on) and `next_day_close`.

use crate::domain::{Bar, Direction, MarkedBar};

/// Default trailing volume window, in bars.
pub const DEFAULT_LOOKBACK: usize = 14;

/// Marked bars plus index views of the pivots in each polarity.
///
/// `pivot_highs` and `pivot_lows` index into `bars`, ascending by date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkedSeries {
    pub bars: Vec<MarkedBar>,
    pub pivot_highs: Vec<usize>,
    pub pivot_lows: Vec<usize>,
}

impl MarkedSeries {
    /// Pivot indices scanned for a direction: lows for long, highs for short.
    pub fn pivots(&self, direction: Direction) -> &[usize] {
        match direction {
            Direction::Long => &self.pivot_lows,
            Direction::Short => &self.pivot_highs,
        }
    }

    /// Iterate the marked bars behind a pivot index list.
    pub fn pivot_bars(&self, direction: Direction) -> impl Iterator<Item = &MarkedBar> + '_ {
        self.pivots(direction).iter().map(move |&i| &self.bars[i])
    }
}

/// Mark pivots and attach the trailing volume average and next-day close.
///
/// `bars` must be ascending by date. Index 0 is never a pivot.
pub fn mark_all_pivots(bars: &[Bar], lookback: usize) -> MarkedSeries {
    let n = bars.len();
    let mut marked: Vec<MarkedBar> = bars.iter().cloned().map(MarkedBar::unmarked).collect();

    if lookback > 0 && n > lookback {
        // Half-open window [i - lookback, i): today's volume is excluded.
        let mut window_sum: u128 = bars[..lookback].iter().map(|b| b.volume as u128).sum();
        for i in lookback..n {
            marked[i].trailing_avg_volume = Some(window_sum as f64 / lookback as f64);
            window_sum += bars[i].volume as u128;
            window_sum -= bars[i - lookback].volume as u128;
        }
    }

    for i in 0..n.saturating_sub(1) {
        marked[i].next_day_close = Some(bars[i + 1].close);
    }

    let mut pivot_highs = Vec::new();
    let mut pivot_lows = Vec::new();

    for i in 1..n {
        let prev = &bars[i - 1];
        let cur = &bars[i];
        let next = bars.get(i + 1);

        let is_high = cur.high > prev.high && next.map_or(true, |nx| cur.high > nx.high);
        let is_low = cur.low < prev.low && next.map_or(true, |nx| cur.low < nx.low);

        if is_high {
            marked[i].is_pivot_high = true;
            pivot_highs.push(i);
        }
        if is_low {
            marked[i].is_pivot_low = true;
            pivot_lows.push(i);
        }
    }

    MarkedSeries {
        bars: marked,
        pivot_highs,
        pivot_lows,
    }
}
