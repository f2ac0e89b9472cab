//! Bar: the fundamental market data unit.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily HLCV bar for a single symbol.
///
/// This is the canonical, persisted form. Fields derived by the pivot marker
/// live on [`MarkedBar`] so later stages can only see them once marking ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    pub fn new(date: NaiveDate, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            date,
            high,
            low,
            close,
            volume,
        }
    }

    /// Basic sanity check: positive prices, high >= low, close inside the range.
    /// NaN in any price fails every comparison.
    pub fn is_sane(&self) -> bool {
        self.high >= self.low
            && self.low > 0.0
            && self.close > 0.0
            && self.close <= self.high
            && self.close >= self.low
    }
}

/// A bar after pivot marking.
///
/// Produced by [`crate::analysis::mark_all_pivots`]. The pivot flags are not
/// exclusive: an outside day can be both a pivot high and a pivot low.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkedBar {
    #[serde(flatten)]
    pub bar: Bar,
    pub is_pivot_high: bool,
    pub is_pivot_low: bool,
    /// Mean volume of the preceding `lookback` bars. `None` until enough history exists.
    pub trailing_avg_volume: Option<f64>,
    /// Close of the following session. `None` for the most recent bar.
    pub next_day_close: Option<f64>,
}

impl MarkedBar {
    pub fn unmarked(bar: Bar) -> Self {
        Self {
            bar,
            is_pivot_high: false,
            is_pivot_low: false,
            trailing_avg_volume: None,
            next_day_close: None,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.bar.date
    }

    pub fn volume(&self) -> u64 {
        self.bar.volume
    }
}
