//! Hit classifier.
//!
//! A hit is an earlier pivot of the same polarity whose extreme price lies
//! within a small band around the current pivot's extreme. For each pivot the
//! classifier collects its prior hits, narrows them to a recent calendar
//! window, and derives the volume-pattern flags used to spot supply/demand
//! tests.
//!
//! Inputs are the marked bars (for `trailing_avg_volume`) and one polarity's
//! pivot indices: `pivot_lows` for long, `pivot_highs` for short. Output is a
//! [`ClassifiedPivot`] per input pivot, in the same order.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::pivots::MarkedSeries;
use crate::domain::{Direction, MarkedBar};

/// Configuration errors. Nothing is computed when one is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifyError {
    #[error("invalid direction '{0}': must specify \"long\" or \"short\"")]
    InvalidDirection(String),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("pivot index {index} out of range for {len} bars")]
    PivotOutOfRange { index: usize, len: usize },
}

/// Classifier tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitParams {
    /// Half-width of the price band as a fraction of price (0.003 = 0.3%).
    pub proximity_threshold: f64,
    /// A prior hit is recent when it is strictly fewer than this many calendar days old.
    pub recent_window_days: i64,
    /// Volume multiple of the trailing average that counts as absorption.
    pub absorption_multiplier: f64,
}

impl Default for HitParams {
    fn default() -> Self {
        Self {
            proximity_threshold: 0.003,
            recent_window_days: 100,
            absorption_multiplier: 1.2,
        }
    }
}

impl HitParams {
    pub fn validate(&self) -> Result<(), ClassifyError> {
        if !self.proximity_threshold.is_finite()
            || self.proximity_threshold < 0.0
            || self.proximity_threshold >= 1.0
        {
            return Err(ClassifyError::InvalidParameter {
                name: "proximity_threshold",
                reason: format!("must be in [0, 1), got {}", self.proximity_threshold),
            });
        }
        if self.recent_window_days <= 0 {
            return Err(ClassifyError::InvalidParameter {
                name: "recent_window_days",
                reason: format!("must be positive, got {}", self.recent_window_days),
            });
        }
        if !self.absorption_multiplier.is_finite() || self.absorption_multiplier <= 0.0 {
            return Err(ClassifyError::InvalidParameter {
                name: "absorption_multiplier",
                reason: format!("must be positive, got {}", self.absorption_multiplier),
            });
        }
        Ok(())
    }
}

/// An earlier pivot that traded near the same level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub bar_index: usize,
    pub date: NaiveDate,
    /// The hit's low (long) or high (short).
    pub price: f64,
    pub volume: u64,
}

/// A pivot with its historical context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedPivot {
    pub bar_index: usize,
    pub direction: Direction,
    pub bar: MarkedBar,
    /// Same-polarity pivots inside the price band, oldest first.
    pub prior_hits: Vec<Hit>,
    /// Prior hits inside the recent window, oldest first.
    pub recent_hits: Vec<Hit>,
    /// Recent hits that traded more volume than this pivot, oldest first.
    pub recent_hits_on_greater_volume: Vec<Hit>,
    pub absorption_volume: bool,
    /// `None` when there is no recent hit on greater volume.
    pub all_recent_hits_decreasing: Option<bool>,
    pub below_avg_vol: bool,
    pub outer_pivot_on_lower_volume: bool,
    pub outer_pivot_on_lower_volume_date: Option<NaiveDate>,
}

impl ClassifiedPivot {
    pub fn date(&self) -> NaiveDate {
        self.bar.date()
    }

    pub fn volume(&self) -> u64 {
        self.bar.volume()
    }

    /// The pivot's extreme: low for long, high for short.
    pub fn price(&self) -> f64 {
        extreme(&self.bar, self.direction)
    }

    pub fn prior_hits_count(&self) -> usize {
        self.prior_hits.len()
    }

    pub fn recent_hits_count(&self) -> usize {
        self.recent_hits.len()
    }

    pub fn recent_hits_on_greater_volume_count(&self) -> usize {
        self.recent_hits_on_greater_volume.len()
    }
}

fn extreme(bar: &MarkedBar, direction: Direction) -> f64 {
    match direction {
        Direction::Long => bar.bar.low,
        Direction::Short => bar.bar.high,
    }
}

/// Classify every pivot in `pivots` against the pivots before it.
pub fn find_hits(
    symbol: &str,
    direction: Direction,
    bars: &[MarkedBar],
    pivots: &[usize],
    params: &HitParams,
) -> Result<Vec<ClassifiedPivot>, ClassifyError> {
    params.validate()?;
    if let Some(&index) = pivots.iter().find(|&&i| i >= bars.len()) {
        return Err(ClassifyError::PivotOutOfRange {
            index,
            len: bars.len(),
        });
    }
    if pivots.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ClassifyError::InvalidParameter {
            name: "pivots",
            reason: "pivot indices must be strictly ascending".into(),
        });
    }

    let hits: Vec<Hit> = pivots
        .iter()
        .map(|&i| Hit {
            bar_index: i,
            date: bars[i].date(),
            price: extreme(&bars[i], direction),
            volume: bars[i].volume(),
        })
        .collect();

    let classified: Vec<ClassifiedPivot> = hits
        .iter()
        .enumerate()
        .map(|(pos, current)| classify_one(direction, &bars[current.bar_index], current, &hits[..pos], params))
        .collect();

    log::debug!(
        "{symbol} - classified {} {direction} pivots, {} with prior hits",
        classified.len(),
        classified.iter().filter(|p| p.prior_hits_count() > 0).count()
    );

    Ok(classified)
}

/// Parse `direction` and classify the matching pivot list of a marked series.
pub fn classify_series(
    symbol: &str,
    direction: &str,
    series: &MarkedSeries,
    params: &HitParams,
) -> Result<Vec<ClassifiedPivot>, ClassifyError> {
    let direction: Direction = direction.parse()?;
    find_hits(symbol, direction, &series.bars, series.pivots(direction), params)
}

fn classify_one(
    direction: Direction,
    bar: &MarkedBar,
    current: &Hit,
    earlier: &[Hit],
    params: &HitParams,
) -> ClassifiedPivot {
    let band_low = current.price - current.price * params.proximity_threshold;
    let band_high = current.price + current.price * params.proximity_threshold;

    let prior_hits: Vec<Hit> = earlier
        .iter()
        .filter(|h| h.price >= band_low && h.price <= band_high)
        .copied()
        .collect();

    let recent_hits: Vec<Hit> = prior_hits
        .iter()
        .filter(|h| (current.date - h.date).num_days() < params.recent_window_days)
        .copied()
        .collect();

    let on_greater_volume: Vec<Hit> = recent_hits
        .iter()
        .filter(|h| h.volume > current.volume)
        .copied()
        .collect();

    let absorption_volume = bar.trailing_avg_volume.map_or(false, |avg| {
        on_greater_volume
            .iter()
            .any(|h| h.volume as f64 > avg * params.absorption_multiplier)
    });

    let all_recent_hits_decreasing = match on_greater_volume.as_slice() {
        [] => None,
        // Always true for a member of the greater-volume list.
        [only] => Some(only.volume > current.volume),
        many => Some(
            many.windows(2)
                .all(|w| w[1].volume <= w[0].volume && w[1].volume > current.volume),
        ),
    };

    let below_avg_vol = bar
        .trailing_avg_volume
        .map_or(false, |avg| (current.volume as f64) < avg);

    let outer_against = recent_hits.last().copied().filter(|last| {
        let beyond = match direction {
            Direction::Long => current.price < last.price,
            Direction::Short => current.price > last.price,
        };
        beyond && current.volume < last.volume
    });

    ClassifiedPivot {
        bar_index: current.bar_index,
        direction,
        bar: bar.clone(),
        prior_hits,
        recent_hits,
        recent_hits_on_greater_volume: on_greater_volume,
        absorption_volume,
        all_recent_hits_decreasing,
        below_avg_vol,
        outer_pivot_on_lower_volume: outer_against.is_some(),
        outer_pivot_on_lower_volume_date: outer_against.map(|h| h.date),
    }
}
