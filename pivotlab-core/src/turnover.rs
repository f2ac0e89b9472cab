//! Float turnover.
//!
//! Walks daily volume from a start date and counts how many times the
//! cumulative volume has exceeded the float. Each time the remaining float of
//! the current cycle drops below zero, that day is a turnover date and a fresh
//! float is added back.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Bar;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TurnoverError {
    #[error("total float must be positive")]
    ZeroFloat,

    #[error("total float {0} is too large")]
    FloatTooLarge(u64),

    #[error("start date {0} not found in history")]
    StartDateNotFound(NaiveDate),
}

/// Which way to walk from the start date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnoverDirection {
    /// From the start date to the most recent bar.
    Forward,
    /// From the bar before the start date back to the oldest bar.
    Reverse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnoverReport {
    pub direction: TurnoverDirection,
    pub start: NaiveDate,
    pub days_considered: usize,
    /// Dates on which a full float cycle completed, in scan order.
    pub turnovers: Vec<NaiveDate>,
    /// Float left in the cycle that was in progress when the scan ended.
    pub float_remaining: i64,
    pub percent_float_remaining: f64,
    /// Forward scans only.
    pub average_volume_per_day: Option<f64>,
    /// Forward scans only: days until the current cycle completes at the average pace.
    pub estimated_days_remaining: Option<f64>,
}

pub fn float_turnover(
    bars: &[Bar],
    total_float: u64,
    start: NaiveDate,
    direction: TurnoverDirection,
) -> Result<TurnoverReport, TurnoverError> {
    if total_float == 0 {
        return Err(TurnoverError::ZeroFloat);
    }
    if i64::try_from(total_float).is_err() {
        return Err(TurnoverError::FloatTooLarge(total_float));
    }
    let start_idx = bars
        .iter()
        .position(|b| b.date == start)
        .ok_or(TurnoverError::StartDateNotFound(start))?;

    let window: Vec<&Bar> = match direction {
        TurnoverDirection::Forward => bars[start_idx..].iter().collect(),
        TurnoverDirection::Reverse => bars[..start_idx].iter().rev().collect(),
    };

    // Wide accumulators: a single bar may carry any u64 volume.
    let float = i128::from(total_float);
    let mut remaining = float;
    let mut turnovers = Vec::new();
    let mut cumulative: u128 = 0;

    for bar in &window {
        remaining -= i128::from(bar.volume);
        cumulative += u128::from(bar.volume);
        if remaining < 0 {
            turnovers.push(bar.date);
            remaining += float;
        }
    }

    let (average_volume_per_day, estimated_days_remaining) = match direction {
        TurnoverDirection::Forward if !window.is_empty() => {
            let avg = cumulative as f64 / window.len() as f64;
            let est = if avg > 0.0 {
                Some(remaining as f64 / avg)
            } else {
                None
            };
            (Some(avg), est)
        }
        _ => (None, None),
    };

    Ok(TurnoverReport {
        direction,
        start,
        days_considered: window.len(),
        turnovers,
        float_remaining: remaining.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64,
        percent_float_remaining: remaining as f64 / float as f64 * 100.0,
        average_volume_per_day,
        estimated_days_remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(volumes: &[u64]) -> Vec<Bar> {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        volumes
            .iter()
            .enumerate()
            .map(|(i, &v)| Bar::new(base + chrono::Duration::days(i as i64), 11.0, 9.0, 10.0, v))
            .collect()
    }

    fn day(i: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i)
    }

    #[test]
    fn forward_counts_cycles() {
        let history = bars(&[999, 40, 30, 50, 20, 70]);
        let report = float_turnover(&history, 100, day(1), TurnoverDirection::Forward).unwrap();

        // 100-40-30 = 30, -50 -> -20 turnover on day 3 (80), -20 = 60, -70 -> -10 turnover day 5 (90).
        assert_eq!(report.turnovers, vec![day(3), day(5)]);
        assert_eq!(report.float_remaining, 90);
        assert_eq!(report.percent_float_remaining, 90.0);
        assert_eq!(report.days_considered, 5);
        assert_eq!(report.average_volume_per_day, Some(42.0));
        let est = report.estimated_days_remaining.unwrap();
        assert!((est - 90.0 / 42.0).abs() < 1e-12);
    }

    #[test]
    fn exact_exhaustion_is_not_a_turnover() {
        let history = bars(&[60, 40]);
        let report = float_turnover(&history, 100, day(0), TurnoverDirection::Forward).unwrap();
        assert!(report.turnovers.is_empty());
        assert_eq!(report.float_remaining, 0);
    }

    #[test]
    fn reverse_walks_backwards_from_day_before_start() {
        let history = bars(&[70, 20, 50, 30, 999]);
        let report = float_turnover(&history, 100, day(4), TurnoverDirection::Reverse).unwrap();

        // 100-30-50 = 20, -20 = 0, -70 -> -70 turnover on day 0 (30).
        assert_eq!(report.turnovers, vec![day(0)]);
        assert_eq!(report.float_remaining, 30);
        assert_eq!(report.days_considered, 4);
        assert_eq!(report.average_volume_per_day, None);
        assert_eq!(report.estimated_days_remaining, None);
    }

    #[test]
    fn reverse_from_first_bar_considers_nothing() {
        let history = bars(&[10, 20]);
        let report = float_turnover(&history, 100, day(0), TurnoverDirection::Reverse).unwrap();
        assert_eq!(report.days_considered, 0);
        assert_eq!(report.float_remaining, 100);
        assert_eq!(report.percent_float_remaining, 100.0);
    }

    #[test]
    fn errors() {
        let history = bars(&[10]);
        assert_eq!(
            float_turnover(&history, 0, day(0), TurnoverDirection::Forward),
            Err(TurnoverError::ZeroFloat)
        );
        assert_eq!(
            float_turnover(&history, 10, day(5), TurnoverDirection::Forward),
            Err(TurnoverError::StartDateNotFound(day(5)))
        );
        assert_eq!(
            float_turnover(&history, u64::MAX, day(0), TurnoverDirection::Forward),
            Err(TurnoverError::FloatTooLarge(u64::MAX))
        );
    }

    #[test]
    fn huge_volumes_do_not_overflow() {
        let history = bars(&[u64::MAX, 10]);
        let float = i64::MAX as u64;
        let report = float_turnover(&history, float, day(0), TurnoverDirection::Forward).unwrap();

        // Day 0: (2^63 - 1) - (2^64 - 1) = -2^63, refilled to -1.
        // Day 1: -1 - 10 = -11, refilled to 2^63 - 12.
        assert_eq!(report.turnovers, vec![day(0), day(1)]);
        assert_eq!(report.float_remaining, i64::MAX - 11);
        assert!(report.average_volume_per_day.unwrap() > 9e18);
    }
}
