//! Incremental history merge.
//!
//! The provider only offers "compact" (~100 trading days) or "full" history.
//! A compact fetch is enough while the stored history is recent; once the gap
//! could exceed the compact window, only a full fetch is safe. After a compact
//! fetch, the new bars are spliced onto the stored sequence at the last stored
//! date, which must be present in the fetched window.

use chrono::NaiveDate;
use thiserror::Error;

use super::provider::FetchMode;
use super::store::HistoryRecord;
use crate::domain::Bar;

/// Calendar-day gap beyond which a compact fetch can leave a hole.
pub const DEFAULT_FULL_FETCH_AFTER_DAYS: i64 = 100;

/// The fetched window does not overlap the stored history.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "merge gap: last stored date {last_stored} not found in fetched window {}",
    fmt_window(.incoming_first, .incoming_last)
)]
pub struct MergeGapError {
    pub last_stored: NaiveDate,
    pub incoming_first: Option<NaiveDate>,
    pub incoming_last: Option<NaiveDate>,
}

fn fmt_window(first: &Option<NaiveDate>, last: &Option<NaiveDate>) -> String {
    match (first, last) {
        (Some(first), Some(last)) => format!("{first}..={last}"),
        _ => "(empty)".to_string(),
    }
}

/// Decide whether a compact fetch suffices for a symbol.
///
/// No stored record, or a last retrieved date more than `full_after_days`
/// calendar days before `today`, requires a full fetch.
pub fn required_fetch_mode(
    record: Option<&HistoryRecord>,
    today: NaiveDate,
    full_after_days: i64,
) -> FetchMode {
    match record {
        None => FetchMode::Full,
        Some(record) => {
            let gap = (today - record.last_date_retrieved).num_days();
            if gap > full_after_days {
                FetchMode::Full
            } else {
                FetchMode::Compact
            }
        }
    }
}

/// Merge freshly fetched bars onto stored bars.
///
/// Both inputs must be ascending by date. If either side is empty the other
/// is returned unchanged. Otherwise the last stored date is located in
/// `incoming` and only bars strictly after it are appended, so the overlap
/// window is never duplicated. If it cannot be located the splice point is
/// unknown and a [`MergeGapError`] is returned.
pub fn merge_history(existing: Vec<Bar>, incoming: Vec<Bar>) -> Result<Vec<Bar>, MergeGapError> {
    let Some(last_stored) = existing.last().map(|b| b.date) else {
        return Ok(incoming);
    };
    if incoming.is_empty() {
        return Ok(existing);
    }

    let Some(pos) = incoming.iter().position(|b| b.date == last_stored) else {
        return Err(MergeGapError {
            last_stored,
            incoming_first: incoming.first().map(|b| b.date),
            incoming_last: incoming.last().map(|b| b.date),
        });
    };

    let mut merged = existing;
    merged.extend(incoming.into_iter().skip(pos + 1));
    Ok(merged)
}

/// Check the ordering invariant: strictly ascending dates, no duplicates.
pub fn is_strictly_ascending(bars: &[Bar]) -> bool {
    bars.windows(2).all(|w| w[0].date < w[1].date)
}
