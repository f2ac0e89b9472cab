//! Bar normalizer for Alpha Vantage `TIME_SERIES_DAILY` payloads.
//!
//! The upstream body is a date-keyed map, newest first, with numeric fields
//! encoded as text. Rate-limit and error responses come back with HTTP 200
//! and a different shape; any body without the series is malformed here and
//! the live provider decides which of those are worth retrying.

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::provider::DataError;
use crate::domain::Bar;

/// Key under which the daily series lives.
pub const DAILY_SERIES_KEY: &str = "Time Series (Daily)";

/// Raw daily payload as returned by the provider.
#[derive(Debug, Default, Deserialize)]
pub struct DailyPayload {
    #[serde(rename = "Time Series (Daily)")]
    pub time_series: Option<BTreeMap<String, RawDay>>,
    #[serde(rename = "Error Message")]
    pub error_message: Option<String>,
    #[serde(rename = "Note")]
    pub note: Option<String>,
    #[serde(rename = "Information")]
    pub information: Option<String>,
}

impl DailyPayload {
    /// Throttling notice sent in place of the series, if any.
    pub fn notice(&self) -> Option<&str> {
        if self.time_series.is_some() {
            return None;
        }
        self.note.as_deref().or(self.information.as_deref())
    }

    /// Parse a payload from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, DataError> {
        serde_json::from_str(json)
            .map_err(|e| DataError::MalformedPayload(format!("unexpected payload shape: {e}")))
    }

    /// Parse a payload from an already-decoded JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, DataError> {
        serde_json::from_value(value)
            .map_err(|e| DataError::MalformedPayload(format!("unexpected payload shape: {e}")))
    }
}

/// One day of raw fields. Open is not used by the scanner.
#[derive(Debug, Deserialize)]
pub struct RawDay {
    #[serde(rename = "2. high")]
    pub high: RawNumber,
    #[serde(rename = "3. low")]
    pub low: RawNumber,
    #[serde(rename = "4. close")]
    pub close: RawNumber,
    #[serde(rename = "5. volume")]
    pub volume: RawNumber,
}

/// A numeric field that may arrive as a JSON number or as text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(f64),
    Text(String),
}

impl RawNumber {
    fn parse(&self, field: &str, date: &str) -> Result<f64, DataError> {
        let value = match self {
            RawNumber::Number(n) => *n,
            RawNumber::Text(s) => s.trim().parse::<f64>().map_err(|_| {
                DataError::MalformedPayload(format!("{date}: field '{field}' is not numeric: {s:?}"))
            })?,
        };
        if !value.is_finite() {
            return Err(DataError::MalformedPayload(format!(
                "{date}: field '{field}' is not finite"
            )));
        }
        Ok(value)
    }
}

/// Convert a raw payload into bars, oldest first.
///
/// Every bar starts unmarked; pivot flags are the marker's job.
pub fn normalize_daily(symbol: &str, payload: DailyPayload) -> Result<Vec<Bar>, DataError> {
    let series = match payload.time_series {
        Some(series) => series,
        None => {
            let detail = payload
                .error_message
                .or(payload.note)
                .or(payload.information)
                .unwrap_or_else(|| format!("missing '{DAILY_SERIES_KEY}'"));
            return Err(DataError::MalformedPayload(format!("{symbol}: {detail}")));
        }
    };

    let mut bars = Vec::with_capacity(series.len());
    for (key, day) in &series {
        let date = parse_session_date(key)?;
        let high = positive(day.high.parse("2. high", key)?, "2. high", key)?;
        let low = positive(day.low.parse("3. low", key)?, "3. low", key)?;
        let close = positive(day.close.parse("4. close", key)?, "4. close", key)?;
        let volume = day.volume.parse("5. volume", key)?;
        if volume < 0.0 {
            return Err(DataError::MalformedPayload(format!(
                "{key}: negative volume {volume}"
            )));
        }
        let bar = Bar::new(date, high, low, close, volume.round() as u64);
        if !bar.is_sane() {
            return Err(DataError::MalformedPayload(format!(
                "{key}: inconsistent prices (high {high}, low {low}, close {close})"
            )));
        }
        bars.push(bar);
    }

    // Keys like "2017-06-13 16:00:00" collapse onto the same session date.
    // Series keys iterate in text order, so the bare date key wins.
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);

    Ok(bars)
}

/// Parse the calendar date out of a series key, dropping any time component.
fn parse_session_date(key: &str) -> Result<NaiveDate, DataError> {
    let day = key.split_whitespace().next().unwrap_or_default();
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| DataError::MalformedPayload(format!("invalid date key {key:?}: {e}")))
}

fn positive(value: f64, field: &str, date: &str) -> Result<f64, DataError> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(DataError::MalformedPayload(format!(
            "{date}: field '{field}' must be positive, got {value}"
        )))
    }
}
