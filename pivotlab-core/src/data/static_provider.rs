//! In-memory provider serving canned daily payloads.
//!
//! Used for offline runs and tests. Payloads go through the same
//! normalization as live responses, and `Compact` requests only see the
//! most recent [`COMPACT_BARS`] bars.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::Value;

use super::normalize::{normalize_daily, DailyPayload};
use super::provider::{DataError, DataProvider, FetchMode, FetchResult};

/// Bars returned by a compact fetch.
pub const COMPACT_BARS: usize = 100;

#[derive(Debug, Default)]
pub struct StaticProvider {
    payloads: HashMap<String, Value>,
    failures: Mutex<HashMap<String, VecDeque<DataError>>>,
    calls: Mutex<Vec<(String, FetchMode)>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `payload` (a raw daily response body) for `symbol`.
    pub fn with_payload(mut self, symbol: impl Into<String>, payload: Value) -> Self {
        self.payloads.insert(symbol.into(), payload);
        self
    }

    /// Queue an error to be returned by the next fetch of `symbol`.
    pub fn fail_next(&self, symbol: &str, error: DataError) {
        lock(&self.failures)
            .entry(symbol.to_string())
            .or_default()
            .push_back(error);
    }

    /// Every fetch made so far, in order.
    pub fn calls(&self) -> Vec<(String, FetchMode)> {
        lock(&self.calls).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl DataProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn fetch_daily(&self, symbol: &str, mode: FetchMode) -> Result<FetchResult, DataError> {
        lock(&self.calls).push((symbol.to_string(), mode));

        if let Some(err) = lock(&self.failures).get_mut(symbol).and_then(|q| q.pop_front()) {
            return Err(err);
        }

        let payload = match self.payloads.get(symbol) {
            Some(value) => DailyPayload::from_value(value.clone())?,
            None => DailyPayload {
                error_message: Some(format!("Invalid API call for symbol {symbol}")),
                ..DailyPayload::default()
            },
        };
        let mut bars = normalize_daily(symbol, payload)?;
        if mode == FetchMode::Compact && bars.len() > COMPACT_BARS {
            bars.drain(..bars.len() - COMPACT_BARS);
        }

        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars,
            mode,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}
