//! Data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over data sources (Alpha Vantage today)
//! so we can swap implementations and mock for tests.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::merge::MergeGapError;
use crate::domain::Bar;

/// Structured error types for data operations.
///
/// These are designed to be displayable in CLI logs and batch summaries.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    MergeGap(#[from] MergeGapError),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("no cached data for symbol '{symbol}'")]
    NoCachedData { symbol: String },

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// Whether a later attempt at the same symbol could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DataError::NetworkUnreachable(_)
                | DataError::RateLimited { .. }
                | DataError::MalformedPayload(_)
                | DataError::MergeGap(_)
                | DataError::Other(_)
        )
    }
}

/// How much history to request from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Roughly the last 100 trading days.
    Compact,
    /// The entire available history.
    Full,
}

impl FetchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMode::Compact => "compact",
            FetchMode::Full => "full",
        }
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful data fetch for a single symbol.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub symbol: String,
    /// Normalized bars, oldest first.
    pub bars: Vec<Bar>,
    pub mode: FetchMode,
}

/// Trait for daily bar providers.
///
/// Implementations handle transport and payload normalization. The history
/// store sits above this trait; providers don't know about the cache.
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily bars for a symbol in the given size mode.
    fn fetch_daily(&self, symbol: &str, mode: FetchMode) -> Result<FetchResult, DataError>;

    /// Check if the provider is currently available (not rate-limited, not blocked).
    fn is_available(&self) -> bool;
}
