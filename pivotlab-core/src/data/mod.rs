//! Data ingestion, normalization and per-symbol history caching

pub mod alpha_vantage;
pub mod circuit_breaker;
pub mod merge;
pub mod normalize;
pub mod provider;
pub mod static_provider;
pub mod store;
pub mod throttle;

pub use alpha_vantage::{AlphaVantageOptions, AlphaVantageProvider};
pub use circuit_breaker::CircuitBreaker;
pub use merge::{merge_history, required_fetch_mode, MergeGapError, DEFAULT_FULL_FETCH_AFTER_DAYS};
pub use normalize::{normalize_daily, DailyPayload};
pub use provider::{DataError, DataProvider, FetchMode, FetchResult};
pub use static_provider::StaticProvider;
pub use store::{CacheStatus, HistoryRecord, HistoryStore, JsonHistoryStore};
pub use throttle::Throttle;
