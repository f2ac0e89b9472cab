//! Pivot analysis: marking, hit classification and signal building.

pub mod hits;
pub mod pivots;
pub mod signals;

pub use hits::{classify_series, find_hits, ClassifiedPivot, ClassifyError, Hit, HitParams};
pub use pivots::{mark_all_pivots, MarkedSeries, DEFAULT_LOOKBACK};
pub use signals::{build_signals, Signal};
