//! Per-symbol history store.
//!
//! Layout: `{cache_dir}/{SYMBOL}.json`, one record per symbol.
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Integrity validation on load (parse check, ascending dates)
//! - Quarantine for corrupt files ({SYMBOL}.json.quarantined)
//! - BLAKE3 content hash of the stored bars

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::merge::is_strictly_ascending;
use super::provider::DataError;
use crate::domain::Bar;

/// Persisted history for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Ascending by date, no duplicates.
    pub bars: Vec<Bar>,
    pub last_date_retrieved: NaiveDate,
    pub last_updated: DateTime<Utc>,
    pub bar_count: usize,
    pub data_hash: String,
}

impl HistoryRecord {
    /// Build a record from a merged bar sequence.
    ///
    /// Rejects empty sequences and sequences that are not strictly ascending.
    pub fn new(bars: Vec<Bar>, updated_at: DateTime<Utc>) -> Result<Self, DataError> {
        let last_date_retrieved = bars
            .last()
            .map(|b| b.date)
            .ok_or_else(|| DataError::CacheError("no bars to cache".into()))?;
        if !is_strictly_ascending(&bars) {
            return Err(DataError::CacheError(
                "bars are not strictly ascending by date".into(),
            ));
        }
        let data_hash = hash_bars(&bars)?;
        Ok(Self {
            bar_count: bars.len(),
            bars,
            last_date_retrieved,
            last_updated: updated_at,
            data_hash,
        })
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }
}

fn hash_bars(bars: &[Bar]) -> Result<String, DataError> {
    let bytes = serde_json::to_vec(bars)
        .map_err(|e| DataError::CacheError(format!("hash serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Persistence contract for history records.
///
/// `write` must be all-or-nothing from a reader's point of view.
pub trait HistoryStore: Send + Sync {
    /// Read the stored record for a symbol. `Ok(None)` when nothing is stored.
    fn read(&self, symbol: &str) -> Result<Option<HistoryRecord>, DataError>;

    /// Replace the stored record for a symbol.
    fn write(&self, symbol: &str, record: &HistoryRecord) -> Result<(), DataError>;
}

/// JSON-file history store.
#[derive(Debug, Clone)]
pub struct JsonHistoryStore {
    cache_dir: PathBuf,
}

impl JsonHistoryStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Path to the record for a symbol: `{cache_dir}/{SYMBOL}.json`
    fn record_path(&self, symbol: &str) -> Result<PathBuf, DataError> {
        if symbol.is_empty()
            || symbol.contains(['/', '\\'])
            || symbol.starts_with('.')
        {
            return Err(DataError::CacheError(format!(
                "invalid symbol for cache path: {symbol:?}"
            )));
        }
        Ok(self.cache_dir.join(format!("{symbol}.json")))
    }

    /// Symbols that currently have a record on disk, sorted.
    pub fn symbols(&self) -> Result<Vec<String>, DataError> {
        if !self.cache_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.cache_dir)
            .map_err(|e| DataError::CacheError(format!("read dir: {e}")))?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::CacheError(format!("dir entry: {e}")))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                symbols.push(stem.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    /// Cached/last date/bar count for each requested symbol.
    pub fn status(&self, symbols: &[&str]) -> Vec<CacheStatus> {
        symbols
            .iter()
            .map(|sym| {
                let record = self.read(sym).ok().flatten();
                CacheStatus {
                    symbol: sym.to_string(),
                    cached: record.is_some(),
                    start_date: record.as_ref().and_then(|r| r.first_date()),
                    end_date: record.as_ref().map(|r| r.last_date_retrieved),
                    bar_count: record.as_ref().map(|r| r.bar_count),
                    last_updated: record.as_ref().map(|r| r.last_updated),
                }
            })
            .collect()
    }

    fn quarantine(&self, path: &Path, reason: &str) {
        let quarantine = path.with_extension("json.quarantined");
        log::warn!(
            "quarantining corrupt history file {}: {reason}",
            path.display()
        );
        let _ = fs::rename(path, &quarantine);
    }
}

impl HistoryStore for JsonHistoryStore {
    fn read(&self, symbol: &str) -> Result<Option<HistoryRecord>, DataError> {
        let path = self.record_path(symbol)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| DataError::CacheError(format!("read {}: {e}", path.display())))?;

        let record: HistoryRecord = match serde_json::from_str(&content) {
            Ok(record) => record,
            Err(e) => {
                self.quarantine(&path, &e.to_string());
                return Ok(None);
            }
        };

        if record.bars.is_empty() || !is_strictly_ascending(&record.bars) {
            self.quarantine(&path, "bars empty or out of order");
            return Ok(None);
        }

        log::debug!("{symbol} - local data found ({} bars)", record.bar_count);
        Ok(Some(record))
    }

    fn write(&self, symbol: &str, record: &HistoryRecord) -> Result<(), DataError> {
        let path = self.record_path(symbol)?;
        fs::create_dir_all(&self.cache_dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let json = serde_json::to_vec(record)
            .map_err(|e| DataError::CacheError(format!("record serialization: {e}")))?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .map_err(|e| DataError::CacheError(format!("write {}: {e}", tmp_path.display())))?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::CacheError(format!("atomic rename failed: {e}"))
        })?;

        log::debug!("{symbol} - wrote {} bars to {}", record.bar_count, path.display());
        Ok(())
    }
}

/// Cache status for a single symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub symbol: String,
    pub cached: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub bar_count: Option<usize>,
    pub last_updated: Option<DateTime<Utc>>,
}
