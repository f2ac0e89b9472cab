//! Scan configuration.
//!
//! Loaded from TOML; every section is optional and falls back to defaults.
//!
//! ```toml
//! symbols = ["AAPL", "MSFT"]
//!
//! [data]
//! cache_dir = "stock_data"
//! full_fetch_after_days = 100
//!
//! [hits]
//! proximity_threshold = 0.003
//!
//! [filter]
//! and = [{ compare = { field = "recent_hits", op = ">", value = 0 } }]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pivotlab_core::analysis::{ClassifyError, HitParams, DEFAULT_LOOKBACK};
use pivotlab_core::data::DEFAULT_FULL_FETCH_AFTER_DAYS;

/// Upper bound for `data.max_retries`; the backoff doubles per attempt.
pub const MAX_PROVIDER_RETRIES: u32 = 10;

use crate::filter::Predicate;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid hit parameters: {0}")]
    Hits(#[from] ClassifyError),
}

/// Everything a scan needs besides the provider and the date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScanConfig {
    pub symbols: Vec<String>,
    pub data: DataConfig,
    pub pivots: PivotConfig,
    pub hits: HitParams,
    pub batch: BatchConfig,
    pub filter: Option<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub cache_dir: PathBuf,
    /// Environment variable holding the provider API key.
    pub api_key_env: String,
    pub full_fetch_after_days: i64,
    pub throttle_ms: u64,
    pub max_retries: u32,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("stock_data"),
            api_key_env: "ALPHAVANTAGE_API_KEY".into(),
            full_fetch_after_days: DEFAULT_FULL_FETCH_AFTER_DAYS,
            throttle_ms: 1900,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PivotConfig {
    pub lookback: usize,
}

impl Default for PivotConfig {
    fn default() -> Self {
        Self {
            lookback: DEFAULT_LOOKBACK,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// How many times the retry list is replayed after the first pass.
    pub max_retry_passes: u32,
    /// Analyze stored history only; never call the provider.
    pub offline: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_retry_passes: 1,
            offline: false,
        }
    }
}

impl ScanConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Symbols to scan, upper-cased and de-duplicated in first-seen order.
    pub fn normalized_symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.symbols.len());
        for s in &self.symbols {
            let s = s.trim().to_ascii_uppercase();
            if !s.is_empty() && !out.contains(&s) {
                out.push(s);
            }
        }
        out
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.normalized_symbols().is_empty() {
            return Err(ConfigError::Invalid("no symbols to scan".into()));
        }
        if self.data.api_key_env.trim().is_empty() {
            return Err(ConfigError::Invalid("data.api_key_env must name a variable".into()));
        }
        if self.data.max_retries > MAX_PROVIDER_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "data.max_retries must be at most {MAX_PROVIDER_RETRIES}, got {}",
                self.data.max_retries
            )));
        }
        self.validate_analysis()
    }

    /// Checks that apply to any symbol list: pivot, merge and hit parameters.
    pub fn validate_analysis(&self) -> Result<(), ConfigError> {
        if self.pivots.lookback == 0 {
            return Err(ConfigError::Invalid("pivots.lookback must be at least 1".into()));
        }
        if self.data.full_fetch_after_days < 0 {
            return Err(ConfigError::Invalid(format!(
                "data.full_fetch_after_days must not be negative, got {}",
                self.data.full_fetch_after_days
            )));
        }
        self.hits.validate()?;
        Ok(())
    }
}
