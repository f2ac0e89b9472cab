//! PivotLab Runner: scan orchestration, filters, reporting.
//!
//! This crate builds on `pivotlab-core` to provide:
//! - TOML scan configuration
//! - Batch driver with retry replay and parallel analysis
//! - Structured signal filters
//! - CSV export and terminal summaries

pub mod batch;
pub mod config;
pub mod filter;
pub mod report;

pub use batch::{
    analyze_symbol, run_batch, unanimous_direction, update_symbol, BatchOutcome, ScanError,
    SymbolContext, UpdateOptions,
};
pub use config::{BatchConfig, ConfigError, DataConfig, PivotConfig, ScanConfig};
pub use filter::{CompareOp, Field, FilterError, Predicate, Value};
pub use report::{export_signals_csv, render_table, save_signals_csv, SignalSummary};
