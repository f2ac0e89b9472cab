//! Batch driver: runs the per-symbol pipeline over a symbol list.
//!
//! Two phases:
//! 1. Update (sequential): read → decide fetch mode → fetch → merge → persist.
//!    Requests go through the provider's throttle one symbol at a time.
//!    Retryable failures are collected and replayed after the first pass;
//!    a merge gap is replayed as a full fetch.
//! 2. Analyze (parallel): mark → classify long/short → build signals, one
//!    rayon task per updated symbol.
//!
//! One symbol's failure never stops the others.

use chrono::{NaiveDate, Utc};
use rayon::prelude::*;
use thiserror::Error;

use pivotlab_core::analysis::{build_signals, find_hits, mark_all_pivots, ClassifyError, Signal};
use pivotlab_core::data::{
    merge_history, required_fetch_mode, DataError, DataProvider, FetchMode, HistoryRecord,
    HistoryStore,
};
use pivotlab_core::domain::{Bar, Direction};

use crate::config::{ConfigError, ScanConfig};

/// Errors from the batch driver, per symbol.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("classification error: {0}")]
    Classify(#[from] ClassifyError),
}

impl ScanError {
    /// Whether replaying the symbol could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScanError::Data(e) if e.is_retryable())
    }

    fn is_merge_gap(&self) -> bool {
        matches!(self, ScanError::Data(DataError::MergeGap(_)))
    }
}

/// Working state for one symbol, owned by the driver for the duration of a run.
#[derive(Debug, Clone)]
pub struct SymbolContext {
    pub symbol: String,
    /// The record as it was before this run.
    pub record: Option<HistoryRecord>,
    /// `None` when no fetch was made (offline).
    pub mode: Option<FetchMode>,
    /// Bars returned by the provider.
    pub fetched: usize,
    /// The history analyzed in phase 2, oldest first.
    pub bars: Vec<Bar>,
}

/// Knobs for a single `update_symbol` call.
#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    pub today: NaiveDate,
    pub full_fetch_after_days: i64,
    pub offline: bool,
    /// Skip the compact/full decision and fetch full history.
    pub force_full: bool,
}

/// Bring one symbol's stored history up to date.
///
/// Offline, the stored record is used as-is and a missing record is an error.
/// A full fetch replaces the stored bars; a compact fetch is merged onto them.
pub fn update_symbol(
    symbol: &str,
    provider: &dyn DataProvider,
    store: &dyn HistoryStore,
    opts: &UpdateOptions,
) -> Result<SymbolContext, ScanError> {
    let record = store.read(symbol)?;

    if opts.offline {
        let bars = record
            .as_ref()
            .map(|r| r.bars.clone())
            .ok_or_else(|| DataError::NoCachedData {
                symbol: symbol.to_string(),
            })?;
        log::info!("{symbol} - using {} stored bars (offline)", bars.len());
        return Ok(SymbolContext {
            symbol: symbol.to_string(),
            record,
            mode: None,
            fetched: 0,
            bars,
        });
    }

    let mode = if opts.force_full {
        FetchMode::Full
    } else {
        required_fetch_mode(record.as_ref(), opts.today, opts.full_fetch_after_days)
    };

    let fetch = provider.fetch_daily(symbol, mode)?;
    let fetched = fetch.bars.len();

    let bars = match (&record, mode) {
        (Some(existing), FetchMode::Compact) => {
            let merged = merge_history(existing.bars.clone(), fetch.bars)
                .map_err(DataError::from)?;
            log::info!(
                "{symbol} - merged {} new bars onto {} stored",
                merged.len() - existing.bars.len(),
                existing.bars.len()
            );
            merged
        }
        _ => fetch.bars,
    };

    let updated = HistoryRecord::new(bars, Utc::now())?;
    store.write(symbol, &updated)?;

    Ok(SymbolContext {
        symbol: symbol.to_string(),
        record,
        mode: Some(mode),
        fetched,
        bars: updated.bars,
    })
}

/// Mark pivots and build long and short signals for one symbol.
pub fn analyze_symbol(ctx: &SymbolContext, config: &ScanConfig) -> Result<Vec<Signal>, ScanError> {
    let series = mark_all_pivots(&ctx.bars, config.pivots.lookback);
    let mut signals = Vec::new();
    for direction in [Direction::Long, Direction::Short] {
        let pivots = find_hits(
            &ctx.symbol,
            direction,
            &series.bars,
            series.pivots(direction),
            &config.hits,
        )?;
        signals.extend(build_signals(direction, &pivots, &ctx.symbol));
    }
    log::debug!("{} - {} signals", ctx.symbol, signals.len());
    Ok(signals)
}

/// Result of a batch run.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// All signals, sorted by date, then symbol, then direction.
    pub signals: Vec<Signal>,
    /// Symbols whose update and analysis both succeeded.
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, ScanError)>,
    /// Symbols that went through at least one retry pass.
    pub retried: Vec<String>,
}

impl BatchOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Update every symbol, replay retryable failures, then analyze in parallel.
pub fn run_batch(
    symbols: &[String],
    provider: &dyn DataProvider,
    store: &dyn HistoryStore,
    config: &ScanConfig,
    today: NaiveDate,
) -> Result<BatchOutcome, ScanError> {
    config.validate_analysis()?;

    let base = UpdateOptions {
        today,
        full_fetch_after_days: config.data.full_fetch_after_days,
        offline: config.batch.offline,
        force_full: false,
    };

    let mut outcome = BatchOutcome::default();
    let mut contexts: Vec<SymbolContext> = Vec::with_capacity(symbols.len());

    // ── Phase 1: update ──────────────────────────────────────────────

    let mut pending: Vec<(String, bool)> = symbols.iter().map(|s| (s.clone(), false)).collect();
    let passes = 1 + config.batch.max_retry_passes;

    for pass in 0..passes {
        if pending.is_empty() {
            break;
        }
        if pass > 0 {
            log::info!("retry pass {pass}: {} symbol(s)", pending.len());
            for (symbol, _) in &pending {
                if !outcome.retried.contains(symbol) {
                    outcome.retried.push(symbol.clone());
                }
            }
        }
        let last_pass = pass + 1 == passes;
        let mut retry = Vec::new();

        let mut queue = std::mem::take(&mut pending).into_iter();
        while let Some((symbol, force_full)) = queue.next() {
            if !base.offline && !provider.is_available() {
                log::error!("{} unavailable; skipping remaining symbols", provider.name());
                for (rest, _) in std::iter::once((symbol, force_full)).chain(queue.by_ref()) {
                    outcome.failed.push((rest, DataError::CircuitBreakerTripped.into()));
                }
                break;
            }

            let opts = UpdateOptions { force_full, ..base };
            match update_symbol(&symbol, provider, store, &opts) {
                Ok(ctx) => contexts.push(ctx),
                Err(e) if e.is_retryable() && !last_pass => {
                    log::warn!("{symbol} - {e}; queued for retry");
                    let full = force_full || e.is_merge_gap();
                    retry.push((symbol, full));
                }
                Err(e) => {
                    log::error!("{symbol} - {e}");
                    outcome.failed.push((symbol, e));
                }
            }
        }
        pending = retry;
    }

    // ── Phase 2: analyze ─────────────────────────────────────────────

    let analyzed: Vec<(String, Result<Vec<Signal>, ScanError>)> = contexts
        .par_iter()
        .map(|ctx| (ctx.symbol.clone(), analyze_symbol(ctx, config)))
        .collect();

    for (symbol, result) in analyzed {
        match result {
            Ok(signals) => {
                outcome.signals.extend(signals);
                outcome.succeeded.push(symbol);
            }
            Err(e) => {
                log::error!("{symbol} - {e}");
                outcome.failed.push((symbol, e));
            }
        }
    }

    outcome.signals.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.symbol.cmp(&b.symbol))
            .then_with(|| a.trade.as_str().cmp(b.trade.as_str()))
    });

    log::info!(
        "{} succeeded, {} failed, {} retried, {} signals",
        outcome.succeeded.len(),
        outcome.failed.len(),
        outcome.retried.len(),
        outcome.signals.len()
    );
    Ok(outcome)
}

/// The shared direction when every signal agrees, `None` otherwise or when empty.
pub fn unanimous_direction<'a, I>(signals: I) -> Option<Direction>
where
    I: IntoIterator<Item = &'a Signal>,
{
    let mut iter = signals.into_iter();
    let first = iter.next()?.trade;
    iter.all(|s| s.trade == first).then_some(first)
}
