//! PivotLab CLI: scan, float turnover, and cache commands.
//!
//! Commands:
//! - `scan`: update stored history, classify pivots, filter and export signals
//! - `turnover`: count float turnover cycles from a start date
//! - `cache status`: report stored symbols, date ranges and bar counts

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pivotlab_core::data::{
    AlphaVantageOptions, AlphaVantageProvider, CircuitBreaker, DataProvider, HistoryStore,
    JsonHistoryStore, StaticProvider,
};
use pivotlab_core::turnover::{float_turnover, TurnoverDirection};
use pivotlab_runner::{
    render_table, run_batch, save_signals_csv, unanimous_direction, update_symbol, DataConfig,
    Predicate, ScanConfig, UpdateOptions,
};

#[derive(Parser)]
#[command(
    name = "pivotlab",
    about = "PivotLab CLI: pivot retest and volume pattern scanner"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Update history for a symbol list and report pivot signals.
    Scan {
        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Symbols to scan (overrides the config list).
        #[arg(long, num_args = 1..)]
        symbols: Vec<String>,

        /// Only report signals on this date (YYYY-MM-DD).
        #[arg(long)]
        date: Option<String>,

        /// Filter expression, e.g. "recent_hits > 0 && absorption_volume".
        #[arg(long, conflicts_with = "all")]
        filter: Option<String>,

        /// Report every signal, unfiltered.
        #[arg(long, default_value_t = false)]
        all: bool,

        /// CSV output path.
        #[arg(long, default_value = "results.csv")]
        csv: PathBuf,

        /// Offline mode: analyze stored history only.
        #[arg(long, default_value_t = false)]
        offline: bool,

        /// History directory (overrides the config).
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Count float turnover cycles for a symbol from a start date.
    Turnover {
        symbol: String,

        /// Total float, in shares.
        float: u64,

        /// Start date (YYYY-MM-DD); must be a trading day in the history.
        start: String,

        /// Walk backwards from the day before the start date.
        #[arg(long, default_value_t = false)]
        reverse: bool,

        /// History directory. Defaults to ./stock_data.
        #[arg(long, default_value = "stock_data")]
        cache_dir: PathBuf,
    },
    /// History store commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report stored symbols, date ranges and bar counts.
    Status {
        /// History directory. Defaults to ./stock_data.
        #[arg(long, default_value = "stock_data")]
        cache_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            config,
            symbols,
            date,
            filter,
            all,
            csv,
            offline,
            cache_dir,
        } => run_scan(config, symbols, date, filter, all, csv, offline, cache_dir),
        Commands::Turnover {
            symbol,
            float,
            start,
            reverse,
            cache_dir,
        } => run_turnover(&symbol, float, &start, reverse, cache_dir),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
        },
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

fn build_provider(data: &DataConfig) -> Result<AlphaVantageProvider> {
    let api_key = std::env::var(&data.api_key_env)
        .with_context(|| format!("set {} to your Alpha Vantage API key", data.api_key_env))?;
    let mut options = AlphaVantageOptions::new(api_key);
    options.throttle = std::time::Duration::from_millis(data.throttle_ms);
    options.max_retries = data.max_retries;
    let breaker = Arc::new(CircuitBreaker::default_provider());
    Ok(AlphaVantageProvider::new(options, breaker)?)
}

#[allow(clippy::too_many_arguments)]
fn run_scan(
    config_path: Option<PathBuf>,
    symbols: Vec<String>,
    date: Option<String>,
    filter: Option<String>,
    all: bool,
    csv: PathBuf,
    offline: bool,
    cache_dir: Option<PathBuf>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => ScanConfig::from_file(&path)?,
        None => ScanConfig::default(),
    };
    if !symbols.is_empty() {
        config.symbols = symbols;
    }
    if let Some(dir) = cache_dir {
        config.data.cache_dir = dir;
    }
    config.batch.offline |= offline;
    config.validate()?;

    let date = date.as_deref().map(parse_date).transpose()?;
    let base = if all {
        Predicate::All
    } else if let Some(expr) = filter.as_deref() {
        Predicate::parse(expr)?
    } else if let Some(configured) = config.filter.clone() {
        configured
    } else {
        Predicate::vsa_setup(None)
    };
    let predicate = match date {
        Some(date) => base.on_date(date),
        None => base,
    };

    let store = JsonHistoryStore::new(&config.data.cache_dir);
    let provider: Box<dyn DataProvider> = if config.batch.offline {
        Box::new(StaticProvider::new())
    } else {
        Box::new(build_provider(&config.data)?)
    };

    let today = chrono::Local::now().date_naive();
    let symbols = config.normalized_symbols();
    let outcome = run_batch(&symbols, provider.as_ref(), &store, &config, today)?;

    for (sym, err) in &outcome.failed {
        eprintln!("Error for {sym}: {err}");
    }

    let results = predicate.apply(&outcome.signals);
    if matches!(predicate, Predicate::All) {
        println!("\nNo search filter provided. All results:\n");
    } else {
        println!("\nFilter: {predicate}\n");
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    let owned: Vec<_> = results.iter().map(|s| (*s).clone()).collect();
    print!("{}", render_table(&owned));
    save_signals_csv(&owned, &csv)?;

    if let Some(direction) = unanimous_direction(results.iter().copied()) {
        println!();
        println!("All results agree: {direction}.");
    }
    Ok(())
}

fn run_turnover(
    symbol: &str,
    float: u64,
    start: &str,
    reverse: bool,
    cache_dir: PathBuf,
) -> Result<()> {
    let start = parse_date(start)?;
    let symbol = symbol.trim().to_ascii_uppercase();
    let store = JsonHistoryStore::new(cache_dir);

    let bars = match store.read(&symbol)? {
        Some(record) => record.bars,
        None => {
            log::info!("{symbol} - no stored history, fetching full");
            let provider = build_provider(&DataConfig::default())?;
            let opts = UpdateOptions {
                today: chrono::Local::now().date_naive(),
                full_fetch_after_days: DataConfig::default().full_fetch_after_days,
                offline: false,
                force_full: true,
            };
            update_symbol(&symbol, &provider, &store, &opts)?.bars
        }
    };

    let direction = if reverse {
        TurnoverDirection::Reverse
    } else {
        TurnoverDirection::Forward
    };
    let report = float_turnover(&bars, float, start, direction)?;

    println!();
    println!("=== Float Turnover: {symbol} ===");
    println!("Start:            {}", report.start);
    println!("Direction:        {direction:?}");
    println!("Days considered:  {}", report.days_considered);
    println!("Turnovers:        {}", report.turnovers.len());
    for date in &report.turnovers {
        println!("  {date}");
    }
    println!("Float remaining:  {}", report.float_remaining);
    println!("Float remaining:  {:.2}%", report.percent_float_remaining);
    if let Some(avg) = report.average_volume_per_day {
        println!("Avg volume/day:   {avg:.0}");
    }
    if let Some(days) = report.estimated_days_remaining {
        println!("Est. days left:   {days:.1}");
    }
    Ok(())
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let store = JsonHistoryStore::new(cache_dir);
    let symbols = store.symbols()?;
    if symbols.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    let refs: Vec<&str> = symbols.iter().map(|s| s.as_str()).collect();
    let rows = store.status(&refs);

    println!("Cache: {}", cache_dir.display());
    println!("Symbols: {}", rows.len());
    println!();
    println!(
        "{:<8} {:<25} {:>8} {:<20}",
        "Symbol", "Date Range", "Bars", "Updated"
    );
    println!("{}", "-".repeat(64));
    for row in &rows {
        let range = match (row.start_date, row.end_date) {
            (Some(start), Some(end)) => format!("{start} to {end}"),
            _ => "(unreadable)".to_string(),
        };
        let bars = row.bar_count.map_or_else(|| "-".to_string(), |n| n.to_string());
        let updated = row
            .last_updated
            .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
        println!("{:<8} {:<25} {:>8} {:<20}", row.symbol, range, bars, updated);
    }

    if rows.iter().any(|r| !r.cached) {
        bail!("some history files could not be read; see warnings above");
    }
    Ok(())
}
