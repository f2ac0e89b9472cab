//! Integration tests for the batch driver: retry replay, offline runs,
//! provider outages, filtering and export of the collected signals.

use chrono::{Duration, NaiveDate};
use serde_json::{json, Map, Value as Json};

use pivotlab_core::data::{
    DataError, DataProvider, FetchMode, FetchResult, HistoryStore, JsonHistoryStore,
    StaticProvider,
};
use pivotlab_core::domain::Direction;
use pivotlab_runner::{
    export_signals_csv, run_batch, unanimous_direction, update_symbol, Predicate, ScanConfig,
    ScanError, UpdateOptions,
};

fn day(i: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap() + Duration::days(i)
}

/// Lows alternate 10/11 so every odd day is a pivot low retesting the same level.
/// Highs alternate the other way so every even day after the first is a pivot high.
fn payload(days: std::ops::Range<i64>) -> Json {
    let mut series = Map::new();
    for i in days {
        let (low, high) = if i % 2 == 1 { (10.0, 11.0) } else { (11.0, 12.0) };
        series.insert(
            day(i).to_string(),
            json!({
                "2. high": format!("{high:.4}"),
                "3. low": format!("{low:.4}"),
                "4. close": format!("{:.4}", (low + high) / 2.0),
                "5. volume": format!("{}", 2_000_000 - i * 1_000),
            }),
        );
    }
    json!({ "Time Series (Daily)": series })
}

fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn seed(store: &JsonHistoryStore, symbol: &str, days: std::ops::Range<i64>) {
    let provider = StaticProvider::new().with_payload(symbol, payload(days.clone()));
    let opts = UpdateOptions {
        today: day(days.end),
        full_fetch_after_days: 100,
        offline: false,
        force_full: false,
    };
    update_symbol(symbol, &provider, store, &opts).unwrap();
}

/// A provider whose circuit breaker is open.
struct Blocked;

impl DataProvider for Blocked {
    fn name(&self) -> &str {
        "blocked"
    }

    fn fetch_daily(&self, _symbol: &str, _mode: FetchMode) -> Result<FetchResult, DataError> {
        panic!("blocked provider must not be called");
    }

    fn is_available(&self) -> bool {
        false
    }
}

#[test]
fn retries_are_replayed_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonHistoryStore::new(dir.path());
    // GAP has ten stored days; its compact window (last 100 of 250) will not reach them.
    seed(&store, "GAP", 0..10);

    let provider = StaticProvider::new()
        .with_payload("GOOD", payload(0..60))
        .with_payload("FLAKY", payload(0..60))
        .with_payload("GAP", payload(0..250))
        .with_payload("LOCKED", payload(0..60));
    provider.fail_next("FLAKY", DataError::NetworkUnreachable("connection reset".into()));
    provider.fail_next("LOCKED", DataError::AuthenticationRequired("bad key".into()));

    let config = ScanConfig::default();
    let outcome = run_batch(
        &symbols(&["GOOD", "FLAKY", "NOPE", "GAP", "LOCKED"]),
        &provider,
        &store,
        &config,
        day(60),
    )
    .unwrap();

    let mut succeeded = outcome.succeeded.clone();
    succeeded.sort();
    assert_eq!(succeeded, vec!["FLAKY", "GAP", "GOOD"]);

    let mut failed: Vec<&str> = outcome.failed.iter().map(|(s, _)| s.as_str()).collect();
    failed.sort();
    assert_eq!(failed, vec!["LOCKED", "NOPE"]);
    assert!(!outcome.all_succeeded());

    let mut retried = outcome.retried.clone();
    retried.sort();
    assert_eq!(retried, vec!["FLAKY", "GAP", "NOPE"]);

    // The merge gap is replayed as a full fetch that replaces the stored history.
    let gap_calls: Vec<FetchMode> = provider
        .calls()
        .into_iter()
        .filter(|(s, _)| s == "GAP")
        .map(|(_, m)| m)
        .collect();
    assert_eq!(gap_calls, vec![FetchMode::Compact, FetchMode::Full]);
    assert_eq!(store.read("GAP").unwrap().unwrap().bar_count, 250);

    // Non-retryable errors are not replayed.
    let locked_calls = provider.calls().iter().filter(|(s, _)| s == "LOCKED").count();
    assert_eq!(locked_calls, 1);

    assert!(outcome
        .signals
        .windows(2)
        .all(|w| (w[0].date, &w[0].symbol, w[0].trade.as_str())
            <= (w[1].date, &w[1].symbol, w[1].trade.as_str())));
    assert!(outcome.signals.iter().any(|s| s.symbol == "GAP"));
}

#[test]
fn zero_retry_passes_fail_fast() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonHistoryStore::new(dir.path());
    let provider = StaticProvider::new().with_payload("FLAKY", payload(0..30));
    provider.fail_next("FLAKY", DataError::RateLimited { retry_after_secs: 60 });

    let mut config = ScanConfig::default();
    config.batch.max_retry_passes = 0;
    let outcome = run_batch(&symbols(&["FLAKY"]), &provider, &store, &config, day(30)).unwrap();

    assert!(outcome.succeeded.is_empty());
    assert!(outcome.retried.is_empty());
    assert!(matches!(
        outcome.failed[0].1,
        ScanError::Data(DataError::RateLimited { .. })
    ));
}

#[test]
fn blocked_provider_skips_every_symbol() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonHistoryStore::new(dir.path());

    let outcome = run_batch(
        &symbols(&["AAA", "BBB"]),
        &Blocked,
        &store,
        &ScanConfig::default(),
        day(0),
    )
    .unwrap();

    assert_eq!(outcome.failed.len(), 2);
    assert!(outcome
        .failed
        .iter()
        .all(|(_, e)| matches!(e, ScanError::Data(DataError::CircuitBreakerTripped))));
}

#[test]
fn offline_scan_reads_the_store_only() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonHistoryStore::new(dir.path());
    seed(&store, "OSC", 0..40);

    let mut config = ScanConfig::default();
    config.batch.offline = true;
    let outcome = run_batch(&symbols(&["OSC", "MISSING"]), &Blocked, &store, &config, day(40)).unwrap();

    assert_eq!(outcome.succeeded, vec!["OSC"]);
    assert_eq!(outcome.failed.len(), 1);
    assert!(matches!(
        outcome.failed[0].1,
        ScanError::Data(DataError::NoCachedData { .. })
    ));
    assert!(!outcome.signals.is_empty());
}

#[test]
fn filtered_signals_export_and_agree() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonHistoryStore::new(dir.path());
    let provider = StaticProvider::new().with_payload("OSC", payload(0..40));

    let outcome = run_batch(&symbols(&["OSC"]), &provider, &store, &ScanConfig::default(), day(40)).unwrap();
    assert!(outcome.signals.iter().any(|s| s.trade == Direction::Long));
    assert!(outcome.signals.iter().any(|s| s.trade == Direction::Short));
    assert_eq!(unanimous_direction(&outcome.signals), None);

    let longs = Predicate::parse("trade == long && prior_hits > 0").unwrap();
    let kept = longs.apply(&outcome.signals);
    assert!(!kept.is_empty());
    assert_eq!(unanimous_direction(kept.iter().copied()), Some(Direction::Long));

    let owned: Vec<_> = kept.into_iter().cloned().collect();
    let csv = export_signals_csv(&owned).unwrap();
    assert_eq!(csv.lines().count(), owned.len() + 1);
    assert!(csv.lines().skip(1).all(|l| l.starts_with("OSC,") && l.contains(",long,")));
}

#[test]
fn invalid_analysis_config_is_rejected_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonHistoryStore::new(dir.path());
    let mut config = ScanConfig::default();
    config.pivots.lookback = 0;

    let err = run_batch(&symbols(&["AAA"]), &Blocked, &store, &config, day(0)).unwrap_err();
    assert!(matches!(err, ScanError::Config(_)));
}
