//! End-to-end per-symbol pipeline: payload → store → merge → analysis.

use chrono::{Duration, NaiveDate, Utc};
use serde_json::{json, Map, Value};

use pivotlab_core::analysis::{build_signals, find_hits, mark_all_pivots, HitParams};
use pivotlab_core::data::{
    merge_history, normalize_daily, required_fetch_mode, DailyPayload, DataProvider, FetchMode,
    HistoryRecord, HistoryStore, JsonHistoryStore, StaticProvider,
};
use pivotlab_core::domain::Direction;

fn day(i: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(i)
}

/// Daily payload with lows oscillating between 10 and 11, newest first like upstream.
fn oscillating_payload(days: i64) -> Value {
    let mut series = Map::new();
    for i in (0..days).rev() {
        let (low, high, volume) = if i % 2 == 1 {
            (10.0, 10.8, 500_000 - i * 1_000)
        } else {
            (11.0, 11.8, 300_000)
        };
        series.insert(
            format!("{} 16:00:00", day(i)),
            json!({
                "1. open": format!("{:.2}", low + 0.2),
                "2. high": format!("{high:.2}"),
                "3. low": format!("{low:.2}"),
                "4. close": format!("{:.2}", (high + low) / 2.0),
                "5. volume": volume.to_string(),
            }),
        );
    }
    json!({ "Meta Data": {}, "Time Series (Daily)": series })
}

#[test]
fn falling_lows_have_no_hits() {
    let lows = [10.0, 9.0, 9.5, 8.0, 9.0];
    let mut series = Map::new();
    for (i, low) in lows.iter().enumerate() {
        series.insert(
            day(i as i64).to_string(),
            json!({"2. high": low + 1.0, "3. low": low, "4. close": low + 0.5, "5. volume": 1000}),
        );
    }
    let payload = DailyPayload::from_value(json!({ "Time Series (Daily)": series })).unwrap();
    let bars = normalize_daily("LOWS", payload).unwrap();

    let marked = mark_all_pivots(&bars, 14);
    assert_eq!(marked.pivot_lows, vec![1, 3]);

    let pivots = find_hits("LOWS", Direction::Long, &marked.bars, &marked.pivot_lows, &HitParams::default()).unwrap();
    // 8.0 is far outside the band around 9.0.
    assert_eq!(pivots[1].prior_hits_count(), 0);
    assert!(build_signals(Direction::Long, &pivots, "LOWS").is_empty());
}

#[test]
fn store_merge_and_analyze() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonHistoryStore::new(dir.path());
    let provider = StaticProvider::new().with_payload("OSC", oscillating_payload(40));

    // First run: nothing stored, full fetch.
    let today = day(40);
    assert_eq!(required_fetch_mode(None, today, 100), FetchMode::Full);
    let fetched = provider.fetch_daily("OSC", FetchMode::Full).unwrap();
    let bars = merge_history(Vec::new(), fetched.bars).unwrap();
    let record = HistoryRecord::new(bars, Utc::now()).unwrap();
    store.write("OSC", &record).unwrap();

    // Second run: the stored record is recent, so compact suffices and the merge is a no-op.
    let stored = store.read("OSC").unwrap().unwrap();
    assert_eq!(stored.bar_count, 40);
    assert_eq!(stored.last_date_retrieved, day(39));
    assert_eq!(required_fetch_mode(Some(&stored), today, 100), FetchMode::Compact);
    let again = provider.fetch_daily("OSC", FetchMode::Compact).unwrap();
    let merged = merge_history(stored.bars.clone(), again.bars).unwrap();
    assert_eq!(merged, stored.bars);

    let marked = mark_all_pivots(&merged, 14);
    // Every odd day is a pivot low, including the most recent bar.
    assert_eq!(marked.pivot_lows.len(), 20);

    let pivots = find_hits("OSC", Direction::Long, &marked.bars, &marked.pivot_lows, &HitParams::default()).unwrap();
    let signals = build_signals(Direction::Long, &pivots, "OSC");
    assert_eq!(signals.len(), 19);

    let last = signals.last().unwrap();
    assert_eq!(last.date, day(39));
    assert_eq!(last.prior_hits_count, 19);
    // Older pivots carried more volume and each step down stays above today's.
    assert_eq!(last.recent_hits_on_greater_volume_count, 19);
    assert_eq!(last.all_recent_hits_decreasing, Some(true));
    assert_eq!(last.next_day_close, None);
}
