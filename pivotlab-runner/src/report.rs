//! Reporting: CSV export and terminal summary for scan results.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use pivotlab_core::analysis::Signal;
use pivotlab_core::domain::Direction;

const NOT_AVAILABLE: &str = "N/A";

fn opt_to_string<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| NOT_AVAILABLE.to_string(), |v| v.to_string())
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export signals as CSV, one row per signal.
///
/// Columns: symbol, date, trade, prior_hits, recent_hits,
/// recent_hits_on_greater_volume, absorption_volume,
/// all_recent_hits_decreasing, below_avg_vol, opolv, opolv_date, close,
/// next_close. Unknown values are written as `N/A`.
pub fn export_signals_csv(signals: &[Signal]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "symbol",
        "date",
        "trade",
        "prior_hits",
        "recent_hits",
        "recent_hits_on_greater_volume",
        "absorption_volume",
        "all_recent_hits_decreasing",
        "below_avg_vol",
        "opolv",
        "opolv_date",
        "close",
        "next_close",
    ])?;

    for s in signals {
        wtr.write_record([
            s.symbol.clone(),
            s.date.to_string(),
            s.trade.to_string(),
            s.prior_hits_count.to_string(),
            s.recent_hits_count.to_string(),
            s.recent_hits_on_greater_volume_count.to_string(),
            s.absorption_volume.to_string(),
            opt_to_string(s.all_recent_hits_decreasing),
            s.below_avg_vol.to_string(),
            s.outer_pivot_on_lower_volume.to_string(),
            opt_to_string(s.outer_pivot_on_lower_volume_date),
            format!("{:.4}", s.close),
            s.next_day_close
                .map_or_else(|| NOT_AVAILABLE.to_string(), |c| format!("{c:.4}")),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Write the signal CSV to `path`, replacing any previous results.
pub fn save_signals_csv(signals: &[Signal], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output dir: {}", parent.display()))?;
    }
    let csv = export_signals_csv(signals)?;
    std::fs::write(path, csv).with_context(|| format!("failed to write {}", path.display()))?;
    log::info!("CSV results written to {}", path.display());
    Ok(())
}

// ─── Summary ────────────────────────────────────────────────────────

/// Long/short tallies. Weighted counts sum each signal's recent hits on
/// greater volume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSummary {
    pub long: usize,
    pub short: usize,
    pub weighted_long: usize,
    pub weighted_short: usize,
}

impl SignalSummary {
    pub fn from_signals<'a, I>(signals: I) -> Self
    where
        I: IntoIterator<Item = &'a Signal>,
    {
        let mut summary = Self::default();
        for s in signals {
            match s.trade {
                Direction::Long => {
                    summary.long += 1;
                    summary.weighted_long += s.recent_hits_on_greater_volume_count;
                }
                Direction::Short => {
                    summary.short += 1;
                    summary.weighted_short += s.recent_hits_on_greater_volume_count;
                }
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.long + self.short
    }

    /// `None` when there are no short signals.
    pub fn long_short_ratio(&self) -> Option<f64> {
        ratio(self.long, self.short)
    }

    pub fn weighted_ratio(&self) -> Option<f64> {
        ratio(self.weighted_long, self.weighted_short)
    }
}

fn ratio(a: usize, b: usize) -> Option<f64> {
    (b > 0).then(|| a as f64 / b as f64)
}

fn fmt_ratio(r: Option<f64>) -> String {
    r.map_or_else(|| NOT_AVAILABLE.to_string(), |r| format!("{r:.3}"))
}

/// Render signals and their summary as a fixed-width terminal table.
pub fn render_table(signals: &[Signal]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<8} {:<10} {:<5} {:>4} {:>4} {:>5} {:<5} {:<5} {:<5} {:<5} {:<10}",
        "Symbol", "Date", "Trade", "APH", "RH", "RHOGV", "AV", "RHAD", "BAV", "OPLV", "OPLV Date"
    );
    let _ = writeln!(out, "{}", "-".repeat(84));
    for s in signals {
        let _ = writeln!(
            out,
            "{:<8} {:<10} {:<5} {:>4} {:>4} {:>5} {:<5} {:<5} {:<5} {:<5} {:<10}",
            s.symbol,
            s.date.to_string(),
            s.trade.as_str(),
            s.prior_hits_count,
            s.recent_hits_count,
            s.recent_hits_on_greater_volume_count,
            s.absorption_volume,
            opt_to_string(s.all_recent_hits_decreasing),
            s.below_avg_vol,
            s.outer_pivot_on_lower_volume,
            opt_to_string(s.outer_pivot_on_lower_volume_date),
        );
    }

    let summary = SignalSummary::from_signals(signals);
    let _ = writeln!(out);
    let _ = writeln!(out, "Long/Short Ratio: {}", fmt_ratio(summary.long_short_ratio()));
    let _ = writeln!(out, "Weighted Ratio:   {}", fmt_ratio(summary.weighted_ratio()));
    let _ = writeln!(out, "Weighted Long:    {}", summary.weighted_long);
    let _ = writeln!(out, "Weighted Short:   {}", summary.weighted_short);
    let _ = writeln!(out, "Long:             {}", summary.long);
    let _ = writeln!(out, "Short:            {}", summary.short);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn signal(symbol: &str, trade: Direction, rhogv: usize, next: Option<f64>) -> Signal {
        let date = NaiveDate::from_ymd_opt(2017, 6, 13).unwrap();
        Signal {
            symbol: symbol.into(),
            date,
            trade,
            prior_hits_count: 2,
            prior_hit_dates: vec![],
            recent_hits_count: rhogv,
            recent_hit_dates: vec![],
            recent_hits_on_greater_volume_count: rhogv,
            recent_hits_on_greater_volume_dates: vec![],
            absorption_volume: true,
            all_recent_hits_decreasing: None,
            below_avg_vol: false,
            outer_pivot_on_lower_volume: false,
            outer_pivot_on_lower_volume_date: None,
            price: 10.0,
            volume: 100,
            trailing_avg_volume: None,
            close: 10.25,
            next_day_close: next,
        }
    }

    #[test]
    fn csv_has_header_and_na_for_unknowns() {
        let csv = export_signals_csv(&[signal("ACME", Direction::Short, 1, None)]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "symbol,date,trade,prior_hits,recent_hits,recent_hits_on_greater_volume,absorption_volume,all_recent_hits_decreasing,below_avg_vol,opolv,opolv_date,close,next_close"
        );
        assert_eq!(
            lines.next().unwrap(),
            "ACME,2017-06-13,short,2,1,1,true,N/A,false,false,N/A,10.2500,N/A"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn csv_writes_known_next_close() {
        let csv = export_signals_csv(&[signal("ACME", Direction::Long, 0, Some(11.0))]).unwrap();
        assert!(csv.lines().nth(1).unwrap().ends_with(",10.2500,11.0000"));
    }

    #[test]
    fn save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/results.csv");
        save_signals_csv(&[signal("ACME", Direction::Long, 1, None)], &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 2);
    }

    #[test]
    fn summary_counts_and_ratios() {
        let signals = vec![
            signal("A", Direction::Long, 3, None),
            signal("B", Direction::Long, 1, None),
            signal("C", Direction::Short, 2, None),
        ];
        let summary = SignalSummary::from_signals(&signals);
        assert_eq!(summary.long, 2);
        assert_eq!(summary.short, 1);
        assert_eq!(summary.weighted_long, 4);
        assert_eq!(summary.weighted_short, 2);
        assert_eq!(summary.long_short_ratio(), Some(2.0));
        assert_eq!(summary.weighted_ratio(), Some(2.0));
        assert_eq!(summary.total(), 3);
    }

    #[test]
    fn ratio_without_shorts_is_unavailable() {
        let summary = SignalSummary::from_signals(&[signal("A", Direction::Long, 1, None)]);
        assert_eq!(summary.long_short_ratio(), None);
        let table = render_table(&[signal("A", Direction::Long, 1, None)]);
        assert!(table.contains("Long/Short Ratio: N/A"));
        assert!(table.contains("Long:             1"));
    }
}
