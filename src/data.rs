//! Data loading
//!
//! Reads per-stock intraday CSV exports, keeps the regular session and
//! splits the bars into trading days.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{Bar, TradingDay};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Column positions in the source export
const COL_DATETIME: usize = 0;
const COL_OPEN: usize = 3;
const COL_HIGH: usize = 4;
const COL_LOW: usize = 5;
const COL_CLOSE: usize = 6;
const COL_VOLUME: usize = 7;

// =============================================================================
// Session window
// =============================================================================

/// Open interval of wall-clock times kept from each day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl SessionWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Strictly inside the window
    pub fn contains(&self, time: NaiveTime) -> bool {
        time > self.start && time < self.end
    }
}

impl Default for SessionWindow {
    /// 09:30..=16:00 regular session
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 29, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(16, 1, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

// =============================================================================
// CSV Data Loading
// =============================================================================

/// Load the in-session bars of one source file, in file order.
///
/// Rows with an empty price field are dropped; an empty volume reads as 0.
pub fn load_bars(path: impl AsRef<Path>, session: &SessionWindow) -> Result<Vec<Bar>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .context(format!("Failed to open CSV file {}", path.display()))?;

    let mut bars = Vec::new();
    let mut incomplete = 0usize;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(COL_DATETIME).context("Missing datetime column")?;
        let datetime = NaiveDateTime::parse_from_str(dt_str.trim(), DATETIME_FORMAT)
            .context(format!("Failed to parse datetime: {}", dt_str))?;

        if !session.contains(datetime.time()) {
            continue;
        }

        let prices = [COL_OPEN, COL_HIGH, COL_LOW, COL_CLOSE]
            .iter()
            .map(|&col| parse_price(record.get(col), row_idx + 1))
            .collect::<Result<Vec<_>>>()?;
        let (open, high, low, close) = match prices.as_slice() {
            [Some(o), Some(h), Some(l), Some(c)] => (*o, *h, *l, *c),
            _ => {
                incomplete += 1;
                continue;
            }
        };

        let volume = parse_volume(record.get(COL_VOLUME))
            .context(format!("Failed to parse volume on row {}", row_idx + 1))?;

        bars.push(Bar::new(datetime, open, high, low, close, volume));
    }

    if incomplete > 0 {
        debug!("{}: dropped {} rows with missing prices", path.display(), incomplete);
    }

    Ok(bars)
}

/// `None` for an empty or missing field
fn parse_price(field: Option<&str>, row: usize) -> Result<Option<f64>> {
    match field.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .map(Some)
            .context(format!("Failed to parse price '{}' on row {}", s, row)),
    }
}

/// Accepts integer and float renderings ("1200", "1200.0")
fn parse_volume(field: Option<&str>) -> Result<u64> {
    let s = match field.map(str::trim) {
        None | Some("") => return Ok(0),
        Some(s) => s,
    };

    if let Ok(v) = s.parse::<u64>() {
        return Ok(v);
    }
    let v: f64 = s.parse().context(format!("Invalid volume '{}'", s))?;
    if !(v.is_finite() && v >= 0.0) {
        bail!("Invalid volume '{}'", s);
    }
    Ok(v as u64)
}

/// Stock ticker from a file name like `AAPL_5min.csv`
pub fn stock_name_from_path(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .context(format!("No file name in {}", path.display()))?;
    let name = stem.split('_').next().unwrap_or_default();

    if name.is_empty() || !name.chars().all(|c| c.is_ascii_uppercase()) {
        bail!("Cannot derive a stock name from {}", path.display());
    }
    Ok(name.to_string())
}

/// Sorted `*.csv` files of a directory
pub fn list_source_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let entries =
        fs::read_dir(dir).context(format!("Failed to read data directory {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort();

    info!("Found {} source files in {}", files.len(), dir.display());
    Ok(files)
}

// =============================================================================
// Day grouping
// =============================================================================

/// Split bars into trading days, keeping only days with exactly
/// `bars_per_day` bars.
pub fn group_bars_by_day(
    bars: Vec<Bar>,
    stock: &str,
    bars_per_day: usize,
) -> BTreeMap<NaiveDate, TradingDay> {
    let mut by_date: BTreeMap<NaiveDate, Vec<Bar>> = BTreeMap::new();
    for bar in bars {
        by_date.entry(bar.datetime.date()).or_default().push(bar);
    }

    let mut days = BTreeMap::new();
    for (date, mut day_bars) in by_date {
        if day_bars.len() != bars_per_day {
            debug!(
                "{} {}: skipping day with {} bars (expected {})",
                stock,
                date,
                day_bars.len(),
                bars_per_day
            );
            continue;
        }

        day_bars.sort_by_key(|b| b.datetime);
        match TradingDay::new(stock, day_bars) {
            Ok(day) => {
                days.insert(date, day);
            }
            Err(e) => warn!("{} {}: {}", stock, date, e),
        }
    }

    days
}

// =============================================================================
// Tests
// =============================================================================
