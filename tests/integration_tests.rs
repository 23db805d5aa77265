//! Integration tests for the intraday-patterns pipeline
//!
//! These tests verify that loading, simulation, encoding, clustering and
//! storage work together correctly.

use approx::assert_relative_eq;
use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tempfile::TempDir;

use intraday_patterns::cluster::{
    assemble_records, ClusteringStrategy, DensityClustering, GreedyClustering,
};
use intraday_patterns::config::{ClusterMethod, ClusterScope};
use intraday_patterns::grid::GridEncoder;
use intraday_patterns::pipeline::{cluster_runs, process_days, process_stock_file, run_batch};
use intraday_patterns::simulator::TradeSimulator;
use intraday_patterns::store::ResultStore;
use intraday_patterns::{data, Bar, CloseReason, Config, PriceField, Side, TradingDay};

// =============================================================================
// Test Utilities
// =============================================================================

fn session_open(date: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(&format!("{} 09:30:00", date), "%Y-%m-%d %H:%M:%S").unwrap()
}

/// 79 five-minute bars starting 09:30 with closes at `100 + shape(i)`
fn generate_day(stock: &str, date: &str, shape: impl Fn(usize) -> f64) -> TradingDay {
    let start = session_open(date);
    let bars = (0..79)
        .map(|i| {
            let price = 100.0 + shape(i);
            Bar::new(
                start + Duration::minutes(5 * i as i64),
                price,
                price + 0.05,
                price - 0.05,
                price,
                1_000,
            )
        })
        .collect();
    TradingDay::new(stock, bars).unwrap()
}

fn rising(i: usize) -> f64 {
    i as f64 * 0.02
}

fn falling(i: usize) -> f64 {
    -(i as f64) * 0.02
}

/// Rises for ten bars then falls back
fn peak(i: usize) -> f64 {
    let i = i as f64;
    if i < 10.0 {
        i * 0.05
    } else {
        (20.0 - i) * 0.05
    }
}

fn to_map(days: Vec<TradingDay>) -> BTreeMap<NaiveDate, TradingDay> {
    days.into_iter().map(|d| (d.date, d)).collect()
}

/// Write a source CSV in the export layout, one line per bar
fn write_source_file(dir: &Path, stock: &str, days: &[TradingDay]) {
    let mut text = String::from("datetime,symbol,frame,open,high,low,close,volume\n");
    for day in days {
        // Pre-session print that must be dropped
        let pre = session_open(&day.date.to_string()) - Duration::minutes(5);
        writeln!(text, "{},{},5,1,1,1,1,1", pre.format("%Y-%m-%d %H:%M:%S"), stock).unwrap();

        for bar in &day.bars {
            writeln!(
                text,
                "{},{},5,{},{},{},{},{}",
                bar.datetime.format("%Y-%m-%d %H:%M:%S"),
                stock,
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                bar.volume
            )
            .unwrap();
        }
    }
    std::fs::write(dir.join(format!("{}_5min.csv", stock)), text).unwrap();
}

// =============================================================================
// Simulation Scenarios
// =============================================================================

#[test]
fn test_flat_day_closes_at_end_of_day() {
    let day = generate_day("AAPL", "2022-03-01", |_| 0.0);
    let outcome = TradeSimulator::new(0.5, 20).simulate(&day).unwrap().unwrap();

    assert_eq!(outcome.close_reason, CloseReason::EndOfDay);
    assert_eq!(outcome.side, Side::Long);
    assert_eq!(outcome.revenue, dec!(0));
    assert_eq!(outcome.entry_time, day.bars[20].datetime);
    assert_eq!(outcome.exit_time, day.bars[78].datetime);
}

#[test]
fn test_stop_loss_exits_at_stop_price() {
    let mut day = generate_day("AAPL", "2022-03-01", |_| 0.0);
    day.bars[25].low = 99.4;

    let outcome = TradeSimulator::new(0.5, 20).simulate(&day).unwrap().unwrap();

    assert_eq!(outcome.close_reason, CloseReason::StopLoss);
    assert_eq!(outcome.side, Side::Long);
    assert_eq!(outcome.revenue, dec!(-0.5));
    assert_relative_eq!(outcome.exit_price, 99.5, epsilon = 1e-9);
    assert_eq!(outcome.exit_time, day.bars[25].datetime);
}

#[test]
fn test_falling_open_goes_short() {
    let day = generate_day("AAPL", "2022-03-01", falling);
    let outcome = TradeSimulator::new(0.5, 20).simulate(&day).unwrap().unwrap();
    assert_eq!(outcome.side, Side::Short);
    assert_eq!(outcome.close_reason, CloseReason::EndOfDay);
    assert!(outcome.revenue > dec!(0));
}

// =============================================================================
// Encoding + Clustering Scenarios
// =============================================================================

#[test]
fn test_identical_days_group_under_both_strategies() {
    let config = Config::default();
    let days = to_map(vec![
        generate_day("AAPL", "2022-03-01", peak),
        generate_day("AAPL", "2022-03-02", falling),
        generate_day("AAPL", "2022-03-03", peak),
    ]);
    let run = process_days("AAPL", &days, &config);
    assert_eq!(run.days_recorded(), 3);

    let greedy: Box<dyn ClusteringStrategy> = Box::new(GreedyClustering::default());
    let density: Box<dyn ClusteringStrategy> = Box::new(DensityClustering::default());

    for strategy in [greedy, density] {
        let rows = strategy.group(&run.records);
        let dates: Vec<String> = rows.iter().map(|r| r.date.to_string()).collect();
        assert_eq!(dates, vec!["2022-03-01", "2022-03-03"], "{}", strategy.name());
        assert_eq!(rows[0].group_label, rows[1].group_label);
        assert_eq!(rows[0].symbolic_code, rows[1].symbolic_code);
        assert_relative_eq!(rows[0].average_correlation, 1.0, epsilon = 1e-9);
    }
}

#[test]
fn test_codes_of_different_length_never_group() {
    let encoder_full = GridEncoder::new(0.25, 20, PriceField::Close);
    let encoder_short = GridEncoder::new(0.25, 15, PriceField::Close);
    let simulator = TradeSimulator::new(0.5, 20);

    let a = generate_day("AAPL", "2022-03-01", rising);
    let b = generate_day("AAPL", "2022-03-02", rising);

    let outcomes = BTreeMap::from([
        (a.key(), simulator.simulate(&a).unwrap().unwrap()),
        (b.key(), simulator.simulate(&b).unwrap().unwrap()),
    ]);
    let codes = BTreeMap::from([
        (a.key(), encoder_full.encode(&a.bars).unwrap()),
        (b.key(), encoder_short.encode(&b.bars).unwrap()),
    ]);
    let records = assemble_records(outcomes, codes);
    assert_eq!(records.len(), 2);

    assert!(GreedyClustering::default().group(&records).is_empty());
    assert!(DensityClustering::default().group(&records).is_empty());
}

#[test]
fn test_clustering_is_deterministic() {
    let config = Config::default();
    let days = to_map(vec![
        generate_day("AAPL", "2022-03-01", peak),
        generate_day("AAPL", "2022-03-02", rising),
        generate_day("AAPL", "2022-03-03", peak),
        generate_day("AAPL", "2022-03-04", rising),
        generate_day("AAPL", "2022-03-07", falling),
    ]);
    let run = process_days("AAPL", &days, &config);

    let strategy = GreedyClustering::default();
    let first = strategy.group(&run.records);
    let second = strategy.group(&run.records);
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

// =============================================================================
// End-to-end: CSV -> pipeline -> store
// =============================================================================

#[test]
fn test_end_to_end_discovery() {
    let dir = TempDir::new().unwrap();
    let aapl = vec![
        generate_day("AAPL", "2022-03-01", peak),
        generate_day("AAPL", "2022-03-02", falling),
        generate_day("AAPL", "2022-03-03", peak),
    ];
    let msft = vec![
        generate_day("MSFT", "2022-03-01", rising),
        generate_day("MSFT", "2022-03-02", rising),
    ];
    write_source_file(dir.path(), "AAPL", &aapl);
    write_source_file(dir.path(), "MSFT", &msft);
    std::fs::write(dir.path().join("readme.txt"), "not data").unwrap();

    let mut config = Config::default();
    config.data.source_dir = dir.path().to_string_lossy().into_owned();

    let files = data::list_source_files(&config.data.source_dir).unwrap();
    assert_eq!(files.len(), 2);

    let single = process_stock_file(&files[0], &config).unwrap();
    assert_eq!(single.stock, "AAPL");
    assert_eq!(single.days_seen, 3);

    let runs = run_batch(&files, &config, None);
    let stocks: Vec<&str> = runs.iter().map(|r| r.stock.as_str()).collect();
    assert_eq!(stocks, vec!["AAPL", "MSFT"]);

    let rows = cluster_runs(&runs, &config.clustering);
    assert_eq!(rows.len(), 4);
    assert!(rows[..2].iter().all(|r| r.stock == "AAPL"));
    assert!(rows[2..].iter().all(|r| r.stock == "MSFT"));

    let mut store = ResultStore::open(dir.path().join("results/patterns.db")).unwrap();
    let stored = store
        .append_rows(&config.output.table, &rows, Utc::now(), &config.hash())
        .unwrap();
    assert_eq!(stored, 4);

    let loaded = store.load_rows(&config.output.table).unwrap();
    assert_eq!(loaded.len(), 4);
    assert_eq!(loaded[0].stock, "AAPL");
    assert_eq!(loaded[0].date, "2022-03-01");
    assert_eq!(loaded[0].config_hash, config.hash());
}

#[test]
fn test_combined_scope_groups_across_stocks() {
    let config = Config::default();
    let a = process_days(
        "AAPL",
        &to_map(vec![generate_day("AAPL", "2022-03-01", peak)]),
        &config,
    );
    let m = process_days(
        "MSFT",
        &to_map(vec![generate_day("MSFT", "2022-03-01", peak)]),
        &config,
    );
    let runs = vec![a, m];

    let mut clustering = config.clustering.clone();
    assert!(cluster_runs(&runs, &clustering).is_empty());

    clustering.scope = ClusterScope::Combined;
    for method in [ClusterMethod::Greedy, ClusterMethod::Density] {
        clustering.method = method;
        let rows = cluster_runs(&runs, &clustering);
        assert_eq!(rows.len(), 2, "{:?}", method);
        assert_eq!(rows[0].group_label, rows[1].group_label);
    }
}
