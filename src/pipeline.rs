//! Discovery pipeline
//!
//! One job per source file: load, split into days, simulate and encode each
//! day. Jobs are independent and run on the rayon pool. Clustering starts
//! only after every job has finished.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::cluster::{
    assemble_records, ClusteringStrategy, DayRecords, DensityClustering, GreedyClustering,
    GroupRow,
};
use crate::config::{ClusterMethod, ClusterScope, ClusteringConfig, Config};
use crate::data::{group_bars_by_day, load_bars, stock_name_from_path};
use crate::grid::GridEncoder;
use crate::simulator::TradeSimulator;
use crate::TradingDay;

/// Per-stock job result
#[derive(Debug, Clone, Default)]
pub struct StockRun {
    pub stock: String,
    pub records: DayRecords,
    /// Days with the canonical bar count
    pub days_seen: usize,
    /// Canonical days that produced no record
    pub days_skipped: usize,
}

impl StockRun {
    /// Days that made it to clustering
    pub fn days_recorded(&self) -> usize {
        self.records.len()
    }
}

/// Simulate and encode every day of one stock.
///
/// A day that fails either step is logged and counted as skipped.
pub fn process_days(stock: &str, days: &BTreeMap<NaiveDate, TradingDay>, config: &Config) -> StockRun {
    let simulator = TradeSimulator::new(
        config.simulation.stop_loss_percent,
        config.simulation.warm_up_depth,
    );
    let encoder = GridEncoder::new(
        config.grid.volatility_unit,
        config.grid.depth,
        config.grid.price_basis,
    );

    let mut outcomes = BTreeMap::new();
    let mut codes = BTreeMap::new();

    for day in days.values() {
        let key = day.key();

        match simulator.simulate(day) {
            Ok(Some(outcome)) => {
                outcomes.insert(key.clone(), outcome);
            }
            Ok(None) => debug!("{}: no trade opened", key),
            Err(e) => warn!("{}: simulation failed: {}", key, e),
        }

        match encoder.encode(&day.bars) {
            Ok(code) => {
                codes.insert(key, code);
            }
            Err(e) => warn!("{}: encoding failed: {}", key, e),
        }
    }

    let records = assemble_records(outcomes, codes);
    let days_seen = days.len();
    let days_skipped = days_seen - records.len();

    debug!(
        "{}: {} days, {} recorded, {} skipped",
        stock,
        days_seen,
        records.len(),
        days_skipped
    );

    StockRun {
        stock: stock.to_string(),
        records,
        days_seen,
        days_skipped,
    }
}

/// Full per-stock job for one source file
pub fn process_stock_file(path: impl AsRef<Path>, config: &Config) -> Result<StockRun> {
    let path = path.as_ref();
    let stock = stock_name_from_path(path)?;
    let bars = load_bars(path, &config.data.session())
        .context(format!("Failed to load bars for {}", stock))?;
    let days = group_bars_by_day(bars, &stock, config.data.bars_per_day);

    Ok(process_days(&stock, &days, config))
}

/// Job wrapper that logs and swallows a failed file
pub fn try_process_file(path: &Path, config: &Config) -> Option<StockRun> {
    match process_stock_file(path, config) {
        Ok(run) => Some(run),
        Err(e) => {
            warn!("Skipping {}: {:#}", path.display(), e);
            None
        }
    }
}

/// Run every file's job in parallel and collect the results sorted by stock.
pub fn run_batch(files: &[PathBuf], config: &Config, progress: Option<&ProgressBar>) -> Vec<StockRun> {
    let jobs = files.par_iter().map(|path| try_process_file(path, config));
    let mut runs: Vec<StockRun> = match progress {
        Some(pb) => jobs.progress_with(pb.clone()).flatten().collect(),
        None => jobs.flatten().collect(),
    };

    sort_runs(&mut runs);
    info!("Processed {} of {} files", runs.len(), files.len());
    runs
}

pub fn sort_runs(runs: &mut [StockRun]) {
    runs.sort_by(|a, b| a.stock.cmp(&b.stock));
}

/// Strategy for the configured method
pub fn build_strategy(config: &ClusteringConfig) -> Box<dyn ClusteringStrategy> {
    match config.method {
        ClusterMethod::Greedy => Box::new(GreedyClustering::new(config.threshold)),
        ClusterMethod::Density => {
            Box::new(DensityClustering::new(config.threshold, config.min_samples))
        }
    }
}

/// Cluster the collected runs, per stock or all together.
pub fn cluster_runs(runs: &[StockRun], config: &ClusteringConfig) -> Vec<GroupRow> {
    let strategy = build_strategy(config);
    info!(
        "Clustering {} stocks with {} strategy ({:?} scope, threshold {})",
        runs.len(),
        strategy.name(),
        config.scope,
        config.threshold
    );

    match config.scope {
        ClusterScope::PerStock => runs
            .iter()
            .flat_map(|run| strategy.group(&run.records))
            .collect(),
        ClusterScope::Combined => {
            let combined: DayRecords = runs
                .iter()
                .flat_map(|run| run.records.iter().map(|(k, r)| (k.clone(), r.clone())))
                .collect();
            strategy.group(&combined)
        }
    }
}
