//! Discover command implementation with progress tracking

use anyhow::{bail, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use intraday_patterns::cluster::summarize_groups;
use intraday_patterns::config::{ClusterMethod, ClusterScope};
use intraday_patterns::pipeline::{cluster_runs, run_batch, sort_runs, try_process_file, StockRun};
use intraday_patterns::store::{write_csv, ResultStore};
use intraday_patterns::data;
use tracing::info;

const TOP_GROUPS: usize = 15;

#[derive(Debug)]
pub struct DiscoverArgs {
    pub config: Option<String>,
    pub data_dir: Option<String>,
    pub method: Option<ClusterMethod>,
    pub scope: Option<ClusterScope>,
    pub threshold: Option<f64>,
    pub db: Option<String>,
    pub csv: Option<String>,
    pub sequential: bool,
}

pub fn run(args: DiscoverArgs) -> Result<()> {
    let mut config = super::load_config(args.config.as_deref())?;

    // CLI overrides
    if let Some(dir) = args.data_dir {
        config.data.source_dir = dir;
    }
    if let Some(method) = args.method {
        config.clustering.method = method;
    }
    if let Some(scope) = args.scope {
        config.clustering.scope = scope;
    }
    if let Some(threshold) = args.threshold {
        config.clustering.threshold = threshold;
    }
    if let Some(db) = args.db {
        config.output.db_path = db;
    }
    if args.csv.is_some() {
        config.output.csv_path = args.csv;
    }

    config.validate()?;
    let config_hash = config.hash();
    info!("Config hash: {}", config_hash);

    let files = data::list_source_files(&config.data.source_dir)?;
    if files.is_empty() {
        bail!("No CSV files found in {}", config.data.source_dir);
    }

    println!("\n{}", "=".repeat(70));
    println!("PATTERN DISCOVERY");
    println!("{}", "=".repeat(70));
    println!("  Source:        {} ({} files)", config.data.source_dir, files.len());
    println!(
        "  Simulation:    stop {}%, warm-up {} bars",
        config.simulation.stop_loss_percent, config.simulation.warm_up_depth
    );
    println!(
        "  Grid:          unit {}, depth {}, basis {}",
        config.grid.volatility_unit, config.grid.depth, config.grid.price_basis
    );
    println!(
        "  Clustering:    {:?}, {:?}, threshold {}",
        config.clustering.method, config.clustering.scope, config.clustering.threshold
    );
    println!("  Mode:          {}", if args.sequential { "sequential" } else { "parallel" });
    println!("{}\n", "=".repeat(70));

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec:.2}] {msg}")?
            .progress_chars("█░ "),
    );

    let runs: Vec<StockRun> = if args.sequential {
        let mut runs: Vec<StockRun> = files
            .iter()
            .filter_map(|path| {
                let run = try_process_file(path, &config);
                pb.inc(1);
                run
            })
            .collect();
        sort_runs(&mut runs);
        runs
    } else {
        run_batch(&files, &config, Some(&pb))
    };

    let days_seen: usize = runs.iter().map(|r| r.days_seen).sum();
    let days_recorded: usize = runs.iter().map(|r| r.days_recorded()).sum();
    pb.finish_with_message(format!("{} days recorded", days_recorded));
    println!();

    let rows = cluster_runs(&runs, &config.clustering);
    let summaries = summarize_groups(&rows);

    let mut store = ResultStore::open(&config.output.db_path)?;
    let stored = store.append_rows(&config.output.table, &rows, Utc::now(), &config_hash)?;
    if let Some(csv_path) = &config.output.csv_path {
        write_csv(csv_path, &rows)?;
    }

    println!("\n{}", "=".repeat(100));
    println!("DISCOVERY SUMMARY");
    println!("{}", "=".repeat(100));
    println!("  Stocks processed:  {}/{}", runs.len(), files.len());
    println!("  Days seen:         {}", days_seen);
    println!("  Days recorded:     {}", days_recorded);
    println!("  Groups found:      {}", summaries.len());
    println!("  Rows stored:       {} -> {}:{}", stored, config.output.db_path, config.output.table);
    if let Some(csv_path) = &config.output.csv_path {
        println!("  CSV export:        {}", csv_path);
    }

    if !summaries.is_empty() {
        let mut top = summaries;
        top.sort_by(|a, b| b.members.cmp(&a.members));

        println!("\n{:>7} {:>8} {:>6} {:>6} {:>9} | Group", "Members", "AvgCorr", "Longs", "SL", "AvgRev%");
        println!("{}", "-".repeat(100));
        for s in top.iter().take(TOP_GROUPS) {
            println!(
                "{:>7} {:>8.3} {:>6} {:>6} {:>9.2} | {}",
                s.members,
                s.average_correlation,
                s.longs,
                s.stop_losses,
                s.mean_revenue,
                truncate(&s.group_label, 60)
            );
        }
    }
    println!("{}", "=".repeat(100));

    info!(
        "Discovery complete: {} stocks, {} days, {} grouped rows",
        runs.len(),
        days_recorded,
        rows.len()
    );
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
