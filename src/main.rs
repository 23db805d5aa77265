//! Intraday pattern discovery - main entry point
//!
//! This binary provides two subcommands:
//! - discover: Run the full pipeline over a directory of source files
//! - inspect: Show per-day outcomes and codes for one file

use anyhow::Result;
use clap::{Parser, Subcommand};
use intraday_patterns::config::{ClusterMethod, ClusterScope};
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "intraday-patterns")]
#[command(about = "Discover recurring intraday price-path patterns and their trade outcomes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Simulate, encode and cluster every source file
    Discover {
        /// Path to configuration file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Directory of per-stock CSV files (overrides config file)
        #[arg(short, long)]
        data_dir: Option<String>,

        /// Clustering method
        #[arg(short, long, value_enum)]
        method: Option<ClusterMethod>,

        /// Cluster per stock or across all stocks
        #[arg(long, value_enum)]
        scope: Option<ClusterScope>,

        /// Correlation threshold
        #[arg(short, long)]
        threshold: Option<f64>,

        /// SQLite database path
        #[arg(long)]
        db: Option<String>,

        /// Also export grouped rows to this CSV file
        #[arg(long)]
        csv: Option<String>,

        /// Run sequentially instead of parallel
        #[arg(long)]
        sequential: bool,
    },

    /// Print each day's trade outcome and symbolic code for one file
    Inspect {
        /// Source CSV file
        #[arg(short, long)]
        file: String,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },
}

/// Where log lines go for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogTarget {
    /// Console and log file
    ConsoleAndFile,
    /// Log file only, keeping the console free for the progress bar
    FileOnly,
}

/// Initialise tracing: `logs/{command}_{date}.log` always, plus the console
/// for commands that print no progress bar.
///
/// The returned guard flushes the non-blocking file writer when dropped and
/// must live until the command finishes.
fn setup_logging(verbose: bool, command_name: &str, target: LogTarget) -> Result<WorkerGuard> {
    let log_dir = PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(&log_dir, &log_filename));

    // Crate logs follow --verbose; dependencies stay at warn
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,intraday_patterns={level}")));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    let console_layer = (target == LogTarget::ConsoleAndFile).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    info!("Log file: {}", log_dir.join(&log_filename).display());
    Ok(guard)
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let (command_name, target) = match &cli.command {
        Commands::Discover { .. } => ("discover", LogTarget::FileOnly),
        Commands::Inspect { .. } => ("inspect", LogTarget::ConsoleAndFile),
    };

    let _log_guard = setup_logging(cli.verbose, command_name, target)?;

    match cli.command {
        Commands::Discover {
            config,
            data_dir,
            method,
            scope,
            threshold,
            db,
            csv,
            sequential,
        } => commands::discover::run(commands::discover::DiscoverArgs {
            config,
            data_dir,
            method,
            scope,
            threshold,
            db,
            csv,
            sequential,
        }),

        Commands::Inspect { file, config } => commands::inspect::run(file, config),
    }
}
