//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable overrides for data and database locations.

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use crate::cluster::DEFAULT_CORRELATION_THRESHOLD;
use crate::data::SessionWindow;
use crate::PriceField;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Override locations from `PATTERNS_DATA_DIR` / `PATTERNS_DB_PATH` if set
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("PATTERNS_DATA_DIR") {
            self.data.source_dir = dir;
        }
        if let Ok(db) = std::env::var("PATTERNS_DB_PATH") {
            self.output.db_path = db;
        }
    }

    /// Reject parameter combinations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let sim = &self.simulation;
        if !(sim.stop_loss_percent.is_finite() && sim.stop_loss_percent > 0.0) {
            bail!("simulation.stop_loss_percent must be positive, got {}", sim.stop_loss_percent);
        }
        if sim.warm_up_depth >= self.data.bars_per_day {
            bail!(
                "simulation.warm_up_depth ({}) leaves no bar to enter on in a {}-bar day",
                sim.warm_up_depth,
                self.data.bars_per_day
            );
        }

        let grid = &self.grid;
        if !(grid.volatility_unit.is_finite() && grid.volatility_unit > 0.0) {
            bail!("grid.volatility_unit must be positive, got {}", grid.volatility_unit);
        }
        if grid.depth == 0 || grid.depth > self.data.bars_per_day {
            bail!(
                "grid.depth must be within 1..={}, got {}",
                self.data.bars_per_day,
                grid.depth
            );
        }

        let clustering = &self.clustering;
        if !(clustering.threshold > -1.0 && clustering.threshold < 1.0) {
            bail!("clustering.threshold must be within (-1, 1), got {}", clustering.threshold);
        }
        if clustering.min_samples == 0 {
            bail!("clustering.min_samples must be at least 1");
        }

        if !is_identifier(&self.output.table) {
            bail!("output.table '{}' is not a valid table name", self.output.table);
        }

        if self.data.session_start >= self.data.session_end {
            bail!(
                "data.session_start ({}) must be before data.session_end ({})",
                self.data.session_start,
                self.data.session_end
            );
        }

        Ok(())
    }

    /// SHA-256 fingerprint of the effective configuration
    pub fn hash(&self) -> String {
        let serialized = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&serialized))
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Source files and session shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    pub source_dir: String,
    /// Bars strictly after this time are kept
    pub session_start: NaiveTime,
    /// Bars strictly before this time are kept
    pub session_end: NaiveTime,
    /// Days with any other bar count are dropped
    pub bars_per_day: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        let window = SessionWindow::default();
        DataConfig {
            source_dir: "source_data".to_string(),
            session_start: window.start,
            session_end: window.end,
            bars_per_day: 79, // 09:30..=16:00 at 5 minutes
        }
    }
}

impl DataConfig {
    pub fn session(&self) -> SessionWindow {
        SessionWindow::new(self.session_start, self.session_end)
    }
}

/// Trade simulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Stop distance in percent of the entry price
    pub stop_loss_percent: f64,
    /// Bars skipped before a position may open
    pub warm_up_depth: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            stop_loss_percent: 0.5,
            warm_up_depth: 20,
        }
    }
}

/// Grid encoder parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Price per band
    pub volatility_unit: f64,
    /// Number of leading bars encoded
    pub depth: usize,
    #[serde(default)]
    pub price_basis: PriceField,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            volatility_unit: 0.25,
            depth: 20,
            price_basis: PriceField::Close,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMethod {
    /// Greedy transitive grouping over retained pairs
    #[default]
    Greedy,
    /// DBSCAN over the 1 - correlation distance matrix
    Density,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ClusterScope {
    /// Cluster each stock's days on their own
    #[default]
    PerStock,
    /// Cluster all stocks' days in one pass
    Combined,
}

/// Clustering parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringConfig {
    #[serde(default)]
    pub method: ClusterMethod,
    pub threshold: f64,
    /// Density clustering only
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default)]
    pub scope: ClusterScope,
}

fn default_min_samples() -> usize {
    2
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        ClusteringConfig {
            method: ClusterMethod::Greedy,
            threshold: DEFAULT_CORRELATION_THRESHOLD,
            min_samples: default_min_samples(),
            scope: ClusterScope::PerStock,
        }
    }
}

/// Where grouped rows go
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub db_path: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_path: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            db_path: "results/patterns.db".to_string(),
            table: "group_by_correlation_per_stock".to_string(),
            csv_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.data.bars_per_day, 79);
        assert_eq!(config.grid.price_basis, PriceField::Close);
        assert_eq!(config.clustering.threshold, 0.85);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let json = r#"{
            "grid": { "volatility_unit": 0.5, "depth": 12, "price_basis": "open" },
            "clustering": { "method": "density", "threshold": 0.9, "scope": "combined" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.grid.depth, 12);
        assert_eq!(config.grid.price_basis, PriceField::Open);
        assert_eq!(config.clustering.method, ClusterMethod::Density);
        assert_eq!(config.clustering.scope, ClusterScope::Combined);
        assert_eq!(config.clustering.min_samples, 2);
        assert_eq!(config.simulation, SimulationConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.grid.depth = 80;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.clustering.threshold = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.output.table = "results; DROP TABLE x".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.simulation.warm_up_depth = 79;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_hash_tracks_parameters() {
        let a = Config::default();
        let mut b = Config::default();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);

        b.simulation.stop_loss_percent = 1.0;
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("group_by_correlation"));
        assert!(is_identifier("_t1"));
        assert!(!is_identifier("1table"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a-b"));
    }
}
