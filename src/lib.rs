//! Intraday Pattern Discovery
//!
//! Simulates a single-trade-per-day strategy on intraday bars, encodes the
//! opening price path of each day as a symbolic grid code, and clusters days
//! whose codes correlate, so recurring opening shapes can be compared with
//! the trade outcomes that followed them.

pub mod cluster;
pub mod config;
pub mod data;
pub mod error;
pub mod grid;
pub mod pipeline;
pub mod simulator;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{PatternError, PatternResult};
pub use types::*;
