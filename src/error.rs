//! Domain error types for the discovery pipeline

use thiserror::Error;

use crate::DayKey;

/// Errors raised by the simulator, the grid encoder and the clustering stage.
///
/// None of these are retried: every computation is deterministic. Callers
/// treat them as "skip this day" (or "skip this file"), never as fatal for
/// the whole batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatternError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("degenerate price range: high ({high}) equals low ({low})")]
    DegenerateRange { high: f64, low: f64 },

    #[error("vector length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("day {0} has no matching outcome or symbolic code")]
    MissingMember(DayKey),
}

impl PatternError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

pub type PatternResult<T> = Result<T, PatternError>;
