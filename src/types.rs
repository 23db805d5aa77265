//! Core data types used across the discovery pipeline

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PatternError, PatternResult};

/// OHLCV candle for one fixed intraday interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub datetime: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    pub fn new(
        datetime: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Self {
        Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Price of the requested field
    pub fn price(&self, field: PriceField) -> f64 {
        match field {
            PriceField::Open => self.open,
            PriceField::High => self.high,
            PriceField::Low => self.low,
            PriceField::Close => self.close,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.open.is_finite() && self.high.is_finite() && self.low.is_finite() && self.close.is_finite()
    }
}

/// One regular session of bars for a single stock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingDay {
    pub date: NaiveDate,
    pub stock: String,
    pub bars: Vec<Bar>,
}

impl TradingDay {
    /// Build a day from its bars; the calendar date is taken from the first bar.
    pub fn new(stock: impl Into<String>, bars: Vec<Bar>) -> PatternResult<Self> {
        let date = bars
            .first()
            .map(|b| b.datetime.date())
            .ok_or_else(|| PatternError::invalid("trading day has no bars"))?;

        let day = Self {
            date,
            stock: stock.into(),
            bars,
        };
        day.validate()?;
        Ok(day)
    }

    /// Check the invariants the simulator and encoder rely on.
    ///
    /// Bar ordering and the canonical bar count are the caller's job and are
    /// not checked here.
    pub fn validate(&self) -> PatternResult<()> {
        if self.bars.is_empty() {
            return Err(PatternError::invalid(format!(
                "{} {}: trading day has no bars",
                self.stock, self.date
            )));
        }

        for (i, bar) in self.bars.iter().enumerate() {
            if !bar.is_finite() {
                return Err(PatternError::invalid(format!(
                    "{} {}: bar {} has a non-finite price",
                    self.stock, self.date, i
                )));
            }
            if bar.datetime.date() != self.date {
                return Err(PatternError::invalid(format!(
                    "{} {}: bar {} belongs to {}",
                    self.stock,
                    self.date,
                    i,
                    bar.datetime.date()
                )));
            }
        }

        Ok(())
    }

    pub fn key(&self) -> DayKey {
        DayKey::new(self.stock.clone(), self.date)
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

/// Identity of one stock/day combination.
///
/// Ordered by stock, then date. Every ordered walk in the clustering stage
/// follows this order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DayKey {
    pub stock: String,
    pub date: NaiveDate,
}

impl DayKey {
    pub fn new(stock: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            stock: stock.into(),
            date,
        }
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.stock, self.date)
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Why a simulated position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    EndOfDay,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::StopLoss => write!(f, "stop_loss"),
            CloseReason::EndOfDay => write!(f, "end_of_day"),
        }
    }
}

/// OHLC column used as the basis of the grid encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceField {
    Open,
    High,
    Low,
    #[default]
    Close,
}

impl FromStr for PriceField {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(PriceField::Open),
            "high" => Ok(PriceField::High),
            "low" => Ok(PriceField::Low),
            "close" => Ok(PriceField::Close),
            other => Err(PatternError::invalid(format!(
                "unknown price field '{}', expected open|high|low|close",
                other
            ))),
        }
    }
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PriceField::Open => "open",
            PriceField::High => "high",
            PriceField::Low => "low",
            PriceField::Close => "close",
        };
        f.write_str(name)
    }
}

/// Realized result of simulating one trade on one day
///
/// `revenue` is a percentage. Stop-loss exits always report the negated
/// stop distance; end-of-day exits report the unsigned size of the move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub close_reason: CloseReason,
    pub revenue: Decimal,
    pub side: Side,
    pub stock: String,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub exit_price: f64,
    pub exit_time: NaiveDateTime,
}
