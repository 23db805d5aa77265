//! Correlation clustering of symbolic codes
//!
//! Days are compared by the Pearson correlation of their numeric code
//! vectors and partitioned into groups of similar shapes. Two interchangeable
//! strategies implement [`ClusteringStrategy`]:
//!
//! - [`GreedyClustering`]: greedy grouping over the retained-pairs graph
//! - [`DensityClustering`]: DBSCAN over a precomputed `1 - correlation` matrix
//!
//! Both emit the same [`GroupRow`] shape. Pairwise work is O(n²) in the
//! number of days, and the full record set must be assembled before either
//! strategy runs.

pub mod density;
pub mod greedy;

pub use density::DensityClustering;
pub use greedy::GreedyClustering;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{PatternError, PatternResult};
use crate::grid::SymbolicCode;
use crate::{CloseReason, DayKey, Side, TradeOutcome};

/// Minimum Pearson coefficient for two codes to count as similar
pub const DEFAULT_CORRELATION_THRESHOLD: f64 = 0.85;

/// Clustering input for one stock/day
#[derive(Debug, Clone, PartialEq)]
pub struct DayRecord {
    pub code: SymbolicCode,
    pub outcome: TradeOutcome,
}

/// Records keyed and ordered by day
pub type DayRecords = BTreeMap<DayKey, DayRecord>;

/// Join outcomes with codes by day key.
///
/// A day present on only one side is logged and left out.
pub fn assemble_records(
    outcomes: BTreeMap<DayKey, TradeOutcome>,
    mut codes: BTreeMap<DayKey, SymbolicCode>,
) -> DayRecords {
    let mut records = DayRecords::new();

    for (key, outcome) in outcomes {
        match codes.remove(&key) {
            Some(code) => {
                records.insert(key, DayRecord { code, outcome });
            }
            None => warn!("Skipping: {}", PatternError::MissingMember(key)),
        }
    }

    for key in codes.into_keys() {
        warn!("Skipping: {}", PatternError::MissingMember(key));
    }

    records
}

/// Pearson correlation coefficient of two equal-length vectors.
///
/// Returns `Ok(None)` when the coefficient is undefined (fewer than two
/// points or zero variance on either side).
pub fn pearson(a: &[f64], b: &[f64]) -> PatternResult<Option<f64>> {
    if a.len() != b.len() {
        return Err(PatternError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.len() < 2 {
        return Ok(None);
    }

    let sd_a = a.iter().std_dev();
    let sd_b = b.iter().std_dev();
    if !(sd_a > 0.0 && sd_b > 0.0) {
        return Ok(None);
    }

    let covariance = a.iter().covariance(b.iter());
    Ok(Some((covariance / (sd_a * sd_b)).clamp(-1.0, 1.0)))
}

/// One output row: a group member with its trade outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
    pub group_label: String,
    pub stock: String,
    pub average_correlation: f64,
    pub date: NaiveDate,
    pub symbolic_code: String,
    pub side: Side,
    pub revenue: Decimal,
    pub entry_price: f64,
    pub exit_price: f64,
    pub close_reason: CloseReason,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
}

impl GroupRow {
    pub fn new(
        group_label: impl Into<String>,
        average_correlation: f64,
        key: &DayKey,
        record: &DayRecord,
    ) -> Self {
        let outcome = &record.outcome;
        Self {
            group_label: group_label.into(),
            stock: key.stock.clone(),
            average_correlation,
            date: key.date,
            symbolic_code: record.code.to_string(),
            side: outcome.side,
            revenue: outcome.revenue,
            entry_price: outcome.entry_price,
            exit_price: outcome.exit_price,
            close_reason: outcome.close_reason,
            entry_time: outcome.entry_time,
            exit_time: outcome.exit_time,
        }
    }
}

/// Clustering strategy trait
pub trait ClusteringStrategy: Send + Sync {
    /// Short name used in logs and reports
    fn name(&self) -> &'static str;

    /// Partition `records` into groups. Days that end up in no group are
    /// not emitted.
    fn group(&self, records: &DayRecords) -> Vec<GroupRow>;
}

/// Numeric vectors in record order
pub(crate) fn numeric_vectors(records: &DayRecords) -> Vec<Vec<f64>> {
    records.values().map(|r| r.code.numeric_vector()).collect()
}

/// Per-group aggregate for reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub group_label: String,
    pub members: usize,
    pub average_correlation: f64,
    pub longs: usize,
    pub stop_losses: usize,
    pub mean_revenue: f64,
}

/// Collapse rows into one summary per group label, in first-seen order.
pub fn summarize_groups(rows: &[GroupRow]) -> Vec<GroupSummary> {
    let mut order: Vec<&str> = Vec::new();
    let mut by_label: BTreeMap<&str, Vec<&GroupRow>> = BTreeMap::new();
    for row in rows {
        let entry = by_label.entry(row.group_label.as_str()).or_default();
        if entry.is_empty() {
            order.push(row.group_label.as_str());
        }
        entry.push(row);
    }

    order
        .into_iter()
        .filter_map(|label| {
            let members = by_label.get(label)?;
            let revenues: Vec<f64> = members
                .iter()
                .filter_map(|r| r.revenue.to_f64())
                .collect();
            Some(GroupSummary {
                group_label: label.to_string(),
                members: members.len(),
                average_correlation: members[0].average_correlation,
                longs: members.iter().filter(|r| r.side == Side::Long).count(),
                stop_losses: members
                    .iter()
                    .filter(|r| r.close_reason == CloseReason::StopLoss)
                    .count(),
                mean_revenue: if revenues.is_empty() {
                    0.0
                } else {
                    revenues.mean()
                },
            })
        })
        .collect()
}

pub(crate) fn log_grouping(strategy: &str, records: usize, rows: &[GroupRow]) {
    let groups = rows
        .iter()
        .map(|r| r.group_label.as_str())
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    debug!(
        "{} clustering: {} days -> {} groups, {} rows",
        strategy,
        records,
        groups,
        rows.len()
    );
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::NaiveDate;

    pub fn record(stock: &str, day: u32, code: &str) -> (DayKey, DayRecord) {
        let date = NaiveDate::from_ymd_opt(2022, 3, day).unwrap();
        let time = date.and_hms_opt(11, 10, 0).unwrap();
        let key = DayKey::new(stock, date);
        let outcome = TradeOutcome {
            close_reason: CloseReason::EndOfDay,
            revenue: Decimal::new(125, 2),
            side: Side::Long,
            stock: stock.to_string(),
            entry_price: 100.0,
            entry_time: time,
            exit_price: 101.25,
            exit_time: date.and_hms_opt(15, 55, 0).unwrap(),
        };
        (
            key,
            DayRecord {
                code: code.parse().unwrap(),
                outcome,
            },
        )
    }

    pub fn records(entries: &[(&str, u32, &str)]) -> DayRecords {
        entries
            .iter()
            .map(|(stock, day, code)| record(stock, *day, code))
            .collect()
    }
}
