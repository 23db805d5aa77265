// Result persistence
// SQLite tables of grouped days, with an optional CSV export
//
// Each run appends its rows stamped with the processing time and the
// config fingerprint, so several runs can share one table.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::cluster::GroupRow;
use crate::config::is_identifier;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// =============================================================================
// Data Models
// =============================================================================

/// A persisted group row as read back from the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub id: i64,
    pub processed_at: String,
    pub config_hash: String,
    pub group_label: String,
    pub stock: String,
    pub average_correlation: f64,
    pub date: String,
    pub symbolic_code: String,
    pub side: String,         // "LONG" or "SHORT"
    pub revenue: Decimal,
    pub entry_price: f64,
    pub exit_price: f64,
    pub close_reason: String, // "stop_loss" or "end_of_day"
    pub entry_time: String,
    pub exit_time: String,
}

// =============================================================================
// Result Store Implementation
// =============================================================================

pub struct ResultStore {
    conn: Connection,
}

impl ResultStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        info!("Result store opened at {}", db_path.display());
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Ok(Self { conn })
    }

    fn create_table(&self, table: &str) -> Result<()> {
        check_table_name(table)?;
        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    processed_at TEXT NOT NULL,
                    config_hash TEXT NOT NULL,
                    group_label TEXT NOT NULL,
                    stock TEXT NOT NULL,
                    average_correlation REAL,
                    date TEXT NOT NULL,
                    symbolic_code TEXT NOT NULL,
                    side TEXT NOT NULL,
                    revenue TEXT NOT NULL,
                    entry_price REAL NOT NULL,
                    exit_price REAL NOT NULL,
                    close_reason TEXT NOT NULL,
                    entry_time TEXT NOT NULL,
                    exit_time TEXT NOT NULL
                )"
            ),
            [],
        )?;
        self.conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS idx_{table}_stock_date ON {table}(stock, date)"),
            [],
        )?;
        Ok(())
    }

    /// Append `rows` to `table` in one transaction, creating the table if needed.
    pub fn append_rows(
        &mut self,
        table: &str,
        rows: &[GroupRow],
        processed_at: DateTime<Utc>,
        config_hash: &str,
    ) -> Result<usize> {
        self.create_table(table)?;

        let processed_at = processed_at.format(TIME_FORMAT).to_string();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {table} (
                    processed_at, config_hash, group_label, stock, average_correlation,
                    date, symbolic_code, side, revenue, entry_price, exit_price,
                    close_reason, entry_time, exit_time
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ))?;

            for row in rows {
                let average = row.average_correlation.is_finite().then_some(row.average_correlation);
                stmt.execute(params![
                    processed_at,
                    config_hash,
                    row.group_label,
                    row.stock,
                    average,
                    row.date.to_string(),
                    row.symbolic_code,
                    row.side.to_string(),
                    row.revenue.to_string(),
                    row.entry_price,
                    row.exit_price,
                    row.close_reason.to_string(),
                    row.entry_time.format(TIME_FORMAT).to_string(),
                    row.exit_time.format(TIME_FORMAT).to_string(),
                ])?;
            }
        }
        tx.commit()?;

        debug!("Appended {} rows to {}", rows.len(), table);
        Ok(rows.len())
    }

    /// All rows of `table` in insertion order
    pub fn load_rows(&self, table: &str) -> Result<Vec<StoredRow>> {
        check_table_name(table)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, processed_at, config_hash, group_label, stock, average_correlation,
                    date, symbolic_code, side, revenue, entry_price, exit_price,
                    close_reason, entry_time, exit_time
             FROM {table} ORDER BY id"
        ))?;

        let rows = stmt
            .query_map([], |row| {
                let revenue: String = row.get(9)?;
                let revenue: Decimal = revenue.parse().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e))
                })?;
                Ok(StoredRow {
                    id: row.get(0)?,
                    processed_at: row.get(1)?,
                    config_hash: row.get(2)?,
                    group_label: row.get(3)?,
                    stock: row.get(4)?,
                    average_correlation: row.get::<_, Option<f64>>(5)?.unwrap_or(f64::NAN),
                    date: row.get(6)?,
                    symbolic_code: row.get(7)?,
                    side: row.get(8)?,
                    revenue,
                    entry_price: row.get(10)?,
                    exit_price: row.get(11)?,
                    close_reason: row.get(12)?,
                    entry_time: row.get(13)?,
                    exit_time: row.get(14)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Loaded {} rows from {}", rows.len(), table);
        Ok(rows)
    }
}

fn check_table_name(table: &str) -> Result<()> {
    if !is_identifier(table) {
        bail!("Invalid table name: {}", table);
    }
    Ok(())
}

/// Export group rows as CSV with a header line
pub fn write_csv(path: impl AsRef<Path>, rows: &[GroupRow]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}
