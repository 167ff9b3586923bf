// Destination store: full replace of the processed events table

use std::path::Path;

use calsync_recon::{CanonicalEvent, OUTPUT_COLUMNS};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::StoreError;

pub const DEFAULT_TABLE: &str = "calendar_events";

/// Result of comparing a table's columns with the output schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaCheck {
    /// Columns the table has beyond the output schema. Tolerated.
    pub extra_columns: Vec<String>,
}

pub trait DestinationStore {
    /// Fails when the table is absent or lacks an output column.
    fn check_schema(&self) -> Result<SchemaCheck, StoreError>;

    fn row_count(&self) -> Result<usize, StoreError>;

    /// Delete every row, then insert `events`, atomically.
    fn replace_all(&mut self, events: &[CanonicalEvent]) -> Result<usize, StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub previous_rows: usize,
    pub inserted: usize,
    pub extra_columns: Vec<String>,
    pub dry_run: bool,
}

/// Check the schema, then replace the table contents unless `dry_run`.
pub fn upload(
    store: &mut dyn DestinationStore,
    events: &[CanonicalEvent],
    dry_run: bool,
) -> Result<UploadReport, StoreError> {
    let schema = store.check_schema()?;
    for column in &schema.extra_columns {
        warn!(column = %column, "destination has an extra column; it will be left empty");
    }
    let previous_rows = store.row_count()?;

    if dry_run {
        info!(rows = previous_rows, pending = events.len(), "dry run: store reachable, schema ok");
        return Ok(UploadReport {
            previous_rows,
            inserted: 0,
            extra_columns: schema.extra_columns,
            dry_run,
        });
    }

    let inserted = store.replace_all(events)?;
    info!(deleted = previous_rows, inserted, "destination table replaced");
    Ok(UploadReport {
        previous_rows,
        inserted,
        extra_columns: schema.extra_columns,
        dry_run,
    })
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

pub struct SqliteStore {
    conn: Connection,
    table: String,
}

/// Table names are interpolated into SQL, so only identifiers pass.
fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let mut chars = table.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}

impl SqliteStore {
    pub fn open(path: &Path, table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Connect(format!("{}: {e}", path.display())))?;
        Ok(Self {
            conn,
            table: table.to_string(),
        })
    }

    pub fn open_in_memory(table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Connect(e.to_string()))?;
        Ok(Self {
            conn,
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the table with the output columns if it does not exist.
    pub fn create_table(&self) -> Result<(), StoreError> {
        let columns: Vec<String> = OUTPUT_COLUMNS.iter().map(|c| format!("{c} TEXT")).collect();
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            self.table,
            columns.join(", ")
        ))?;
        Ok(())
    }

    fn table_exists(&self) -> Result<bool, StoreError> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![self.table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn columns(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", self.table))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

impl DestinationStore for SqliteStore {
    fn check_schema(&self) -> Result<SchemaCheck, StoreError> {
        if !self.table_exists()? {
            return Err(StoreError::MissingTable(self.table.clone()));
        }
        let columns = self.columns()?;
        let missing: Vec<String> = OUTPUT_COLUMNS
            .iter()
            .filter(|c| !columns.iter().any(|have| have.eq_ignore_ascii_case(c)))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::MissingColumns {
                table: self.table.clone(),
                columns: missing,
            });
        }
        let extra_columns = columns
            .into_iter()
            .filter(|have| !OUTPUT_COLUMNS.iter().any(|c| have.eq_ignore_ascii_case(c)))
            .collect();
        Ok(SchemaCheck { extra_columns })
    }

    fn row_count(&self) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn replace_all(&mut self, events: &[CanonicalEvent]) -> Result<usize, StoreError> {
        let placeholders: Vec<String> = (1..=OUTPUT_COLUMNS.len()).map(|i| format!("?{i}")).collect();
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            OUTPUT_COLUMNS.join(", "),
            placeholders.join(", ")
        );

        let tx = self.conn.transaction()?;
        tx.execute(&format!("DELETE FROM {}", self.table), [])?;
        {
            let mut stmt = tx.prepare(&insert)?;
            for e in events {
                stmt.execute(params![
                    e.ticker,
                    e.institution_name,
                    e.institution_id,
                    e.institution_type,
                    e.event_type,
                    e.event_headline,
                    e.event_date_time_utc,
                    e.event_date_time_local,
                    e.event_date,
                    e.event_time_local,
                    e.webcast_link,
                    e.contact_info,
                    e.fiscal_year,
                    e.fiscal_period,
                    e.data_fetched_timestamp,
                ])?;
            }
        }
        tx.commit()?;
        Ok(events.len())
    }
}
