//! Metadata store reader
//!
//! A store has two tables:
//! - `Classes(column_name, label_property, ...)` maps generic column names
//!   (`c01`, `c02`, ...) to property paths
//! - `Objects(id, enabled, label, comment, creation, c01, c02, ...)` holds one
//!   row per item
//!
//! Reading substitutes the normalized label for every mapped column, derives the
//! movie identity per [`SourceKind`], and projects the fields of interest while
//! keeping the full raw row.
//!
//! A store or table that does not exist yet produces no rows rather than an
//! error: the pipeline creates them lazily.

use super::{normalize_label, SourceKind, SourceRow, StoreHandle};
use crate::models::{FieldValue, RawRow};
use crate::utils::retry_on_lock;
use cryoqc_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Row, SqliteConnection, TypeInfo, ValueRef};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const LABEL_TABLE: &str = "Classes";
const DATA_TABLE: &str = "Objects";

/// Reads one metadata store
#[derive(Debug, Clone)]
pub struct SourceReader {
    kind: SourceKind,
    path: PathBuf,
    lock_wait_ms: u64,
}

impl SourceReader {
    pub fn new(kind: SourceKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            lock_wait_ms: 2000,
        }
    }

    pub fn for_store(store: &StoreHandle) -> Self {
        Self::new(store.kind, store.path.clone())
    }

    /// How long to keep retrying while the store is locked by a writer
    pub fn with_lock_wait_ms(mut self, lock_wait_ms: u64) -> Self {
        self.lock_wait_ms = lock_wait_ms;
        self
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all rows of the store
    pub async fn read(&self) -> Result<Vec<SourceRow>> {
        if !self.path.is_file() {
            tracing::debug!(store = %self.path.display(), "Store not created yet");
            return Ok(Vec::new());
        }

        let operation = self.path.display().to_string();
        retry_on_lock(&operation, self.lock_wait_ms, || self.read_once()).await
    }

    async fn read_once(&self) -> Result<Vec<SourceRow>> {
        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .read_only(true)
            .disable_statement_logging();
        let mut conn = SqliteConnection::connect_with(&options).await?;

        if !table_exists(&mut conn, DATA_TABLE).await? {
            tracing::debug!(store = %self.path.display(), "Data table missing, no rows");
            conn.close().await?;
            return Ok(Vec::new());
        }

        let labels = if table_exists(&mut conn, LABEL_TABLE).await? {
            read_label_map(&mut conn).await?
        } else {
            HashMap::new()
        };

        let rows: Vec<SqliteRow> = sqlx::query(&format!("SELECT * FROM {}", DATA_TABLE))
            .fetch_all(&mut conn)
            .await?;
        conn.close().await?;

        let mut produced = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;

        for row in &rows {
            let raw = decode_row(row, &labels)?;

            if matches!(raw.get("enabled"), Some(FieldValue::Integer(0))) {
                skipped += 1;
                continue;
            }

            let identity = raw
                .get(self.kind.identity_label())
                .map(|v| v.to_string())
                .and_then(|value| self.kind.derive_identity(&value));

            let Some(identity) = identity else {
                skipped += 1;
                continue;
            };

            produced.push(SourceRow {
                kind: self.kind,
                identity,
                fields: self.kind.project_fields(&raw),
                raw,
            });
        }

        tracing::debug!(
            store = %self.path.display(),
            kind = ?self.kind,
            rows = produced.len(),
            skipped,
            "Store read"
        );

        Ok(produced)
    }
}

async fn table_exists(conn: &mut SqliteConnection, table: &str) -> Result<bool> {
    let found: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(found.is_some())
}

/// Internal column name → normalized label
async fn read_label_map(conn: &mut SqliteConnection) -> Result<HashMap<String, String>> {
    let pairs: Vec<(String, String)> = sqlx::query_as(&format!(
        "SELECT column_name, label_property FROM {}",
        LABEL_TABLE
    ))
    .fetch_all(&mut *conn)
    .await?;

    Ok(pairs
        .into_iter()
        .map(|(column, property)| (column, normalize_label(&property)))
        .collect())
}

/// Decode one data row, renaming mapped columns to their labels
fn decode_row(row: &SqliteRow, labels: &HashMap<String, String>) -> Result<RawRow> {
    let mut raw = RawRow::new();

    for column in row.columns() {
        let idx = column.ordinal();
        let value_ref = row.try_get_raw(idx)?;
        if value_ref.is_null() {
            continue;
        }
        let type_name = value_ref.type_info().name().to_string();

        let value = match type_name.as_str() {
            "INTEGER" => FieldValue::Integer(row.try_get::<i64, _>(idx)?),
            "REAL" => FieldValue::Real(row.try_get::<f64, _>(idx)?),
            "TEXT" => FieldValue::Text(row.try_get::<String, _>(idx)?),
            // Blobs carry nothing the table or the artifacts use
            _ => continue,
        };

        let name = column.name();
        let key = labels.get(name).cloned().unwrap_or_else(|| name.to_string());
        raw.insert(key, value);
    }

    Ok(raw)
}
