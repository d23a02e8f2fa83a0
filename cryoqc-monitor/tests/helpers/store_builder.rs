//! Metadata Store Builder
//!
//! Creates stores shaped like the pipeline's output: a `Classes` table mapping
//! generic columns to property labels and an `Objects` table with one row per
//! item.

use anyhow::Result;
use cryoqc_monitor::models::FieldValue;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection, SqliteConnection};
use std::path::{Path, PathBuf};

/// One `Objects` row: `enabled` flag plus one value per mapped column
#[derive(Debug, Clone)]
pub struct StoreRow {
    pub enabled: bool,
    pub creation: Option<String>,
    pub values: Vec<Option<FieldValue>>,
}

#[derive(Debug, Clone)]
pub struct StoreBuilder {
    path: PathBuf,
    labels: Vec<String>,
    rows: Vec<StoreRow>,
    with_objects: bool,
}

impl StoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            labels: Vec::new(),
            rows: Vec::new(),
            with_objects: true,
        }
    }

    /// Add a mapped column (`c01`, `c02`, ...) with its property label
    pub fn column(mut self, label_property: &str) -> Self {
        self.labels.push(label_property.to_string());
        self
    }

    pub fn row(mut self, values: Vec<Option<FieldValue>>) -> Self {
        self.rows.push(StoreRow {
            enabled: true,
            creation: Some("2024-05-02 10:15:00".to_string()),
            values,
        });
        self
    }

    pub fn disabled_row(mut self, values: Vec<Option<FieldValue>>) -> Self {
        self.rows.push(StoreRow {
            enabled: false,
            creation: None,
            values,
        });
        self
    }

    /// Create only the label table, as a stage does before its first result
    pub fn without_objects(mut self) -> Self {
        self.with_objects = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the store, replacing any previous file
    pub async fn build(self) -> Result<PathBuf> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);
        let mut conn = options.connect().await?;

        sqlx::query(
            "CREATE TABLE Classes (id INTEGER PRIMARY KEY, label_property TEXT, \
             column_name TEXT, class_name TEXT)",
        )
        .execute(&mut conn)
        .await?;

        for (idx, label) in self.labels.iter().enumerate() {
            sqlx::query(
                "INSERT INTO Classes (label_property, column_name, class_name) VALUES (?, ?, ?)",
            )
            .bind(label)
            .bind(column_name(idx))
            .bind("String")
            .execute(&mut conn)
            .await?;
        }

        if self.with_objects {
            create_objects(&mut conn, self.labels.len(), &self.rows).await?;
        }

        conn.close().await?;
        Ok(self.path)
    }
}

fn column_name(idx: usize) -> String {
    format!("c{:02}", idx + 1)
}

async fn create_objects(conn: &mut SqliteConnection, columns: usize, rows: &[StoreRow]) -> Result<()> {
    let mapped: Vec<String> = (0..columns).map(column_name).collect();

    let mut ddl = String::from(
        "CREATE TABLE Objects (id INTEGER PRIMARY KEY, enabled INTEGER DEFAULT 1, \
         label TEXT DEFAULT '', comment TEXT DEFAULT '', creation DATE",
    );
    for column in &mapped {
        ddl.push_str(&format!(", {}", column));
    }
    ddl.push(')');
    sqlx::query(&ddl).execute(&mut *conn).await?;

    let mut insert = String::from("INSERT INTO Objects (enabled, creation");
    for column in &mapped {
        insert.push_str(&format!(", {}", column));
    }
    insert.push_str(") VALUES (?, ?");
    insert.push_str(&", ?".repeat(columns));
    insert.push(')');

    for row in rows {
        let mut query = sqlx::query(&insert)
            .bind(row.enabled as i64)
            .bind(row.creation.clone());
        for idx in 0..columns {
            query = match row.values.get(idx).cloned().flatten() {
                Some(FieldValue::Integer(v)) => query.bind(v),
                Some(FieldValue::Real(v)) => query.bind(v),
                Some(FieldValue::Text(v)) => query.bind(v),
                None => query.bind(None::<String>),
            };
        }
        query.execute(&mut *conn).await?;
    }

    Ok(())
}

/// Shorthand for text values
pub fn text(value: &str) -> Option<FieldValue> {
    Some(FieldValue::Text(value.to_string()))
}

/// Shorthand for real values
pub fn real(value: f64) -> Option<FieldValue> {
    Some(FieldValue::Real(value))
}

/// Shorthand for integer values
pub fn int(value: i64) -> Option<FieldValue> {
    Some(FieldValue::Integer(value))
}
