//! Consolidated table output
//!
//! The table is comma-delimited with a single header row in [`RecordField::ALL`]
//! order and one row per identity. It is published by writing a temp file in the
//! destination directory and renaming it over the old table, so readers see
//! either the previous or the new table, never a partial one.

use super::RecordTable;
use crate::models::RecordField;
use cryoqc_common::{Error, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Render the full table as CSV text
pub fn render_table(table: &RecordTable) -> String {
    let mut out = String::new();

    let header: Vec<String> = RecordField::ALL
        .iter()
        .map(|f| escape_cell(f.column_name()))
        .collect();
    out.push_str(&header.join(","));
    out.push('\n');

    for (_, record) in table.records() {
        let cells: Vec<String> = RecordField::ALL
            .iter()
            .map(|f| {
                record
                    .get(*f)
                    .map(|v| escape_cell(&v.to_string()))
                    .unwrap_or_default()
            })
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }

    out
}

/// Atomically replace the table at `path`; returns the number of data rows
pub fn write_table(table: &RecordTable, path: &Path) -> Result<usize> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(render_table(table).as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Publish {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    Ok(table.len())
}

fn escape_cell(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldValue, MovieIdentity, RawRow};
    use crate::sources::{label, SourceKind, SourceRow};
    use tempfile::TempDir;

    fn movie_row(id: &str, filename: &str) -> SourceRow {
        let mut raw = RawRow::new();
        raw.insert(label::FILENAME.to_string(), FieldValue::from(filename));
        SourceRow {
            kind: SourceKind::Movies,
            identity: MovieIdentity::new(id),
            fields: SourceKind::Movies.project_fields(&raw),
            raw,
        }
    }

    #[test]
    fn test_header_and_sorted_rows() {
        let mut table = RecordTable::new();
        table.merge_row(movie_row("b", "/in/b.mrcs"));
        table.merge_row(movie_row("a", "/in/a.mrcs"));

        let text = render_table(&table);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "Movie,Micrograph,Date,Magnification,Voltage,Pixel Size,Counts,DF1,DF2,DF1-DF2,Angast,CCC,Average Drift,Maximum Drift"
        );
        assert_eq!(lines[1], "/in/a.mrcs,,,,,,,,,,,,,");
        assert_eq!(lines[2], "/in/b.mrcs,,,,,,,,,,,,,");
    }

    #[test]
    fn test_cells_with_delimiters_are_quoted() {
        assert_eq!(escape_cell("plain"), "plain");
        assert_eq!(escape_cell("a,b"), "\"a,b\"");
        assert_eq!(escape_cell("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_write_replaces_existing_table() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("qc").join("qc_summary.csv");

        let mut table = RecordTable::new();
        table.merge_row(movie_row("a", "/in/a.mrcs"));
        assert_eq!(write_table(&table, &path).unwrap(), 1);

        table.merge_row(movie_row("b", "/in/b.mrcs"));
        assert_eq!(write_table(&table, &path).unwrap(), 2);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        // No temp files left behind
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_unreplaceable_target_reports_publish_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("qc_summary.csv");
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let mut table = RecordTable::new();
        table.merge_row(movie_row("a", "/in/a.mrcs"));

        match write_table(&table, &path) {
            Err(Error::Publish { path: target, .. }) => assert_eq!(target, path),
            other => panic!("expected publish error, got {:?}", other),
        }
        // Temp file is cleaned up when persisting fails
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }
}
