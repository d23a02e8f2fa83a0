//! Integration tests for metadata store reading
//!
//! Stores are created with sqlx in the pipeline's two-table layout and read back
//! through `SourceReader`.

mod helpers;

use cryoqc_monitor::models::{FieldValue, MovieIdentity, RecordField};
use cryoqc_monitor::sources::{label, locate_stores, SourceKind, SourceReader};
use helpers::store_builder::{real, text};
use helpers::{ProjectLayout, StoreBuilder};
use tempfile::TempDir;

#[tokio::test]
async fn test_missing_store_yields_no_rows() {
    let temp = TempDir::new().unwrap();
    let reader = SourceReader::new(SourceKind::Movies, temp.path().join("movies.sqlite"));

    let rows = reader.read().await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_store_without_data_table_yields_no_rows() {
    let temp = TempDir::new().unwrap();
    let path = StoreBuilder::new(temp.path().join("ctfs.sqlite"))
        .column("_micObj._filename")
        .without_objects()
        .build()
        .await
        .unwrap();

    let rows = SourceReader::new(SourceKind::Ctfs, path).read().await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_labels_are_normalized_and_fields_projected() {
    let temp = TempDir::new().unwrap();
    let layout = ProjectLayout::new(temp.path());
    let path = layout.write_movies_store(&["m_0001"]).await.unwrap();

    let rows = SourceReader::new(SourceKind::Movies, path).read().await.unwrap();
    assert_eq!(rows.len(), 1);

    let row = &rows[0];
    assert_eq!(row.identity, MovieIdentity::new("m_0001"));
    assert_eq!(row.raw.get("Acquisition Voltage"), Some(&FieldValue::Real(300.0)));
    assert_eq!(row.raw.get(label::DOSE_PER_FRAME), Some(&FieldValue::Real(1.25)));
    assert_eq!(row.raw.get(label::FRAMES), Some(&FieldValue::Integer(40)));
    assert_eq!(row.fields.get(&RecordField::Voltage), Some(&FieldValue::Real(300.0)));
    assert_eq!(row.fields.get(&RecordField::PixelSize), Some(&FieldValue::Real(0.83)));
    assert_eq!(
        row.fields.get(&RecordField::Magnification),
        Some(&FieldValue::Integer(59000))
    );
    // Native column without a label mapping keeps its own name
    assert_eq!(
        row.fields.get(&RecordField::Date),
        Some(&FieldValue::Text("2024-05-02 10:15:00".to_string()))
    );
}

#[tokio::test]
async fn test_disabled_rows_are_skipped() {
    let temp = TempDir::new().unwrap();
    let path = StoreBuilder::new(temp.path().join("movies.sqlite"))
        .column("_filename")
        .row(vec![text("extra/keep.tif")])
        .disabled_row(vec![text("extra/drop.tif")])
        .build()
        .await
        .unwrap();

    let rows = SourceReader::new(SourceKind::Movies, path).read().await.unwrap();
    let ids: Vec<&str> = rows.iter().map(|r| r.identity.as_str()).collect();
    assert_eq!(ids, vec!["keep"]);
}

#[tokio::test]
async fn test_rows_without_identity_are_skipped() {
    let temp = TempDir::new().unwrap();
    let path = StoreBuilder::new(temp.path().join("movies.sqlite"))
        .column("_filename")
        .column("_samplingRate")
        .row(vec![None, real(1.1)])
        .row(vec![text("extra/m_7.tif"), real(1.1)])
        .build()
        .await
        .unwrap();

    let rows = SourceReader::new(SourceKind::Movies, path).read().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].identity, MovieIdentity::new("m_7"));
}

#[tokio::test]
async fn test_ctf_rows_join_through_referenced_micrograph() {
    let temp = TempDir::new().unwrap();
    let layout = ProjectLayout::new(temp.path());
    let path = layout.write_ctf_store(&["m_0003"]).await.unwrap();

    let rows = SourceReader::new(SourceKind::Ctfs, path).read().await.unwrap();
    assert_eq!(rows.len(), 1);

    let row = &rows[0];
    assert_eq!(row.identity, MovieIdentity::new("m_0003"));
    assert_eq!(row.fields.get(&RecordField::Df1), Some(&FieldValue::Real(15234.5)));
    assert_eq!(row.fields.get(&RecordField::Df2), Some(&FieldValue::Real(14820.0)));
    assert_eq!(row.fields.get(&RecordField::Angast), Some(&FieldValue::Real(42.7)));
    assert_eq!(row.fields.get(&RecordField::Ccc), Some(&FieldValue::Real(0.081)));
    assert!(row.raw.contains_key(label::PSD_FILE));
}

#[tokio::test]
async fn test_locator_finds_every_stage_store() {
    let temp = TempDir::new().unwrap();
    let layout = ProjectLayout::new(temp.path());
    layout.write_all(&["m_0001"]).await.unwrap();

    let kinds: Vec<SourceKind> = locate_stores(temp.path()).into_iter().map(|s| s.kind).collect();
    assert_eq!(kinds.len(), 4);
    assert_eq!(kinds.iter().filter(|k| **k == SourceKind::Movies).count(), 2);
    assert!(kinds.contains(&SourceKind::Micrographs));
    assert!(kinds.contains(&SourceKind::Ctfs));
}
