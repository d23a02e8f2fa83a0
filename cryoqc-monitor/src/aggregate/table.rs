//! In-memory movie record table
//!
//! Records are keyed by [`MovieIdentity`] and only ever grow: rows merge into the
//! existing record field by field, and raw rows are retained per
//! (source kind, identity) for artifact generation.

use super::derived;
use crate::analysis::ShiftTrace;
use crate::models::{MovieIdentity, MovieRecord, RawRow};
use crate::sources::{SourceKind, SourceRow};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
pub struct RecordTable {
    records: BTreeMap<MovieIdentity, MovieRecord>,
    raw: HashMap<(SourceKind, MovieIdentity), RawRow>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one source row, creating the record on first observation
    pub fn merge_row(&mut self, row: SourceRow) {
        let SourceRow {
            kind,
            identity,
            fields,
            raw,
        } = row;

        self.records
            .entry(identity.clone())
            .or_default()
            .merge(fields);

        // Import and alignment both write a movie store; keep the union of labels
        self.raw.entry((kind, identity)).or_default().extend(raw);
    }

    pub fn merge_rows<I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = SourceRow>,
    {
        for row in rows {
            self.merge_row(row);
        }
    }

    /// Recompute derived fields for every record
    pub fn apply_derived(&mut self) {
        for (identity, record) in self.records.iter_mut() {
            let movie_raw = self.raw.get(&(SourceKind::Movies, identity.clone()));
            derived::apply_derived(record, movie_raw);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, identity: &MovieIdentity) -> Option<&MovieRecord> {
        self.records.get(identity)
    }

    /// Records in identity order
    pub fn records(&self) -> impl Iterator<Item = (&MovieIdentity, &MovieRecord)> {
        self.records.iter()
    }

    pub fn identities(&self) -> impl Iterator<Item = &MovieIdentity> {
        self.records.keys()
    }

    pub fn raw_row(&self, kind: SourceKind, identity: &MovieIdentity) -> Option<&RawRow> {
        self.raw.get(&(kind, identity.clone()))
    }

    pub fn shift_trace(&self, identity: &MovieIdentity) -> Option<ShiftTrace> {
        self.raw_row(SourceKind::Movies, identity)
            .and_then(derived::shift_trace)
    }
}
