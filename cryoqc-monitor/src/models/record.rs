//! Movie record model
//!
//! A [`MovieRecord`] is a sparse mapping from the fixed set of consolidated-table
//! columns to values. Absent fields stay absent: nothing is zero-filled.

use std::collections::BTreeMap;
use std::fmt;

/// Columns of the consolidated table, in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordField {
    Movie,
    Micrograph,
    Date,
    Magnification,
    Voltage,
    PixelSize,
    Counts,
    Df1,
    Df2,
    Df1MinusDf2,
    Angast,
    Ccc,
    AverageDrift,
    MaximumDrift,
}

impl RecordField {
    /// All fields in column order
    pub const ALL: [RecordField; 14] = [
        RecordField::Movie,
        RecordField::Micrograph,
        RecordField::Date,
        RecordField::Magnification,
        RecordField::Voltage,
        RecordField::PixelSize,
        RecordField::Counts,
        RecordField::Df1,
        RecordField::Df2,
        RecordField::Df1MinusDf2,
        RecordField::Angast,
        RecordField::Ccc,
        RecordField::AverageDrift,
        RecordField::MaximumDrift,
    ];

    /// Header label used in the consolidated table
    pub fn column_name(self) -> &'static str {
        match self {
            RecordField::Movie => "Movie",
            RecordField::Micrograph => "Micrograph",
            RecordField::Date => "Date",
            RecordField::Magnification => "Magnification",
            RecordField::Voltage => "Voltage",
            RecordField::PixelSize => "Pixel Size",
            RecordField::Counts => "Counts",
            RecordField::Df1 => "DF1",
            RecordField::Df2 => "DF2",
            RecordField::Df1MinusDf2 => "DF1-DF2",
            RecordField::Angast => "Angast",
            RecordField::Ccc => "CCC",
            RecordField::AverageDrift => "Average Drift",
            RecordField::MaximumDrift => "Maximum Drift",
        }
    }
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// Scalar value read from a metadata store or derived locally
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric view; text is parsed leniently
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Real(v) => Some(*v),
            FieldValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Real(v) => write!(f, "{}", v),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Real(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// Full row as read from a store, keyed by normalized label
pub type RawRow = BTreeMap<String, FieldValue>;

/// Sparse consolidated-table row for one movie
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieRecord {
    fields: BTreeMap<RecordField, FieldValue>,
}

impl MovieRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: RecordField) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    pub fn get_f64(&self, field: RecordField) -> Option<f64> {
        self.get(field).and_then(FieldValue::as_f64)
    }

    pub fn contains(&self, field: RecordField) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn set(&mut self, field: RecordField, value: impl Into<FieldValue>) {
        self.fields.insert(field, value.into());
    }

    pub fn remove(&mut self, field: RecordField) -> Option<FieldValue> {
        self.fields.remove(&field)
    }

    /// Merge observed fields; each incoming field overwrites the stored one
    pub fn merge<I>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (RecordField, FieldValue)>,
    {
        self.fields.extend(fields);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_order_matches_table_header() {
        let header: Vec<&str> = RecordField::ALL.iter().map(|f| f.column_name()).collect();
        assert_eq!(
            header,
            vec![
                "Movie",
                "Micrograph",
                "Date",
                "Magnification",
                "Voltage",
                "Pixel Size",
                "Counts",
                "DF1",
                "DF2",
                "DF1-DF2",
                "Angast",
                "CCC",
                "Average Drift",
                "Maximum Drift",
            ]
        );
    }

    #[test]
    fn test_merge_is_last_write_wins_per_field() {
        let mut record = MovieRecord::new();
        record.merge([
            (RecordField::Voltage, FieldValue::Real(200.0)),
            (RecordField::Movie, FieldValue::from("a.mrcs")),
        ]);
        record.merge([(RecordField::Voltage, FieldValue::Real(300.0))]);

        assert_eq!(record.get_f64(RecordField::Voltage), Some(300.0));
        assert_eq!(
            record.get(RecordField::Movie).and_then(FieldValue::as_text),
            Some("a.mrcs")
        );
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_text_values_parse_as_numbers() {
        assert_eq!(FieldValue::from(" 1.5 ").as_f64(), Some(1.5));
        assert_eq!(FieldValue::from("n/a").as_f64(), None);
        assert_eq!(FieldValue::Integer(3).as_f64(), Some(3.0));
    }
}
