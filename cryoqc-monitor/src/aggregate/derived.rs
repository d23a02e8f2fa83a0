//! Fields computed locally from merged data rather than read from a store
//!
//! A derived field whose inputs are incomplete is removed from the record, never
//! zero-filled.

use crate::analysis::ShiftTrace;
use crate::models::{MovieRecord, RawRow, RecordField};
use crate::sources::label;

/// Exposure from dose labels: `max(initial, 0) + max(per_frame, 0) * frames`
///
/// A missing initial dose counts as 0. The frame count falls back to the length
/// of the shift trace when the store has no frame label.
pub fn counts(movie_raw: &RawRow, trace: Option<&ShiftTrace>) -> Option<f64> {
    let per_frame = movie_raw.get(label::DOSE_PER_FRAME)?.as_f64()?;
    let frames = movie_raw
        .get(label::FRAMES)
        .and_then(|v| v.as_f64())
        .or_else(|| trace.filter(|t| !t.is_empty()).map(|t| t.len() as f64))?;
    let initial = movie_raw
        .get(label::DOSE_INITIAL)
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);

    Some(initial.max(0.0) + per_frame.max(0.0) * frames)
}

/// Alignment shift trace from the movie store's shift labels
pub fn shift_trace(movie_raw: &RawRow) -> Option<ShiftTrace> {
    let xs = movie_raw.get(label::X_SHIFTS)?;
    let ys = movie_raw.get(label::Y_SHIFTS)?;
    ShiftTrace::from_values(xs, ys)
}

/// Recompute all derived fields of one record
pub fn apply_derived(record: &mut MovieRecord, movie_raw: Option<&RawRow>) {
    let trace = movie_raw.and_then(shift_trace);

    match movie_raw.and_then(|raw| counts(raw, trace.as_ref())) {
        Some(value) => record.set(RecordField::Counts, value),
        None => {
            record.remove(RecordField::Counts);
        }
    }

    let drift = trace
        .as_ref()
        .and_then(|t| Some((t.average_drift()?, t.maximum_drift()?)));
    match drift {
        Some((average, maximum)) => {
            record.set(RecordField::AverageDrift, average);
            record.set(RecordField::MaximumDrift, maximum);
        }
        None => {
            record.remove(RecordField::AverageDrift);
            record.remove(RecordField::MaximumDrift);
        }
    }

    match (record.get_f64(RecordField::Df1), record.get_f64(RecordField::Df2)) {
        (Some(df1), Some(df2)) => record.set(RecordField::Df1MinusDf2, df1 - df2),
        _ => {
            record.remove(RecordField::Df1MinusDf2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;

    fn raw(pairs: &[(&str, FieldValue)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_counts_formula() {
        let row = raw(&[
            (label::DOSE_INITIAL, FieldValue::Real(2.0)),
            (label::DOSE_PER_FRAME, FieldValue::Real(1.5)),
            (label::FRAMES, FieldValue::Integer(10)),
        ]);
        assert_eq!(counts(&row, None), Some(17.0));
    }

    #[test]
    fn test_counts_clamps_negative_initial_dose() {
        let row = raw(&[
            (label::DOSE_INITIAL, FieldValue::Real(-1.0)),
            (label::DOSE_PER_FRAME, FieldValue::Real(1.5)),
            (label::FRAMES, FieldValue::Integer(10)),
        ]);
        assert_eq!(counts(&row, None), Some(15.0));
    }

    #[test]
    fn test_counts_frames_fall_back_to_trace() {
        let row = raw(&[(label::DOSE_PER_FRAME, FieldValue::Real(2.0))]);
        let trace = ShiftTrace::parse("0, 1, 2", "0, 0, 0").unwrap();
        assert_eq!(counts(&row, Some(&trace)), Some(6.0));
        assert_eq!(counts(&row, None), None);
    }

    #[test]
    fn test_df_difference_requires_both_values() {
        let mut record = MovieRecord::new();
        record.set(RecordField::Df1, 1.2);
        apply_derived(&mut record, None);
        assert!(!record.contains(RecordField::Df1MinusDf2));

        record.set(RecordField::Df2, 1.0);
        apply_derived(&mut record, None);
        let diff = record.get_f64(RecordField::Df1MinusDf2).unwrap();
        assert!((diff - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_drift_fields_from_shift_labels() {
        let row = raw(&[
            (label::X_SHIFTS, FieldValue::from("0,3,3")),
            (label::Y_SHIFTS, FieldValue::from("0,4,4")),
        ]);
        let mut record = MovieRecord::new();
        apply_derived(&mut record, Some(&row));

        assert_eq!(record.get_f64(RecordField::AverageDrift), Some(2.5));
        assert_eq!(record.get_f64(RecordField::MaximumDrift), Some(5.0));
        assert!(!record.contains(RecordField::Counts));
    }
}
