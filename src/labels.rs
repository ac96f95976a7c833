//! # Label Index & Reconciliation
//!
//! Builds a per-user lookup from normalized label keys to label records, and
//! reconciles parsed trajectories against it. A label index exists only while
//! one user's directory is being ingested and is discarded afterwards.
//!
//! Labels and trajectories are recorded independently and legitimately may
//! not correspond one-to-one, so a missed lookup or timestamp mismatch is
//! never an error — the trajectory simply stays unlabeled.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDateTime;

use crate::error::{IngestError, Result};
use crate::reader::RecordReader;
use crate::trajectory::combine_date_time;

/// Raw fields of one label record, as read from a user's `labels.txt`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRecord {
    pub start_date: String,
    pub start_time: String,
    pub end_date: String,
    pub end_time: String,
    pub mode: String,
}

impl LabelRecord {
    /// The normalized start key this record is indexed under.
    pub fn start_key(&self) -> String {
        normalize_key(&self.start_date, &self.start_time)
    }

    /// The record's end timestamp, combined the same way trajectory
    /// timestamps are.
    pub fn end_timestamp(&self) -> Result<NaiveDateTime> {
        combine_date_time(&self.end_date, &self.end_time)
    }
}

/// Derive a normalized label key from a start date and start time by
/// stripping the `/` and `:` separators and concatenating.
///
/// For the Geolife dataset this yields exactly the stem of the trajectory
/// file recorded at that instant, e.g. `2008/04/02` + `11:24:21` →
/// `20080402112421`.
pub fn normalize_key(date: &str, time: &str) -> String {
    let strip = |s: &str| s.replace(['/', ':'], "");
    strip(date) + &strip(time)
}

/// Lookup from normalized start keys to label records for a single user.
#[derive(Debug, Clone, Default)]
pub struct LabelIndex {
    entries: HashMap<String, LabelRecord>,
}

impl LabelIndex {
    /// An index with no labels (for users without a labels file).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the index from a user's `labels.txt`.
    ///
    /// The first record is a header and is skipped. Duplicate keys resolve
    /// last-write-wins; within one user's label set keys are expected unique,
    /// an assumption this builder does not validate.
    pub fn from_file(path: &Path) -> Result<Self> {
        let reader = RecordReader::new(path);
        let mut entries = HashMap::new();

        for record in reader.records()?.skip(1) {
            let fields = record?;
            if fields.len() < 5 {
                return Err(IngestError::format(format!(
                    "label record in '{}' has {} fields, expected 5",
                    path.display(),
                    fields.len()
                )));
            }

            let record = LabelRecord {
                start_date: fields[0].clone(),
                start_time: fields[1].clone(),
                end_date: fields[2].clone(),
                end_time: fields[3].clone(),
                mode: fields[4].clone(),
            };
            entries.insert(record.start_key(), record);
        }

        Ok(Self { entries })
    }

    /// Look up a label record by normalized start key (= trajectory file
    /// stem).
    pub fn get(&self, key: &str) -> Option<&LabelRecord> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Match a parsed trajectory to a transportation mode.
///
/// If the user has no labels the mode is absent, unconditionally. Otherwise
/// the trajectory's file stem is looked up in the index, and the mode is
/// attached only when the label's end timestamp exactly equals the
/// trajectory's end timestamp. Mismatched or absent entries yield no mode.
///
/// A malformed timestamp inside a matched label record is a
/// [`IngestError::Format`] error, like any other corrupt dataset field.
pub fn reconcile_mode(
    index: &LabelIndex,
    has_labels: bool,
    file_stem: &str,
    end_time: NaiveDateTime,
) -> Result<Option<String>> {
    if !has_labels {
        return Ok(None);
    }

    match index.get(file_stem) {
        Some(record) if record.end_timestamp()? == end_time => Ok(Some(record.mode.clone())),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const LABELS: &str = "Start Time\tEnd Time\tTransportation Mode\n\
        2008/04/02 11:24:21\t2008/04/02 11:50:45\tbus\n\
        2008/04/03 01:07:03\t2008/04/03 11:31:55\ttrain\n";

    fn write_labels(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("2008/04/02", "11:24:21"), "20080402112421");
        // Separators are stripped from both fields regardless of position.
        assert_eq!(normalize_key("2008:04:02", "11/24/21"), "20080402112421");
    }

    #[test]
    fn test_index_from_file() {
        let file = write_labels(LABELS);
        let index = LabelIndex::from_file(file.path()).unwrap();

        assert_eq!(index.len(), 2);
        let record = index.get("20080402112421").unwrap();
        assert_eq!(record.mode, "bus");
        assert_eq!(record.end_date, "2008/04/02");
        assert!(index.get("19990101000000").is_none());
    }

    #[test]
    fn test_header_skipped() {
        let file = write_labels("Start Time\tEnd Time\tTransportation Mode\n");
        let index = LabelIndex::from_file(file.path()).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_duplicate_keys_last_write_wins() {
        let file = write_labels(
            "header x y z w\n\
             2008/04/02 11:24:21\t2008/04/02 11:50:45\tbus\n\
             2008/04/02 11:24:21\t2008/04/02 11:50:45\twalk\n",
        );
        let index = LabelIndex::from_file(file.path()).unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("20080402112421").unwrap().mode, "walk");
    }

    #[test]
    fn test_short_record_is_format_error() {
        let file = write_labels("header\n2008/04/02 11:24:21\n");
        assert!(matches!(
            LabelIndex::from_file(file.path()),
            Err(IngestError::Format { .. })
        ));
    }

    #[test]
    fn test_reconcile_matching_end_time() {
        let file = write_labels(LABELS);
        let index = LabelIndex::from_file(file.path()).unwrap();
        let end = combine_date_time("2008/04/02", "11:50:45").unwrap();

        let mode = reconcile_mode(&index, true, "20080402112421", end).unwrap();
        assert_eq!(mode.as_deref(), Some("bus"));
    }

    #[test]
    fn test_reconcile_mismatched_end_time() {
        let file = write_labels(LABELS);
        let index = LabelIndex::from_file(file.path()).unwrap();
        let end = combine_date_time("2008/04/02", "11:50:46").unwrap();

        assert_eq!(reconcile_mode(&index, true, "20080402112421", end).unwrap(), None);
    }

    #[test]
    fn test_reconcile_without_labels() {
        let index = LabelIndex::empty();
        let end = combine_date_time("2008/04/02", "11:50:45").unwrap();

        assert_eq!(reconcile_mode(&index, false, "20080402112421", end).unwrap(), None);
    }

    #[test]
    fn test_reconcile_unknown_stem() {
        let file = write_labels(LABELS);
        let index = LabelIndex::from_file(file.path()).unwrap();
        let end = combine_date_time("2008/04/02", "11:50:45").unwrap();

        assert_eq!(reconcile_mode(&index, true, "19990101000000", end).unwrap(), None);
    }

    #[test]
    fn test_reconcile_idempotent() {
        let file = write_labels(LABELS);
        let index = LabelIndex::from_file(file.path()).unwrap();
        let end = combine_date_time("2008/04/02", "11:50:45").unwrap();

        let first = reconcile_mode(&index, true, "20080402112421", end).unwrap();
        let second = reconcile_mode(&index, true, "20080402112421", end).unwrap();
        assert_eq!(first, second);
    }
}
