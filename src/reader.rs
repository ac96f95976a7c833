//! # Raw Record Reader
//!
//! Lazy, restartable reading of line-delimited dataset files into token
//! records. Trajectory files delimit fields with commas, label files with
//! tabs; both are split on any run of whitespace or commas, so callers see a
//! uniform `Vec<String>` per line. No semantic interpretation happens here.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use crate::error::{IngestError, Result};

/// A handle to a dataset file that can be scanned any number of times.
///
/// Each call to [`records`](RecordReader::records) opens a fresh pass over
/// the file, so a reader can be kept around and restarted.
#[derive(Debug, Clone)]
pub struct RecordReader {
    path: PathBuf,
}

impl RecordReader {
    /// Create a reader for the given path. The file is not touched until
    /// [`records`](RecordReader::records) is called.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The path this reader scans.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a fresh pass over the file.
    ///
    /// Fails with [`IngestError::Io`] if the path is unreadable.
    pub fn records(&self) -> Result<Records> {
        let file = File::open(&self.path).map_err(|e| IngestError::io(&self.path, e))?;
        Ok(Records {
            path: self.path.clone(),
            lines: BufReader::new(file).lines(),
        })
    }
}

/// Iterator over the token records of one pass, in file order.
///
/// Blank lines yield empty records rather than being skipped, so record
/// indices stay aligned with line numbers.
pub struct Records {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
}

impl Iterator for Records {
    type Item = Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => return Some(Err(IngestError::io(&self.path, e))),
        };

        let tokens = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        Some(Ok(tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_comma_delimited_records() {
        let file = write_temp("39.9847,116.3184,0,492,39744.12,2008-10-23,02:53:04\n");
        let reader = RecordReader::new(file.path());

        let records: Vec<_> = reader.records().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0],
            vec!["39.9847", "116.3184", "0", "492", "39744.12", "2008-10-23", "02:53:04"]
        );
    }

    #[test]
    fn test_whitespace_delimited_records() {
        let file = write_temp("2008/04/02 11:24:21\t2008/04/02 11:50:45\tbus\n");
        let reader = RecordReader::new(file.path());

        let records: Vec<_> = reader.records().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(
            records[0],
            vec!["2008/04/02", "11:24:21", "2008/04/02", "11:50:45", "bus"]
        );
    }

    #[test]
    fn test_file_order_preserved() {
        let file = write_temp("a b\nc d\ne f\n");
        let reader = RecordReader::new(file.path());

        let records: Vec<_> = reader.records().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(records, vec![vec!["a", "b"], vec!["c", "d"], vec!["e", "f"]]);
    }

    #[test]
    fn test_restartable() {
        let file = write_temp("a\nb\n");
        let reader = RecordReader::new(file.path());

        let first: Vec<_> = reader.records().unwrap().collect::<Result<_>>().unwrap();
        let second: Vec<_> = reader.records().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_blank_lines_yield_empty_records() {
        let file = write_temp("a\n\nb\n");
        let reader = RecordReader::new(file.path());

        let records: Vec<_> = reader.records().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[1].is_empty());
    }

    #[test]
    fn test_unreadable_path() {
        let reader = RecordReader::new("/no/such/file.plt");
        assert!(matches!(reader.records(), Err(IngestError::Io { .. })));
    }
}
