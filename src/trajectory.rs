//! # Trajectory Parser & Validator
//!
//! Converts one `.plt` trajectory file into a bounded, time-ordered point
//! sequence. Files exceeding the point cap are rejected whole (a silent
//! skip, by contract); malformed fields are fatal for the run because they
//! signal a corrupt dataset.

use std::path::Path;

use chrono::NaiveDateTime;

use crate::error::{IngestError, Result};
use crate::reader::RecordReader;
use crate::{IngestConfig, TrackPoint};

/// Field positions within a trajectory data record.
const FIELD_LAT: usize = 0;
const FIELD_LON: usize = 1;
const FIELD_ALTITUDE: usize = 3;
const FIELD_DATE_DAYS: usize = 4;
const FIELD_DATE: usize = 5;
const FIELD_TIME: usize = 6;

/// A parsed, accepted trajectory file: its ordered points and the timestamps
/// derived from the first and last point.
#[derive(Debug, Clone)]
pub struct Trajectory {
    pub points: Vec<TrackPoint>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

/// Outcome of parsing one trajectory file.
///
/// `Oversize` is not an error: the point-count bound exists to exclude
/// degenerate oversized files from the dataset, and such files are skipped
/// with no side effects.
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    Accepted(Trajectory),
    Oversize { records: usize },
}

/// Combine a date and a time token into a canonical timestamp.
///
/// Label files use `/`-separated dates while trajectory files use `-`; both
/// normalize to `YYYY-MM-DD HH:MM:SS`. Malformed input is a
/// [`IngestError::Format`] error, fatal for the run — a trajectory with no
/// derivable timestamp cannot be reconciled or stored meaningfully.
pub fn combine_date_time(date: &str, time: &str) -> Result<NaiveDateTime> {
    let joined = format!("{} {}", date.replace('/', "-"), time);
    NaiveDateTime::parse_from_str(&joined, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| IngestError::format(format!("invalid timestamp '{}': {}", joined, e)))
}

/// Parse and validate one trajectory file.
///
/// Discards the fixed-format header rows, rejects the file whole if more
/// than `config.max_trackpoints` data records remain, and otherwise produces
/// the ordered point sequence with start/end timestamps taken from the first
/// and last point.
pub fn parse_trajectory(path: &Path, config: &IngestConfig) -> Result<ParseOutcome> {
    let reader = RecordReader::new(path);
    let records: Vec<Vec<String>> = reader.records()?.collect::<Result<_>>()?;

    let data = if records.len() > config.header_rows {
        &records[config.header_rows..]
    } else {
        &[]
    };

    if data.len() > config.max_trackpoints {
        return Ok(ParseOutcome::Oversize {
            records: data.len(),
        });
    }
    if data.is_empty() {
        return Err(IngestError::format(format!(
            "trajectory '{}' has no data records",
            path.display()
        )));
    }

    let points = data
        .iter()
        .map(|record| parse_point(record, path))
        .collect::<Result<Vec<TrackPoint>>>()?;

    let start_time = points[0].time;
    let end_time = points[points.len() - 1].time;

    Ok(ParseOutcome::Accepted(Trajectory {
        points,
        start_time,
        end_time,
    }))
}

/// Extract one typed point from a data record by fixed positional index.
fn parse_point(fields: &[String], path: &Path) -> Result<TrackPoint> {
    let lat = parse_f64(fields, FIELD_LAT, "latitude", path)?;
    let lon = parse_f64(fields, FIELD_LON, "longitude", path)?;
    // Altitude is recorded as a float but stored as a rounded integer.
    let altitude = parse_f64(fields, FIELD_ALTITUDE, "altitude", path)?.round() as i32;
    let date_days = parse_f64(fields, FIELD_DATE_DAYS, "day fraction", path)?;
    let date = field(fields, FIELD_DATE, "date", path)?;
    let time_str = field(fields, FIELD_TIME, "time", path)?;
    let time = combine_date_time(date, time_str)?;

    Ok(TrackPoint {
        lat,
        lon,
        altitude,
        date_days,
        time,
    })
}

fn field<'a>(fields: &'a [String], index: usize, what: &str, path: &Path) -> Result<&'a str> {
    fields.get(index).map(String::as_str).ok_or_else(|| {
        IngestError::format(format!(
            "record in '{}' is missing the {} field (index {})",
            path.display(),
            what,
            index
        ))
    })
}

fn parse_f64(fields: &[String], index: usize, what: &str, path: &Path) -> Result<f64> {
    let token = field(fields, index, what, path)?;
    token.parse::<f64>().map_err(|_| {
        IngestError::format(format!(
            "invalid {} '{}' in '{}'",
            what,
            token,
            path.display()
        ))
    })
}
