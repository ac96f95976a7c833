//! # Geolife Ingest
//!
//! Ingestion and sequential analytics for hierarchical GPS-trajectory
//! datasets in the Geolife layout: per-user directories of `.plt` activity
//! files, optionally annotated with transportation-mode labels.
//!
//! This library provides:
//! - A single-pass ingestion pipeline into a normalized three-table SQLite
//!   store (`User` / `Activity` / `TrackPoint`)
//! - Label reconciliation: matching loosely-keyed label records to parsed
//!   trajectories by end-timestamp equality
//! - A battery of read-only analytics computed as linear scans over
//!   store-ordered point sequences (distance, altitude gain, temporal-gap
//!   validity, per-mode rankings)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use geolife_ingest::{ingest_dataset, IngestConfig, Store};
//! use std::path::Path;
//!
//! let mut store = Store::open("trajectories.db").unwrap();
//! store.create_tables().unwrap();
//!
//! let summary = ingest_dataset(
//!     &mut store,
//!     Path::new("./dataset"),
//!     IngestConfig::default(),
//! )
//! .unwrap();
//! println!(
//!     "ingested {} users, {} activities, {} trackpoints",
//!     summary.users, summary.activities, summary.trackpoints
//! );
//! ```

use chrono::NaiveDateTime;

// Unified error handling
pub mod error;
pub use error::{IngestError, Result};

// Raw record reading (whitespace/comma token records)
pub mod reader;
pub use reader::{RecordReader, Records};

// Label index building and reconciliation
pub mod labels;
pub use labels::{normalize_key, reconcile_mode, LabelIndex, LabelRecord};

// Trajectory file parsing and validation
pub mod trajectory;
pub use trajectory::{combine_date_time, parse_trajectory, ParseOutcome, Trajectory};

// Dataset traversal and ingestion driver
pub mod walker;
pub use walker::{ingest_dataset, read_labeled_ids, IngestSummary};

// SQLite-backed trajectory store
pub mod store;
pub use store::Store;

// Geographic utilities (great-circle distance)
pub mod geo_utils;
pub use geo_utils::haversine_km;

// Sequential analytics over the stored dataset
pub mod analytics;
pub use analytics::{full_report, AnalyticsReport, ReportParams};

// ============================================================================
// Core Types
// ============================================================================

/// Altitude value meaning "unknown". Excluded from altitude-delta math in
/// either position of a compared pair.
pub const ALTITUDE_SENTINEL: i32 = -777;

/// One GPS sample within an activity.
///
/// Ordering within an activity is significant and preserved exactly as read
/// from the source file (ascending time).
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
    /// Altitude in feet; [`ALTITUDE_SENTINEL`] when unknown
    pub altitude: i32,
    /// Timestamp as a fraction of days since 1899-12-30 (dataset convention)
    pub date_days: f64,
    /// Canonical timestamp, second precision
    pub time: NaiveDateTime,
}

impl TrackPoint {
    /// Whether the altitude carries a real measurement.
    pub fn has_known_altitude(&self) -> bool {
        self.altitude != ALTITUDE_SENTINEL
    }
}

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Maximum data records per trajectory file. Files with more records are
    /// rejected whole: no Activity, no TrackPoints. Default: 2500
    pub max_trackpoints: usize,

    /// Fixed-format header rows at the top of every trajectory file.
    /// Default: 6
    pub header_rows: usize,

    /// Rows per TrackPoint insert statement. Bounds statement size only;
    /// there is no concurrency. Default: 100
    pub batch_size: usize,

    /// Halt the traversal (successfully) before ingesting this user id.
    /// Used for partial/bounded ingestion runs. Default: None
    pub stop_at_user: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_trackpoints: 2500,
            header_rows: 6,
            batch_size: 100,
            stop_at_user: None,
        }
    }
}

impl IngestConfig {
    /// Config that stops the traversal before the given user id.
    pub fn stop_at(user_id: &str) -> Self {
        Self {
            stop_at_user: Some(user_id.to_string()),
            ..Self::default()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
