//! # Dataset Walker
//!
//! Drives the depth-first traversal of the dataset tree and dispatches the
//! ingestion calls. The traversal carries an explicit two-state machine
//! instead of ambient "current user" variables: a directory whose children
//! include `Trajectory` marks a user, and files inside a `Trajectory`
//! directory belong to the most recently entered user.
//!
//! Traversal order equals the underlying file-system enumeration order; no
//! sorting is imposed, so store-assigned activity ids are only as
//! deterministic as the directory listing.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::error::{IngestError, Result};
use crate::labels::{reconcile_mode, LabelIndex};
use crate::reader::RecordReader;
use crate::store::Store;
use crate::trajectory::{parse_trajectory, ParseOutcome};
use crate::IngestConfig;

/// Name of the per-user subdirectory holding trajectory files.
const TRAJECTORY_DIR: &str = "Trajectory";
/// Name of the per-user label file.
const LABELS_FILE: &str = "labels.txt";

/// Totals from one ingestion run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestSummary {
    pub users: u32,
    pub activities: u32,
    pub trackpoints: u64,
    pub oversize_skipped: u32,
}

/// Read the set of labeled user ids from `labeled_ids.txt` (one id per
/// line).
pub fn read_labeled_ids(path: &Path) -> Result<HashSet<String>> {
    let reader = RecordReader::new(path);
    let mut ids = HashSet::new();

    for record in reader.records()? {
        let fields = record?;
        if let Some(id) = fields.first() {
            ids.insert(id.clone());
        }
    }
    Ok(ids)
}

/// Parse the dataset rooted at `root` and insert its users, activities and
/// trackpoints into the store.
///
/// Expects `<root>/labeled_ids.txt` and a `<root>/Data` tree of
/// `<userId>/Trajectory/*.plt` files plus optional `<userId>/labels.txt`.
/// Oversized trajectory files are skipped silently; any I/O, format or store
/// failure aborts the run.
pub fn ingest_dataset(
    store: &mut Store,
    root: &Path,
    config: IngestConfig,
) -> Result<IngestSummary> {
    let labeled_ids = read_labeled_ids(&root.join("labeled_ids.txt"))?;
    info!(
        "ingesting dataset at '{}' ({} labeled users)",
        root.display(),
        labeled_ids.len()
    );

    let mut walker = DatasetWalker {
        store,
        config,
        labeled_ids,
        state: WalkState::AwaitingUser,
        summary: IngestSummary::default(),
    };
    walker.visit_dir(&root.join("Data"))?;

    info!(
        "ingestion done: {} users, {} activities, {} trackpoints ({} oversize files skipped)",
        walker.summary.users,
        walker.summary.activities,
        walker.summary.trackpoints,
        walker.summary.oversize_skipped
    );
    Ok(walker.summary)
}

/// Whether the traversal keeps going.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Walk {
    Continue,
    Halt,
}

/// Traversal state: either between users, or inside a user's subtree.
enum WalkState {
    AwaitingUser,
    UserActive(UserContext),
}

/// Everything the ingestion of one user's files needs.
struct UserContext {
    user_id: String,
    has_labels: bool,
    labels: LabelIndex,
}

struct DatasetWalker<'a> {
    store: &'a mut Store,
    config: IngestConfig,
    labeled_ids: HashSet<String>,
    state: WalkState,
    summary: IngestSummary,
}

impl DatasetWalker<'_> {
    fn visit_dir(&mut self, dir: &Path) -> Result<Walk> {
        let mut subdirs = Vec::new();
        let mut files = Vec::new();

        let entries = fs::read_dir(dir).map_err(|e| IngestError::io(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| IngestError::io(dir, e))?;
            let path = entry.path();
            if path.is_dir() {
                subdirs.push(path);
            } else {
                files.push(path);
            }
        }

        // A directory with a Trajectory child is a user directory.
        let is_user_dir = subdirs
            .iter()
            .any(|d| d.file_name().map(|n| n == TRAJECTORY_DIR).unwrap_or(false));
        if is_user_dir && self.enter_user(dir)? == Walk::Halt {
            return Ok(Walk::Halt);
        }

        // Files inside a Trajectory directory are this user's activities.
        let in_trajectory_dir = dir
            .file_name()
            .map(|n| n == TRAJECTORY_DIR)
            .unwrap_or(false);
        if in_trajectory_dir {
            for file in &files {
                self.ingest_file(file)?;
            }
        }

        for subdir in &subdirs {
            if self.visit_dir(subdir)? == Walk::Halt {
                return Ok(Walk::Halt);
            }
        }
        Ok(Walk::Continue)
    }

    /// Transition to `UserActive` for the user directory just encountered,
    /// inserting the user row. Halts the traversal if this is the configured
    /// stop user.
    fn enter_user(&mut self, dir: &Path) -> Result<Walk> {
        let user_id = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        // Partial ingestion: stop before this user, successfully.
        if self.config.stop_at_user.as_deref() == Some(user_id.as_str()) {
            info!("reached stop user '{}', halting traversal", user_id);
            return Ok(Walk::Halt);
        }

        let labels_path = dir.join(LABELS_FILE);
        let (has_labels, labels) = if self.labeled_ids.contains(&user_id) && labels_path.is_file() {
            (true, LabelIndex::from_file(&labels_path)?)
        } else {
            (false, LabelIndex::empty())
        };

        info!("inserting user {} (has_labels: {})", user_id, has_labels);
        self.store.insert_user(&user_id, has_labels)?;
        self.summary.users += 1;

        self.state = WalkState::UserActive(UserContext {
            user_id,
            has_labels,
            labels,
        });
        Ok(Walk::Continue)
    }

    /// Ingest one trajectory file for the active user: parse, reconcile,
    /// insert the activity, then batch-insert its points.
    fn ingest_file(&mut self, path: &Path) -> Result<()> {
        let ctx = match &self.state {
            WalkState::UserActive(ctx) => ctx,
            // A Trajectory directory outside any user subtree; the layout
            // guarantees this cannot happen, so just skip it.
            WalkState::AwaitingUser => {
                debug!("skipping '{}': no active user", path.display());
                return Ok(());
            }
        };

        let trajectory = match parse_trajectory(path, &self.config)? {
            ParseOutcome::Accepted(trajectory) => trajectory,
            ParseOutcome::Oversize { records } => {
                debug!(
                    "skipping oversize trajectory '{}' ({} records)",
                    path.display(),
                    records
                );
                self.summary.oversize_skipped += 1;
                return Ok(());
            }
        };

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let mode = reconcile_mode(&ctx.labels, ctx.has_labels, &stem, trajectory.end_time)?;
        let user_id = ctx.user_id.clone();

        let activity_id = self.store.insert_activity(
            &user_id,
            mode.as_deref(),
            trajectory.start_time,
            trajectory.end_time,
        )?;
        debug!(
            "inserting {} trackpoints for activity {} (user {})",
            trajectory.points.len(),
            activity_id,
            user_id
        );
        self.store
            .insert_trackpoints(activity_id, &trajectory.points, self.config.batch_size)?;

        self.summary.activities += 1;
        self.summary.trackpoints += trajectory.points.len() as u64;
        Ok(())
    }
}
