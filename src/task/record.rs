//! Task record and its wire view.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::TaskStatus;

/// Registry-side representation of one execution request.
///
/// `id` and `source_path` never change after creation. `started_at` is set
/// on entering `Running`, `ended_at` and `result` on entering a terminal
/// status.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    /// UUIDv4 assigned at submission.
    pub id: String,

    /// Program being executed.
    pub source_path: PathBuf,

    /// Current lifecycle status.
    pub status: TaskStatus,

    /// Outcome message or error description, set once at the terminal
    /// transition.
    pub result: Option<String>,

    /// When the task was submitted.
    pub submitted_at: DateTime<Utc>,

    /// When the worker moved the task to `Running`.
    pub started_at: Option<DateTime<Utc>>,

    /// When the task reached a terminal status.
    pub ended_at: Option<DateTime<Utc>>,

    /// Submission order, used to list tasks stably.
    pub(crate) seq: u64,
}

impl TaskRecord {
    /// Creates a `Pending` record with a fresh id.
    ///
    /// # Examples
    ///
    /// ```
    /// use cnc_sim::task::TaskRecord;
    /// use cnc_sim::TaskStatus;
    ///
    /// let record = TaskRecord::new("/data/nc/part.nc");
    /// assert_eq!(record.status, TaskStatus::Pending);
    /// assert_eq!(record.id.len(), 36);
    /// assert!(record.started_at.is_none());
    /// ```
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_path: source_path.into(),
            status: TaskStatus::Pending,
            result: None,
            submitted_at: Utc::now(),
            started_at: None,
            ended_at: None,
            seq: 0,
        }
    }

    /// Wall time between start and end, once both are known.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.ended_at? - self.started_at?)
    }

    /// The program path.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Snapshot for callers outside the core.
    pub fn view(&self) -> TaskView {
        TaskView {
            id: self.id.clone(),
            filename: self.source_path.display().to_string(),
            status: self.status,
            result: self.result.clone(),
            start_time: self.started_at,
            end_time: self.ended_at,
        }
    }
}

/// Read-only snapshot of a task as returned to REST callers.
///
/// Times serialize as fractional Unix seconds, or `null` while unset.
///
/// # Examples
///
/// ```
/// use cnc_sim::task::TaskRecord;
///
/// let view = TaskRecord::new("/data/nc/part.nc").view();
/// let json = serde_json::to_value(&view).unwrap();
/// assert_eq!(json["status"], "pending");
/// assert_eq!(json["filename"], "/data/nc/part.nc");
/// assert!(json["start_time"].is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    /// Task id.
    pub id: String,
    /// Program path the task runs.
    pub filename: String,
    /// Current status.
    pub status: TaskStatus,
    /// Outcome message, once terminal.
    pub result: Option<String>,
    /// Start of the run.
    #[serde(with = "crate::serde_time::unix_seconds_opt")]
    pub start_time: Option<DateTime<Utc>>,
    /// End of the run.
    #[serde(with = "crate::serde_time::unix_seconds_opt")]
    pub end_time: Option<DateTime<Utc>>,
}
