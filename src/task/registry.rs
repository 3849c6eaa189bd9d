//! In-memory task registry.
//!
//! # Concurrency
//!
//! Records live in a [`DashMap`], so lookups only contend with writers on
//! the same shard. Every mutation additionally takes a single writer lock,
//! which serialises transitions across all tasks; contention is one
//! acquisition per lifecycle step.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::record::{TaskRecord, TaskView};
use super::status::TaskStatus;
use crate::error::{Result, SimError};

/// Thread-safe store of task records.
///
/// # Examples
///
/// ```
/// use cnc_sim::task::TaskRegistry;
/// use cnc_sim::TaskStatus;
///
/// let registry = TaskRegistry::new();
/// let id = registry.create("/data/nc/part.nc");
/// registry.set_running(&id).unwrap();
/// registry
///     .set_terminal(&id, TaskStatus::Finished, "done".to_string())
///     .unwrap();
///
/// let view = registry.get(&id).unwrap();
/// assert_eq!(view.status, TaskStatus::Finished);
/// assert_eq!(view.result.as_deref(), Some("done"));
/// ```
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: DashMap<String, TaskRecord>,
    writer: Mutex<()>,
    next_seq: AtomicU64,
    max_retained: Option<usize>,
}

impl TaskRegistry {
    /// Creates an empty registry that keeps every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds the number of terminal records kept (builder pattern).
    ///
    /// When a task reaches a terminal status and more than `limit` terminal
    /// records exist, the oldest terminal records are dropped. Pending and
    /// running records are never dropped.
    pub fn with_max_retained(mut self, limit: Option<usize>) -> Self {
        self.max_retained = limit;
        self
    }

    /// Registers a new `Pending` task and returns its id.
    pub fn create(&self, source_path: impl Into<PathBuf>) -> String {
        let mut record = TaskRecord::new(source_path);
        let _guard = self.writer.lock();
        record.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = record.id.clone();
        info!(task_id = %id, source = %record.source_path.display(), "task created");
        self.tasks.insert(id.clone(), record);
        id
    }

    /// Moves a task from `Pending` to `Running` and stamps its start time.
    pub fn set_running(&self, task_id: &str) -> Result<()> {
        let _guard = self.writer.lock();
        let mut record = self.entry(task_id)?;
        record.status.validate_transition(task_id, &TaskStatus::Running)?;
        record.status = TaskStatus::Running;
        record.started_at = Some(Utc::now());
        debug!(task_id, "task running");
        Ok(())
    }

    /// Moves a `Running` task to `Finished` or `Failed`, recording its
    /// result and end time.
    pub fn set_terminal(&self, task_id: &str, status: TaskStatus, result: String) -> Result<()> {
        {
            let _guard = self.writer.lock();
            let mut record = self.entry(task_id)?;
            record.status.validate_transition(task_id, &status)?;
            let now = Utc::now();
            // Never report an end before the start, even if the wall clock stepped back.
            let ended_at = record.started_at.map_or(now, |started| started.max(now));
            record.status = status;
            record.result = Some(result);
            record.ended_at = Some(ended_at);
            info!(task_id, %status, "task reached terminal state");
        }
        self.prune();
        Ok(())
    }

    /// Returns a snapshot of one task.
    pub fn get(&self, task_id: &str) -> Option<TaskView> {
        self.tasks.get(task_id).map(|r| r.view())
    }

    /// Returns a clone of the full record.
    pub fn record(&self, task_id: &str) -> Option<TaskRecord> {
        self.tasks.get(task_id).map(|r| r.value().clone())
    }

    /// Current status of a task.
    pub fn status(&self, task_id: &str) -> Option<TaskStatus> {
        self.tasks.get(task_id).map(|r| r.status)
    }

    /// Snapshots of every task, in submission order.
    pub fn list_all(&self) -> Vec<TaskView> {
        let mut records: Vec<(u64, TaskView)> = self
            .tasks
            .iter()
            .map(|entry| (entry.seq, entry.view()))
            .collect();
        records.sort_by_key(|(seq, _)| *seq);
        records.into_iter().map(|(_, view)| view).collect()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if no records are held.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn entry(&self, task_id: &str) -> Result<dashmap::mapref::one::RefMut<'_, String, TaskRecord>> {
        self.tasks
            .get_mut(task_id)
            .ok_or_else(|| SimError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    fn prune(&self) {
        let Some(limit) = self.max_retained else {
            return;
        };

        let _guard = self.writer.lock();
        let mut terminal: Vec<(u64, String)> = self
            .tasks
            .iter()
            .filter(|entry| entry.status.is_terminal())
            .map(|entry| (entry.seq, entry.key().clone()))
            .collect();
        if terminal.len() <= limit {
            return;
        }

        terminal.sort_by_key(|(seq, _)| *seq);
        let excess = terminal.len() - limit;
        for (_, id) in terminal.into_iter().take(excess) {
            self.tasks.remove(&id);
            debug!(task_id = %id, "pruned retained task");
        }
    }
}
