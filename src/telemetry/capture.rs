//! Draining the telemetry queue and persisting results per task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::{CaptureBuffer, TelemetryQueue};
use crate::error::{Result, SimError};

/// Extension of stored telemetry files.
pub const RESULT_EXTENSION: &str = "txt";

/// Drains the shared telemetry queue and stores results keyed by task id.
///
/// Draining is serialised by one lock because the queue is shared by every
/// job. Flushing has its own lock, so a flush never waits on a drain.
pub struct TelemetryCapture {
    queue: Arc<dyn TelemetryQueue>,
    results_dir: PathBuf,
    drain_lock: tokio::sync::Mutex<()>,
    save_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for TelemetryCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryCapture")
            .field("results_dir", &self.results_dir)
            .finish_non_exhaustive()
    }
}

impl TelemetryCapture {
    /// Opens a capture writing into `results_dir`, creating it if needed.
    pub async fn open(queue: Arc<dyn TelemetryQueue>, results_dir: impl Into<PathBuf>) -> Result<Self> {
        let results_dir = results_dir.into();
        tokio::fs::create_dir_all(&results_dir)
            .await
            .map_err(|e| SimError::io(&results_dir, e))?;
        Ok(Self {
            queue,
            results_dir,
            drain_lock: tokio::sync::Mutex::new(()),
            save_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// The results directory.
    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Where the result for `task_id` is stored.
    pub fn result_path(&self, task_id: &str) -> PathBuf {
        self.results_dir.join(format!("{task_id}.{RESULT_EXTENSION}"))
    }

    /// Replaces the contents of `buffer` with everything currently in the
    /// queue, popping until it reports empty. Returns the number of lines.
    ///
    /// Each item must be UTF-8; the first one that is not aborts the drain
    /// with [`SimError::TelemetryDecode`].
    pub async fn drain(&self, buffer: &mut CaptureBuffer) -> Result<usize> {
        let _guard = self.drain_lock.lock().await;
        buffer.clear();
        while let Some(raw) = self.queue.pop().await? {
            buffer.push(String::from_utf8(raw)?);
        }
        debug!(lines = buffer.len(), "telemetry drained");
        Ok(buffer.len())
    }

    /// Pops and drops everything currently in the queue, decodable or not.
    /// Returns the number of items dropped.
    ///
    /// Used around runs whose samples belong to no task, so they cannot
    /// leak into the next task's result.
    pub async fn discard(&self) -> Result<usize> {
        let _guard = self.drain_lock.lock().await;
        let mut dropped = 0;
        while self.queue.pop().await?.is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "stale telemetry discarded");
        }
        Ok(dropped)
    }

    /// Writes `buffer` to the result file for `task_id`, one line per
    /// entry, replacing any previous result for that id.
    pub async fn flush(&self, task_id: &str, buffer: &CaptureBuffer) -> Result<PathBuf> {
        check_task_id(task_id)?;
        let path = self.result_path(task_id);
        let partial = self
            .results_dir
            .join(format!(".{task_id}.{RESULT_EXTENSION}.partial"));

        let mut contents = String::with_capacity(buffer.lines().iter().map(|l| l.len() + 1).sum());
        for line in buffer.lines() {
            contents.push_str(line);
            contents.push('\n');
        }

        let _guard = self.save_lock.lock().await;
        if let Err(e) = tokio::fs::write(&partial, contents).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(SimError::io(&partial, e));
        }
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| SimError::io(&path, e))?;

        info!(task_id, lines = buffer.len(), path = %path.display(), "telemetry saved");
        Ok(path)
    }

    /// Reads back the stored lines for `task_id`.
    pub async fn load(&self, task_id: &str) -> Result<Vec<String>> {
        check_task_id(task_id)?;
        let path = self.result_path(task_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(contents.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SimError::TaskNotFound {
                task_id: task_id.to_string(),
            }),
            Err(e) => Err(SimError::io(&path, e)),
        }
    }

    /// Ids of every task with a stored result, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.results_dir)
            .await
            .map_err(|e| SimError::io(&self.results_dir, e))?;

        let suffix = format!(".{RESULT_EXTENSION}");
        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SimError::io(&self.results_dir, e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if let Some(id) = name.strip_suffix(&suffix) {
                if Uuid::parse_str(id).is_ok() {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Deletes the stored result for `task_id`. Returns `false` if there
    /// was none.
    pub async fn delete(&self, task_id: &str) -> Result<bool> {
        check_task_id(task_id)?;
        let path = self.result_path(task_id);
        let _guard = self.save_lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SimError::io(&path, e)),
        }
    }
}

// Task ids are UUIDs; anything else cannot name a stored result.
fn check_task_id(task_id: &str) -> Result<()> {
    Uuid::parse_str(task_id)
        .map(|_| ())
        .map_err(|_| SimError::TaskNotFound {
            task_id: task_id.to_string(),
        })
}
