//! Telemetry capture: draining the scope's queue and persisting it per task.
//!
//! While a job runs, the scope pushes one text line per servo cycle into an
//! external queue. After the run completes, the worker drains that queue
//! into a [`CaptureBuffer`] it owns and flushes the buffer to
//! `<results_dir>/<task_id>.txt`, one line per captured item.
//!
//! # Ordering
//!
//! Lines are written in the order they were popped. The producer pushes at
//! the head of the list and [`TelemetryQueue::pop`] takes from the tail, so
//! pop order is chronological.
//!
//! # Module Organization
//!
//! - [`capture`] - [`TelemetryCapture`], the drain/flush/load operations
//! - [`memory`] - [`MemoryQueue`], an in-process queue
//! - `redis` - `RedisQueue` (feature `redis`)

pub mod capture;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use async_trait::async_trait;

use crate::controller::ControllerError;

pub use capture::TelemetryCapture;
pub use memory::MemoryQueue;
#[cfg(feature = "redis")]
pub use self::redis::RedisQueue;

/// The external queue the scope writes into during a run.
#[async_trait]
pub trait TelemetryQueue: Send + Sync {
    /// Removes and returns the next item, or `None` once the queue is empty.
    async fn pop(&self) -> Result<Option<Vec<u8>>, ControllerError>;
}

/// Lines captured for one task, in pop order.
///
/// Each worker owns its own buffer, so concurrent jobs never see each
/// other's lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureBuffer {
    lines: Vec<String>,
}

impl CaptureBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line.
    pub fn push(&mut self, line: String) {
        self.lines.push(line);
    }

    /// Discards all lines.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// The captured lines.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Number of captured lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns `true` if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl From<Vec<String>> for CaptureBuffer {
    fn from(lines: Vec<String>) -> Self {
        Self { lines }
    }
}
