//! In-process telemetry queue.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::TelemetryQueue;
use crate::controller::ControllerError;

/// FIFO [`TelemetryQueue`] held in memory.
///
/// Useful for dry runs without a scope and for tests. Items come out in the
/// order they were pushed.
///
/// # Examples
///
/// ```
/// use cnc_sim::telemetry::{MemoryQueue, TelemetryQueue};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let queue = MemoryQueue::new();
/// queue.push("X 0.000000");
/// queue.push("X 0.100000");
/// assert_eq!(queue.pop().await.unwrap(), Some(b"X 0.000000".to_vec()));
/// assert_eq!(queue.len(), 1);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<Vec<u8>>>,
}

impl MemoryQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue that will pop `items` in order.
    pub fn with_items<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Vec<u8>>,
    {
        Self {
            items: Mutex::new(items.into_iter().map(Into::into).collect()),
        }
    }

    /// Appends an item at the producer end.
    pub fn push(&self, item: impl Into<Vec<u8>>) {
        self.items.lock().push_back(item.into());
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[async_trait]
impl TelemetryQueue for MemoryQueue {
    async fn pop(&self) -> Result<Option<Vec<u8>>, ControllerError> {
        Ok(self.items.lock().pop_front())
    }
}
