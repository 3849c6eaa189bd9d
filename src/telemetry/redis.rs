//! Redis-backed telemetry queue.
//!
//! The scope component pushes each sample line onto a Redis list with
//! `LPUSH`. [`RedisQueue`] pops from the other end with `RPOP`, so items
//! come out in the order they were produced.

use ::redis::aio::MultiplexedConnection;
use ::redis::AsyncCommands;
use async_trait::async_trait;

use super::TelemetryQueue;
use crate::controller::ControllerError;

/// List key the scope writes to by default.
pub const DEFAULT_QUEUE_KEY: &str = "rtcp";

/// [`TelemetryQueue`] reading a Redis list.
///
/// # Examples
///
/// ```rust,no_run
/// use cnc_sim::telemetry::RedisQueue;
///
/// # async fn example() {
/// let queue = RedisQueue::new("redis://127.0.0.1:6379/0")
///     .await
///     .unwrap()
///     .with_key("rtcp");
/// # }
/// ```
#[derive(Clone)]
pub struct RedisQueue {
    conn: MultiplexedConnection,
    key: String,
}

impl std::fmt::Debug for RedisQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueue").field("key", &self.key).finish_non_exhaustive()
    }
}

impl RedisQueue {
    /// Connects to Redis at `url` and reads the [`DEFAULT_QUEUE_KEY`] list.
    ///
    /// # Errors
    ///
    /// Returns a [`ControllerError`] if the client cannot be created or the
    /// connection cannot be established.
    pub async fn new(url: &str) -> Result<Self, ControllerError> {
        let client = ::redis::Client::open(url).map_err(|e| {
            ControllerError::with_source(format!("failed to create Redis client: {e}"), e)
        })?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ControllerError::with_source(format!("failed to connect to Redis: {e}"), e))?;
        Ok(Self::with_connection(conn))
    }

    /// Wraps an existing connection.
    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            key: DEFAULT_QUEUE_KEY.to_string(),
        }
    }

    /// Sets the list key (builder pattern).
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// The list key being drained.
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl TelemetryQueue for RedisQueue {
    async fn pop(&self) -> Result<Option<Vec<u8>>, ControllerError> {
        let mut conn = self.conn.clone();
        let item: Option<Vec<u8>> = conn
            .rpop(&self.key, None)
            .await
            .map_err(|e| ControllerError::with_source(format!("failed to pop telemetry: {e}"), e))?;
        Ok(item)
    }
}
