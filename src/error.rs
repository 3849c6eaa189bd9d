//! Error types for the simulation core.
//!
//! [`SimError`] covers every failure the core can report. Errors raised by
//! synchronous calls (upload, delete, status query) reach the caller as-is;
//! errors raised inside a job worker are rendered with `to_string()` and
//! recorded as the task's result instead.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::controller::ControllerError;
use crate::task::TaskStatus;

/// Errors that can occur in the simulation core.
///
/// # Examples
///
/// ```
/// use cnc_sim::SimError;
///
/// let err = SimError::CapacityExceeded {
///     used: 60,
///     incoming: 50,
///     capacity: 100,
/// };
/// assert!(err.is_client_error());
/// assert!(err.to_string().contains("100"));
/// ```
#[derive(Error, Debug)]
pub enum SimError {
    /// Storing the upload would push artifact usage above the ceiling.
    #[error("insufficient space: {used} bytes in use, upload is {incoming} bytes, capacity is {capacity} bytes")]
    CapacityExceeded {
        /// Bytes already in use (including in-flight reservations).
        used: u64,
        /// Size of the rejected upload.
        incoming: u64,
        /// Configured capacity.
        capacity: u64,
    },

    /// The referenced program file does not exist.
    #[error("program not found: {filename}")]
    ProgramNotFound {
        /// The file name that was looked up.
        filename: String,
    },

    /// The referenced task id is unknown.
    #[error("task not found: {task_id}")]
    TaskNotFound {
        /// The task id that was looked up.
        task_id: String,
    },

    /// The file name is not an acceptable program name.
    #[error("invalid program name '{filename}': {reason}")]
    InvalidProgram {
        /// The rejected file name.
        filename: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A task lifecycle transition was rejected.
    #[error("invalid transition from {from} to {to} for task {task_id}")]
    InvalidTransition {
        /// The task being transitioned.
        task_id: String,
        /// Its current status.
        from: TaskStatus,
        /// The rejected target status.
        to: TaskStatus,
    },

    /// The controller or trace controller failed.
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// File system failure while persisting or reading state.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A telemetry item popped from the queue was not valid UTF-8.
    #[error("telemetry item is not valid UTF-8: {0}")]
    TelemetryDecode(#[from] std::string::FromUtf8Error),

    /// The job was cancelled by its submitter.
    #[error("cancelled")]
    Cancelled,

    /// The job did not finish before its deadline.
    #[error("timed out after {}s", .after.as_secs())]
    TimedOut {
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The job worker panicked.
    #[error("worker panicked: {0}")]
    WorkerPanicked(String),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SimError {
    /// Wraps an I/O error with the path it occurred on.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` for errors the caller can fix by changing the request.
    ///
    /// Capacity, not-found and invalid-name errors are client errors;
    /// everything else is an internal failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. }
                | Self::ProgramNotFound { .. }
                | Self::TaskNotFound { .. }
                | Self::InvalidProgram { .. }
        )
    }

    /// Returns `true` if the error reports a missing program or task.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ProgramNotFound { .. } | Self::TaskNotFound { .. }
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = SimError> = std::result::Result<T, E>;
