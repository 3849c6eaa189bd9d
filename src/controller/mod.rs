//! Interfaces to the external CNC controller and the scope trace controller.
//!
//! The core never talks to hardware directly. It drives two collaborators
//! through the traits below, and a job worker holds exclusive use of both
//! for the duration of a run when the executor uses
//! [`ExecutionLane::Exclusive`](crate::executor::ExecutionLane::Exclusive).
//!
//! - [`Controller`] loads and runs a program and reports interpreter
//!   idleness.
//! - [`TraceController`] toggles the scope capture. Calls are signal
//!   toggles with no acknowledgement from the scope itself.

pub mod halcmd;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

pub use halcmd::{HalcmdTraceController, TraceCommand};

/// Error raised by an external collaborator.
///
/// The message is what ends up in a failed task's `result`, so it should be
/// written for the operator.
///
/// # Examples
///
/// ```
/// use cnc_sim::controller::ControllerError;
///
/// let err = ControllerError::new("cannot connect to controller");
/// assert_eq!(err.to_string(), "cannot connect to controller");
/// ```
#[derive(Debug)]
pub struct ControllerError {
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ControllerError {
    /// Creates an error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error with a message and an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The operator-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ControllerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// The numerical-control execution engine.
#[async_trait]
pub trait Controller: Send + Sync {
    /// Loads and starts a program.
    ///
    /// Implementations abort whatever is running, reset the interpreter,
    /// home every axis in machine coordinates by issuing
    /// `G00G53X0Y0Z0A0B0C0` in MDI mode, abort and reset again, then open
    /// `path` in auto mode and run it from line 0.
    async fn load_and_run(&self, path: &Path) -> Result<(), ControllerError>;

    /// Polls the interpreter and returns `true` once it is idle.
    ///
    /// When the interpreter is not idle, implementations reset it as a side
    /// effect before returning `false`. Callers must not rely on calling
    /// this being free of effects.
    async fn is_idle(&self) -> Result<bool, ControllerError>;
}

/// The scope capture running alongside a job.
#[async_trait]
pub trait TraceController: Send + Sync {
    /// Discards anything the scope has buffered.
    async fn clear(&self) -> Result<(), ControllerError>;

    /// Starts sampling into the telemetry queue.
    async fn start(&self) -> Result<(), ControllerError>;

    /// Stops sampling.
    async fn stop(&self) -> Result<(), ControllerError>;
}
