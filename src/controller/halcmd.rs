//! Trace controller that drives the scope through `halcmd`.
//!
//! The scope component watches a single S32 control pin. Each command sets
//! the shared signal and then the pin itself, so the value lands whether or
//! not the pin is currently linked to the signal.

use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ControllerError, TraceController};

/// Values understood by the scope's control pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceCommand {
    /// Stop sampling.
    Stop,
    /// Start sampling into the telemetry queue.
    Start,
    /// Clear buffered samples.
    Clear,
}

impl TraceCommand {
    /// The integer written to the control pin.
    pub fn pin_value(self) -> i32 {
        match self {
            Self::Stop => 0,
            Self::Start => 1,
            Self::Clear => 2,
        }
    }
}

impl fmt::Display for TraceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Start => write!(f, "start"),
            Self::Clear => write!(f, "clear"),
        }
    }
}

/// [`TraceController`] backed by the `halcmd` command-line tool.
///
/// # Examples
///
/// ```
/// use cnc_sim::controller::HalcmdTraceController;
///
/// let scope = HalcmdTraceController::new()
///     .with_signal("sig_scope_cmd")
///     .with_pin("blk_scope.ctrl_cmd");
/// assert_eq!(scope.pin(), "blk_scope.ctrl_cmd");
/// ```
#[derive(Debug, Clone)]
pub struct HalcmdTraceController {
    program: String,
    signal: String,
    pin: String,
}

impl HalcmdTraceController {
    /// Uses `halcmd` from `PATH`, signal `sig_ctrl_cmd` and pin `ctrl_cmd`.
    pub fn new() -> Self {
        Self {
            program: "halcmd".to_string(),
            signal: "sig_ctrl_cmd".to_string(),
            pin: "ctrl_cmd".to_string(),
        }
    }

    /// Overrides the `halcmd` executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Overrides the signal name.
    pub fn with_signal(mut self, signal: impl Into<String>) -> Self {
        self.signal = signal.into();
        self
    }

    /// Overrides the pin name.
    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = pin.into();
        self
    }

    /// The signal written by `sets`.
    pub fn signal(&self) -> &str {
        &self.signal
    }

    /// The pin written by `setp`.
    pub fn pin(&self) -> &str {
        &self.pin
    }

    /// Sends `command` to the scope.
    pub async fn send(&self, command: TraceCommand) -> Result<(), ControllerError> {
        let value = command.pin_value().to_string();
        debug!(%command, signal = %self.signal, pin = %self.pin, "sending scope command");
        self.halcmd(&["sets", &self.signal, &value]).await?;
        self.halcmd(&["setp", &self.pin, &value]).await
    }

    async fn halcmd(&self, args: &[&str]) -> Result<(), ControllerError> {
        let output = tokio::process::Command::new(&self.program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                ControllerError::with_source(format!("failed to spawn {}: {e}", self.program), e)
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let msg = format!(
            "{} {} failed (exit code {:?}): {}",
            self.program,
            args.join(" "),
            output.status.code(),
            stderr.trim()
        );
        warn!("{}", msg);
        Err(ControllerError::new(msg))
    }
}

impl Default for HalcmdTraceController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TraceController for HalcmdTraceController {
    async fn clear(&self) -> Result<(), ControllerError> {
        self.send(TraceCommand::Clear).await
    }

    async fn start(&self) -> Result<(), ControllerError> {
        self.send(TraceCommand::Start).await
    }

    async fn stop(&self) -> Result<(), ControllerError> {
        self.send(TraceCommand::Stop).await
    }
}
