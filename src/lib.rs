//! Job orchestration core for CNC program simulation.
//!
//! Callers upload NC programs into a capacity-bounded store, submit them
//! for execution against an external CNC controller, poll task status, and
//! read back the scope telemetry captured during each run.
//!
//! # Overview
//!
//! A submission creates a task in the [`TaskRegistry`](task::TaskRegistry)
//! and spawns a worker in the [`JobExecutor`](executor::JobExecutor). The
//! worker starts the scope, runs the program, polls the controller until it
//! is idle, then drains the telemetry queue and stores the lines under the
//! task id. Task status moves `pending -> running -> finished | failed`.
//!
//! The controller, the scope and the telemetry queue are external and are
//! reached through the [`Controller`](controller::Controller),
//! [`TraceController`](controller::TraceController) and
//! [`TelemetryQueue`](telemetry::TelemetryQueue) traits.
//!
//! # Module Organization
//!
//! - [`artifact`] - Capacity-bounded program storage and eviction
//! - [`task`] - Task records, status state machine, registry
//! - [`executor`] - Job workers, lanes, cancellation and deadlines
//! - [`telemetry`] - Queue abstraction, drain and per-task persistence
//! - [`controller`] - Controller traits and the `halcmd` scope driver
//! - [`service`] - [`SimulationService`] facade
//! - [`config`] - TOML and environment configuration
//! - [`error`] - [`SimError`]
//! - `http` - axum router (feature `http`)
//! - `logging` - tracing subscriber setup (feature `logging`)
//!
//! # Feature Flags
//!
//! - `logging` (default): [`tracing-subscriber`] setup
//! - `http`: REST router built on axum
//! - `redis`: Redis-backed telemetry queue
//!
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod artifact;
pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod service;
pub mod task;
pub mod telemetry;

mod serde_time;

#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub mod http;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

pub use config::{ConfigError, SimConfig};
pub use error::{Result, SimError};
pub use executor::{ExecutionLane, ExecutorOptions, JobExecutor};
pub use service::SimulationService;
pub use task::{TaskStatus, TaskView};
