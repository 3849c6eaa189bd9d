//! Job executor: one supervised worker per submitted task.
//!
//! # Run sequence
//!
//! For each task the worker:
//!
//! 1. waits for the execution lane (the task stays `Pending` meanwhile),
//! 2. moves the task to `Running`,
//! 3. discards whatever is left in the telemetry queue, clears and starts
//!    the scope, then loads and runs the program,
//! 4. polls [`Controller::is_idle`] every poll interval until it reports
//!    idle,
//! 5. stops the scope, drains the telemetry queue into a buffer it owns and
//!    flushes it under the task id,
//! 6. moves the task to `Finished`.
//!
//! Any error in steps 3 to 5 moves the task to `Failed` with the error's
//! message as its result, and the worker discards the queue before giving
//! up the lane. Failures are never retried; callers resubmit.
//!
//! # Cancellation and deadlines
//!
//! Every task carries a [`CancellationToken`]. [`JobExecutor::cancel`]
//! signals it, and the run (idle polling included) is bounded by
//! [`ExecutorOptions::deadline`]. A cancelled or timed-out run fails with
//! `"cancelled"` or `"timed out after <n>s"`, and the worker sends a
//! best-effort `stop` to the scope. A task cancelled while still waiting for
//! the lane is moved through `Running` straight to `Failed`.
//!
//! # Lanes
//!
//! The controller and scope are single physical resources: a second
//! `load_and_run` aborts whatever the first job was running.
//! [`ExecutionLane::Exclusive`] (the default) admits one run at a time.
//! [`ExecutionLane::Concurrent`] admits every run immediately and is only
//! meant for test rigs where the collaborators are simulated.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::SimConfig;
use crate::controller::{Controller, TraceController};
use crate::error::{Result, SimError};
use crate::task::{TaskRegistry, TaskStatus};
use crate::telemetry::{CaptureBuffer, TelemetryCapture};

/// How runs share the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionLane {
    /// One run at a time; later submissions wait in `Pending`.
    #[default]
    Exclusive,
    /// Every run starts immediately. Runs will fight over the hardware.
    Concurrent,
}

/// Tunables for [`JobExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Delay between idle polls.
    pub poll_interval: Duration,
    /// Upper bound on one run, from `Running` until telemetry is saved.
    pub deadline: Option<Duration>,
    /// Lane policy.
    pub lane: ExecutionLane,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            deadline: Some(Duration::from_secs(6 * 60 * 60)),
            lane: ExecutionLane::Exclusive,
        }
    }
}

impl From<&SimConfig> for ExecutorOptions {
    fn from(config: &SimConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            deadline: config.job_deadline(),
            lane: config.lane,
        }
    }
}

/// Launches and supervises simulation jobs.
///
/// Workers are detached: dropping the executor or exiting the process does
/// not wait for them. Use [`shutdown`](Self::shutdown) for an orderly
/// stop.
#[derive(Clone)]
pub struct JobExecutor {
    inner: Arc<Inner>,
    tracker: TaskTracker,
}

struct Inner {
    registry: Arc<TaskRegistry>,
    controller: Arc<dyn Controller>,
    trace: Arc<dyn TraceController>,
    capture: Arc<TelemetryCapture>,
    options: ExecutorOptions,
    lane: Option<Semaphore>,
    cancellations: DashMap<String, CancellationToken>,
    stopping: AtomicBool,
}

impl std::fmt::Debug for JobExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobExecutor")
            .field("options", &self.inner.options)
            .field("in_flight", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

impl JobExecutor {
    /// Creates an executor driving the given collaborators.
    pub fn new(
        registry: Arc<TaskRegistry>,
        controller: Arc<dyn Controller>,
        trace: Arc<dyn TraceController>,
        capture: Arc<TelemetryCapture>,
        options: ExecutorOptions,
    ) -> Self {
        let lane = match options.lane {
            ExecutionLane::Exclusive => Some(Semaphore::new(1)),
            ExecutionLane::Concurrent => None,
        };
        Self {
            inner: Arc::new(Inner {
                registry,
                controller,
                trace,
                capture,
                options,
                lane,
                cancellations: DashMap::new(),
                stopping: AtomicBool::new(false),
            }),
            tracker: TaskTracker::new(),
        }
    }

    /// The registry tasks are recorded in.
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.inner.registry
    }

    /// The options in effect.
    pub fn options(&self) -> &ExecutorOptions {
        &self.inner.options
    }

    /// Registers a task for `source_path`, starts its worker and returns the
    /// task id. The task is `Pending` when this returns.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, source_path: impl Into<PathBuf>) -> String {
        let source = source_path.into();
        let task_id = self.inner.registry.create(source.clone());
        let token = CancellationToken::new();
        self.inner
            .cancellations
            .insert(task_id.clone(), token.clone());

        let inner = Arc::clone(&self.inner);
        let span = info_span!("job", task_id = %task_id);
        let id = task_id.clone();
        self.tracker
            .spawn(async move { inner.run(id, source, token).await }.instrument(span));

        info!(task_id = %task_id, "task submitted");
        task_id
    }

    /// Signals cancellation to a task's worker.
    ///
    /// Returns `true` if a live worker was signalled and `false` if the task
    /// already reached a terminal status.
    pub fn cancel(&self, task_id: &str) -> Result<bool> {
        if let Some(token) = self.inner.cancellations.get(task_id) {
            token.cancel();
            info!(task_id, "cancellation requested");
            return Ok(true);
        }
        match self.inner.registry.status(task_id) {
            Some(_) => Ok(false),
            None => Err(SimError::TaskNotFound {
                task_id: task_id.to_string(),
            }),
        }
    }

    /// Number of workers that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits until every worker spawned so far has finished.
    ///
    /// Meant for one caller at a time, such as a test. The tracker is
    /// reopened on return, so an overlapping caller may also wait on
    /// workers submitted after the first one returned. Once
    /// [`shutdown`](Self::shutdown) has begun the tracker stays closed.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        if !self.inner.stopping.load(Ordering::SeqCst) {
            self.tracker.reopen();
        }
    }

    /// Waits for every in-flight worker and leaves the tracker closed.
    ///
    /// Safe to call from several places at once. Jobs submitted afterwards
    /// still run but are no longer waited for.
    pub async fn shutdown(&self) {
        self.inner.stopping.store(true, Ordering::SeqCst);
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Inner {
    async fn run(self: Arc<Self>, task_id: String, source: PathBuf, token: CancellationToken) {
        let _permit = match self.acquire_lane(&token).await {
            Ok(permit) => permit,
            Err(err) => {
                debug!("cancelled while waiting for the lane");
                if self.start(&task_id) {
                    self.finish(&task_id, Err(err));
                }
                return;
            }
        };

        if !self.start(&task_id) {
            return;
        }

        let outcome = self.drive_bounded(&task_id, &source, &token).await;
        if outcome.is_err() {
            if matches!(outcome, Err(SimError::Cancelled | SimError::TimedOut { .. })) {
                if let Err(e) = self.trace.stop().await {
                    warn!(error = %e, "could not stop scope after interrupted run");
                }
            }
            // Samples of a failed run must not reach the next task's result.
            if let Err(e) = self.capture.discard().await {
                warn!(error = %e, "could not discard telemetry of failed run");
            }
        }
        self.finish(&task_id, outcome);
    }

    async fn acquire_lane(&self, token: &CancellationToken) -> Result<Option<SemaphorePermit<'_>>> {
        let Some(lane) = &self.lane else {
            return Ok(None);
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(SimError::Cancelled),
            permit = lane.acquire() => permit.map(Some).map_err(|_| SimError::Cancelled),
        }
    }

    async fn drive_bounded(&self, task_id: &str, source: &Path, token: &CancellationToken) -> Result<String> {
        let run = AssertUnwindSafe(self.drive(task_id, source))
            .catch_unwind()
            .map(|caught| match caught {
                Ok(result) => result,
                Err(panic) => Err(SimError::WorkerPanicked(panic_message(panic.as_ref()))),
            });

        let bounded = async {
            match self.options.deadline {
                Some(after) => tokio::time::timeout(after, run)
                    .await
                    .unwrap_or(Err(SimError::TimedOut { after })),
                None => run.await,
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(SimError::Cancelled),
            result = bounded => result,
        }
    }

    async fn drive(&self, task_id: &str, source: &Path) -> Result<String> {
        self.capture.discard().await?;
        self.trace.clear().await?;
        self.trace.start().await?;
        self.controller.load_and_run(source).await?;

        let mut busy_polls: u64 = 0;
        while !self.controller.is_idle().await? {
            busy_polls += 1;
            debug!(busy_polls, "controller busy");
            tokio::time::sleep(self.options.poll_interval).await;
        }
        self.trace.stop().await?;

        let mut buffer = CaptureBuffer::new();
        self.capture.drain(&mut buffer).await?;
        self.capture.flush(task_id, &buffer).await?;

        Ok(format!("simulation complete: {}", source.display()))
    }

    fn start(&self, task_id: &str) -> bool {
        match self.registry.set_running(task_id) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "could not start task");
                self.cancellations.remove(task_id);
                false
            }
        }
    }

    fn finish(&self, task_id: &str, outcome: Result<String>) {
        self.cancellations.remove(task_id);

        let (status, result) = match outcome {
            Ok(message) => (TaskStatus::Finished, message),
            Err(e) => {
                error!(error = %e, "task failed");
                (TaskStatus::Failed, e.to_string())
            }
        };

        if let Err(e) = self.registry.set_terminal(task_id, status, result) {
            error!(error = %e, "could not record task outcome");
            return;
        }

        if let Some(elapsed) = self.registry.record(task_id).and_then(|r| r.elapsed()) {
            info!(%status, elapsed_ms = elapsed.num_milliseconds(), "task ended");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
