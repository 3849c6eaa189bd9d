//! Test doubles for the controller, the scope and the telemetry queue.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cnc_sim::controller::{Controller, ControllerError, TraceController};
use cnc_sim::task::TaskRegistry;
use cnc_sim::telemetry::{MemoryQueue, TelemetryCapture};
use cnc_sim::{ExecutionLane, ExecutorOptions, JobExecutor, TaskStatus};
use parking_lot::Mutex;

/// Controller whose idle answers follow a script.
///
/// `is_idle` pops the scripted answers first, then reports busy for
/// `busy_polls_per_run` polls after each `load_and_run`, then idle.
#[derive(Default)]
pub struct ScriptedController {
    idle_script: Mutex<VecDeque<bool>>,
    busy_polls_per_run: usize,
    remaining_busy: AtomicUsize,
    stuck_runs: usize,
    current_run: AtomicUsize,
    fail_load: Option<String>,
    panic_on_load: bool,
    telemetry: Option<(Arc<MemoryQueue>, Vec<Vec<u8>>)>,
    tagged: Option<Arc<MemoryQueue>>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub load_calls: AtomicUsize,
    pub idle_calls: AtomicUsize,
    pub loaded: Mutex<Vec<PathBuf>>,
}

impl ScriptedController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_script(self, script: impl IntoIterator<Item = bool>) -> Self {
        *self.idle_script.lock() = script.into_iter().collect();
        self
    }

    pub fn with_busy_polls_per_run(mut self, polls: usize) -> Self {
        self.busy_polls_per_run = polls;
        self
    }

    pub fn never_idle(self) -> Self {
        self.stuck_for_runs(usize::MAX)
    }

    /// The first `runs` runs never report idle; later ones behave normally.
    pub fn stuck_for_runs(mut self, runs: usize) -> Self {
        self.stuck_runs = runs;
        self
    }

    pub fn failing_load(mut self, message: &str) -> Self {
        self.fail_load = Some(message.to_string());
        self
    }

    pub fn panicking_load(mut self) -> Self {
        self.panic_on_load = true;
        self
    }

    /// Pushes `lines` onto `queue` on every run, as the scope would.
    pub fn producing(self, queue: Arc<MemoryQueue>, lines: &[&str]) -> Self {
        self.producing_raw(queue, lines.iter().map(|l| l.as_bytes().to_vec()).collect())
    }

    /// Pushes raw items, which need not be valid UTF-8.
    pub fn producing_raw(mut self, queue: Arc<MemoryQueue>, items: Vec<Vec<u8>>) -> Self {
        self.telemetry = Some((queue, items));
        self
    }

    /// Pushes `job<n>-sample` on run `n`, counting from zero.
    pub fn producing_tagged(mut self, queue: Arc<MemoryQueue>) -> Self {
        self.tagged = Some(queue);
        self
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn idle_calls(&self) -> usize {
        self.idle_calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Controller for ScriptedController {
    async fn load_and_run(&self, path: &Path) -> Result<(), ControllerError> {
        let run = self.load_calls.fetch_add(1, Ordering::SeqCst);
        self.current_run.store(run, Ordering::SeqCst);
        self.loaded.lock().push(path.to_path_buf());
        if let Some(message) = &self.fail_load {
            return Err(ControllerError::new(message.clone()));
        }
        if self.panic_on_load {
            panic!("controller exploded");
        }

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.remaining_busy
            .store(self.busy_polls_per_run, Ordering::SeqCst);

        if let Some((queue, items)) = &self.telemetry {
            for item in items {
                queue.push(item.clone());
            }
        }
        if let Some(queue) = &self.tagged {
            queue.push(format!("job{run}-sample"));
        }
        Ok(())
    }

    async fn is_idle(&self) -> Result<bool, ControllerError> {
        self.idle_calls.fetch_add(1, Ordering::SeqCst);
        // Give other workers a chance to overlap if the lane lets them.
        tokio::task::yield_now().await;

        let idle = if self.current_run.load(Ordering::SeqCst) < self.stuck_runs {
            false
        } else if let Some(scripted) = self.idle_script.lock().pop_front() {
            scripted
        } else if self.remaining_busy.load(Ordering::SeqCst) > 0 {
            self.remaining_busy.fetch_sub(1, Ordering::SeqCst);
            false
        } else {
            true
        };

        if idle {
            let _ = self
                .active
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        }
        Ok(idle)
    }
}

/// Trace controller that records every call.
#[derive(Default)]
pub struct RecordingTrace {
    calls: Mutex<Vec<&'static str>>,
    fail_start: bool,
}

impl RecordingTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }
}

#[async_trait]
impl TraceController for RecordingTrace {
    async fn clear(&self) -> Result<(), ControllerError> {
        self.calls.lock().push("clear");
        Ok(())
    }

    async fn start(&self) -> Result<(), ControllerError> {
        self.calls.lock().push("start");
        if self.fail_start {
            return Err(ControllerError::new("halcmd setp ctrl_cmd 1 failed"));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), ControllerError> {
        self.calls.lock().push("stop");
        Ok(())
    }
}

/// Everything an executor test needs, wired over a scratch directory.
pub struct Rig {
    pub dir: tempfile::TempDir,
    pub registry: Arc<TaskRegistry>,
    pub controller: Arc<ScriptedController>,
    pub trace: Arc<RecordingTrace>,
    pub queue: Arc<MemoryQueue>,
    pub capture: Arc<TelemetryCapture>,
    pub executor: JobExecutor,
}

pub fn fast_options(lane: ExecutionLane) -> ExecutorOptions {
    ExecutorOptions {
        poll_interval: Duration::from_millis(5),
        deadline: Some(Duration::from_secs(10)),
        lane,
    }
}

pub async fn rig_with(
    controller: ScriptedController,
    trace: RecordingTrace,
    queue: Arc<MemoryQueue>,
    options: ExecutorOptions,
) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(TaskRegistry::new());
    let controller = Arc::new(controller);
    let trace = Arc::new(trace);
    let capture = Arc::new(
        TelemetryCapture::open(queue.clone(), dir.path().join("results"))
            .await
            .unwrap(),
    );
    let executor = JobExecutor::new(
        registry.clone(),
        controller.clone(),
        trace.clone(),
        capture.clone(),
        options,
    );
    Rig {
        dir,
        registry,
        controller,
        trace,
        queue,
        capture,
        executor,
    }
}

pub async fn rig(controller: ScriptedController) -> Rig {
    rig_with(
        controller,
        RecordingTrace::new(),
        Arc::new(MemoryQueue::new()),
        fast_options(ExecutionLane::Exclusive),
    )
    .await
}

/// Polls the registry until `task_id` reaches `status` or two seconds pass.
pub async fn wait_for_status(registry: &TaskRegistry, task_id: &str, status: TaskStatus) -> bool {
    for _ in 0..400 {
        if registry.status(task_id) == Some(status) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
