//! [`SimulationService`]: the operations REST callers use, in one place.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::artifact::{Artifact, ArtifactStore, EvictionReport, UsageReport};
use crate::config::SimConfig;
use crate::controller::{Controller, TraceController};
use crate::error::{Result, SimError};
use crate::executor::{ExecutorOptions, JobExecutor};
use crate::task::{TaskRegistry, TaskView};
use crate::telemetry::{TelemetryCapture, TelemetryQueue};

/// Artifact store, task registry, executor and telemetry capture wired
/// together from a [`SimConfig`].
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use cnc_sim::controller::HalcmdTraceController;
/// use cnc_sim::telemetry::MemoryQueue;
/// use cnc_sim::{SimConfig, SimulationService};
/// # use cnc_sim::controller::{Controller, ControllerError};
/// # struct Rig;
/// # #[async_trait::async_trait]
/// # impl Controller for Rig {
/// #     async fn load_and_run(&self, _: &std::path::Path) -> Result<(), ControllerError> { Ok(()) }
/// #     async fn is_idle(&self) -> Result<bool, ControllerError> { Ok(true) }
/// # }
///
/// # async fn example() -> cnc_sim::Result<()> {
/// let service = SimulationService::new(
///     SimConfig::load()?,
///     Arc::new(Rig),
///     Arc::new(HalcmdTraceController::new()),
///     Arc::new(MemoryQueue::new()),
/// )
/// .await?;
///
/// service.upload_program("part.nc", b"G0 X0\nM2\n").await?;
/// let task_id = service.submit("part.nc").await?;
/// println!("{:?}", service.task(&task_id)?);
/// # Ok(())
/// # }
/// ```
pub struct SimulationService {
    config: SimConfig,
    store: Arc<ArtifactStore>,
    registry: Arc<TaskRegistry>,
    capture: Arc<TelemetryCapture>,
    executor: JobExecutor,
    shutdown: CancellationToken,
    cleanup: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SimulationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationService")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl SimulationService {
    /// Builds the service, creating the programs and results directories.
    ///
    /// Starts the background eviction pass when `cleanup_interval_secs` is
    /// set; it stops on [`shutdown`](Self::shutdown) or drop.
    pub async fn new(
        config: SimConfig,
        controller: Arc<dyn Controller>,
        trace: Arc<dyn TraceController>,
        queue: Arc<dyn TelemetryQueue>,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(
            ArtifactStore::open(
                &config.programs_dir,
                config.capacity_bytes,
                &config.program_extension,
            )
            .await?,
        );
        let capture = Arc::new(TelemetryCapture::open(queue, &config.results_dir).await?);
        let registry = Arc::new(TaskRegistry::new().with_max_retained(config.max_retained_tasks));
        let executor = JobExecutor::new(
            Arc::clone(&registry),
            controller,
            trace,
            Arc::clone(&capture),
            ExecutorOptions::from(&config),
        );

        let shutdown = CancellationToken::new();
        let cleanup = config
            .cleanup_interval()
            .map(|every| Arc::clone(&store).spawn_cleanup(every, shutdown.child_token()));

        info!(
            programs_dir = %config.programs_dir.display(),
            results_dir = %config.results_dir.display(),
            capacity_bytes = config.capacity_bytes,
            lane = ?config.lane,
            "simulation service ready"
        );

        Ok(Self {
            config,
            store,
            registry,
            capture,
            executor,
            shutdown,
            cleanup,
        })
    }

    /// The configuration in effect.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The artifact store.
    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// The task registry.
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// The telemetry capture.
    pub fn capture(&self) -> &Arc<TelemetryCapture> {
        &self.capture
    }

    /// The job executor.
    pub fn executor(&self) -> &JobExecutor {
        &self.executor
    }

    /// Stored programs, most recently modified first.
    pub async fn list_programs(&self) -> Result<Vec<Artifact>> {
        self.store.list().await
    }

    /// Stores an uploaded program and returns its path.
    pub async fn upload_program(&self, filename: &str, contents: &[u8]) -> Result<PathBuf> {
        self.store.save(filename, contents).await
    }

    /// Deletes a program, failing with [`SimError::ProgramNotFound`] if it
    /// does not exist.
    pub async fn delete_program(&self, filename: &str) -> Result<()> {
        if self.store.delete(filename).await? {
            Ok(())
        } else {
            Err(SimError::ProgramNotFound {
                filename: filename.to_string(),
            })
        }
    }

    /// Current store usage.
    pub async fn usage(&self) -> Result<UsageReport> {
        self.store.usage().await
    }

    /// Runs an eviction pass now.
    pub async fn evict_programs(&self) -> Result<EvictionReport> {
        self.store.evict_least_recently_accessed().await
    }

    /// Submits the stored program `filename` for simulation and returns the
    /// task id.
    pub async fn submit(&self, filename: &str) -> Result<String> {
        let path = self.store.resolve(filename).await?;
        Ok(self.executor.submit(path))
    }

    /// Snapshot of one task.
    pub fn task(&self, task_id: &str) -> Result<TaskView> {
        self.registry
            .get(task_id)
            .ok_or_else(|| SimError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    /// Snapshots of every task, in submission order.
    pub fn tasks(&self) -> Vec<TaskView> {
        self.registry.list_all()
    }

    /// Requests cancellation of a task. See [`JobExecutor::cancel`].
    pub fn cancel(&self, task_id: &str) -> Result<bool> {
        self.executor.cancel(task_id)
    }

    /// Stored telemetry lines of a finished task.
    pub async fn telemetry(&self, task_id: &str) -> Result<Vec<String>> {
        self.capture.load(task_id).await
    }

    /// Stops background eviction and waits for in-flight jobs.
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.cleanup.take() {
            let _ = handle.await;
        }
        self.executor.shutdown().await;
        info!("simulation service stopped");
    }
}

impl Drop for SimulationService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
