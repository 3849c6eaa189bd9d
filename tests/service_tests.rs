//! Integration tests for SimulationService.

mod common;

use std::sync::Arc;

use cnc_sim::telemetry::MemoryQueue;
use cnc_sim::{ExecutionLane, SimConfig, SimError, SimulationService, TaskStatus};
use common::{wait_for_status, RecordingTrace, ScriptedController};

struct Fixture {
    _dir: tempfile::TempDir,
    service: SimulationService,
    controller: Arc<ScriptedController>,
}

async fn fixture(config: impl FnOnce(&mut SimConfig), controller: ScriptedController) -> Fixture {
    fixture_with_queue(config, controller, Arc::new(MemoryQueue::new())).await
}

async fn fixture_with_queue(
    config: impl FnOnce(&mut SimConfig),
    controller: ScriptedController,
    queue: Arc<MemoryQueue>,
) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = SimConfig {
        programs_dir: dir.path().join("nc"),
        results_dir: dir.path().join("results"),
        capacity_bytes: 100,
        poll_interval_ms: 5,
        lane: ExecutionLane::Exclusive,
        ..SimConfig::default()
    };
    config(&mut cfg);

    let controller = Arc::new(controller);
    let service = SimulationService::new(
        cfg,
        controller.clone(),
        Arc::new(RecordingTrace::new()),
        queue,
    )
    .await
    .unwrap();

    Fixture {
        _dir: dir,
        service,
        controller,
    }
}

// ─── Programs ───────────────────────────────────────────────────────────────

mod programs {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn creates_directories() {
        let fx = fixture(|_| {}, ScriptedController::new()).await;
        assert!(fx.service.config().programs_dir.is_dir());
        assert!(fx.service.config().results_dir.is_dir());
    }

    #[tokio::test]
    async fn upload_list_delete() {
        let fx = fixture(|_| {}, ScriptedController::new()).await;

        let path = fx.service.upload_program("part.nc", b"G0 X1\n").await.unwrap();
        assert!(path.ends_with("part.nc"));

        let listed = fx.service.list_programs().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].filename, "part.nc");
        assert_eq!(fx.service.usage().await.unwrap().total_size_bytes, 6);

        fx.service.delete_program("part.nc").await.unwrap();
        assert!(matches!(
            fx.service.delete_program("part.nc").await,
            Err(SimError::ProgramNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn wrong_extension_is_rejected() {
        let fx = fixture(|_| {}, ScriptedController::new()).await;
        let err = fx.service.upload_program("part.gcode", b"G0").await.unwrap_err();
        assert!(matches!(err, SimError::InvalidProgram { .. }));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn evict_programs_after_capacity_is_lowered() {
        let fx = fixture(|c| c.capacity_bytes = 10, ScriptedController::new()).await;
        std::fs::write(fx.service.config().programs_dir.join("big.nc"), [b'G'; 40]).unwrap();

        let report = fx.service.evict_programs().await.unwrap();
        assert_eq!(report.removed, vec!["big.nc".to_string()]);
        assert_eq!(fx.service.usage().await.unwrap().file_count, 0);
    }
}

// ─── Simulation ─────────────────────────────────────────────────────────────

mod simulation {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn submit_runs_stored_program() {
        let queue = Arc::new(MemoryQueue::new());
        let fx = fixture_with_queue(
            |_| {},
            ScriptedController::new()
                .with_idle_script([false, true])
                .producing(queue.clone(), &["X 0.000000 Y 0.000000"]),
            queue,
        )
        .await;

        fx.service.upload_program("part.nc", b"G0 X1\n").await.unwrap();
        let id = fx.service.submit("part.nc").await.unwrap();
        fx.service.executor().wait_idle().await;

        let view = fx.service.task(&id).unwrap();
        assert_eq!(view.status, TaskStatus::Finished);
        assert!(view.filename.ends_with("part.nc"));
        assert!(std::path::Path::new(&view.filename).is_absolute());
        assert_eq!(
            fx.service.telemetry(&id).await.unwrap(),
            vec!["X 0.000000 Y 0.000000".to_string()]
        );
        assert_eq!(fx.controller.load_calls(), 1);
    }

    #[tokio::test]
    async fn submit_missing_program() {
        let fx = fixture(|_| {}, ScriptedController::new()).await;
        assert!(matches!(
            fx.service.submit("absent.nc").await,
            Err(SimError::ProgramNotFound { .. })
        ));
        assert!(fx.service.tasks().is_empty());
    }

    #[tokio::test]
    async fn unknown_task() {
        let fx = fixture(|_| {}, ScriptedController::new()).await;
        assert!(fx.service.task("nope").unwrap_err().is_not_found());
        assert!(fx.service.cancel("nope").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn tasks_listed_in_submission_order() {
        let fx = fixture(|_| {}, ScriptedController::new()).await;
        fx.service.upload_program("a.nc", b"G0").await.unwrap();
        fx.service.upload_program("b.nc", b"G1").await.unwrap();

        let first = fx.service.submit("a.nc").await.unwrap();
        let second = fx.service.submit("b.nc").await.unwrap();
        fx.service.executor().wait_idle().await;

        let ids: Vec<String> = fx.service.tasks().into_iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[tokio::test]
    async fn cancel_through_service() {
        let fx = fixture(|_| {}, ScriptedController::new().never_idle()).await;
        fx.service.upload_program("part.nc", b"G0").await.unwrap();

        let id = fx.service.submit("part.nc").await.unwrap();
        assert!(wait_for_status(fx.service.registry(), &id, TaskStatus::Running).await);
        assert!(fx.service.cancel(&id).unwrap());
        fx.service.executor().wait_idle().await;

        assert_eq!(fx.service.task(&id).unwrap().result.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn retention_bounds_terminal_tasks() {
        let fx = fixture(|c| c.max_retained_tasks = Some(2), ScriptedController::new()).await;
        fx.service.upload_program("part.nc", b"G0").await.unwrap();

        for _ in 0..5 {
            fx.service.submit("part.nc").await.unwrap();
        }
        fx.service.executor().wait_idle().await;

        assert_eq!(fx.service.tasks().len(), 2);
    }

    #[tokio::test]
    async fn shutdown_waits_for_jobs() {
        let mut fx = fixture(
            |c| c.cleanup_interval_secs = Some(60),
            ScriptedController::new().with_busy_polls_per_run(3),
        )
        .await;
        fx.service.upload_program("part.nc", b"G0").await.unwrap();
        let id = fx.service.submit("part.nc").await.unwrap();

        fx.service.shutdown().await;
        assert_eq!(fx.service.task(&id).unwrap().status, TaskStatus::Finished);
    }
}
