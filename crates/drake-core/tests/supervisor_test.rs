use std::sync::Arc;

use drake_core::provider::circuit_breaker::CircuitBreakerRegistry;
use drake_core::provider::ProviderRegistry;
use drake_core::supervisor::execution::TickContext;
use drake_core::supervisor::{run_tick, Supervisor, SupervisorConfig, TickResult};
use drake_core::workspace::WorkspaceContext;
use drake_store::{Priority, TaskRecord, TaskStatus, Wal};
use tokio_util::sync::CancellationToken;

fn task(id: &str, priority: Priority, status: TaskStatus, deps: Vec<String>) -> TaskRecord {
    TaskRecord {
        id: id.to_string(),
        description: "demo task".to_string(),
        priority,
        status,
        assigned_agent_type: None,
        project_id: String::new(),
        dependencies: deps,
        commit_sha: None,
        output_files: vec![],
        provider_name: None,
        error_message: None,
    }
}

fn tick_ctx(dir: &std::path::Path) -> Arc<TickContext> {
    Arc::new(TickContext {
        providers: Arc::new(ProviderRegistry::new()),
        circuit_breakers: Arc::new(CircuitBreakerRegistry::new()),
        workspace: WorkspaceContext::new(dir.to_path_buf(), vec![]),
        plans_dir: dir.join("plans"),
        workspace_root: dir.to_path_buf(),
        allowed_external_paths: vec![],
        default_provider: "fake".to_string(),
        project_id: "proj-a".to_string(),
    })
}

#[tokio::test]
async fn concurrency_cap_limits_simultaneous_spawns() {
    let config = SupervisorConfig {
        max_concurrent_workers: 1,
        ..SupervisorConfig::default()
    };
    let mut supervisor = Supervisor::new(config);
    let cancel = CancellationToken::new();

    let first = task("T-1", Priority::Normal, TaskStatus::Unassigned, vec![]);
    let second = task("T-2", Priority::Normal, TaskStatus::Unassigned, vec![]);

    let spawned_first = supervisor.try_spawn(&first, cancel.clone(), |_, _| async { Ok(None) });
    let spawned_second = supervisor.try_spawn(&second, cancel.clone(), |_, _| async { Ok(None) });

    assert!(spawned_first);
    assert!(!spawned_second, "second spawn should be refused while the only permit is held");
}

#[tokio::test]
async fn all_done_reported_once_every_task_completes() {
    let dir = tempfile::tempdir().unwrap();
    let mut tasks = vec![task("T-1", Priority::Normal, TaskStatus::Done, vec![])];
    let mut supervisor = Supervisor::new(SupervisorConfig::default());
    let cancel = CancellationToken::new();
    let ctx = tick_ctx(dir.path());
    let wal = Wal::new(dir.path().join("wal.log"));
    assert_eq!(run_tick(&mut supervisor, &mut tasks, &cancel, &ctx, &wal).await, TickResult::AllDone);
}
