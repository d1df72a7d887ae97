//! `drake run`: the tick-driving command. Adapted from
//! `gator-cli::dispatch_cmd::run_dispatch` -- loads the task store, ticks the
//! supervisor until the project is done or stalled, and handles graceful
//! shutdown on Ctrl-C.

use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use drake_core::provider::anthropic::AnthropicClient;
use drake_core::provider::circuit_breaker::CircuitBreakerRegistry;
use drake_core::provider::openai::OpenAiClient;
use drake_core::provider::ProviderRegistry;
use drake_core::supervisor::debounce::Debouncer;
use drake_core::supervisor::execution::TickContext;
use drake_core::supervisor::{run_tick, Supervisor, SupervisorConfig, TickResult};
use drake_core::workspace::WorkspaceContext;
use drake_store::task_file::{list_task_files, TaskFile};
use drake_store::{TaskRecord, Wal};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

pub async fn run(project_dir: &Path, parallel_limit: Option<usize>) -> Result<ExitCode> {
    let config = crate::config::resolve_cli_config(project_dir, parallel_limit, None)?;

    let file_paths = list_task_files(project_dir).context("failed to enumerate task files")?;
    let files: Vec<TaskFile> = file_paths
        .into_iter()
        .map(TaskFile::load)
        .collect::<Result<_, _>>()
        .context("failed to load task files")?;

    let mut providers = ProviderRegistry::new();
    let mut default_provider = None;
    if let Ok(key) = drake_store::config::resolve_api_key("anthropic") {
        providers.register(Arc::new(AnthropicClient::new(key, DEFAULT_ANTHROPIC_MODEL)));
        default_provider.get_or_insert_with(|| "anthropic".to_string());
    }
    if let Ok(key) = drake_store::config::resolve_api_key("openai") {
        providers.register(Arc::new(OpenAiClient::new(key, DEFAULT_OPENAI_MODEL)));
        default_provider.get_or_insert_with(|| "openai".to_string());
    }
    let Some(default_provider) = default_provider else {
        warn!("no provider api key configured (set DRAKE_ANTHROPIC_API_KEY or DRAKE_OPENAI_API_KEY)");
        return Ok(ExitCode::from(1));
    };

    let mut files = files;
    let wal_path = project_dir.join("tasks").join(".wal.log");
    let wal = Wal::new(wal_path.clone());
    let leftover = wal.replay().context("failed to replay write-ahead log")?;
    if !leftover.is_empty() {
        warn!(count = leftover.len(), "replaying wal entries left over from a previous run");
        let mut all_tasks: Vec<TaskRecord> = files.iter().flat_map(|f| f.tasks.clone()).collect();
        drake_store::wal::apply_replay(&mut all_tasks, &leftover);
        apply_back(&mut files, &all_tasks);
    }

    let plans_dir = project_dir.join("plans");
    let tick_ctx = Arc::new(TickContext {
        providers: Arc::new(providers),
        circuit_breakers: Arc::new(CircuitBreakerRegistry::new()),
        workspace: WorkspaceContext::new(project_dir.to_path_buf(), config.resolved.allowed_external_paths.clone()),
        plans_dir,
        workspace_root: project_dir.to_path_buf(),
        allowed_external_paths: config.resolved.allowed_external_paths.clone(),
        default_provider,
        project_id: project_dir.file_name().and_then(|n| n.to_str()).unwrap_or("project").to_string(),
    });

    let shared_files = Arc::new(Mutex::new(files));
    let (debouncer, saver_handle) = Debouncer::spawn(Arc::clone(&shared_files), Wal::new(wal_path));

    let cancel = CancellationToken::new();
    install_ctrl_c_handler(cancel.clone());

    let supervisor_config = SupervisorConfig {
        max_concurrent_workers: config.resolved.parallel_limit,
        worker_stuck_timeout: std::time::Duration::from_secs(config.resolved.kobold_timeout_secs),
    };
    let mut supervisor = Supervisor::new(supervisor_config);

    let outcome = loop {
        let mut all_tasks: Vec<TaskRecord> = {
            let files = shared_files.lock().await;
            files.iter().flat_map(|f| f.tasks.clone()).collect()
        };
        let statuses_before: Vec<_> = all_tasks.iter().map(|t| t.status).collect();

        let result = run_tick(&mut supervisor, &mut all_tasks, &cancel, &tick_ctx, &wal).await;

        let terminal_reached = all_tasks
            .iter()
            .zip(&statuses_before)
            .any(|(after, before)| after.status != *before && drake_core::supervisor::debounce::is_terminal(after.status));
        {
            let mut files = shared_files.lock().await;
            apply_back(&mut files, &all_tasks);
        }
        debouncer.request_save(terminal_reached).await;

        match result {
            TickResult::Continue => {
                if cancel.is_cancelled() {
                    info!("shutdown requested, draining in-flight workers");
                    break ExitCode::from(130);
                }
            }
            TickResult::AllDone => {
                info!("all tasks done");
                break ExitCode::SUCCESS;
            }
            TickResult::Stalled { blocked_task_ids } => {
                warn!(?blocked_task_ids, "no runnable tasks remain");
                break ExitCode::from(2);
            }
        }
    };

    debouncer.shutdown().await;
    let _ = saver_handle.await;

    Ok(outcome)
}

/// Writes `all_tasks` back into each loaded `TaskFile`'s in-memory records.
/// The actual save to disk happens through the [`Debouncer`], not here.
fn apply_back(files: &mut [TaskFile], all_tasks: &[TaskRecord]) {
    for file in files.iter_mut() {
        for task in file.tasks.iter_mut() {
            if let Some(updated) = all_tasks.iter().find(|t| t.id == task.id) {
                *task = updated.clone();
            }
        }
    }
}

fn install_ctrl_c_handler(cancel: CancellationToken) {
    let second_signal = Arc::new(AtomicBool::new(false));
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            if second_signal.swap(true, Ordering::SeqCst) {
                std::process::exit(130);
            }
            cancel.cancel();
        }
    });
}
