//! The real per-task tick procedure: resolve a provider, ensure a plan
//! exists, drive the plan-driven worker loop, and commit on success. This is
//! what `Supervisor::try_spawn` runs for every ready task -- the rest of
//! `supervisor::mod` is scheduling and bookkeeping around it.

use std::path::PathBuf;
use std::sync::Arc;

use drake_store::{PlanStatus, TaskRecord};

use crate::provider::circuit_breaker::CircuitBreakerRegistry;
use crate::provider::{Provider, ProviderRegistry};
use crate::worker::LivenessTracker;
use crate::workspace::WorkspaceContext;

/// Everything a spawned task execution needs that isn't specific to the task
/// itself. Cheap to clone (everything inside is already an `Arc` or a small
/// value), shared across every in-flight worker via an outer `Arc`.
pub struct TickContext {
    pub providers: Arc<ProviderRegistry>,
    pub circuit_breakers: Arc<CircuitBreakerRegistry>,
    pub workspace: WorkspaceContext,
    pub plans_dir: PathBuf,
    pub workspace_root: PathBuf,
    pub allowed_external_paths: Vec<PathBuf>,
    pub default_provider: String,
    pub project_id: String,
}

/// Runs one task to completion: resolves its provider, loads or generates a
/// plan, drives it, and commits the result. Returns the new commit sha (if
/// anything was committed) on success, or an error message that the caller
/// maps to `TaskStatus::Failed`.
pub async fn execute_task(ctx: Arc<TickContext>, task: TaskRecord, liveness: LivenessTracker) -> Result<Option<String>, String> {
    let provider_name = task.provider_name.clone().unwrap_or_else(|| ctx.default_provider.clone());

    if !ctx.circuit_breakers.is_call_allowed(&provider_name) {
        return Err(format!("circuit open for provider {provider_name}, not attempting a call"));
    }

    let provider = ctx
        .providers
        .get(&provider_name)
        .ok_or_else(|| format!("no provider registered under the name {provider_name:?}"))?;

    let outcome = run_task_plan(&ctx, &task, provider.as_ref(), &liveness).await;

    match &outcome {
        Ok(_) => ctx.circuit_breakers.record_success(&provider_name),
        Err(_) => ctx.circuit_breakers.record_failure(&provider_name),
    }

    outcome
}

async fn run_task_plan(
    ctx: &TickContext,
    task: &TaskRecord,
    provider: &dyn Provider,
    liveness: &LivenessTracker,
) -> Result<Option<String>, String> {
    let mut plan = match drake_store::plan_store::load_plan(&ctx.plans_dir, &task.id).map_err(|e| e.to_string())? {
        Some(plan) if !plan.is_exhausted() => plan,
        Some(_) => return Ok(None),
        None => {
            let workspace_summary = ctx.workspace.summary().await;
            let plan = crate::planner::generate_plan(provider, task, &workspace_summary)
                .await
                .map_err(|e| e.to_string())?;
            drake_store::plan_store::save_plan(&ctx.plans_dir, &plan).map_err(|e| e.to_string())?;
            plan
        }
    };
    plan.status = PlanStatus::InProgress;

    let system_prompt = format!(
        "You are implementing task {}: {}\n\nWorkspace context:\n{}",
        task.id,
        task.description,
        ctx.workspace.summary().await,
    );
    let tool_ctx = crate::worker::tool_context(ctx.workspace_root.clone(), ctx.allowed_external_paths.clone());

    crate::worker::run_plan(provider, &tool_ctx, &system_prompt, &mut plan, &ctx.plans_dir, liveness)
        .await
        .map_err(|e| e.to_string())?;

    let commit_sha = crate::vcs::commit_task_work(&ctx.workspace_root, task, &ctx.project_id).map_err(|e| e.to_string())?;
    if let Some(sha) = &commit_sha {
        ctx.workspace.record_commit(sha.clone()).await;
    }
    drake_store::plan_store::delete_plan(&ctx.plans_dir, &task.id).map_err(|e| e.to_string())?;

    Ok(commit_sha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    use crate::provider::{CompletionRequest, CompletionResponse, ContentBlock, ProviderError};
    use drake_store::{Priority, TaskStatus};

    struct FakeProvider;

    #[async_trait]
    impl Provider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
            if request.forced_tool.is_some() {
                let mut input = HashMap::new();
                input.insert(
                    "steps".to_string(),
                    serde_json::Value::Array(vec![serde_json::Value::String("write a file".to_string())]),
                );
                return Ok(CompletionResponse {
                    blocks: vec![ContentBlock::ToolUse {
                        id: "call_1".to_string(),
                        name: "create_implementation_plan".to_string(),
                        input,
                    }],
                    stop_reason: "tool_use".to_string(),
                });
            }
            Ok(CompletionResponse {
                blocks: vec![ContentBlock::Text("done".to_string())],
                stop_reason: "end_turn".to_string(),
            })
        }
    }

    fn task() -> TaskRecord {
        TaskRecord {
            id: "T-001".into(),
            description: "add a log line".into(),
            priority: Priority::Normal,
            status: TaskStatus::Working,
            assigned_agent_type: None,
            project_id: String::new(),
            dependencies: vec![],
            commit_sha: None,
            output_files: vec![],
            provider_name: Some("fake".to_string()),
            error_message: None,
        }
    }

    fn ctx(plans_dir: PathBuf, workspace_root: PathBuf) -> Arc<TickContext> {
        let mut providers = ProviderRegistry::new();
        providers.register(Arc::new(FakeProvider));
        Arc::new(TickContext {
            providers: Arc::new(providers),
            circuit_breakers: Arc::new(CircuitBreakerRegistry::new()),
            workspace: WorkspaceContext::new(workspace_root.clone(), vec![]),
            plans_dir,
            workspace_root,
            allowed_external_paths: vec![],
            default_provider: "fake".to_string(),
            project_id: "proj-a".to_string(),
        })
    }

    #[tokio::test]
    async fn executes_task_generates_plan_and_commits() {
        let plans_dir = tempfile::tempdir().unwrap();
        let workspace_root = tempfile::tempdir().unwrap();
        std::process::Command::new("git").args(["init", "-q"]).current_dir(workspace_root.path()).output().unwrap();

        let ctx = ctx(plans_dir.path().to_path_buf(), workspace_root.path().to_path_buf());
        let result = execute_task(ctx, task(), LivenessTracker::new()).await;
        assert!(result.is_ok(), "{result:?}");
        assert!(drake_store::plan_store::load_plan(plans_dir.path(), "T-001").unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_provider_fails_without_touching_the_workspace() {
        let plans_dir = tempfile::tempdir().unwrap();
        let workspace_root = tempfile::tempdir().unwrap();
        let ctx = ctx(plans_dir.path().to_path_buf(), workspace_root.path().to_path_buf());
        let mut t = task();
        t.provider_name = Some("nonexistent".to_string());
        let err = execute_task(ctx, t, LivenessTracker::new()).await.unwrap_err();
        assert!(err.contains("nonexistent"));
    }

    #[tokio::test]
    async fn open_circuit_breaker_short_circuits_before_calling_the_provider() {
        let plans_dir = tempfile::tempdir().unwrap();
        let workspace_root = tempfile::tempdir().unwrap();
        let ctx = ctx(plans_dir.path().to_path_buf(), workspace_root.path().to_path_buf());
        for _ in 0..10 {
            ctx.circuit_breakers.record_failure("fake");
        }
        let err = execute_task(ctx, task(), LivenessTracker::new()).await.unwrap_err();
        assert!(err.contains("circuit open"));
    }
}
