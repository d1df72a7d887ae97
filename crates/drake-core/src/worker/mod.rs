//! Worker (Kobold): a disposable, single-threaded agent that executes one
//! task's plan step by step, dispatching tool calls and feeding results back
//! to the provider until the step is judged complete or the iteration budget
//! runs out.

pub mod sandbox;
pub mod tools;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use drake_store::plan_store::{ConversationMessage, Plan};
use tokio::sync::Mutex;

use crate::provider::{CompletionRequest, ContentBlock, Message, Provider, ProviderError, ToolSpec};
use tools::{dispatch, parse_tool_call, ToolContext, ToolError};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("worker exceeded its iteration budget without the provider signalling completion")]
    IterationBudgetExhausted,
}

/// Per-step iteration cap: how many provider round trips a single step may
/// take before the worker gives up and leaves the plan `InProgress` for a
/// later resumption.
pub const MAX_ITERATIONS_PER_STEP: u32 = 10;

/// Tracks the last time a provider response was observed, so the supervisor's
/// watchdog can distinguish a long-but-healthy tool loop from a stuck worker.
/// Deliberately keyed on the *last response*, not the worker's start time.
#[derive(Clone)]
pub struct LivenessTracker {
    inner: Arc<Mutex<Option<chrono::DateTime<Utc>>>>,
}

impl LivenessTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn touch(&self) {
        *self.inner.lock().await = Some(Utc::now());
    }

    pub async fn last_model_response_at(&self) -> Option<chrono::DateTime<Utc>> {
        *self.inner.lock().await
    }
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Determines whether a worker should be killed by the watchdog: if any
/// response has ever been observed, staleness is measured from that point;
/// otherwise it's measured from `started_at`, since a worker that has never
/// responded has no better reference point.
pub fn is_stuck(
    started_at: chrono::DateTime<Utc>,
    last_model_response_at: Option<chrono::DateTime<Utc>>,
    now: chrono::DateTime<Utc>,
    timeout: Duration,
) -> bool {
    let reference = last_model_response_at.unwrap_or(started_at);
    now.signed_duration_since(reference)
        .to_std()
        .map(|elapsed| elapsed >= timeout)
        .unwrap_or(false)
}

fn tool_specs() -> Vec<ToolSpec> {
    let simple = |name: &str, description: &str, props: serde_json::Value| ToolSpec {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: serde_json::json!({ "type": "object", "properties": props }),
    };
    vec![
        simple("read_file", "Read a file's contents", serde_json::json!({"path": {"type": "string"}})),
        simple(
            "write_file",
            "Write (overwriting) a file's contents",
            serde_json::json!({"path": {"type": "string"}, "content": {"type": "string"}}),
        ),
        simple(
            "append_file",
            "Append to a file's contents",
            serde_json::json!({"path": {"type": "string"}, "content": {"type": "string"}}),
        ),
        simple(
            "edit_file",
            "Replace one exact occurrence of old_text with new_text",
            serde_json::json!({
                "path": {"type": "string"},
                "old_text": {"type": "string"},
                "new_text": {"type": "string"},
            }),
        ),
        simple("search_code", "Search the workspace for a pattern", serde_json::json!({"pattern": {"type": "string"}})),
        simple(
            "run_command",
            "Run a shell command in the workspace",
            serde_json::json!({"command": {"type": "string"}, "args": {"type": "array", "items": {"type": "string"}}}),
        ),
        simple("ask_user", "Ask the human operator a question", serde_json::json!({"question": {"type": "string"}})),
        simple("display_text", "Display text to the human operator", serde_json::json!({"text": {"type": "string"}})),
    ]
}

/// Result of running one plan step to completion (or exhaustion).
pub enum StepOutcome {
    Completed,
    BudgetExhausted,
}

/// Drives the provider/tool loop for a single plan step, appending every
/// exchange to the conversation checkpoint as it goes so a crash mid-step
/// loses at most the in-flight round trip.
pub async fn run_step(
    provider: &dyn Provider,
    ctx: &ToolContext,
    system_prompt: &str,
    step_description: &str,
    conversation: &mut Vec<ConversationMessage>,
    plans_dir: &std::path::Path,
    task_id: &str,
    liveness: &LivenessTracker,
) -> Result<StepOutcome, WorkerError> {
    conversation.push(ConversationMessage {
        role: "user".to_string(),
        content: step_description.to_string(),
    });
    drake_store::plan_store::append_conversation_message(
        plans_dir,
        task_id,
        conversation.last().expect("just pushed"),
    )
    .ok();

    for _ in 0..MAX_ITERATIONS_PER_STEP {
        let request = CompletionRequest {
            system_prompt: system_prompt.to_string(),
            messages: conversation
                .iter()
                .map(|m| Message {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            tools: tool_specs(),
            forced_tool: None,
        };

        let response = provider.complete(&request).await?;
        liveness.touch().await;

        let mut tool_used = false;
        let mut assistant_text = String::new();

        for block in &response.blocks {
            match block {
                ContentBlock::Text(text) => {
                    assistant_text.push_str(text);
                }
                ContentBlock::ToolUse { name, input, .. } => {
                    tool_used = true;
                    let input_map: HashMap<String, serde_json::Value> = input.clone();
                    let result = match parse_tool_call(name, &input_map) {
                        Ok(call) => dispatch(ctx, call).await.unwrap_or_else(|e| format!("error: {e}")),
                        Err(e) => format!("error: {e}"),
                    };
                    let tool_message = ConversationMessage {
                        role: "tool".to_string(),
                        content: format!("[{name}] {result}"),
                    };
                    conversation.push(tool_message.clone());
                    drake_store::plan_store::append_conversation_message(plans_dir, task_id, &tool_message).ok();
                }
            }
        }

        if !assistant_text.is_empty() {
            let message = ConversationMessage {
                role: "assistant".to_string(),
                content: assistant_text,
            };
            conversation.push(message.clone());
            drake_store::plan_store::append_conversation_message(plans_dir, task_id, &message).ok();
        }

        if !tool_used && response.stop_reason == "end_turn" {
            return Ok(StepOutcome::Completed);
        }
    }

    Ok(StepOutcome::BudgetExhausted)
}

/// Runs every remaining step of `plan`, stopping at the first exhausted step
/// and leaving the plan's `current_step_index` wherever it got to -- the
/// plan is never forced to a failed status just because the iteration
/// budget ran out mid-step.
pub async fn run_plan(
    provider: &dyn Provider,
    ctx: &ToolContext,
    system_prompt: &str,
    plan: &mut Plan,
    plans_dir: &std::path::Path,
    liveness: &LivenessTracker,
) -> Result<(), WorkerError> {
    let mut conversation = drake_store::plan_store::load_conversation(plans_dir, &plan.task_id).unwrap_or_default();

    while !plan.is_exhausted() {
        let step_index = plan.current_step_index;
        let description = plan.steps[step_index].description.clone();

        let outcome = run_step(
            provider,
            ctx,
            system_prompt,
            &description,
            &mut conversation,
            plans_dir,
            &plan.task_id,
            liveness,
        )
        .await?;

        match outcome {
            StepOutcome::Completed => {
                plan.mark_step_complete(step_index);
                drake_store::plan_store::save_plan(plans_dir, plan).ok();
            }
            StepOutcome::BudgetExhausted => {
                return Err(WorkerError::IterationBudgetExhausted);
            }
        }
    }

    Ok(())
}

pub fn tool_context(workspace_root: PathBuf, allowed_external_paths: Vec<PathBuf>) -> ToolContext {
    ToolContext {
        workspace_root,
        allowed_external_paths,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stuck_detection_uses_last_response_when_present() {
        let started_at = Utc::now() - chrono::Duration::hours(2);
        let last_response = Utc::now() - chrono::Duration::seconds(5);
        let stuck = is_stuck(started_at, Some(last_response), Utc::now(), Duration::from_secs(60));
        assert!(!stuck, "a recent response should not be flagged as stuck");
    }

    #[test]
    fn stuck_detection_falls_back_to_started_at_before_first_response() {
        let started_at = Utc::now() - chrono::Duration::seconds(120);
        let stuck = is_stuck(started_at, None, Utc::now(), Duration::from_secs(60));
        assert!(stuck);
    }

    #[test]
    fn not_stuck_within_timeout_before_first_response() {
        let started_at = Utc::now() - chrono::Duration::seconds(5);
        let stuck = is_stuck(started_at, None, Utc::now(), Duration::from_secs(60));
        assert!(!stuck);
    }

    #[tokio::test]
    async fn liveness_tracker_records_touch() {
        let tracker = LivenessTracker::new();
        assert!(tracker.last_model_response_at().await.is_none());
        tracker.touch().await;
        assert!(tracker.last_model_response_at().await.is_some());
    }
}
