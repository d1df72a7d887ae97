//! Planner: asks the Provider Client for a resumable step list for one task,
//! forcing the `create_implementation_plan` tool so the response is always
//! structured.

pub mod validate;

use drake_store::plan_store::Plan;
use drake_store::TaskRecord;

use crate::provider::{CompletionRequest, ContentBlock, Message, Provider, ProviderError, ToolSpec};
use validate::{validate_steps, PlanValidationError};

#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Validation(#[from] PlanValidationError),
    #[error("planner response did not include a create_implementation_plan tool call")]
    NoToolCall,
    #[error("plan tool call input was malformed: {0}")]
    MalformedInput(String),
}

const FORCED_TOOL_NAME: &str = "create_implementation_plan";

fn plan_tool_spec() -> ToolSpec {
    ToolSpec {
        name: FORCED_TOOL_NAME.to_string(),
        description: "Propose an ordered list of concrete implementation steps for this task".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "steps": {
                    "type": "array",
                    "items": { "type": "string" },
                },
            },
            "required": ["steps"],
        }),
    }
}

fn system_prompt(task: &TaskRecord, workspace_summary: &str) -> String {
    format!(
        "You are planning the implementation of a single task. \
         Break it into a short, ordered list of concrete, independently resumable steps. \
         Task: {}\n\nWorkspace context:\n{workspace_summary}",
        task.description
    )
}

/// Requests a plan from `provider` for `task`, validates the returned step
/// list, and returns a fresh [`Plan`] with no steps yet completed.
pub async fn generate_plan(
    provider: &dyn Provider,
    task: &TaskRecord,
    workspace_summary: &str,
) -> Result<Plan, PlannerError> {
    let request = CompletionRequest {
        system_prompt: system_prompt(task, workspace_summary),
        messages: vec![Message {
            role: "user".to_string(),
            content: format!("Plan task {}: {}", task.id, task.description),
        }],
        tools: vec![plan_tool_spec()],
        forced_tool: Some(FORCED_TOOL_NAME.to_string()),
    };

    let response = provider.complete(&request).await?;

    let steps = response
        .blocks
        .iter()
        .find_map(|block| match block {
            ContentBlock::ToolUse { name, input, .. } if name == FORCED_TOOL_NAME => {
                input.get("steps").and_then(|v| v.as_array()).map(|arr| {
                    arr.iter()
                        .filter_map(|s| s.as_str().map(str::to_string))
                        .collect::<Vec<_>>()
                })
            }
            _ => None,
        })
        .ok_or(PlannerError::NoToolCall)?;

    validate_steps(&steps)?;

    Ok(Plan::new(task.id.clone(), steps))
}
