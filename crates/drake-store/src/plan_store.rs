//! Implementation plans: pretty-printed JSON on disk, one file per task, plus
//! a JSONL conversation checkpoint (one message per line) alongside it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::PlanStatus;

#[derive(Debug, Error)]
pub enum PlanStoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse plan at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A single resumable step in an implementation plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanStep {
    pub description: String,
    pub completed: bool,
}

/// A plan produced by the Planner for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub task_id: String,
    pub steps: Vec<PlanStep>,
    pub current_step_index: usize,
    pub status: PlanStatus,
}

impl Plan {
    pub fn new(task_id: impl Into<String>, steps: Vec<String>) -> Self {
        Self {
            task_id: task_id.into(),
            steps: steps
                .into_iter()
                .map(|description| PlanStep {
                    description,
                    completed: false,
                })
                .collect(),
            current_step_index: 0,
            status: PlanStatus::Ready,
        }
    }

    /// `current_step_index` is always the count of completed steps; this
    /// function both records the completion and re-derives the index so the
    /// two can never drift apart.
    pub fn mark_step_complete(&mut self, index: usize) {
        if let Some(step) = self.steps.get_mut(index) {
            step.completed = true;
        }
        self.current_step_index = self.steps.iter().take_while(|s| s.completed).count();
        if self.current_step_index == self.steps.len() {
            self.status = PlanStatus::Completed;
        }
    }

    pub fn next_step(&self) -> Option<&PlanStep> {
        self.steps.get(self.current_step_index)
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_step_index >= self.steps.len()
    }
}

fn plan_path(plans_dir: &Path, task_id: &str) -> PathBuf {
    plans_dir.join(format!("{task_id}.plan.json"))
}

fn checkpoint_path(plans_dir: &Path, task_id: &str) -> PathBuf {
    plans_dir.join(format!("{task_id}.conversation.jsonl"))
}

pub fn save_plan(plans_dir: &Path, plan: &Plan) -> Result<(), PlanStoreError> {
    std::fs::create_dir_all(plans_dir).map_err(|source| PlanStoreError::Io {
        path: plans_dir.to_path_buf(),
        source,
    })?;
    let path = plan_path(plans_dir, &plan.task_id);
    let rendered = serde_json::to_string_pretty(plan).expect("Plan serialization cannot fail");
    std::fs::write(&path, rendered).map_err(|source| PlanStoreError::Io { path, source })
}

pub fn load_plan(plans_dir: &Path, task_id: &str) -> Result<Option<Plan>, PlanStoreError> {
    let path = plan_path(plans_dir, task_id);
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path).map_err(|source| PlanStoreError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| PlanStoreError::Parse { path, source })
}

/// Deletes the persisted plan and its conversation checkpoint. Called once a
/// task reaches a terminal status (`Done` or permanently `Failed`), so a
/// retried task starts its plan fresh rather than resuming stale steps.
pub fn delete_plan(plans_dir: &Path, task_id: &str) -> Result<(), PlanStoreError> {
    for path in [plan_path(plans_dir, task_id), checkpoint_path(plans_dir, task_id)] {
        if path.exists() {
            std::fs::remove_file(&path).map_err(|source| PlanStoreError::Io { path, source })?;
        }
    }
    Ok(())
}

/// One line of the conversation checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
}

pub fn append_conversation_message(
    plans_dir: &Path,
    task_id: &str,
    message: &ConversationMessage,
) -> Result<(), PlanStoreError> {
    std::fs::create_dir_all(plans_dir).map_err(|source| PlanStoreError::Io {
        path: plans_dir.to_path_buf(),
        source,
    })?;
    let path = checkpoint_path(plans_dir, task_id);
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| PlanStoreError::Io {
            path: path.clone(),
            source,
        })?;
    use std::io::Write as _;
    let line = serde_json::to_string(message).expect("ConversationMessage serialization cannot fail");
    writeln!(file, "{line}").map_err(|source| PlanStoreError::Io { path, source })
}

pub fn load_conversation(plans_dir: &Path, task_id: &str) -> Result<Vec<ConversationMessage>, PlanStoreError> {
    let path = checkpoint_path(plans_dir, task_id);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(&path).map_err(|source| PlanStoreError::Io {
        path: path.clone(),
        source,
    })?;
    text.lines()
        .filter(|l| !l.is_empty())
        .map(|l| serde_json::from_str(l).map_err(|source| PlanStoreError::Parse { path: path.clone(), source }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let plan = Plan::new("T-001", vec!["step one".into(), "step two".into()]);
        save_plan(dir.path(), &plan).unwrap();
        let loaded = load_plan(dir.path(), "T-001").unwrap().unwrap();
        assert_eq!(loaded.steps.len(), 2);
        assert_eq!(loaded.status, PlanStatus::Ready);
    }

    #[test]
    fn load_missing_plan_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_plan(dir.path(), "T-999").unwrap().is_none());
    }

    #[test]
    fn current_step_index_tracks_completed_count() {
        let mut plan = Plan::new("T-001", vec!["a".into(), "b".into(), "c".into()]);
        plan.mark_step_complete(0);
        assert_eq!(plan.current_step_index, 1);
        assert_eq!(plan.status, PlanStatus::Ready);
        plan.mark_step_complete(1);
        assert_eq!(plan.current_step_index, 2);
    }

    #[test]
    fn exhausting_all_steps_marks_completed_not_failed() {
        let mut plan = Plan::new("T-001", vec!["a".into(), "b".into()]);
        plan.mark_step_complete(0);
        plan.mark_step_complete(1);
        assert_eq!(plan.status, PlanStatus::Completed);
        assert!(plan.is_exhausted());
    }

    #[test]
    fn exhausting_iteration_budget_mid_plan_leaves_in_progress() {
        // Simulates a worker running out of its iteration budget after
        // completing one of three steps: the plan's status is left
        // untouched by the caller (InProgress), never forced to Failed.
        let mut plan = Plan::new("T-001", vec!["a".into(), "b".into(), "c".into()]);
        plan.status = PlanStatus::InProgress;
        plan.mark_step_complete(0);
        assert_eq!(plan.status, PlanStatus::InProgress);
        assert!(!plan.is_exhausted());
    }

    #[test]
    fn delete_plan_removes_plan_and_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let plan = Plan::new("T-001", vec!["a".into()]);
        save_plan(dir.path(), &plan).unwrap();
        append_conversation_message(
            dir.path(),
            "T-001",
            &ConversationMessage {
                role: "user".into(),
                content: "go".into(),
            },
        )
        .unwrap();
        delete_plan(dir.path(), "T-001").unwrap();
        assert!(load_plan(dir.path(), "T-001").unwrap().is_none());
        assert!(load_conversation(dir.path(), "T-001").unwrap().is_empty());
    }

    #[test]
    fn conversation_appends_are_line_delimited() {
        let dir = tempfile::tempdir().unwrap();
        append_conversation_message(
            dir.path(),
            "T-001",
            &ConversationMessage {
                role: "user".into(),
                content: "first".into(),
            },
        )
        .unwrap();
        append_conversation_message(
            dir.path(),
            "T-001",
            &ConversationMessage {
                role: "assistant".into(),
                content: "second".into(),
            },
        )
        .unwrap();
        let messages = load_conversation(dir.path(), "T-001").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, "assistant");
    }
}
