//! Task state machine: which transitions are legal, and helpers mirroring
//! the named dispatch functions `gator-core` groups under `state::dispatch`.

use drake_store::TaskStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error("task {task_id} has unmet dependencies: {unmet:?}")]
    UnmetDependencies { task_id: String, unmet: Vec<String> },
}

/// Validates and names legal transitions through a task's lifecycle:
/// `Unassigned -> Working -> Done`, with `Failed` reachable from `Working`
/// and `BlockedByFailure` reachable from `Failed` once retried, or set
/// directly by orphan recovery.
pub struct TaskStateMachine;

impl TaskStateMachine {
    pub fn is_valid_transition(from: TaskStatus, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (from, to),
            (Unassigned, NotInitialized)
                | (Unassigned, Working)
                | (NotInitialized, Working)
                | (Working, Done)
                | (Working, Failed)
                | (Working, BlockedByFailure)
                | (Failed, Unassigned)
                | (Failed, BlockedByFailure)
                | (BlockedByFailure, Unassigned)
                | (BlockedByFailure, Working)
        )
    }

    pub fn transition(task_id: &str, from: TaskStatus, to: TaskStatus) -> Result<TaskStatus, StateError> {
        if !Self::is_valid_transition(from, to) {
            return Err(StateError::InvalidTransition {
                task_id: task_id.to_string(),
                from,
                to,
            });
        }
        Ok(to)
    }
}

pub mod dispatch {
    //! Semantic wrappers over [`TaskStateMachine::transition`], named for the
    //! lifecycle event they represent rather than the raw status pair.

    use super::*;

    pub fn assign(task_id: &str) -> Result<TaskStatus, StateError> {
        TaskStateMachine::transition(task_id, TaskStatus::Unassigned, TaskStatus::NotInitialized)
    }

    pub fn start(task_id: &str, from: TaskStatus) -> Result<TaskStatus, StateError> {
        TaskStateMachine::transition(task_id, from, TaskStatus::Working)
    }

    pub fn complete(task_id: &str) -> Result<TaskStatus, StateError> {
        TaskStateMachine::transition(task_id, TaskStatus::Working, TaskStatus::Done)
    }

    pub fn fail(task_id: &str) -> Result<TaskStatus, StateError> {
        TaskStateMachine::transition(task_id, TaskStatus::Working, TaskStatus::Failed)
    }

    pub fn block(task_id: &str) -> Result<TaskStatus, StateError> {
        TaskStateMachine::transition(task_id, TaskStatus::Working, TaskStatus::BlockedByFailure)
    }

    pub fn retry(task_id: &str) -> Result<TaskStatus, StateError> {
        TaskStateMachine::transition(task_id, TaskStatus::Failed, TaskStatus::Unassigned)
    }

    pub fn escalate(task_id: &str) -> Result<TaskStatus, StateError> {
        TaskStateMachine::transition(task_id, TaskStatus::Failed, TaskStatus::BlockedByFailure)
    }
}

/// Checks every dependency in `dependencies` is `Done` in `all_tasks`;
/// returns the unmet subset on failure.
pub fn check_dependencies<'a>(
    task_id: &str,
    dependencies: &[String],
    all_tasks: &'a [drake_store::TaskRecord],
) -> Result<(), StateError> {
    let unmet: Vec<String> = dependencies
        .iter()
        .filter(|dep_id| {
            !all_tasks
                .iter()
                .any(|t| &t.id == dep_id && t.status == TaskStatus::Done)
        })
        .cloned()
        .collect();
    if unmet.is_empty() {
        Ok(())
    } else {
        Err(StateError::UnmetDependencies {
            task_id: task_id.to_string(),
            unmet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unassigned_to_working_is_valid() {
        assert!(TaskStateMachine::is_valid_transition(
            TaskStatus::Unassigned,
            TaskStatus::Working
        ));
    }

    #[test]
    fn done_to_working_is_invalid() {
        assert!(!TaskStateMachine::is_valid_transition(
            TaskStatus::Done,
            TaskStatus::Working
        ));
    }

    #[test]
    fn working_can_fail_or_block_or_complete() {
        assert!(TaskStateMachine::is_valid_transition(TaskStatus::Working, TaskStatus::Done));
        assert!(TaskStateMachine::is_valid_transition(TaskStatus::Working, TaskStatus::Failed));
        assert!(TaskStateMachine::is_valid_transition(
            TaskStatus::Working,
            TaskStatus::BlockedByFailure
        ));
    }

    #[test]
    fn dispatch_helpers_match_named_transitions() {
        assert_eq!(dispatch::assign("T-1").unwrap(), TaskStatus::NotInitialized);
        assert_eq!(dispatch::complete("T-1").unwrap(), TaskStatus::Done);
        assert!(dispatch::complete("T-1").is_ok());
    }

    #[test]
    fn check_dependencies_reports_unmet() {
        let all = vec![drake_store::TaskRecord {
            id: "T-1".into(),
            description: "x".into(),
            priority: drake_store::Priority::Normal,
            status: TaskStatus::Working,
            assigned_agent_type: None,
            project_id: String::new(),
            dependencies: vec![],
            commit_sha: None,
            output_files: vec![],
            provider_name: None,
            error_message: None,
        }];
        let err = check_dependencies("T-2", &["T-1".to_string()], &all).unwrap_err();
        assert!(matches!(err, StateError::UnmetDependencies { .. }));
    }
}
