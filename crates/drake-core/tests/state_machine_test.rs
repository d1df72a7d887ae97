use drake_core::state::{check_dependencies, dispatch, TaskStateMachine};
use drake_store::{Priority, TaskRecord, TaskStatus};

fn task(id: &str, status: TaskStatus, deps: Vec<String>) -> TaskRecord {
    TaskRecord {
        id: id.to_string(),
        description: "demo".to_string(),
        priority: Priority::Normal,
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

#[test]
fn two_task_chain_dependency_unblocks_after_completion() {
    let mut tasks = vec![
        task("T-001", TaskStatus::Working, vec![]),
        task("T-002", TaskStatus::Unassigned, vec!["T-001".to_string()]),
    ];

    assert!(check_dependencies("T-002", &tasks[1].dependencies.clone(), &tasks).is_err());

    tasks[0].status = TaskStatus::Done;
    assert!(check_dependencies("T-002", &tasks[1].dependencies.clone(), &tasks).is_ok());
}

#[test]
fn failed_task_blocks_dependents_until_retried() {
    let mut tasks = vec![
        task("T-001", TaskStatus::Failed, vec![]),
        task("T-002", TaskStatus::Unassigned, vec!["T-001".to_string()]),
    ];
    assert!(check_dependencies("T-002", &tasks[1].dependencies.clone(), &tasks).is_err());

    let retried = dispatch::retry("T-001").unwrap();
    tasks[0].status = retried;
    tasks[0].status = TaskStatus::Working;
    tasks[0].status = TaskStatus::Done;
    assert!(check_dependencies("T-002", &tasks[1].dependencies.clone(), &tasks).is_ok());
}

#[test]
fn invalid_transition_is_rejected() {
    assert!(!TaskStateMachine::is_valid_transition(TaskStatus::Done, TaskStatus::Failed));
}
