//! Version control adapter: git invoked as a subprocess, mirroring
//! `gator-core::lifecycle::commit_agent_work` rather than a git library.

use std::fmt::Write as _;
use std::path::Path;
use std::process::Command;

use drake_store::{AgentType, TaskRecord};

#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("git command failed: {0}")]
    CommandFailed(String),
    #[error("io error running git: {0}")]
    Io(#[from] std::io::Error),
}

const SUBJECT_MAX_CHARS: usize = 60;

/// Stages every change in `workspace_root` and commits it with a
/// conventional-commit message naming the task, its agent type, priority and
/// dependencies. Returns the new commit sha, or `None` if there was nothing
/// to commit (the task's step didn't touch the working tree).
pub fn commit_task_work(workspace_root: &Path, task: &TaskRecord, project_id: &str) -> Result<Option<String>, VcsError> {
    run(workspace_root, &["config", "user.email", "drake@localhost"])?;
    run(workspace_root, &["config", "user.name", "drake"])?;
    run(workspace_root, &["add", "-A"])?;

    let status = run(workspace_root, &["status", "--porcelain"])?;
    if status.trim().is_empty() {
        return Ok(None);
    }

    let message = commit_message(task, project_id);
    run(workspace_root, &["commit", "-q", "-m", &message])?;
    let sha = run(workspace_root, &["rev-parse", "HEAD"])?;
    Ok(Some(sha.trim().to_string()))
}

/// Renders the conventional-commit subject/body/trailers for a task's work.
/// `Feature` is omitted: no field on `TaskRecord` tracks it yet.
fn commit_message(task: &TaskRecord, project_id: &str) -> String {
    let agent = task.assigned_agent_type.unwrap_or(AgentType::GenericCoding);
    let subject: String = task.description.chars().take(SUBJECT_MAX_CHARS).collect();

    let mut message = format!("feat({}): {subject}\n\n{}\n\n", agent.as_str(), task.description);
    let _ = writeln!(message, "Task-Id: {}", task.id);
    let _ = writeln!(message, "Agent-Type: {}", agent.as_str());
    let _ = writeln!(message, "Priority: {}", task.priority);
    if !task.dependencies.is_empty() {
        let _ = writeln!(message, "Depends-On: {}", task.dependencies.join(", "));
    }
    let _ = write!(message, "Project: {project_id}");
    message
}

fn run(workspace_root: &Path, args: &[&str]) -> Result<String, VcsError> {
    let output = Command::new("git").args(args).current_dir(workspace_root).output()?;
    if !output.status.success() {
        return Err(VcsError::CommandFailed(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
