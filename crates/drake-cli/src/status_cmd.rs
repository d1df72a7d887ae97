//! `drake status`: reports per-status task counts across every task file in
//! the project, mirroring `gator-cli`'s `PlanProgress` summary.

use std::path::Path;

use anyhow::{Context, Result};
use drake_store::task_file::load_all;
use drake_store::TaskStatus;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct TaskProgress {
    pub unassigned: usize,
    pub not_initialized: usize,
    pub working: usize,
    pub done: usize,
    pub failed: usize,
    pub blocked_by_failure: usize,
    pub total: usize,
}

pub fn compute_progress(project_dir: &Path) -> Result<TaskProgress> {
    let files = load_all(project_dir).context("failed to load task files")?;
    let mut progress = TaskProgress::default();
    for file in &files {
        for task in &file.tasks {
            progress.total += 1;
            match task.status {
                TaskStatus::Unassigned => progress.unassigned += 1,
                TaskStatus::NotInitialized => progress.not_initialized += 1,
                TaskStatus::Working => progress.working += 1,
                TaskStatus::Done => progress.done += 1,
                TaskStatus::Failed => progress.failed += 1,
                TaskStatus::BlockedByFailure => progress.blocked_by_failure += 1,
            }
        }
    }
    Ok(progress)
}

pub fn run_status(project_dir: &Path) -> Result<()> {
    let progress = compute_progress(project_dir)?;
    println!(
        "done {}/{} | working {} | unassigned {} | blocked {} | failed {}",
        progress.done, progress.total, progress.working, progress.unassigned, progress.blocked_by_failure, progress.failed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_progress_counts_every_status() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tasks")).unwrap();
        std::fs::write(
            dir.path().join("tasks/backend-tasks.md"),
            "- [ ] T-1: a\n  - status: done\n\n- [ ] T-2: b\n  - status: working\n",
        )
        .unwrap();
        let progress = compute_progress(dir.path()).unwrap();
        assert_eq!(progress.total, 2);
        assert_eq!(progress.done, 1);
        assert_eq!(progress.working, 1);
    }
}
