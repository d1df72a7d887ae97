//! Workspace Context: the shared, in-process view of a project's working
//! directory, guarded by a mutex the way `harness::claude_code` guards its
//! process table.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

/// A note left by a worker for any future worker touching the same area,
/// e.g. "ran migrations, schema is now at v7".
#[derive(Debug, Clone)]
pub struct WorkspaceNote {
    pub author_task_id: String,
    pub text: String,
}

struct Inner {
    notes: Vec<WorkspaceNote>,
    recent_commits: Vec<String>,
    allowed_external_paths: Vec<PathBuf>,
}

/// One workspace context per project; cheaply cloneable, all workers for a
/// project share the same instance. No file locks are enforced -- the
/// workspace directory is shared, and avoiding write conflicts between
/// concurrently running tasks is the operator's responsibility (task
/// decomposition, not this component).
#[derive(Clone)]
pub struct WorkspaceContext {
    pub root: PathBuf,
    inner: Arc<Mutex<Inner>>,
}

impl WorkspaceContext {
    pub fn new(root: PathBuf, allowed_external_paths: Vec<PathBuf>) -> Self {
        Self {
            root,
            inner: Arc::new(Mutex::new(Inner {
                notes: Vec::new(),
                recent_commits: Vec::new(),
                allowed_external_paths,
            })),
        }
    }

    pub async fn allowed_external_paths(&self) -> Vec<PathBuf> {
        self.inner.lock().await.allowed_external_paths.clone()
    }

    pub async fn add_note(&self, author_task_id: impl Into<String>, text: impl Into<String>) {
        self.inner.lock().await.notes.push(WorkspaceNote {
            author_task_id: author_task_id.into(),
            text: text.into(),
        });
    }

    pub async fn notes(&self) -> Vec<WorkspaceNote> {
        self.inner.lock().await.notes.clone()
    }

    pub async fn record_commit(&self, sha: impl Into<String>) {
        self.inner.lock().await.recent_commits.push(sha.into());
    }

    pub async fn recent_commits(&self) -> Vec<String> {
        self.inner.lock().await.recent_commits.clone()
    }

    /// A short textual summary handed to the Planner so it can account for
    /// what other tasks have already done in this workspace.
    pub async fn summary(&self) -> String {
        let inner = self.inner.lock().await;
        if inner.notes.is_empty() {
            return "no notes from other tasks yet".to_string();
        }
        inner
            .notes
            .iter()
            .map(|n| format!("- [{}] {}", n.author_task_id, n.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notes_from_concurrent_tasks_accumulate() {
        let ctx = WorkspaceContext::new(PathBuf::from("/work/project"), vec![]);
        ctx.add_note("T-001", "ran migrations").await;
        ctx.add_note("T-002", "added rate limiter").await;
        assert_eq!(ctx.notes().await.len(), 2);
    }

    #[tokio::test]
    async fn summary_lists_every_note() {
        let ctx = WorkspaceContext::new(PathBuf::from("/work/project"), vec![]);
        ctx.add_note("T-001", "ran migrations").await;
        let summary = ctx.summary().await;
        assert!(summary.contains("T-001"));
        assert!(summary.contains("ran migrations"));
    }

    #[tokio::test]
    async fn clone_shares_underlying_state() {
        let ctx = WorkspaceContext::new(PathBuf::from("/work/project"), vec![]);
        let clone = ctx.clone();
        clone.add_note("T-001", "hello").await;
        assert_eq!(ctx.notes().await.len(), 1);
    }
}
