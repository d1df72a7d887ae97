//! Test fixtures: throwaway project directories with a populated `tasks/`
//! folder, for exercising the task store and supervisor without touching a
//! real project.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary project directory, torn down when dropped.
pub struct ProjectFixture {
    dir: TempDir,
}

impl ProjectFixture {
    /// Creates an empty project with a `tasks/` directory.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp project dir");
        std::fs::create_dir_all(dir.path().join("tasks")).expect("failed to create tasks dir");
        std::fs::create_dir_all(dir.path().join("plans")).expect("failed to create plans dir");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.dir.path().join("tasks")
    }

    pub fn plans_dir(&self) -> PathBuf {
        self.dir.path().join("plans")
    }

    pub fn wal_path(&self) -> PathBuf {
        self.dir.path().join("drake.wal")
    }

    /// Writes a `<area>-tasks.md` file with the given raw contents and
    /// returns its path.
    pub fn write_task_file(&self, area: &str, contents: &str) -> PathBuf {
        let path = self.tasks_dir().join(format!("{area}-tasks.md"));
        std::fs::write(&path, contents).expect("failed to write task file");
        path
    }

    /// Initializes a real git repository in the project root, used by tests
    /// of the commit-on-completion adapter.
    pub fn init_git_repo(&self) {
        let root = self.dir.path();
        let run = |args: &[&str]| {
            std::process::Command::new("git")
                .args(args)
                .current_dir(root)
                .output()
                .expect("failed to run git")
        };
        run(&["init", "-q"]);
        run(&["config", "user.email", "drake-test@example.com"]);
        run(&["config", "user.name", "drake-test"]);
        std::fs::write(root.join("README.md"), "fixture\n").expect("failed to write README");
        run(&["add", "-A"]);
        run(&["commit", "-q", "-m", "initial commit"]);
    }
}

impl Default for ProjectFixture {
    fn default() -> Self {
        Self::new()
    }
}
