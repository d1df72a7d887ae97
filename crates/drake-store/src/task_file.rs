//! Task-list markdown file: parsing, serialization, and the queries the
//! supervisor runs against it (ready tasks, orphan recovery, dependency
//! satisfaction).
//!
//! File shape, one task per bullet:
//!
//! ```text
//! - [ ] T-042: Add rate limiting to the ingest endpoint
//!   - priority: high
//!   - status: unassigned
//!   - agent: generic-coding
//!   - depends on: T-040, T-041
//! ```
//!
//! A checked box (`[x]`) is a display convenience only; `status:` is
//! authoritative. Dependencies are read from a structured `depends on:` line
//! first; if absent, a trailing `(depends on: ...)` marker inside the title
//! text is used as a fallback (see DESIGN.md for the Open Question this
//! resolves).

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::{AgentType, PlanStatus, Priority, TaskRecord, TaskStatus};

#[derive(Debug, Error)]
pub enum TaskFileError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("duplicate task id {0:?} in task file")]
    DuplicateTaskId(String),
    #[error("task {task:?} depends on unknown task {dependency:?}")]
    UnknownDependency { task: String, dependency: String },
    #[error("dependency cycle detected involving: {0}")]
    CycleDetected(String),
}

/// One `<area>-tasks.md` file's worth of task records, in file order.
#[derive(Debug, Clone, Default)]
pub struct TaskFile {
    pub path: PathBuf,
    pub tasks: Vec<TaskRecord>,
}

impl TaskFile {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, TaskFileError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|source| TaskFileError::Io {
            path: path.clone(),
            source,
        })?;
        let tasks = parse_tasks(&text)?;
        validate_dependencies(&tasks)?;
        Ok(Self { path, tasks })
    }

    pub fn save(&self) -> Result<(), TaskFileError> {
        let rendered = render_tasks(&self.tasks);
        std::fs::write(&self.path, rendered).map_err(|source| TaskFileError::Io {
            path: self.path.clone(),
            source,
        })
    }

    pub fn find_mut(&mut self, task_id: &str) -> Option<&mut TaskRecord> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    pub fn find(&self, task_id: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.id == task_id)
    }
}

/// Enumerates every `*-tasks.md` file under `<project-root>/tasks/`.
pub fn list_task_files(project_dir: &Path) -> Result<Vec<PathBuf>, TaskFileError> {
    let tasks_dir = project_dir.join("tasks");
    if !tasks_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    let entries = std::fs::read_dir(&tasks_dir).map_err(|source| TaskFileError::Io {
        path: tasks_dir.clone(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| TaskFileError::Io {
            path: tasks_dir.clone(),
            source,
        })?;
        let p = entry.path();
        if p.extension().and_then(|e| e.to_str()) == Some("md")
            && p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with("-tasks.md"))
        {
            out.push(p);
        }
    }
    out.sort();
    Ok(out)
}

/// Loads every task file under the project and returns them alongside a flat
/// view of all tasks, for cross-area dependency lookups.
pub fn load_all(project_dir: &Path) -> Result<Vec<TaskFile>, TaskFileError> {
    list_task_files(project_dir)?
        .into_iter()
        .map(TaskFile::load)
        .collect()
}

/// Returns the subset of `all_tasks` that are ready to run: status is
/// `Unassigned` or `BlockedByFailure`, and every dependency (looked up across
/// all areas) is `Done`.
pub fn get_ready_tasks<'a>(all_tasks: &'a [TaskRecord]) -> Vec<&'a TaskRecord> {
    all_tasks
        .iter()
        .filter(|t| t.is_candidate_for_ready())
        .filter(|t| deps_satisfied(t, all_tasks))
        .collect()
}

fn deps_satisfied(task: &TaskRecord, all_tasks: &[TaskRecord]) -> bool {
    task.dependencies.iter().all(|dep_id| {
        all_tasks
            .iter()
            .find(|t| &t.id == dep_id)
            .is_some_and(|t| t.status == TaskStatus::Done)
    })
}

/// A task left in `NotInitialized` or `Working` whose id is not in the live
/// worker map is orphaned -- its worker no longer exists (crash, restart, or
/// a tick that reconciled the in-memory map against a dead process). Run
/// every tick, not just at startup, since a worker can die at any point.
///
/// If the task's stored plan is `Completed`, the work actually finished and
/// only the status sync was lost: mark it `Done`. Otherwise reset it to
/// `Unassigned` as a retry candidate, clearing any stale error so the next
/// ready-task sort doesn't treat it as previously failed.
///
/// Returns the ids that were reset, in iteration order.
pub fn reset_orphaned_tasks(tasks: &mut [TaskRecord], live_task_ids: &[String], plans_dir: &Path) -> Vec<String> {
    let mut reset = Vec::new();
    for t in tasks.iter_mut() {
        let orphaned = matches!(t.status, TaskStatus::NotInitialized | TaskStatus::Working) && !live_task_ids.contains(&t.id);
        if !orphaned {
            continue;
        }
        let plan_completed = crate::plan_store::load_plan(plans_dir, &t.id)
            .ok()
            .flatten()
            .is_some_and(|plan| plan.status == PlanStatus::Completed);
        if plan_completed {
            t.status = TaskStatus::Done;
        } else {
            t.status = TaskStatus::Unassigned;
            t.error_message = None;
        }
        reset.push(t.id.clone());
    }
    reset
}

fn validate_dependencies(tasks: &[TaskRecord]) -> Result<(), TaskFileError> {
    let mut seen = std::collections::HashSet::new();
    for t in tasks {
        if !seen.insert(t.id.clone()) {
            return Err(TaskFileError::DuplicateTaskId(t.id.clone()));
        }
    }
    for t in tasks {
        for dep in &t.dependencies {
            if !tasks.iter().any(|other| &other.id == dep) {
                return Err(TaskFileError::UnknownDependency {
                    task: t.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    check_for_cycles(tasks)
}

/// Kahn's algorithm: repeatedly remove tasks with no unresolved dependencies
/// and count them off; any left over at the end are on or depend on a cycle.
fn check_for_cycles(tasks: &[TaskRecord]) -> Result<(), TaskFileError> {
    use std::collections::HashMap;

    let mut in_degree: HashMap<&str, usize> = tasks.iter().map(|t| (t.id.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for t in tasks {
        for dep in &t.dependencies {
            *in_degree.get_mut(t.id.as_str()).unwrap() += 1;
            dependents.entry(dep.as_str()).or_default().push(t.id.as_str());
        }
    }

    let mut queue: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(id, _)| *id)
        .collect();
    queue.sort_unstable();

    let mut resolved = 0usize;
    let mut i = 0;
    while i < queue.len() {
        let id = queue[i];
        i += 1;
        resolved += 1;
        if let Some(next) = dependents.get(id) {
            let mut newly_zero = Vec::new();
            for &n in next {
                let e = in_degree.get_mut(n).unwrap();
                *e -= 1;
                if *e == 0 {
                    newly_zero.push(n);
                }
            }
            newly_zero.sort_unstable();
            queue.extend(newly_zero);
        }
    }

    if resolved == tasks.len() {
        Ok(())
    } else {
        let mut stuck: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg > 0)
            .map(|(id, _)| *id)
            .collect();
        stuck.sort_unstable();
        Err(TaskFileError::CycleDetected(stuck.join(", ")))
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn parse_tasks(text: &str) -> Result<Vec<TaskRecord>, TaskFileError> {
    let mut tasks = Vec::new();
    let mut current: Option<TaskRecord> = None;

    for raw_line in text.lines() {
        if let Some(rest) = raw_line.trim_start().strip_prefix("- [") {
            if let Some(task) = current.take() {
                tasks.push(finalize(task));
            }
            let (id, description) = parse_bullet(rest);
            current = Some(TaskRecord {
                id,
                description,
                priority: Priority::default(),
                status: TaskStatus::Unassigned,
                assigned_agent_type: None,
                project_id: String::new(),
                dependencies: Vec::new(),
                commit_sha: None,
                output_files: Vec::new(),
                provider_name: None,
                error_message: None,
            });
            continue;
        }

        let trimmed = raw_line.trim_start();
        let Some(meta) = trimmed.strip_prefix("- ") else {
            continue;
        };
        let Some(task) = current.as_mut() else {
            continue;
        };
        apply_metadata(task, meta);
    }

    if let Some(task) = current.take() {
        tasks.push(finalize(task));
    }

    Ok(tasks)
}

fn parse_bullet(rest: &str) -> (String, String) {
    // rest looks like "x] T-042: Add rate limiting..." or " ] T-042: ..."
    let after_bracket = rest.splitn(2, ']').nth(1).unwrap_or("").trim_start();
    match after_bracket.split_once(':') {
        Some((id, desc)) => (id.trim().to_string(), desc.trim().to_string()),
        None => (String::new(), after_bracket.trim().to_string()),
    }
}

fn apply_metadata(task: &mut TaskRecord, meta: &str) {
    let Some((key, value)) = meta.split_once(':') else {
        return;
    };
    let key = key.trim().to_ascii_lowercase();
    let value = value.trim();
    match key.as_str() {
        "priority" => task.priority = value.parse().unwrap_or_default(),
        "status" => task.status = TaskStatus::from_token_or_unassigned(value),
        "agent" | "agent_type" | "agent-type" => task.assigned_agent_type = value.parse::<AgentType>().ok(),
        "project" | "project_id" => task.project_id = value.to_string(),
        "depends on" | "depends_on" | "dependencies" => {
            task.dependencies = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "commit" => task.commit_sha = Some(value.to_string()),
        "files" => {
            task.output_files = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "provider" => task.provider_name = Some(value.to_string()),
        "error" => task.error_message = Some(value.to_string()),
        _ => {}
    }
}

/// Handles the `(depends on: ...)` inline fallback when no structured
/// `depends on:` metadata line was present.
fn finalize(mut task: TaskRecord) -> TaskRecord {
    if task.dependencies.is_empty() {
        if let Some(start) = task.description.find("(depends on:") {
            if let Some(end_rel) = task.description[start..].find(')') {
                let inner = &task.description[start + "(depends on:".len()..start + end_rel];
                task.dependencies = inner
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                let mut desc = task.description.clone();
                desc.replace_range(start..start + end_rel + 1, "");
                task.description = desc.trim().to_string();
            }
        }
    }
    task
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render_tasks(tasks: &[TaskRecord]) -> String {
    let mut out = String::new();
    for t in tasks {
        let checked = if t.status == TaskStatus::Done { "x" } else { " " };
        let _ = writeln!(out, "- [{}] {}: {}", checked, t.id, t.description);
        let _ = writeln!(out, "  - priority: {}", t.priority);
        let _ = writeln!(out, "  - status: {}", t.status);
        if let Some(agent) = t.assigned_agent_type {
            let _ = writeln!(out, "  - agent: {agent}");
        }
        if !t.dependencies.is_empty() {
            let _ = writeln!(out, "  - depends on: {}", t.dependencies.join(", "));
        }
        if let Some(provider) = &t.provider_name {
            let _ = writeln!(out, "  - provider: {provider}");
        }
        if let Some(commit) = &t.commit_sha {
            let _ = writeln!(out, "  - commit: {commit}");
        }
        if !t.output_files.is_empty() {
            let _ = writeln!(out, "  - files: {}", t.output_files.join(", "));
        }
        if let Some(err) = &t.error_message {
            let _ = writeln!(out, "  - error: {err}");
        }
    }
    out
}
