//! Core enums and record types shared by the task file, WAL, and plan store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Status of a task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Unassigned,
    NotInitialized,
    Working,
    Done,
    Failed,
    BlockedByFailure,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unassigned => "unassigned",
            Self::NotInitialized => "not_initialized",
            Self::Working => "working",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::BlockedByFailure => "blocked_by_failure",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    /// Parses case-insensitively. Unknown tokens are not an error here --
    /// callers that must tolerate free-form text (the task-file parser)
    /// should use [`TaskStatus::from_token_or_unassigned`] instead.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "unassigned" => Ok(Self::Unassigned),
            "not_initialized" | "notinitialized" => Ok(Self::NotInitialized),
            "working" | "in_progress" => Ok(Self::Working),
            "done" | "completed" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            "blocked_by_failure" | "blocked" => Ok(Self::BlockedByFailure),
            other => Err(TaskStatusParseError(other.to_owned())),
        }
    }
}

impl TaskStatus {
    /// Parse a status token, falling back to [`TaskStatus::Unassigned`] for
    /// anything unrecognised. This is the tolerant parsing rule the task-file
    /// format requires: an operator hand-editing the file should never
    /// produce an unparseable task.
    pub fn from_token_or_unassigned(token: &str) -> Self {
        token.parse().unwrap_or(Self::Unassigned)
    }
}

#[derive(Debug, Clone)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {:?}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Task priority, ordered `Critical > High > Normal > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        };
        f.write_str(s)
    }
}

impl FromStr for Priority {
    type Err = PriorityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "normal" | "medium" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            other => Err(PriorityParseError(other.to_owned())),
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

#[derive(Debug, Clone)]
pub struct PriorityParseError(pub String);

impl fmt::Display for PriorityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid priority: {:?}", self.0)
    }
}

impl std::error::Error for PriorityParseError {}

// ---------------------------------------------------------------------------
// AgentType
// ---------------------------------------------------------------------------

/// Closed set of worker specialisations a task can be assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentType {
    GenericCoding,
    Csharp,
    Cpp,
    Assembler,
    Javascript,
    Typescript,
    Css,
    Html,
    React,
    Angular,
    Php,
    Python,
    Diagramming,
    Media,
    Image,
    Svg,
    Bitmap,
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenericCoding => "generic-coding",
            Self::Csharp => "csharp",
            Self::Cpp => "cpp",
            Self::Assembler => "assembler",
            Self::Javascript => "javascript",
            Self::Typescript => "typescript",
            Self::Css => "css",
            Self::Html => "html",
            Self::React => "react",
            Self::Angular => "angular",
            Self::Php => "php",
            Self::Python => "python",
            Self::Diagramming => "diagramming",
            Self::Media => "media",
            Self::Image => "image",
            Self::Svg => "svg",
            Self::Bitmap => "bitmap",
        }
    }
}

impl FromStr for AgentType {
    type Err = AgentTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generic-coding" | "generic_coding" | "generic" => Ok(Self::GenericCoding),
            "csharp" | "c#" => Ok(Self::Csharp),
            "cpp" | "c++" => Ok(Self::Cpp),
            "assembler" | "asm" => Ok(Self::Assembler),
            "javascript" | "js" => Ok(Self::Javascript),
            "typescript" | "ts" => Ok(Self::Typescript),
            "css" => Ok(Self::Css),
            "html" => Ok(Self::Html),
            "react" => Ok(Self::React),
            "angular" => Ok(Self::Angular),
            "php" => Ok(Self::Php),
            "python" | "py" => Ok(Self::Python),
            "diagramming" | "diagram" => Ok(Self::Diagramming),
            "media" => Ok(Self::Media),
            "image" => Ok(Self::Image),
            "svg" => Ok(Self::Svg),
            "bitmap" => Ok(Self::Bitmap),
            other => Err(AgentTypeParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentTypeParseError(pub String);

impl fmt::Display for AgentTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid agent type: {:?}", self.0)
    }
}

impl std::error::Error for AgentTypeParseError {}

// ---------------------------------------------------------------------------
// WorkerStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Unassigned,
    Assigned,
    Working,
    Done,
    Failed,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unassigned => "unassigned",
            Self::Assigned => "assigned",
            Self::Working => "working",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// PlanStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Ready,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "ready",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// TaskRecord
// ---------------------------------------------------------------------------

/// A single task as persisted in a `<area>-tasks.md` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub description: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub assigned_agent_type: Option<AgentType>,
    pub project_id: String,
    pub dependencies: Vec<String>,
    pub commit_sha: Option<String>,
    pub output_files: Vec<String>,
    pub provider_name: Option<String>,
    pub error_message: Option<String>,
}

impl TaskRecord {
    /// A task is ready when its own status is `Unassigned` or
    /// `BlockedByFailure` and (checked by the caller) every dependency is
    /// `Done`.
    pub fn is_candidate_for_ready(&self) -> bool {
        matches!(self.status, TaskStatus::Unassigned | TaskStatus::BlockedByFailure)
    }
}

// ---------------------------------------------------------------------------
// WAL
// ---------------------------------------------------------------------------

/// A single write-ahead-log record: one task status transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalEntry {
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    pub previous_status: TaskStatus,
    pub new_status: TaskStatus,
    pub assigned_agent: Option<String>,
    pub error_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// In-memory record of a single-use worker.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub id: Uuid,
    pub task_id: Option<String>,
    pub agent_type: AgentType,
    pub status: WorkerStatus,
    pub started_at: DateTime<Utc>,
    pub last_model_response_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}
