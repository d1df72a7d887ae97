//! Write-ahead log for task status transitions.
//!
//! Every transition is appended to the log *before* the in-memory task record
//! is mutated and the task file is saved; once the save completes the log is
//! checkpointed (truncated). On restart, any entries still present in the log
//! represent transitions that were recorded but never confirmed durable, and
//! are replayed against the loaded task file.
//!
//! Line format, tab-separated:
//! `<iso8601>\t<task_id>\t<prev>\t<new>\t<agent-or-dash>\t<error-or-dash>`

use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

use crate::models::{TaskStatus, WalEntry};

#[derive(Debug, Error)]
pub enum WalError {
    #[error("io error on wal {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed wal line {line_no}: {line:?}")]
    Malformed { line_no: usize, line: String },
    #[error("invalid status in wal line {line_no}: {0}")]
    InvalidStatus(#[source] crate::models::TaskStatusParseError, usize),
}

/// Append-only write-ahead log backed by a single file.
pub struct Wal {
    path: PathBuf,
}

impl Wal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Appends one entry to the log. The write-then-mutate-then-checkpoint
    /// ordering is the caller's responsibility; this only performs the append.
    pub fn append(&self, entry: &WalEntry) -> Result<(), WalError> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| WalError::Io {
                path: self.path.clone(),
                source,
            })?;
        let line = render_line(entry);
        file.write_all(line.as_bytes()).map_err(|source| WalError::Io {
            path: self.path.clone(),
            source,
        })?;
        file.flush().map_err(|source| WalError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Truncates the log to empty. Called after the task file save that an
    /// appended entry described has completed successfully.
    pub fn checkpoint(&self) -> Result<(), WalError> {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map(|_| ())
            .map_err(|source| WalError::Io {
                path: self.path.clone(),
                source,
            })
    }

    /// Reads every entry currently in the log, in append order.
    pub fn replay(&self) -> Result<Vec<WalEntry>, WalError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.path).map_err(|source| WalError::Io {
            path: self.path.clone(),
            source,
        })?;
        text.lines()
            .enumerate()
            .filter(|(_, l)| !l.is_empty())
            .map(|(i, l)| parse_line(l, i + 1))
            .collect()
    }
}

/// Applies replayed WAL entries to a task file's in-memory records. Entries
/// whose `new_status` already matches the record are a no-op (the task file
/// save had already completed before the crash, only the checkpoint was
/// missed).
pub fn apply_replay(tasks: &mut [crate::models::TaskRecord], entries: &[WalEntry]) {
    for entry in entries {
        if let Some(task) = tasks.iter_mut().find(|t| t.id == entry.task_id) {
            task.status = entry.new_status;
            if let Some(err) = &entry.error_message {
                task.error_message = Some(err.clone());
            }
        }
    }
}

fn render_line(entry: &WalEntry) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\n",
        entry.timestamp.to_rfc3339(),
        entry.task_id,
        entry.previous_status,
        entry.new_status,
        entry.assigned_agent.as_deref().unwrap_or("-"),
        entry.error_message.as_deref().unwrap_or("-"),
    )
}

fn parse_line(line: &str, line_no: usize) -> Result<WalEntry, WalError> {
    let parts: Vec<&str> = line.split('\t').collect();
    if parts.len() != 6 {
        return Err(WalError::Malformed {
            line_no,
            line: line.to_string(),
        });
    }
    let timestamp = chrono::DateTime::parse_from_rfc3339(parts[0])
        .map_err(|_| WalError::Malformed {
            line_no,
            line: line.to_string(),
        })?
        .with_timezone(&Utc);
    let previous_status: TaskStatus = parts[2]
        .parse()
        .map_err(|e| WalError::InvalidStatus(e, line_no))?;
    let new_status: TaskStatus = parts[3]
        .parse()
        .map_err(|e| WalError::InvalidStatus(e, line_no))?;
    Ok(WalEntry {
        timestamp,
        task_id: parts[1].to_string(),
        previous_status,
        new_status,
        assigned_agent: none_if_dash(parts[4]),
        error_message: none_if_dash(parts[5]),
    })
}

fn none_if_dash(s: &str) -> Option<String> {
    if s == "-" {
        None
    } else {
        Some(s.to_string())
    }
}
