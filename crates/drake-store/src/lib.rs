//! File-backed persistence for drake: task lists, the write-ahead log,
//! implementation plans, and project configuration.

pub mod config;
pub mod models;
pub mod plan_store;
pub mod task_file;
pub mod wal;

pub use models::{
    AgentType, AgentTypeParseError, Priority, PriorityParseError, PlanStatus, TaskRecord,
    TaskStatus, TaskStatusParseError, WalEntry, WorkerRecord, WorkerStatus,
};
pub use task_file::{TaskFile, TaskFileError};
pub use wal::{Wal, WalError};
