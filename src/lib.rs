//! Parallel task dispatch engine.
//!
//! Takes a plan document of checkbox tasks annotated with parallel-group
//! markers and executes the ready ones as isolated, mutually-exclusive units
//! of work:
//!
//! - [`plan`] - parses plan documents into tasks and parallel groups
//! - [`lock`] - per-task mutual exclusion via atomic lock files
//! - [`git`] - git2-backed branch and worktree operations
//! - [`workspace`] - isolated, branch-bound worktree checkouts per task
//! - [`dispatch`] - batch-concurrent execution with guaranteed cleanup
//! - [`config`] - explicit configuration, no process-wide state
//!
//! The lock directory discipline is atomic exclusive file creation. This is a
//! single-host, single-filesystem mutual-exclusion mechanism, not a
//! distributed lock.

pub mod config;
pub mod dispatch;
pub mod git;
pub mod lock;
pub mod plan;
pub mod workspace;

pub use config::DispatchConfig;
pub use dispatch::{
    CommandRunner, DispatchOptions, DispatchSummary, Dispatcher, LogSink, ProcessRunner,
    TaskResult, TaskStatus,
};
pub use lock::{LockError, LockManager, LockRecord, StaleCleanup};
pub use plan::{parse_plan, parse_plan_file, ready_tasks, ParsedPlan, ParsedTask, TaskGroup};
pub use workspace::{Workspace, WorkspaceError, WorkspaceManager};
