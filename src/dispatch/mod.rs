//! Parallel task dispatch
//!
//! Filters a plan's tasks down to the ready ones, partitions them into
//! concurrency-bounded batches, and executes each task as an isolated unit:
//! lock acquire -> workspace create -> run -> result classification ->
//! guaranteed cleanup. A single task's failure never aborts its batch or the
//! dispatch; every dispatched task yields exactly one [`TaskResult`].

mod runner;

pub use runner::{CommandRunner, LogSink, ProcessRunner};

use runner::emit;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::lock::LockManager;
use crate::plan::ParsedTask;
use crate::workspace::WorkspaceManager;

/// Outcome classification for one dispatched task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    Failed,
    Skipped,
}

/// One result per dispatched task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Aggregate outcome of one dispatch run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    /// Number of tasks handed to batches (including later skips)
    pub launched: usize,
    pub results: Vec<TaskResult>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl DispatchSummary {
    pub fn completed(&self) -> usize {
        self.count(TaskStatus::Completed)
    }

    pub fn failed(&self) -> usize {
        self.count(TaskStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(TaskStatus::Skipped)
    }

    fn count(&self, status: TaskStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

/// Options for one dispatch run
#[derive(Clone)]
pub struct DispatchOptions {
    /// Identifier woven into branch names so workspace paths are unique per
    /// run
    pub dispatch_id: String,
    /// Batch size; batch N+1 never starts before batch N has fully settled
    pub max_concurrent: usize,
    /// Sink for streamed task output; defaults to the `log` crate
    pub on_log: Option<LogSink>,
}

impl DispatchOptions {
    pub fn new<S: Into<String>>(dispatch_id: S) -> Self {
        Self {
            dispatch_id: dispatch_id.into(),
            max_concurrent: 4,
            on_log: None,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.on_log = Some(sink);
        self
    }
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

/// Orchestrates lock acquisition, workspace lifecycle, and command execution
/// for batches of parallel tasks
pub struct Dispatcher<R: CommandRunner> {
    locks: LockManager,
    workspaces: WorkspaceManager,
    runner: R,
    options: DispatchOptions,
}

impl<R: CommandRunner> Dispatcher<R> {
    pub fn new(
        locks: LockManager,
        workspaces: WorkspaceManager,
        runner: R,
        options: DispatchOptions,
    ) -> Self {
        Self {
            locks,
            workspaces,
            runner,
            options,
        }
    }

    /// Dispatch the ready tasks among `tasks` in concurrency-bounded batches.
    ///
    /// Per-task failures (lock conflict, workspace error, nonzero exit) are
    /// captured in that task's [`TaskResult`] and never unwind the dispatch.
    pub async fn dispatch(&self, tasks: &[ParsedTask]) -> DispatchSummary {
        let sink = self.log_sink();
        let start_time = Utc::now();

        let pending: Vec<&ParsedTask> = tasks
            .iter()
            .filter(|t| t.group_id.is_some() && !t.completed && !t.in_progress)
            .collect();

        let mut summary = DispatchSummary {
            launched: 0,
            results: Vec::new(),
            start_time,
            end_time: start_time,
        };

        if pending.is_empty() {
            emit(&sink, "[Dispatch] No pending parallel tasks found.");
            summary.end_time = Utc::now();
            return summary;
        }

        emit(&sink, &format!(
            "[Dispatch] Found {} parallel tasks to execute.",
            pending.len()
        ));

        let batch_size = self.options.max_concurrent.max(1);
        let batches: Vec<&[&ParsedTask]> = pending.chunks(batch_size).collect();
        let batch_count = batches.len();

        for (i, batch) in batches.into_iter().enumerate() {
            emit(&sink, &format!(
                "[Dispatch] Starting batch {}/{} ({} tasks)",
                i + 1,
                batch_count,
                batch.len()
            ));

            // Hard synchronization point: the next batch starts only after
            // every task in this one has settled
            let batch_results =
                join_all(batch.iter().copied().map(|task| self.execute_task(task, &sink))).await;

            summary.launched += batch.len();
            summary.results.extend(batch_results);
        }

        summary.end_time = Utc::now();

        emit(&sink, &format!(
            "[Dispatch] Finished: {} completed, {} failed, {} skipped",
            summary.completed(),
            summary.failed(),
            summary.skipped()
        ));

        summary
    }

    /// Run one task: lock, workspace, execute, classify, clean up.
    ///
    /// The cleanup phase (workspace removal, then lock release) runs on every
    /// path that got past lock acquisition; cleanup errors are logged and
    /// never override the task's already-determined status.
    async fn execute_task(&self, task: &ParsedTask, sink: &LogSink) -> TaskResult {
        let start = Instant::now();

        if let Err(e) = self.locks.acquire(&task.id) {
            emit(sink, &format!("[Task {}] Skipped: {}", task.id, e));
            return TaskResult {
                task_id: task.id.clone(),
                status: TaskStatus::Skipped,
                exit_code: None,
                reason: Some(e.to_string()),
                workspace_path: None,
                duration_ms: None,
            };
        }

        emit(sink, &format!(
            "[Task {}] Acquired lock, creating workspace...",
            task.id
        ));

        let branch = format!(
            "parallel/{}/{}",
            self.options.dispatch_id,
            sanitize_branch_component(&task.id)
        );

        let workspace = match self.workspaces.create_workspace(&branch, None) {
            Ok(workspace) => workspace,
            Err(e) => {
                if let Err(release_err) = self.locks.release(&task.id) {
                    log::warn!(
                        "[Dispatch] Failed to release lock for task {}: {}",
                        task.id,
                        release_err
                    );
                }
                emit(sink, &format!(
                    "[Task {}] Failed to create workspace: {}",
                    task.id, e
                ));
                return TaskResult {
                    task_id: task.id.clone(),
                    status: TaskStatus::Failed,
                    exit_code: None,
                    reason: Some(format!("Workspace creation failed: {}", e)),
                    workspace_path: None,
                    duration_ms: Some(elapsed_ms(start)),
                };
            }
        };

        emit(sink, &format!(
            "[Task {}] Workspace ready at {}",
            task.id,
            workspace.path.display()
        ));

        let run_outcome = self.runner.run(task, &workspace.path, sink).await;

        // Guaranteed cleanup: workspace first, then the lock, errors logged
        // but not propagated
        if let Err(e) = self.workspaces.remove_workspace(&workspace.path) {
            log::warn!(
                "[Dispatch] Failed to remove workspace for task {}: {}",
                task.id,
                e
            );
        }
        if let Err(e) = self.locks.release(&task.id) {
            log::warn!(
                "[Dispatch] Failed to release lock for task {}: {}",
                task.id,
                e
            );
        }
        emit(sink, &format!(
            "[Task {}] Cleaned up workspace and released lock",
            task.id
        ));

        match run_outcome {
            Ok(exit_code) => {
                let status = if exit_code == 0 {
                    TaskStatus::Completed
                } else {
                    TaskStatus::Failed
                };
                emit(sink, &format!(
                    "[Task {}] {} (exit code: {})",
                    task.id,
                    match status {
                        TaskStatus::Completed => "completed",
                        _ => "failed",
                    },
                    exit_code
                ));
                TaskResult {
                    task_id: task.id.clone(),
                    status,
                    exit_code: Some(exit_code),
                    reason: None,
                    workspace_path: Some(workspace.path.clone()),
                    duration_ms: Some(elapsed_ms(start)),
                }
            }
            Err(e) => {
                emit(sink, &format!("[Task {}] Process error: {}", task.id, e));
                TaskResult {
                    task_id: task.id.clone(),
                    status: TaskStatus::Failed,
                    exit_code: None,
                    reason: Some(format!("Process error: {}", e)),
                    workspace_path: Some(workspace.path.clone()),
                    duration_ms: Some(elapsed_ms(start)),
                }
            }
        }
    }

    fn log_sink(&self) -> LogSink {
        self.options
            .on_log
            .clone()
            .unwrap_or_else(|| Arc::new(|line: &str| log::info!("{}", line)))
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Sanitize a task id for use inside a branch name
fn sanitize_branch_component(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
