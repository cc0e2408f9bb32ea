//! Plan data types
//!
//! Parsed tasks and groups are ephemeral: rebuilt on every parse of the plan
//! document, never persisted.

use serde::{Deserialize, Serialize};

/// A single dispatchable task parsed from a plan document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTask {
    /// Task ID (e.g., "1.1", "2.3.4"), or a generated "task-N" fallback
    pub id: String,
    /// Task title with any group marker stripped
    pub title: String,
    /// Whether the checkbox is marked done (`x` or `X`)
    pub completed: bool,
    /// Whether the checkbox is marked in progress (`/`)
    pub in_progress: bool,
    /// Parallel group ID if the task is marked for parallel execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Raw source line, kept for diagnostics
    pub raw: String,
}

/// A named set of tasks declared safe to execute concurrently
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGroup {
    pub id: String,
    /// Membership order equals order of first appearance in the document
    pub tasks: Vec<ParsedTask>,
}

/// Result of parsing one plan document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedPlan {
    pub tasks: Vec<ParsedTask>,
    /// Groups in order of first reference
    pub groups: Vec<TaskGroup>,
}
