//! Plan document parsing
//!
//! Parses plan documents (checkbox task lists) and extracts parallel group
//! markers. Supports `<!-- parallel: groupId -->` annotations, either inline
//! on a task line or standalone on the line before.

mod parser;
mod types;

pub use parser::{parse_plan, parse_plan_file, ready_tasks};
pub use types::{ParsedPlan, ParsedTask, TaskGroup};
