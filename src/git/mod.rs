//! Git operations using git2-rs
//!
//! This module provides the version-control backend organized into focused
//! submodules:
//! - `manager` - Core GitClient struct and repository access
//! - `branches` - Branch operations (create, lookup, merge detection)
//! - `worktrees` - Worktree management (add, remove, list, prune)
//! - `types` - Shared data structures

mod branches;
mod manager;
#[cfg(test)]
mod tests;
mod types;
mod worktrees;

pub use manager::GitClient;
pub use types::{BranchInfo, WorktreeInfo};
