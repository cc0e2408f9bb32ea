//! Isolated workspace management
//!
//! Creates and destroys branch-bound git worktree checkouts so concurrent
//! tasks never share mutable working-copy state. Supports project-local
//! (`.worktrees/`, `worktrees/`) and operator-preferred locations.

mod manager;

pub use manager::{Workspace, WorkspaceError, WorkspaceManager};
