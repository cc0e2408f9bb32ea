//! Worktree management for GitClient
//!
//! Contains methods for creating, listing, removing, and pruning worktrees.

use git2::{BranchType, Error as GitError, Repository, Worktree, WorktreeAddOptions};
use std::path::Path;

use crate::git::types::WorktreeInfo;
use crate::git::GitClient;

impl GitClient {
    /// Create a worktree at `path` checked out on `branch`.
    ///
    /// The branch is created from HEAD if it does not already exist, and
    /// reused otherwise.
    pub fn add_worktree(&self, branch: &str, path: &Path) -> Result<WorktreeInfo, GitError> {
        if !self.branch_exists(branch) {
            self.create_branch(branch)?;
        }

        // Branch reference is now guaranteed to exist
        let branch_ref = self.repo.find_branch(branch, BranchType::Local)?;

        let mut opts = WorktreeAddOptions::new();
        opts.reference(Some(branch_ref.get()));

        // Sanitize the worktree name to avoid nested directories in
        // .git/worktrees/: branch names like "parallel/x/1.1" would register
        // as ".git/worktrees/parallel/x/1.1" which fails
        let worktree_name = branch.replace('/', "-");

        let worktree = self.repo.worktree(&worktree_name, path, Some(&opts))?;

        self.worktree_to_info(&worktree)
    }

    /// List all registered worktrees
    pub fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>, GitError> {
        let worktrees = self.repo.worktrees()?;

        let mut result = Vec::new();
        for name in worktrees.iter().flatten() {
            if let Ok(worktree) = self.repo.find_worktree(name) {
                result.push(self.worktree_to_info(&worktree)?);
            }
        }

        Ok(result)
    }

    /// Remove a worktree registration by path.
    ///
    /// Searches all worktrees for one matching the given path; falls back to
    /// treating the argument as a worktree name.
    pub fn remove_worktree(&self, path: &Path) -> Result<(), GitError> {
        let wanted = path.to_string_lossy();
        let worktrees = self.repo.worktrees()?;

        for name in worktrees.iter().flatten() {
            if let Ok(worktree) = self.repo.find_worktree(name) {
                let worktree_path = worktree.path().to_string_lossy();
                if worktree_path == wanted
                    || worktree_path.trim_end_matches('/') == wanted.trim_end_matches('/')
                {
                    worktree.prune(Some(&mut force_prune_options()))?;
                    return Ok(());
                }
            }
        }

        // Fallback: the argument may be a worktree name
        if let Ok(worktree) = self.repo.find_worktree(&wanted) {
            worktree.prune(Some(&mut force_prune_options()))?;
            return Ok(());
        }

        Err(GitError::from_str(&format!(
            "Worktree not found: {}",
            wanted
        )))
    }

    /// Prune orphaned worktree registrations whose directories no longer
    /// exist. Cleans up stale entries in .git/worktrees/.
    pub fn prune_orphaned_worktrees(&self) -> Result<u32, GitError> {
        let worktrees = self.repo.worktrees()?;
        let mut pruned_count = 0;

        for name in worktrees.iter().flatten() {
            if let Ok(worktree) = self.repo.find_worktree(name) {
                if !worktree.path().exists() {
                    log::info!(
                        "[Git] Pruning orphaned worktree '{}' (path {:?} no longer exists)",
                        name,
                        worktree.path()
                    );
                    if let Err(e) = worktree.prune(Some(&mut force_prune_options())) {
                        log::warn!("[Git] Failed to prune worktree '{}': {}", name, e);
                    } else {
                        pruned_count += 1;
                    }
                }
            }
        }

        Ok(pruned_count)
    }

    /// Convert a Worktree to WorktreeInfo
    pub(crate) fn worktree_to_info(&self, worktree: &Worktree) -> Result<WorktreeInfo, GitError> {
        let name = worktree.name().unwrap_or("").to_string();
        let path = worktree.path().to_string_lossy().to_string();
        let is_locked = worktree
            .is_locked()
            .map(|status| !matches!(status, git2::WorktreeLockStatus::Unlocked))
            .unwrap_or(false);

        // Determine the branch checked out in this worktree
        let branch = match Repository::open(worktree.path()) {
            Ok(wt_repo) => match wt_repo.head() {
                Ok(head) if head.is_branch() => head.shorthand().map(|s| s.to_string()),
                _ => None,
            },
            Err(_) => None,
        };

        Ok(WorktreeInfo {
            name,
            path,
            branch,
            is_locked,
        })
    }
}

/// Prune options that remove the registration even when the checkout is
/// still valid, including its working tree
fn force_prune_options() -> git2::WorktreePruneOptions {
    let mut opts = git2::WorktreePruneOptions::new();
    opts.valid(true);
    opts.working_tree(true);
    opts
}
