//! Branch operations for GitClient
//!
//! Contains methods for creating and looking up branches and for merge
//! detection against HEAD.

use git2::{Branch, BranchType, Error as GitError, Signature};

use crate::git::types::BranchInfo;
use crate::git::GitClient;

impl GitClient {
    /// Create a new branch from the current HEAD
    pub fn create_branch(&self, name: &str) -> Result<BranchInfo, GitError> {
        // Try to get HEAD, handle unborn branch case
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                // Repository has no commits yet - create an initial commit
                log::info!("[Git] No commits found, creating initial commit");
                self.create_initial_commit()?;
                self.repo.head()?
            }
            Err(e) => return Err(e),
        };

        let head_commit = head.peel_to_commit()?;
        let branch = self.repo.branch(name, &head_commit, false)?;

        self.branch_to_info(&branch)
    }

    /// Create an initial empty commit for a new repository
    pub(crate) fn create_initial_commit(&self) -> Result<(), GitError> {
        let tree_id = self.repo.index()?.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let signature = self
            .repo
            .signature()
            .or_else(|_| Signature::now("Task Dispatch", "dispatch@example.com"))?;

        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            "Initial commit",
            &tree,
            &[], // No parents for initial commit
        )?;

        Ok(())
    }

    /// Whether a local branch with this name exists
    pub fn branch_exists(&self, name: &str) -> bool {
        self.repo.find_branch(name, BranchType::Local).is_ok()
    }

    /// Whether every commit reachable from `name` is an ancestor of HEAD,
    /// i.e. the branch has been fully merged
    pub fn is_ancestor_of_head(&self, name: &str) -> Result<bool, GitError> {
        let branch = self.repo.find_branch(name, BranchType::Local)?;
        let branch_oid = branch
            .get()
            .target()
            .ok_or_else(|| GitError::from_str("Branch has no target commit"))?;
        let head_oid = self
            .repo
            .head()?
            .target()
            .ok_or_else(|| GitError::from_str("HEAD has no target commit"))?;

        // Merged iff the merge base with HEAD is the branch tip itself
        let base = self.repo.merge_base(branch_oid, head_oid)?;
        Ok(base == branch_oid)
    }

    /// Convert a Branch to BranchInfo
    pub(crate) fn branch_to_info(&self, branch: &Branch) -> Result<BranchInfo, GitError> {
        let name = branch.name()?.unwrap_or("").to_string();
        let is_head = branch.is_head();
        let commit = branch.get().peel_to_commit()?;

        Ok(BranchInfo {
            name,
            is_head,
            commit_id: commit.id().to_string(),
        })
    }
}
