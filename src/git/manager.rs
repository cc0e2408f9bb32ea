//! Core GitClient implementation

use git2::{Error as GitError, Repository};
use std::path::{Path, PathBuf};

/// Client for repository operations backing the workspace manager
pub struct GitClient {
    pub(crate) repo: Repository,
}

impl GitClient {
    /// Open the repository at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let repo = Repository::open(path)?;
        Ok(Self { repo })
    }

    /// Path to the repository's .git directory
    pub fn repo_path(&self) -> PathBuf {
        self.repo.path().to_path_buf()
    }

    /// Whether git would ignore the given path
    pub fn is_path_ignored<P: AsRef<Path>>(&self, path: P) -> bool {
        self.repo.is_path_ignored(path).unwrap_or(false)
    }
}
