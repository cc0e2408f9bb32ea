//! Workspace lifecycle: base-dir resolution, gitignore bookkeeping,
//! creation and removal of branch-bound checkouts.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

use crate::git::GitClient;

/// Project metadata file consulted for an operator-declared workspace
/// directory preference
const PREFERENCE_FILE: &str = "CLAUDE.md";

static PREFERENCE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn preference_pattern() -> &'static Regex {
    PREFERENCE_PATTERN.get_or_init(|| {
        Regex::new(r"(?i)worktree[_\-\s]*(?:director(?:y|ies))?[:\s]+([^\n]+)").unwrap()
    })
}

/// An isolated, branch-bound checkout used exclusively by one in-flight task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    /// Absolute path to the checkout
    pub path: PathBuf,
    /// Branch checked out in the workspace
    pub branch: String,
    /// Whether the workspace lives inside the project directory
    pub is_local: bool,
}

/// Errors from workspace operations
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("No workspace directory found. Create .worktrees/ or set a {PREFERENCE_FILE} preference.")]
    NoBaseDir,

    #[error("Workspace path already exists: {0}")]
    PathExists(PathBuf),

    #[error("Workspace not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to prepare workspace directory: {0}")]
    Prepare(#[source] std::io::Error),

    #[error("Failed to update .gitignore: {0}")]
    Ignore(#[source] std::io::Error),

    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),
}

/// Resolved base directory for workspaces
#[derive(Debug, Clone)]
struct BaseDir {
    path: PathBuf,
    is_local: bool,
}

/// Manages workspace checkouts for one project
pub struct WorkspaceManager {
    project_dir: PathBuf,
}

impl WorkspaceManager {
    pub fn new<P: AsRef<Path>>(project_dir: P) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Create a workspace checked out on `branch`.
    ///
    /// The target is `explicit_path` when given, otherwise the detected base
    /// directory joined with the branch name. Fails if the target already
    /// exists. For project-local targets the parent directory is verified to
    /// be git-ignored (appending a rule when missing). The branch is created
    /// if absent and reused otherwise; a failed checkout leaves no partial
    /// directory behind.
    pub fn create_workspace(
        &self,
        branch: &str,
        explicit_path: Option<&Path>,
    ) -> Result<Workspace, WorkspaceError> {
        let (target, is_local) = match explicit_path {
            Some(raw) => {
                let resolved = self.resolve_path(raw);
                let is_local = resolved.starts_with(&self.project_dir);
                (resolved, is_local)
            }
            None => {
                let base = self.detect_base_dir().ok_or(WorkspaceError::NoBaseDir)?;
                (base.path.join(branch), base.is_local)
            }
        };

        if target.exists() {
            return Err(WorkspaceError::PathExists(target));
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(WorkspaceError::Prepare)?;

            if is_local {
                self.verify_ignored(parent)?;
            }
        }

        let client = GitClient::new(&self.project_dir)?;

        // Stale registrations from crashed runs would block re-creation
        if let Err(e) = client.prune_orphaned_worktrees() {
            log::warn!("[Workspace] Failed to prune orphaned worktrees: {}", e);
        }

        match client.add_worktree(branch, &target) {
            Ok(_) => {
                log::info!(
                    "[Workspace] Created workspace at {:?} on branch {}",
                    target,
                    branch
                );
                Ok(Workspace {
                    path: target,
                    branch: branch.to_string(),
                    is_local,
                })
            }
            Err(e) => {
                // Leave nothing behind from a failed checkout
                if target.exists() {
                    if let Err(rm_err) = fs::remove_dir_all(&target) {
                        log::warn!(
                            "[Workspace] Failed to clean up partial checkout at {:?}: {}",
                            target,
                            rm_err
                        );
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Force-remove the workspace at `path`: prune its git registration and
    /// delete the directory. Best-effort by contract; callers treat the error
    /// as non-fatal.
    pub fn remove_workspace(&self, path: &Path) -> Result<(), WorkspaceError> {
        let resolved = self.resolve_path(path);

        if !resolved.exists() {
            return Err(WorkspaceError::NotFound(resolved));
        }

        let client = GitClient::new(&self.project_dir)?;
        client.remove_worktree(&resolved)?;

        // Prune removes the working tree; sweep any leftovers
        if resolved.exists() {
            if let Err(e) = fs::remove_dir_all(&resolved) {
                log::warn!(
                    "[Workspace] Failed to remove workspace directory {:?}: {}",
                    resolved,
                    e
                );
            }
        }

        log::info!("[Workspace] Removed workspace at {:?}", resolved);
        Ok(())
    }

    /// Whether all commits reachable from `branch` are already ancestors of
    /// the current HEAD. Errors (unknown branch, detached state) read as
    /// not merged.
    pub fn is_branch_merged(&self, branch: &str) -> bool {
        match GitClient::new(&self.project_dir) {
            Ok(client) => client.is_ancestor_of_head(branch).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// All worktree checkouts registered for the project
    pub fn list_workspaces(&self) -> Vec<Workspace> {
        let client = match GitClient::new(&self.project_dir) {
            Ok(client) => client,
            Err(_) => return Vec::new(),
        };

        let infos = match client.list_worktrees() {
            Ok(infos) => infos,
            Err(_) => return Vec::new(),
        };

        infos
            .into_iter()
            .map(|info| {
                let path = PathBuf::from(&info.path);
                let is_local = path.starts_with(&self.project_dir);
                Workspace {
                    path,
                    branch: info.branch.unwrap_or_else(|| "HEAD".to_string()),
                    is_local,
                }
            })
            .collect()
    }

    /// Detect the preferred workspace base directory.
    /// Priority: `.worktrees/` (hidden) -> `worktrees/` (visible) ->
    /// preference recorded in project metadata -> none.
    fn detect_base_dir(&self) -> Option<BaseDir> {
        let hidden = self.project_dir.join(".worktrees");
        if hidden.exists() {
            return Some(BaseDir {
                path: hidden,
                is_local: true,
            });
        }

        let visible = self.project_dir.join("worktrees");
        if visible.exists() {
            return Some(BaseDir {
                path: visible,
                is_local: true,
            });
        }

        if let Some(preferred) = self.read_preference() {
            let path = self.resolve_path(Path::new(&preferred));
            let is_local = path.starts_with(&self.project_dir);
            return Some(BaseDir { path, is_local });
        }

        None
    }

    /// Ensure `dir` is excluded from version control, appending a rule to the
    /// project `.gitignore` if needed. Returns whether the file was updated;
    /// an existing rule is never duplicated.
    pub fn verify_ignored(&self, dir: &Path) -> Result<bool, WorkspaceError> {
        let resolved = self.resolve_path(dir);

        if let Ok(client) = GitClient::new(&self.project_dir) {
            if client.is_path_ignored(&resolved) {
                return Ok(false);
            }
        }

        let entry = match resolved.strip_prefix(&self.project_dir) {
            Ok(relative) => relative.to_string_lossy().to_string(),
            // Outside the project: nothing sensible to ignore
            Err(_) => return Ok(false),
        };

        let gitignore_path = self.project_dir.join(".gitignore");
        let existing = if gitignore_path.exists() {
            fs::read_to_string(&gitignore_path).map_err(WorkspaceError::Ignore)?
        } else {
            String::new()
        };

        let already_present = existing
            .lines()
            .any(|line| line.trim() == entry || line.trim() == format!("{}/", entry));

        if !already_present {
            let mut updated = existing.clone();
            if !updated.is_empty() && !updated.ends_with('\n') {
                updated.push('\n');
            }
            updated.push_str(&format!("{}/\n", entry));
            fs::write(&gitignore_path, updated).map_err(WorkspaceError::Ignore)?;
            log::info!("[Workspace] Added \"{}/\" to .gitignore", entry);
        }

        Ok(!already_present)
    }

    /// Read the operator's workspace-directory preference from project
    /// metadata, if declared
    fn read_preference(&self) -> Option<String> {
        let path = self.project_dir.join(PREFERENCE_FILE);
        let content = fs::read_to_string(path).ok()?;
        preference_pattern()
            .captures(&content)
            .map(|caps| caps[1].trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Expand `~` and make relative paths project-relative
    fn resolve_path(&self, raw: &Path) -> PathBuf {
        let expanded = expand_home(raw);
        if expanded.is_absolute() {
            expanded
        } else {
            self.project_dir.join(expanded)
        }
    }
}

fn expand_home(input: &Path) -> PathBuf {
    if let Ok(rest) = input.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    input.to_path_buf()
}
