//! File-based task locking
//!
//! Prevents multiple dispatcher processes from executing the same task
//! simultaneously. Acquisition is atomic exclusive file creation (O_EXCL),
//! which the OS guarantees across independently launched processes on the
//! same host and filesystem. This is not a distributed lock and it never
//! queues: a caller that loses the race gets the holder's details back and
//! decides to skip or retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Locks older than this are considered stale and reclaimed by
/// [`LockManager::cleanup_stale`]
pub const LOCK_TIMEOUT_SECS: i64 = 30 * 60;

/// One record per currently-held lock, persisted as JSON in the lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub task_id: String,
    pub pid: u32,
    /// RFC 3339 acquisition timestamp
    pub acquired_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

/// Errors from lock operations
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Task {task_id} is locked by PID {holder_pid} since {acquired_at}")]
    AlreadyLocked {
        task_id: String,
        holder_pid: u32,
        acquired_at: String,
    },

    #[error("Lock for task {task_id} is owned by PID {holder_pid}, cannot release")]
    NotOwner { task_id: String, holder_pid: u32 },

    #[error("Lock I/O error for task {task_id}: {source}")]
    Io {
        task_id: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a stale-lock sweep
#[derive(Debug, Clone, Default)]
pub struct StaleCleanup {
    /// Lock file names that were removed
    pub removed: Vec<String>,
    /// Descriptions of removals that failed
    pub errors: Vec<String>,
}

/// Manager for per-task lock files in a shared directory
pub struct LockManager {
    locks_dir: PathBuf,
}

impl LockManager {
    /// Create a manager over the given lock directory. The directory is
    /// created lazily on first acquire.
    pub fn new<P: AsRef<Path>>(locks_dir: P) -> Self {
        Self {
            locks_dir: locks_dir.as_ref().to_path_buf(),
        }
    }

    /// The lock directory this manager operates on
    pub fn locks_dir(&self) -> &Path {
        &self.locks_dir
    }

    /// Acquire a lock for a task.
    ///
    /// Writes a [`LockRecord`] through an exclusive create, so exactly one of
    /// any set of concurrent callers succeeds. A lost race returns
    /// [`LockError::AlreadyLocked`] with the holder's pid and timestamp.
    pub fn acquire(&self, task_id: &str) -> Result<PathBuf, LockError> {
        let lock_path = self.lock_path(task_id);

        fs::create_dir_all(&self.locks_dir).map_err(|e| LockError::Io {
            task_id: task_id.to_string(),
            source: e,
        })?;

        let record = LockRecord {
            task_id: task_id.to_string(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
            hostname: hostname(),
        };

        // create_new fails with AlreadyExists if another process holds the lock
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(mut file) => {
                let json = serde_json::to_string_pretty(&record).map_err(|e| LockError::Io {
                    task_id: task_id.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                })?;
                file.write_all(json.as_bytes()).map_err(|e| LockError::Io {
                    task_id: task_id.to_string(),
                    source: e,
                })?;
                Ok(lock_path)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let existing = read_record(&lock_path);
                Err(LockError::AlreadyLocked {
                    task_id: task_id.to_string(),
                    holder_pid: existing.as_ref().map(|r| r.pid).unwrap_or(0),
                    acquired_at: existing
                        .map(|r| r.acquired_at.to_rfc3339())
                        .unwrap_or_else(|| "unknown".to_string()),
                })
            }
            Err(e) => Err(LockError::Io {
                task_id: task_id.to_string(),
                source: e,
            }),
        }
    }

    /// Release a lock for a task.
    ///
    /// Verifies the caller's pid against the record before unlinking; a
    /// mismatch leaves the file untouched. Releasing an absent lock is Ok,
    /// which makes release safe to call from cleanup paths.
    pub fn release(&self, task_id: &str) -> Result<(), LockError> {
        let lock_path = self.lock_path(task_id);

        if !lock_path.exists() {
            return Ok(());
        }

        if let Some(record) = read_record(&lock_path) {
            if record.pid != std::process::id() {
                return Err(LockError::NotOwner {
                    task_id: task_id.to_string(),
                    holder_pid: record.pid,
                });
            }
        }

        fs::remove_file(&lock_path).map_err(|e| LockError::Io {
            task_id: task_id.to_string(),
            source: e,
        })
    }

    /// Current lock record for a task, if any
    pub fn is_locked(&self, task_id: &str) -> Option<LockRecord> {
        read_record(&self.lock_path(task_id))
    }

    /// All currently readable lock records
    pub fn list_locks(&self) -> Vec<LockRecord> {
        let mut locks = Vec::new();
        for path in self.lock_files() {
            if let Some(record) = read_record(&path) {
                locks.push(record);
            }
        }
        locks
    }

    /// Remove locks older than [`LOCK_TIMEOUT_SECS`], plus malformed lock
    /// files.
    ///
    /// Removal is unconditional on age: there is no liveness probe of the
    /// holder, so a task that legitimately runs longer than the timeout will
    /// have its lock reclaimed while still running, permitting a second
    /// concurrent execution. Known gap; fixing it needs a heartbeat scheme.
    pub fn cleanup_stale(&self) -> StaleCleanup {
        let mut result = StaleCleanup::default();
        let now = Utc::now();

        for path in self.lock_files() {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            match read_record(&path) {
                None => {
                    // Unreadable record: remove it
                    match fs::remove_file(&path) {
                        Ok(()) => result.removed.push(file_name),
                        Err(e) => result
                            .errors
                            .push(format!("Failed to remove invalid lock {}: {}", file_name, e)),
                    }
                }
                Some(record) => {
                    if now.signed_duration_since(record.acquired_at).num_seconds()
                        > LOCK_TIMEOUT_SECS
                    {
                        match fs::remove_file(&path) {
                            Ok(()) => {
                                log::info!(
                                    "[Lock] Removed stale lock: {} (PID: {})",
                                    file_name,
                                    record.pid
                                );
                                result.removed.push(file_name);
                            }
                            Err(e) => result.errors.push(format!(
                                "Failed to remove stale lock {}: {}",
                                file_name, e
                            )),
                        }
                    }
                }
            }
        }

        result
    }

    fn lock_path(&self, task_id: &str) -> PathBuf {
        self.locks_dir.join(format!("{}.lock", sanitize_id(task_id)))
    }

    fn lock_files(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.locks_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "lock").unwrap_or(false))
            .collect()
    }
}

fn read_record(lock_path: &Path) -> Option<LockRecord> {
    let content = fs::read_to_string(lock_path).ok()?;
    serde_json::from_str(&content).ok()
}

fn sanitize_id(task_id: &str) -> String {
    task_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn hostname() -> Option<String> {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .filter(|h| !h.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LockManager) {
        let temp = TempDir::new().unwrap();
        let manager = LockManager::new(temp.path().join("locks"));
        (temp, manager)
    }

    #[test]
    fn test_acquire_writes_record() {
        let (_temp, manager) = setup();

        let lock_path = manager.acquire("1.1").unwrap();
        assert!(lock_path.exists());

        let record = manager.is_locked("1.1").unwrap();
        assert_eq!(record.task_id, "1.1");
        assert_eq!(record.pid, std::process::id());
    }

    #[test]
    fn test_second_acquire_reports_holder() {
        let (_temp, manager) = setup();

        manager.acquire("1.1").unwrap();
        let err = manager.acquire("1.1").unwrap_err();

        match err {
            LockError::AlreadyLocked { holder_pid, .. } => {
                assert_eq!(holder_pid, std::process::id());
            }
            other => panic!("expected AlreadyLocked, got {:?}", other),
        }
    }

    #[test]
    fn test_release_then_reacquire() {
        let (_temp, manager) = setup();

        manager.acquire("1.1").unwrap();
        manager.release("1.1").unwrap();
        assert!(manager.is_locked("1.1").is_none());

        manager.acquire("1.1").unwrap();
    }

    #[test]
    fn test_release_absent_lock_is_ok() {
        let (_temp, manager) = setup();
        assert!(manager.release("never-locked").is_ok());
    }

    #[test]
    fn test_release_refuses_foreign_lock() {
        let (_temp, manager) = setup();

        // Forge a lock held by another pid
        fs::create_dir_all(manager.locks_dir()).unwrap();
        let record = LockRecord {
            task_id: "1.1".to_string(),
            pid: std::process::id().wrapping_add(1),
            acquired_at: Utc::now(),
            hostname: None,
        };
        fs::write(
            manager.locks_dir().join("1.1.lock"),
            serde_json::to_string(&record).unwrap(),
        )
        .unwrap();

        let err = manager.release("1.1").unwrap_err();
        assert!(matches!(err, LockError::NotOwner { .. }));
        assert!(manager.is_locked("1.1").is_some());
    }

    #[test]
    fn test_cleanup_removes_stale_and_malformed() {
        let (_temp, manager) = setup();
        fs::create_dir_all(manager.locks_dir()).unwrap();

        // Stale lock, well past the timeout
        let stale = LockRecord {
            task_id: "old".to_string(),
            pid: 12345,
            acquired_at: Utc::now() - chrono::Duration::hours(2),
            hostname: None,
        };
        fs::write(
            manager.locks_dir().join("old.lock"),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        // Malformed lock file
        fs::write(manager.locks_dir().join("bad.lock"), "not json").unwrap();

        // Fresh lock that must survive
        manager.acquire("fresh").unwrap();

        let result = manager.cleanup_stale();
        assert!(result.errors.is_empty());
        assert_eq!(result.removed.len(), 2);
        assert!(result.removed.contains(&"old.lock".to_string()));
        assert!(result.removed.contains(&"bad.lock".to_string()));
        assert!(manager.is_locked("fresh").is_some());
    }

    #[test]
    fn test_list_locks() {
        let (_temp, manager) = setup();

        manager.acquire("1.1").unwrap();
        manager.acquire("1.2").unwrap();

        let mut ids: Vec<String> = manager.list_locks().into_iter().map(|r| r.task_id).collect();
        ids.sort();
        assert_eq!(ids, vec!["1.1", "1.2"]);
    }

    #[test]
    fn test_sanitized_lock_file_names() {
        let (_temp, manager) = setup();

        let path = manager.acquire("feat/task 1").unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "feat_task_1.lock"
        );
        assert!(manager.is_locked("feat/task 1").is_some());
    }
}
