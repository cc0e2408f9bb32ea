// Dispatch configuration
//
// Loaded from <project>/task-dispatch.toml when present, defaults otherwise.
// Values are passed explicitly into the managers that need them; there is no
// process-wide configuration state.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Config file name at the project root
pub const CONFIG_FILE: &str = "task-dispatch.toml";

/// Shared state and scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Directory (relative to the project root) holding shared dispatch state
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    /// Default maximum number of concurrently running tasks
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_state_dir() -> String {
    ".task-dispatch".to_string()
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl DispatchConfig {
    /// Load configuration for a project. A missing config file yields the
    /// defaults; a malformed one is an error.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(CONFIG_FILE);

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: DispatchConfig = toml::from_str(&contents)
            .map_err(|e| anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Directory holding per-task lock files
    pub fn locks_dir(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.state_dir).join("locks")
    }
}
