//! Mediator configuration.
//!
//! Read from `reqflow.toml`. Every key is optional.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::bus::DEFAULT_TAP_CAPACITY;
use crate::error::{ReqflowError, ReqflowResult};

/// File name looked up in a workspace directory.
pub const CONFIG_FILE_NAME: &str = "reqflow.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediatorConfig {
    /// Maximum records analyzed at the same time inside a batch.
    pub batch_concurrency: usize,
    /// Capacity of the broadcast event tap.
    pub event_buffer: usize,
    /// Progress percentages reported while importing: start, parse begin,
    /// parse done and commit. Must be non-decreasing and at most 100.
    pub import_milestones: [u8; 4],
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            batch_concurrency: 1,
            event_buffer: DEFAULT_TAP_CAPACITY,
            import_milestones: [0, 25, 75, 100],
        }
    }
}

impl MediatorConfig {
    pub fn from_toml_str(content: &str) -> ReqflowResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file.
    pub fn load(path: &Path) -> ReqflowResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load `reqflow.toml` from `workspace` if present, defaults otherwise.
    pub fn load_from_workspace(workspace: &Path) -> ReqflowResult<Self> {
        let path = workspace.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> ReqflowResult<()> {
        if self.batch_concurrency == 0 {
            return Err(ReqflowError::config("batch_concurrency must be at least 1"));
        }
        if self.event_buffer == 0 {
            return Err(ReqflowError::config("event_buffer must be at least 1"));
        }
        let m = self.import_milestones;
        if m.windows(2).any(|w| w[0] > w[1]) || m[3] > 100 {
            return Err(ReqflowError::config(
                "import_milestones must be non-decreasing percentages",
            ));
        }
        Ok(())
    }
}
