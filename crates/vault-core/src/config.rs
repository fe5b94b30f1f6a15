use crate::error::{VaultError, VaultResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Runtime limits and policy switches.
///
/// Every field has a default, so a config file only needs to name the
/// settings it changes:
///
/// ```json
/// { "max_link_depth": 4 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Deepest call nesting before `FrameDepthExceeded` aborts the transaction
    pub max_frame_depth: usize,
    /// Number of link hops followed before a borrow reports `LinkCycle`
    pub max_link_depth: usize,
    /// When false, private-data access skips the signer check
    pub enforce_authority: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_frame_depth: 256,
            max_link_depth: 8,
            enforce_authority: true,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(json: &str) -> VaultResult<Self> {
        let config: RuntimeConfig =
            serde_json::from_str(json).map_err(|e| VaultError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> VaultResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    fn validate(&self) -> VaultResult<()> {
        if self.max_frame_depth == 0 {
            return Err(VaultError::Config("max_frame_depth must be at least 1".into()));
        }
        if self.max_link_depth == 0 {
            return Err(VaultError::Config("max_link_depth must be at least 1".into()));
        }
        Ok(())
    }
}
