//! Engine configuration, read from TOML.
//!
//! ```toml
//! policy_paths = ["policies/finalized.json"]
//! policy_dir = "policies/extra"
//! index_threshold = 10
//! log_level = "info"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::enforcer::PolicyEnforcer;
use crate::error::Result;
use crate::loader::{load_policies, load_policy_dir};
use crate::operators::OperatorRegistry;
use crate::policy::Policy;
use crate::sequence::DEFAULT_INDEX_THRESHOLD;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Policy documents loaded first, in this order.
    pub policy_paths: Vec<PathBuf>,
    /// Directory whose `*.json` files are loaded after `policy_paths`.
    pub policy_dir: Option<PathBuf>,
    pub index_threshold: usize,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy_paths: Vec::new(),
            policy_dir: None,
            index_threshold: DEFAULT_INDEX_THRESHOLD,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read a config file. Relative policy paths are taken from the
    /// directory the file lives in.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading engine config from {}", path.display());

        let mut config = Self::from_toml_str(&fs::read_to_string(path)?)?;
        if let Some(base) = path.parent() {
            config.policy_paths = config
                .policy_paths
                .into_iter()
                .map(|p| base.join(p))
                .collect();
            config.policy_dir = config.policy_dir.map(|dir| base.join(dir));
        }
        Ok(config)
    }

    pub fn registry(&self) -> OperatorRegistry {
        OperatorRegistry::builder()
            .with_index_threshold(self.index_threshold)
            .build()
    }

    /// Explicit paths first, then the policy directory.
    pub fn load_policies(&self) -> Result<Vec<Policy>> {
        let mut policies = load_policies(&self.policy_paths)?;
        if let Some(dir) = &self.policy_dir {
            policies.extend(load_policy_dir(dir)?);
        }
        Ok(policies)
    }

    pub fn build_enforcer(&self) -> Result<PolicyEnforcer> {
        let policies = self.load_policies()?;
        Ok(PolicyEnforcer::with_registry(
            Arc::new(self.registry()),
            policies,
        ))
    }
}
