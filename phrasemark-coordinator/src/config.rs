use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

pub const DEFAULT_INJECTION_DELAY: Duration = Duration::from_millis(150);
pub const DEFAULT_VIEWER_URL: &str = "viewer.html";
pub const DEFAULT_PERSIST_KEY: &str = "phrasemark.session";

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Pause between injecting the agent and retrying delivery.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub injection_delay: Duration,
    pub viewer_url: String,
    pub persist_key: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            injection_delay: DEFAULT_INJECTION_DELAY,
            viewer_url: DEFAULT_VIEWER_URL.to_string(),
            persist_key: DEFAULT_PERSIST_KEY.to_string(),
        }
    }
}

impl CoordinatorConfig {
    /// Reads a TOML config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml(&raw).with_context(|| format!("failed to parse config file {:?}", path))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}
