use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use rally::{LinkConditions, RallyConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(flatten)]
    pub rally: RallyConfig,
    pub replicas: usize,
    pub seconds: f64,
    pub seed: u64,
    /// Applied to every link in the simulated network.
    pub link: LinkConditions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rally: RallyConfig::default(),
            replicas: 2,
            seconds: 60.0,
            seed: 1,
            link: LinkConditions::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}
