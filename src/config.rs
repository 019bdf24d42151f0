use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Network, ServiceError};

pub const CONFIG_FILE: &str = "swap_config.json";

fn default_fee_rate() -> f64 {
    0.1
}

fn default_rbf() -> bool {
    true
}

/// Settings for claiming and refunding swaps, persisted as camelCase JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapConfig {
    pub network: Network,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electrum_url: Option<String>,
    /// sat/vbyte
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,
    #[serde(default = "default_rbf")]
    pub rbf: bool,
    /// Measure fees with the discounted virtual size.
    #[serde(default)]
    pub discount_ct: bool,
}

impl SwapConfig {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            electrum_url: None,
            fee_rate: default_fee_rate(),
            rbf: default_rbf(),
            discount_ct: false,
        }
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILE)
    }

    /// Reads the config at `path`; a missing file yields the defaults for
    /// `network`.
    pub fn load(path: &Path, network: Network) -> Result<Self, ServiceError> {
        if !path.exists() {
            log::info!("no config at {}, using {network} defaults", path.display());
            return Ok(Self::new(network));
        }
        let contents =
            fs::read_to_string(path).map_err(|e| ServiceError::Config(e.to_string()))?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|e| ServiceError::Config(e.to_string()))?;
        log::info!("loaded config from {} ({})", path.display(), config.network);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ServiceError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ServiceError::Config(e.to_string()))?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| ServiceError::Config(e.to_string()))?;
        fs::write(path, json).map_err(|e| ServiceError::Config(e.to_string()))
    }

    pub fn electrum_url(&self) -> &str {
        self.electrum_url
            .as_deref()
            .unwrap_or_else(|| self.network.default_electrum_url())
    }
}
