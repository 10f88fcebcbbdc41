//! Harness configuration, as stored in `gantry.toml`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::factory::DEFAULT_CONFIRMATION_TIMEOUT;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "gantry.toml";

/// Where transactions are sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum NetworkTarget {
    /// The in-memory network with the stock stand-ins.
    #[default]
    Memory,
    /// A JSON-RPC development node, by URL.
    #[strum(default)]
    Rpc(String),
}

impl NetworkTarget {
    /// URL of the JSON-RPC node, or `None` for the in-memory network.
    pub fn rpc_url(&self) -> Result<Option<Url>> {
        match self {
            NetworkTarget::Memory => Ok(None),
            NetworkTarget::Rpc(url) => Url::parse(url)
                .map(Some)
                .with_context(|| format!("Invalid RPC URL: {url}")),
        }
    }
}

impl fmt::Display for NetworkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkTarget::Memory => write!(f, "memory"),
            NetworkTarget::Rpc(url) => write!(f, "{url}"),
        }
    }
}

impl Serialize for NetworkTarget {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NetworkTarget {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// Settings shared by every gantry command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub network: NetworkTarget,
    /// Directory of compiled contract artifacts. Without it, the stock blueprints
    /// are used.
    pub artifacts: Option<PathBuf>,
    /// Index of the deploying signer; 0 is the first available account.
    pub signer: usize,
    pub confirmation_timeout_secs: u64,
    /// Gas limit applied to every transaction. The network estimates when unset.
    pub gas_limit: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            network: NetworkTarget::Memory,
            artifacts: None,
            signer: 0,
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT.as_secs(),
            gas_limit: None,
        }
    }
}

impl HarnessConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration to {}", path.display()))?;

        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tempdir::TempDir;

    #[test]
    fn test_network_target_parsing() {
        assert_eq!(NetworkTarget::from_str("memory").unwrap(), NetworkTarget::Memory);

        let target = NetworkTarget::from_str("http://127.0.0.1:8545").unwrap();
        assert_eq!(target, NetworkTarget::Rpc("http://127.0.0.1:8545".to_string()));
        assert_eq!(target.to_string(), "http://127.0.0.1:8545");
        assert_eq!(
            target.rpc_url().unwrap().unwrap().as_str(),
            "http://127.0.0.1:8545/"
        );

        assert!(NetworkTarget::Memory.rpc_url().unwrap().is_none());
        assert!(NetworkTarget::Rpc("not a url".into()).rpc_url().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: HarnessConfig = toml::from_str(r#"network = "http://localhost:8545""#).unwrap();
        assert_eq!(config.network, NetworkTarget::Rpc("http://localhost:8545".into()));
        assert_eq!(config.signer, 0);
        assert_eq!(config.confirmation_timeout(), DEFAULT_CONFIRMATION_TIMEOUT);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new("gantry-config").unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let config = HarnessConfig {
            network: NetworkTarget::Rpc("http://localhost:8545".into()),
            artifacts: Some(PathBuf::from("artifacts")),
            signer: 2,
            confirmation_timeout_secs: 30,
            gas_limit: Some(3_000_000),
        };
        config.save_to_file(&path).unwrap();

        assert_eq!(HarnessConfig::load_from_file(&path).unwrap(), config);
    }
}
