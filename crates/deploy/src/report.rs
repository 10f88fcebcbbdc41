use std::path::Path;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::orchestrator::{DeploymentRecord, Deployments};

/// Summary of a completed deployment run, saved so an operator can find the
/// deployed addresses later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// SHA-256 digest of the plan that was run.
    pub plan_digest: String,
    pub chain_id: u64,
    pub deployer: Address,
    /// RFC 3339 timestamp of the end of the run.
    pub deployed_at: String,
    /// Gantry version that produced this report.
    pub gantry_version: String,
    pub deployments: Vec<DeploymentRecord>,
}

impl RunReport {
    /// Build a report stamped with the current time and the crate version.
    pub fn new(plan_digest: String, chain_id: u64, deployer: Address, deployments: Deployments) -> Self {
        Self {
            plan_digest,
            chain_id,
            deployer,
            deployed_at: chrono::Utc::now().to_rfc3339(),
            gantry_version: env!("CARGO_PKG_VERSION").to_string(),
            deployments: deployments.into_records(),
        }
    }

    pub fn address_of(&self, label: &str) -> Option<Address> {
        self.deployments
            .iter()
            .find(|r| r.label == label)
            .map(|r| r.address)
    }

    /// Save the report as formatted JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run report")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run report to {}", path.display()))?;

        tracing::info!(path = %path.display(), "Run report saved");

        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Run report does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run report from {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse run report JSON")
    }
}
