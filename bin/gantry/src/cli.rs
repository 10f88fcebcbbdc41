use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use gantry_deploy::{BuiltinPlan, CONFIG_FILE_NAME, DeploymentPlan, HarnessConfig, NetworkTarget};
use serde::Serialize;
use tracing::level_filters::LevelFilter;

/// Keys of [`HarnessConfig`] that may be set from `GANTRY_*` environment variables.
const CONFIG_ENV_KEYS: &[&str] = &[
    "network",
    "artifacts",
    "signer",
    "confirmation_timeout_secs",
    "gas_limit",
];

/// A deployment plan: one of the built-ins, or a path to a TOML plan file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanSource {
    Builtin(BuiltinPlan),
    File(PathBuf),
}

impl PlanSource {
    pub fn load(&self) -> anyhow::Result<DeploymentPlan> {
        match self {
            PlanSource::Builtin(builtin) => Ok(builtin.plan()),
            PlanSource::File(path) => DeploymentPlan::load_from_file(path),
        }
    }
}

impl FromStr for PlanSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("plan name or path required".to_string());
        }

        Ok(BuiltinPlan::from_str(s)
            .map(PlanSource::Builtin)
            .unwrap_or_else(|_| PlanSource::File(PathBuf::from(s))))
    }
}

impl fmt::Display for PlanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanSource::Builtin(builtin) => write!(f, "{builtin}"),
            PlanSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Parser)]
#[command(name = "gantry")]
#[command(
    author,
    version,
    about = "Deploy sets of dependent contracts and verify their behavior"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "GANTRY_VERBOSITY", default_value_t = LevelFilter::INFO, global = true)]
    pub verbosity: LevelFilter,

    #[command(flatten)]
    pub overrides: ConfigOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy the steps of a plan, in order.
    Deploy {
        /// A built-in plan (m1-ecdsa, ledger-custody, live-gifts) or a path to a
        /// TOML plan file.
        #[arg(long, env = "GANTRY_PLAN")]
        plan: PlanSource,

        /// Write a JSON report of the run to this path.
        #[arg(long, env = "GANTRY_REPORT")]
        report: Option<PathBuf>,
    },

    /// List the signers available on the network.
    Accounts,

    /// Print a shell completion script.
    Completions {
        /// The shell to generate completions for.
        shell: Shell,
    },
}

/// Command-line values layered on top of the configuration file.
///
/// Unset flags leave the file (or default) value in place.
#[derive(Debug, Clone, Default, Args, Serialize)]
pub struct ConfigOverrides {
    /// Path to the configuration file.
    ///
    /// Defaults to ./gantry.toml when it exists.
    #[arg(long, alias = "conf", env = "GANTRY_CONFIG", global = true)]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// The network to deploy to: `memory` or the URL of a JSON-RPC development node.
    #[arg(short, long, env = "GANTRY_NETWORK", global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkTarget>,

    /// Directory of compiled contract artifacts (Hardhat or Foundry layout).
    #[arg(long, env = "GANTRY_ARTIFACTS", global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<PathBuf>,

    /// Index of the signer that deploys; 0 is the first available account.
    #[arg(long, env = "GANTRY_SIGNER", global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer: Option<usize>,

    /// Seconds to wait for each transaction to be confirmed.
    #[arg(long, env = "GANTRY_CONFIRMATION_TIMEOUT", global = true)]
    #[serde(
        rename = "confirmation_timeout_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub confirmation_timeout: Option<u64>,

    /// Gas limit for every transaction.
    #[arg(long, env = "GANTRY_GAS_LIMIT", global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
}

impl ConfigOverrides {
    /// Layer defaults, the configuration file, `GANTRY_*` variables and these flags,
    /// later layers winning.
    pub fn resolve(&self) -> anyhow::Result<HarnessConfig> {
        let path = match &self.config {
            Some(path) if !path.exists() => {
                anyhow::bail!("Configuration file does not exist: {}", path.display());
            }
            Some(path) => path.clone(),
            None => PathBuf::from(CONFIG_FILE_NAME),
        };

        self.resolve_from(&path)
    }

    fn resolve_from(&self, path: &Path) -> anyhow::Result<HarnessConfig> {
        let config: HarnessConfig = Figment::from(Serialized::defaults(HarnessConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("GANTRY_").only(CONFIG_ENV_KEYS))
            .merge(Serialized::defaults(self))
            .extract()
            .with_context(|| format!("Invalid configuration (file: {})", path.display()))?;

        tracing::debug!(
            network = %config.network,
            signer = config.signer,
            confirmation_timeout_secs = config.confirmation_timeout_secs,
            gas_limit = ?config.gas_limit,
            "Configuration resolved"
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempdir::TempDir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_plan_source_parsing() {
        assert_eq!(
            PlanSource::from_str("ledger-custody").unwrap(),
            PlanSource::Builtin(BuiltinPlan::LedgerCustody)
        );
        assert_eq!(
            PlanSource::from_str("plans/vault.toml").unwrap(),
            PlanSource::File(PathBuf::from("plans/vault.toml"))
        );
        assert!(PlanSource::from_str("").is_err());
    }

    #[test]
    fn test_parse_deploy_command() {
        let cli = Cli::try_parse_from([
            "gantry",
            "deploy",
            "--plan",
            "live-gifts",
            "--network",
            "http://127.0.0.1:8545",
            "--signer",
            "1",
        ])
        .unwrap();

        match cli.command {
            Command::Deploy { plan, report } => {
                assert_eq!(plan, PlanSource::Builtin(BuiltinPlan::LiveGifts));
                assert!(report.is_none());
            }
            _ => panic!("expected the deploy command"),
        }
        assert_eq!(
            cli.overrides.network,
            Some(NetworkTarget::Rpc("http://127.0.0.1:8545".to_string()))
        );
        assert_eq!(cli.overrides.signer, Some(1));
    }

    #[test]
    fn test_deploy_requires_a_plan() {
        assert!(Cli::try_parse_from(["gantry", "deploy"]).is_err());
    }

    #[test]
    fn test_flags_override_the_config_file() {
        let dir = TempDir::new("gantry-cli").unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "network = \"http://localhost:8545\"\nsigner = 3\nconfirmation_timeout_secs = 10\n",
        )
        .unwrap();

        let overrides = ConfigOverrides {
            config: Some(path.clone()),
            confirmation_timeout: Some(5),
            ..Default::default()
        };
        let config = overrides.resolve().unwrap();

        assert_eq!(config.network, NetworkTarget::Rpc("http://localhost:8545".into()));
        assert_eq!(config.signer, 3);
        assert_eq!(config.confirmation_timeout_secs, 5);
        assert_eq!(config.gas_limit, None);
    }

    #[test]
    fn test_missing_default_file_uses_defaults() {
        let dir = TempDir::new("gantry-cli").unwrap();
        let config = ConfigOverrides::default()
            .resolve_from(&dir.path().join(CONFIG_FILE_NAME))
            .unwrap();
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let overrides = ConfigOverrides {
            config: Some(PathBuf::from("/nonexistent/gantry.toml")),
            ..Default::default()
        };
        assert!(overrides.resolve().is_err());
    }
}
