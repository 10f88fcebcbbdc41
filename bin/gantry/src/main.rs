//! gantry deploys ordered sets of dependent contracts and reports where they landed.

mod cli;

use std::io::Write;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use comfy_table::Table;
use gantry_deploy::{
    BlueprintRegistry, DeploymentOrchestrator, DeploymentRecord, HarnessConfig, MemoryNetwork,
    Network, RpcNetwork, RunReport,
};

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    if let Command::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "gantry", &mut std::io::stdout());
        return Ok(());
    }

    let config = cli.overrides.resolve()?;

    match config.network.rpc_url()? {
        None => {
            if config.artifacts.is_some() {
                tracing::warn!("Artifacts are ignored on the in-memory network, using its stock blueprints");
            }
            let network = MemoryNetwork::with_stock_contracts()?;
            let registry = network.blueprints().clone();
            execute(&cli.command, &config, &network, registry, &mut std::io::stdout()).await
        }
        Some(url) => {
            let Some(artifacts) = &config.artifacts else {
                anyhow::bail!("--artifacts is required to deploy on {url}");
            };
            let registry = BlueprintRegistry::load_artifacts(artifacts)?;
            let network = RpcNetwork::new(url)?.with_receipt_timeout(config.confirmation_timeout());
            execute(&cli.command, &config, &network, registry, &mut std::io::stdout()).await
        }
    }
}

/// Run `command` against `network`, writing its output to `out`.
async fn execute<N: Network>(
    command: &Command,
    config: &HarnessConfig,
    network: &N,
    registry: BlueprintRegistry,
    out: &mut impl Write,
) -> Result<()> {
    let chain_id = network
        .chain_id()
        .await
        .context("Failed to query the network chain ID")?;
    let signers = network.signers().await.context("Failed to list signers")?;

    match command {
        Command::Accounts => {
            let mut table = Table::new();
            table.set_header(vec!["Index", "Address"]);
            for signer in &signers {
                table.add_row(vec![signer.index.to_string(), signer.address.to_string()]);
            }
            writeln!(out, "{table}")?;
        }

        Command::Deploy { plan, report } => {
            let signer = signers.get(config.signer).copied().with_context(|| {
                format!(
                    "No signer at index {} ({} available)",
                    config.signer,
                    signers.len()
                )
            })?;

            let plan_source = plan;
            let plan = plan_source.load()?;
            let digest = plan.digest()?;

            tracing::info!(
                plan = %plan_source,
                digest = %digest,
                chain_id,
                steps = plan.steps.len(),
                "Deploying plan"
            );

            let steps = plan.into_steps(&registry, &signers)?;
            let orchestrator = DeploymentOrchestrator::new(network, registry, signer)
                .with_confirmation_timeout(config.confirmation_timeout())
                .with_gas_limit(config.gas_limit);

            let deployments = orchestrator
                .run_with_progress(steps, |record: &DeploymentRecord| {
                    if let Err(e) = writeln!(out, "{} deployed to: {}", record.label, record.address) {
                        tracing::warn!(label = %record.label, error = %e, "Failed to write progress");
                    }
                })
                .await?;

            writeln!(out, "{}", summary(deployments.records()))?;

            if let Some(path) = report {
                RunReport::new(digest, chain_id, signer.address, deployments).save_to_file(path)?;
            }
        }

        Command::Completions { .. } => {}
    }

    Ok(())
}

fn summary(records: &[DeploymentRecord]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Label", "Blueprint", "Address", "Transaction"]);
    for record in records {
        table.add_row(vec![
            record.label.clone(),
            record.blueprint.to_string(),
            record.address.to_string(),
            record.tx_hash.to_string(),
        ]);
    }
    table
}
