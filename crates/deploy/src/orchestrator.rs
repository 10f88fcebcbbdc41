//! Ordered multi-contract deployment with address injection.
//!
//! A run is a linear list of [`DeployStep`]s. Each step builds its constructor
//! arguments from the [`Deployments`] completed so far, so a dependent contract
//! receives the address of the contract it was declared after.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use alloy_core::primitives::{Address, B256};
use serde::{Deserialize, Serialize};

use crate::blueprint::{BlueprintName, BlueprintRegistry, ContractBlueprint};
use crate::error::{HarnessError, Result};
use crate::factory::{ContractFactory, ContractInstance, DEFAULT_CONFIRMATION_TIMEOUT, DeployError};
use crate::network::{Network, Signer};
use crate::value::Value;

/// Outcome of one successful deployment. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub label: String,
    pub blueprint: BlueprintName,
    /// Constructor arguments after dependency resolution.
    pub args: Vec<Value>,
    pub address: Address,
    pub tx_hash: B256,
    pub deployer: Address,
}

/// Records of the steps completed so far in a run, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Deployments(Vec<DeploymentRecord>);

impl Deployments {
    pub fn get(&self, label: &str) -> Option<&DeploymentRecord> {
        self.0.iter().find(|r| r.label == label)
    }

    /// Address deployed under `label`, or `UnresolvedDependency` if that step has
    /// not completed.
    pub fn address_of(&self, label: &str) -> Result<Address> {
        self.get(label)
            .map(|r| r.address)
            .ok_or_else(|| HarnessError::UnresolvedDependency(label.to_string()))
    }

    pub fn records(&self) -> &[DeploymentRecord] {
        &self.0
    }

    pub fn into_records(self) -> Vec<DeploymentRecord> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, record: DeploymentRecord) {
        self.0.push(record);
    }
}

/// Builds a step's constructor arguments from the deployments completed so far.
pub type ArgsBuilder = Box<dyn Fn(&Deployments) -> Result<Vec<Value>> + Send + Sync>;

/// One entry of a deployment sequence.
pub struct DeployStep {
    pub label: String,
    pub blueprint: BlueprintName,
    pub args: ArgsBuilder,
}

impl DeployStep {
    /// A step without constructor arguments, labelled after its blueprint.
    pub fn new(blueprint: impl Into<BlueprintName>) -> Self {
        let blueprint = blueprint.into();
        Self {
            label: blueprint.to_string(),
            blueprint,
            args: Box::new(|_: &Deployments| Ok(Vec::new())),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Fixed constructor arguments.
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = Box::new(move |_: &Deployments| Ok(args.clone()));
        self
    }

    /// Constructor arguments computed from earlier deployments.
    pub fn with_args_from<F>(mut self, build: F) -> Self
    where
        F: Fn(&Deployments) -> Result<Vec<Value>> + Send + Sync + 'static,
    {
        self.args = Box::new(build);
        self
    }
}

impl std::fmt::Debug for DeployStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployStep")
            .field("label", &self.label)
            .field("blueprint", &self.blueprint)
            .finish_non_exhaustive()
    }
}

/// Deploys blueprints on a network, one at a time, on behalf of one signer.
pub struct DeploymentOrchestrator<'n, N> {
    network: &'n N,
    registry: BlueprintRegistry,
    signer: Signer,
    confirmation_timeout: Duration,
    gas_limit: Option<u64>,
}

impl<'n, N: Network> DeploymentOrchestrator<'n, N> {
    pub fn new(network: &'n N, registry: BlueprintRegistry, signer: Signer) -> Self {
        Self {
            network,
            registry,
            signer,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            gas_limit: None,
        }
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: Option<u64>) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn signer(&self) -> Signer {
        self.signer
    }

    pub fn registry(&self) -> &BlueprintRegistry {
        &self.registry
    }

    fn factory(&self, blueprint: Arc<ContractBlueprint>) -> ContractFactory<'n, N> {
        ContractFactory::new(self.network, blueprint, self.signer)
            .gas_limit(self.gas_limit)
            .confirmation_timeout(self.confirmation_timeout)
    }

    /// Deploy a single instance of `blueprint` and wait for its confirmation.
    pub async fn deploy(&self, blueprint: &str, args: Vec<Value>) -> Result<DeploymentRecord> {
        self.deploy_step(0, blueprint, blueprint, args).await
    }

    async fn deploy_step(
        &self,
        step: usize,
        label: &str,
        blueprint: &str,
        args: Vec<Value>,
    ) -> Result<DeploymentRecord> {
        let blueprint = self.registry.get(blueprint)?;

        tracing::debug!(
            step,
            label,
            blueprint = %blueprint.name,
            deployer = %self.signer.address,
            args = args.len(),
            "Deploying contract"
        );

        let (instance, receipt) = match self.factory(blueprint.clone()).deploy(args.clone()).await {
            Ok(deployed) => deployed,
            Err(DeployError::Invalid(e)) => return Err(e),
            Err(DeployError::Failed(reason)) => {
                tracing::error!(step, label, blueprint = %blueprint.name, %reason, "Deployment failed");
                return Err(HarnessError::DeploymentFailure {
                    step,
                    blueprint: blueprint.name.to_string(),
                    reason,
                });
            }
        };

        let ContractInstance { address, .. } = instance;
        let record = DeploymentRecord {
            label: label.to_string(),
            blueprint: blueprint.name.clone(),
            args,
            address,
            tx_hash: receipt.tx_hash,
            deployer: self.signer.address,
        };

        tracing::info!(
            label = %record.label,
            address = %record.address,
            tx_hash = %record.tx_hash,
            gas_used = receipt.gas_used,
            "Contract deployed"
        );

        Ok(record)
    }

    /// Run `steps` in order. See [`Self::run_with_progress`].
    pub async fn run(&self, steps: Vec<DeployStep>) -> Result<Deployments> {
        self.run_with_progress(steps, |_| {}).await
    }

    /// Run `steps` in order, handing each record to `on_deployed` as soon as it
    /// exists.
    ///
    /// Stops at the first failing step. Contracts deployed by earlier steps stay
    /// on the network and have already been reported.
    pub async fn run_with_progress<F>(
        &self,
        steps: Vec<DeployStep>,
        mut on_deployed: F,
    ) -> Result<Deployments>
    where
        F: FnMut(&DeploymentRecord),
    {
        let mut labels = HashSet::new();
        for step in &steps {
            if !labels.insert(step.label.as_str()) {
                return Err(HarnessError::InvalidPlan(format!(
                    "duplicate step label '{}'",
                    step.label
                )));
            }
        }

        tracing::info!(steps = steps.len(), deployer = %self.signer.address, "Starting deployment run");

        let mut deployments = Deployments::default();
        for (index, step) in steps.iter().enumerate() {
            let args = (step.args)(&deployments)?;
            let record = self
                .deploy_step(index, &step.label, &step.blueprint, args)
                .await?;
            on_deployed(&record);
            deployments.push(record);
        }

        tracing::info!(deployed = deployments.len(), "Deployment run complete");

        Ok(deployments)
    }
}
