//! Contract factories and handles to deployed contracts.

use std::sync::Arc;
use std::time::Duration;

use alloy_core::primitives::{Address, U256};
use thiserror::Error;

use crate::blueprint::ContractBlueprint;
use crate::error::{FailureReason, HarnessError, Result};
use crate::network::{Network, Receipt, Signer, TxKind, TxRequest, TxStatus};
use crate::value::Value;

/// Default time to wait for a transaction to be confirmed.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Submit `tx` and wait for its confirmation, bounded by `timeout`.
///
/// Mined-but-failed transactions are reported as [`FailureReason`]s, like network
/// errors, so callers only deal with one failure type.
pub(crate) async fn submit<N: Network>(
    network: &N,
    tx: TxRequest,
    timeout: Duration,
) -> std::result::Result<Receipt, FailureReason> {
    let receipt = tokio::time::timeout(timeout, network.send(tx))
        .await
        .map_err(|_| FailureReason::Timeout(timeout))?
        .map_err(FailureReason::from)?;

    match &receipt.status {
        TxStatus::Success => Ok(receipt),
        TxStatus::Reverted(reason) => Err(FailureReason::Reverted(reason.clone())),
        TxStatus::OutOfGas { limit, required } => Err(FailureReason::OutOfGas {
            limit: *limit,
            required: *required,
        }),
    }
}

/// Deploys instances of one blueprint, and attaches to existing ones.
pub struct ContractFactory<'n, N> {
    network: &'n N,
    blueprint: Arc<ContractBlueprint>,
    signer: Signer,
    gas_limit: Option<u64>,
    confirmation_timeout: Duration,
}

impl<'n, N: Network> ContractFactory<'n, N> {
    pub fn new(network: &'n N, blueprint: Arc<ContractBlueprint>, signer: Signer) -> Self {
        Self {
            network,
            blueprint,
            signer,
            gas_limit: None,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }

    /// Use another signer for subsequent deployments.
    pub fn connect(mut self, signer: Signer) -> Self {
        self.signer = signer;
        self
    }

    pub fn gas_limit(mut self, gas_limit: Option<u64>) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn blueprint(&self) -> &Arc<ContractBlueprint> {
        &self.blueprint
    }

    pub fn signer(&self) -> Signer {
        self.signer
    }

    /// Deploy a new instance with `args` and wait for it to be mined.
    ///
    /// Argument errors are reported before anything is submitted.
    pub async fn deploy(
        &self,
        args: Vec<Value>,
    ) -> std::result::Result<(ContractInstance, Receipt), DeployError> {
        self.blueprint
            .check_constructor_args(&args)
            .map_err(DeployError::Invalid)?;

        let tx = TxRequest {
            from: self.signer.address,
            kind: TxKind::Create {
                blueprint: self.blueprint.clone(),
                args,
            },
            value: U256::ZERO,
            gas_limit: self.gas_limit,
        };

        let receipt = submit(self.network, tx, self.confirmation_timeout)
            .await
            .map_err(DeployError::Failed)?;

        let address = receipt.contract_address.ok_or_else(|| {
            DeployError::Failed(FailureReason::Rejected(
                "receipt carries no contract address".to_string(),
            ))
        })?;

        Ok((self.attach(address), receipt))
    }

    /// Handle to an instance already deployed at `address`.
    pub fn attach(&self, address: Address) -> ContractInstance {
        ContractInstance {
            address,
            blueprint: self.blueprint.clone(),
        }
    }
}

/// Why [`ContractFactory::deploy`] did not produce an instance.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The arguments do not fit the constructor; nothing was submitted.
    #[error(transparent)]
    Invalid(HarnessError),
    /// The create transaction was submitted and failed.
    #[error("deployment failed: {0}")]
    Failed(FailureReason),
}

/// A state-changing call to make on a contract.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub signer: Signer,
    pub method: String,
    pub args: Vec<Value>,
    /// Native value attached to the call, in wei.
    pub value: U256,
    pub gas_limit: Option<u64>,
}

impl MethodCall {
    pub fn new(signer: Signer, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            signer,
            method: method.into(),
            args,
            value: U256::ZERO,
            gas_limit: None,
        }
    }

    /// Attach `value` wei to the call.
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }
}

/// Handle to a deployed contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractInstance {
    pub address: Address,
    pub blueprint: Arc<ContractBlueprint>,
}

impl ContractInstance {
    /// Send a state-changing call and wait for its confirmation.
    pub async fn send<N: Network>(
        &self,
        network: &N,
        call: &MethodCall,
        timeout: Duration,
    ) -> Result<Receipt> {
        self.blueprint.check_call_args(&call.method, &call.args)?;

        let tx = TxRequest {
            from: call.signer.address,
            kind: TxKind::Call {
                to: self.address,
                blueprint: self.blueprint.clone(),
                method: call.method.clone(),
                args: call.args.clone(),
            },
            value: call.value,
            gas_limit: call.gas_limit,
        };

        tracing::debug!(
            contract = %self.address,
            method = %call.method,
            from = %call.signer.address,
            value = %call.value,
            "Sending contract call"
        );

        submit(network, tx, timeout)
            .await
            .map_err(|reason| HarnessError::CallReverted {
                contract: self.address,
                method: call.method.clone(),
                reason,
            })
    }

    /// Call a read-only method.
    pub async fn read<N: Network>(
        &self,
        network: &N,
        method: &str,
        args: &[Value],
    ) -> Result<Vec<Value>> {
        self.blueprint.check_call_args(method, args)?;
        network
            .read(self.address, &self.blueprint, method, args)
            .await
            .map_err(HarnessError::from)
    }
}
