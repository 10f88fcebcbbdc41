//! The network collaborator: where transactions are submitted and confirmed.
//!
//! Two backends implement [`Network`]:
//! - [`MemoryNetwork`]: an in-memory ledger hosting native contract stand-ins,
//!   used by tests and dry runs.
//! - [`RpcNetwork`]: an Ethereum JSON-RPC development node (Hardhat, Anvil)
//!   with unlocked accounts.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy_core::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blueprint::ContractBlueprint;
use crate::value::Value;

mod abi;
pub mod memory;
pub mod rpc;

pub use memory::{MemoryNetwork, MemoryNetworkBuilder};
pub use rpc::RpcNetwork;

/// An identity able to authorize transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signer {
    /// Position in the network's account list.
    pub index: usize,
    pub address: Address,
}

/// What a transaction does.
#[derive(Debug, Clone)]
pub enum TxKind {
    /// Publish a new instance of `blueprint`.
    Create {
        blueprint: Arc<ContractBlueprint>,
        args: Vec<Value>,
    },
    /// Invoke `method` on the contract at `to`.
    Call {
        to: Address,
        blueprint: Arc<ContractBlueprint>,
        method: String,
        args: Vec<Value>,
    },
}

/// A transaction ready to be submitted.
#[derive(Debug, Clone)]
pub struct TxRequest {
    pub from: Address,
    pub kind: TxKind,
    /// Native value attached to the transaction, in wei.
    pub value: U256,
    pub gas_limit: Option<u64>,
}

/// Final state of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Reverted(String),
    OutOfGas { limit: u64, required: u64 },
}

/// A decoded event emitted while executing a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedEvent {
    pub emitter: Address,
    pub name: String,
    pub args: Vec<Value>,
}

impl fmt::Display for EmittedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ") from {}", self.emitter)
    }
}

/// Confirmation of a mined transaction.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub tx_hash: B256,
    pub status: TxStatus,
    /// Address of the created contract, for successful create transactions.
    pub contract_address: Option<Address>,
    pub events: Vec<EmittedEvent>,
    pub gas_used: u64,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == TxStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("network unreachable: {0}")]
    Unreachable(String),
    /// The node refused the request (bad sender, insufficient funds, JSON-RPC error).
    #[error("rejected by the network: {0}")]
    Rejected(String),
    #[error("failed to decode network response: {0}")]
    Decode(String),
    #[error("unsupported by this network: {0}")]
    Unsupported(String),
    /// The transaction was accepted but not confirmed in time.
    #[error("no confirmation after {0:?}")]
    Timeout(Duration),
}

/// The ledger collaborator used by the orchestrator and the verifier.
///
/// Every method takes `&self`; implementations serialize access internally.
/// [`Network::send`] only resolves once the transaction is confirmed.
pub trait Network: Send + Sync {
    /// Chain identifier of the connected network.
    fn chain_id(&self) -> impl Future<Output = Result<u64, NetworkError>> + Send;

    /// Accounts available to sign transactions, in the network's order.
    fn signers(&self) -> impl Future<Output = Result<Vec<Signer>, NetworkError>> + Send;

    /// Submit a transaction and wait until it is mined.
    fn send(&self, tx: TxRequest) -> impl Future<Output = Result<Receipt, NetworkError>> + Send;

    /// Execute a read-only call against the latest state.
    fn read(
        &self,
        to: Address,
        blueprint: &ContractBlueprint,
        method: &str,
        args: &[Value],
    ) -> impl Future<Output = Result<Vec<Value>, NetworkError>> + Send;

    /// Whether a contract is deployed at `address`.
    fn code_exists(&self, address: Address) -> impl Future<Output = Result<bool, NetworkError>> + Send;

    /// Signer at `index`, "first available" being index 0.
    fn signer(&self, index: usize) -> impl Future<Output = Result<Signer, NetworkError>> + Send {
        async move {
            self.signers().await?.get(index).copied().ok_or_else(|| {
                NetworkError::Rejected(format!("no signer available at index {index}"))
            })
        }
    }
}
