//! gantry-deploy - Contract deployment and verification harness.
//!
//! This crate deploys ordered sets of contracts on an Ethereum-style network,
//! injecting the addresses of earlier deployments into later constructors, and
//! verifies deployed contracts by asserting on the events their calls emit.

pub mod blueprint;
pub mod config;
pub mod error;
pub mod factory;
pub mod network;
pub mod orchestrator;
pub mod plan;
pub mod report;
pub mod rpc;
pub mod value;
pub mod verifier;

pub use blueprint::{BlueprintName, BlueprintRegistry, ContractBlueprint};
pub use config::{CONFIG_FILE_NAME, HarnessConfig, NetworkTarget};
pub use error::{FailureReason, HarnessError, Result};
pub use factory::{
    ContractFactory, ContractInstance, DEFAULT_CONFIRMATION_TIMEOUT, DeployError, MethodCall,
};
pub use network::{
    EmittedEvent, MemoryNetwork, MemoryNetworkBuilder, Network, NetworkError, Receipt,
    RpcNetwork, Signer, TxStatus,
};
pub use orchestrator::{ArgsBuilder, DeployStep, DeploymentOrchestrator, DeploymentRecord, Deployments};
pub use plan::{ArgSpec, BuiltinPlan, DeploymentPlan, Literal, PlanStep};
pub use report::RunReport;
pub use value::Value;
pub use verifier::{BehaviorVerifier, ExpectedEvent};
