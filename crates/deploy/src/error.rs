//! Error taxonomy for deployments and verifications.

use std::time::Duration;

use alloy_core::primitives::Address;
use thiserror::Error;

use crate::network::{EmittedEvent, NetworkError};
use crate::verifier::ExpectedEvent;

/// Why a submitted transaction did not produce a usable outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// The transaction was mined but reverted.
    #[error("transaction reverted: {0}")]
    Reverted(String),
    /// The transaction ran out of gas before completing.
    #[error("out of gas (limit {limit}, required {required})")]
    OutOfGas { limit: u64, required: u64 },
    /// The network refused the transaction before mining it.
    #[error("transaction rejected: {0}")]
    Rejected(String),
    /// The network could not be reached.
    #[error("network unreachable: {0}")]
    Unreachable(String),
    /// No confirmation arrived in time.
    #[error("no confirmation after {0:?}")]
    Timeout(Duration),
}

impl From<NetworkError> for FailureReason {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::Unreachable(msg) => FailureReason::Unreachable(msg),
            NetworkError::Rejected(msg) => FailureReason::Rejected(msg),
            NetworkError::Timeout(after) => FailureReason::Timeout(after),
            other => FailureReason::Rejected(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    /// A deployment step failed. Earlier steps of the same run stay deployed.
    #[error("deployment of {blueprint} (step {step}) failed: {reason}")]
    DeploymentFailure {
        step: usize,
        blueprint: String,
        reason: FailureReason,
    },

    /// A state-changing call was rejected by the contract or the network.
    #[error("call {method} on {contract} failed: {reason}")]
    CallReverted {
        contract: Address,
        method: String,
        reason: FailureReason,
    },

    /// The call succeeded but no emitted event matched the expectation.
    #[error("expected event {expected} was not emitted; observed: [{}]", format_events(.observed))]
    EventMismatch {
        expected: Box<ExpectedEvent>,
        observed: Vec<EmittedEvent>,
    },

    #[error("unknown blueprint: {0}")]
    UnknownBlueprint(String),

    #[error("invalid arguments for {target}: {reason}")]
    InvalidArguments { target: String, reason: String },

    /// A step referenced a deployment that does not exist yet in the run.
    #[error("deployment '{0}' has not been resolved yet")]
    UnresolvedDependency(String),

    #[error("invalid deployment plan: {0}")]
    InvalidPlan(String),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl HarnessError {
    pub(crate) fn invalid_args(target: impl Into<String>, reason: impl Into<String>) -> Self {
        HarnessError::InvalidArguments {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

fn format_events(events: &[EmittedEvent]) -> String {
    events
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;
