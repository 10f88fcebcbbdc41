//! Post-deployment behavioral checks based on emitted events.

use std::fmt;
use std::time::Duration;

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::factory::{ContractInstance, DEFAULT_CONFIRMATION_TIMEOUT, MethodCall};
use crate::network::{EmittedEvent, Network, Receipt};
use crate::value::Value;

/// An event a call is expected to emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedEvent {
    pub emitter: Address,
    pub name: String,
    pub args: Vec<Value>,
}

impl ExpectedEvent {
    pub fn new(emitter: Address, name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            emitter,
            name: name.into(),
            args,
        }
    }

    /// Expect `name` to be emitted by `instance`, with no arguments until
    /// [`Self::with_args`] is called.
    pub fn on(instance: &ContractInstance, name: impl Into<String>) -> Self {
        Self::new(instance.address, name, Vec::new())
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = Value>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    /// Same name, same emitter and structurally equal arguments, in order.
    pub fn matches(&self, event: &EmittedEvent) -> bool {
        self.name == event.name && self.emitter == event.emitter && self.args == event.args
    }
}

impl fmt::Display for ExpectedEvent {
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

/// Invokes contract methods and checks the events they emit.
///
/// Each check is a single attempt; nothing is retried.
pub struct BehaviorVerifier<'n, N> {
    network: &'n N,
    confirmation_timeout: Duration,
}

impl<'n, N: Network> BehaviorVerifier<'n, N> {
    pub fn new(network: &'n N) -> Self {
        Self {
            network,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Send `call` to `instance` and require that `expected` is among the events
    /// it emitted.
    ///
    /// Fails with [`HarnessError::CallReverted`] when the call does not confirm
    /// successfully, and with [`HarnessError::EventMismatch`] when it does but no
    /// emitted event matches. A call whose method or arguments do not fit the
    /// contract ABI fails with [`HarnessError::InvalidArguments`] before anything
    /// is submitted.
    pub async fn verify_event_on_call(
        &self,
        instance: &ContractInstance,
        call: MethodCall,
        expected: &ExpectedEvent,
    ) -> Result<Receipt> {
        let receipt = instance
            .send(self.network, &call, self.confirmation_timeout)
            .await
            .inspect_err(|e| tracing::warn!(method = %call.method, error = %e, "Verification call failed"))?;

        if receipt.events.iter().any(|event| expected.matches(event)) {
            tracing::info!(
                event = %expected.name,
                emitter = %expected.emitter,
                tx_hash = %receipt.tx_hash,
                "Expected event observed"
            );
            return Ok(receipt);
        }

        tracing::warn!(
            expected = %expected,
            observed = receipt.events.len(),
            "Expected event not observed"
        );

        Err(HarnessError::EventMismatch {
            expected: Box::new(expected.clone()),
            observed: receipt.events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::U256;

    fn gift_sent(emitter: Address) -> EmittedEvent {
        EmittedEvent {
            emitter,
            name: "GiftSent".to_string(),
            args: vec![
                Value::Address(Address::repeat_byte(1)),
                Value::Address(Address::repeat_byte(2)),
                Value::Uint(U256::from(1000)),
                Value::from("hi"),
            ],
        }
    }

    fn expected(emitter: Address) -> ExpectedEvent {
        ExpectedEvent::new(emitter, "GiftSent", Vec::new()).with_args([
            Value::Address(Address::repeat_byte(1)),
            Value::Address(Address::repeat_byte(2)),
            Value::Uint(U256::from(1000)),
            Value::from("hi"),
        ])
    }

    #[test]
    fn test_matching_is_structural() {
        let emitter = Address::repeat_byte(7);
        assert!(expected(emitter).matches(&gift_sent(emitter)));
    }

    #[test]
    fn test_any_difference_breaks_the_match() {
        let emitter = Address::repeat_byte(7);
        let event = gift_sent(emitter);

        assert!(!expected(Address::repeat_byte(8)).matches(&event));

        let mut renamed = expected(emitter);
        renamed.name = "GiftReceived".to_string();
        assert!(!renamed.matches(&event));

        for i in 0..4 {
            let mut changed = expected(emitter);
            changed.args[i] = Value::from("other");
            assert!(!changed.matches(&event), "argument {i} changed but still matched");
        }

        let mut short = expected(emitter);
        short.args.pop();
        assert!(!short.matches(&event));
    }

    #[test]
    fn test_display() {
        let event = ExpectedEvent::new(Address::ZERO, "Ping", vec![Value::from(3u64)]);
        assert_eq!(
            event.to_string(),
            "Ping(3) from 0x0000000000000000000000000000000000000000"
        );
    }
}
