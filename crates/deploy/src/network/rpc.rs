//! JSON-RPC backend for development nodes with unlocked accounts.

use std::time::Duration;

use alloy_core::dyn_abi::{DynSolType, Specifier};
use alloy_core::json_abi::Event;
use alloy_core::primitives::{Address, B256, Bytes, U64};
use serde::Deserialize;
use url::Url;

use super::abi::{self, decode_params, from_sol_values};
use super::{EmittedEvent, Network, NetworkError, Receipt, Signer, TxKind, TxRequest, TxStatus};
use crate::blueprint::ContractBlueprint;
use crate::rpc::{self, RpcError};
use crate::value::Value;

/// Default time to wait for a transaction receipt.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// A network reached over Ethereum JSON-RPC.
///
/// Transactions are submitted with `eth_sendTransaction`, so the signing accounts
/// must be unlocked on the node, which is the default for Hardhat and Anvil.
#[derive(Debug, Clone)]
pub struct RpcNetwork {
    client: reqwest::Client,
    url: Url,
    receipt_timeout: Duration,
}

/// Receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    status: Option<U64>,
    contract_address: Option<Address>,
    gas_used: U64,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

#[derive(Debug, Deserialize)]
struct RpcLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
}

impl From<RpcError> for NetworkError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Transport { .. } => NetworkError::Unreachable(err.to_string()),
            RpcError::Timeout { after, .. } => NetworkError::Timeout(after),
            RpcError::Response { message, .. } => NetworkError::Rejected(message),
            RpcError::Decode { .. } => NetworkError::Decode(err.to_string()),
        }
    }
}

impl RpcNetwork {
    pub fn new(url: Url) -> Result<Self, NetworkError> {
        Ok(Self {
            client: rpc::create_client()?,
            url,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        })
    }

    /// Set how long [`Network::send`] polls for a receipt.
    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T, NetworkError> {
        Ok(rpc::json_rpc_call(&self.client, self.url.as_str(), method, params).await?)
    }
}

/// Destination and input data of a transaction.
fn encode_input(kind: &TxKind) -> Result<(Option<Address>, Vec<u8>), NetworkError> {
    match kind {
        TxKind::Create { blueprint, args } => {
            if blueprint.bytecode.is_empty() {
                return Err(NetworkError::Unsupported(format!(
                    "blueprint {} has no creation bytecode",
                    blueprint.name
                )));
            }

            let mut data = blueprint.bytecode.to_vec();
            data.extend_from_slice(&abi::encode_constructor_args(blueprint, args)?);
            Ok((None, data))
        }
        TxKind::Call {
            to,
            blueprint,
            method,
            args,
        } => Ok((Some(*to), abi::encode_call(blueprint, method, args)?)),
    }
}

/// Decode a log against `event`, restoring the declared argument order.
///
/// Indexed dynamic values (strings, bytes) only survive as their keccak hash in
/// the topic and are returned as 32 raw bytes.
fn decode_log(event: &Event, topics: &[B256], data: &[u8]) -> Result<Vec<Value>, NetworkError> {
    let mut indexed_topics = topics.iter().skip(1);
    let mut body_types = Vec::new();
    let mut slots = Vec::with_capacity(event.inputs.len());

    for input in &event.inputs {
        let ty: DynSolType = input
            .resolve()
            .map_err(|e| NetworkError::Decode(e.to_string()))?;

        if input.indexed {
            let topic = indexed_topics.next().ok_or_else(|| {
                NetworkError::Decode(format!("missing topic for {}.{}", event.name, input.name))
            })?;

            let value = if ty.is_dynamic() {
                Value::Bytes(Bytes::copy_from_slice(topic.as_slice()))
            } else {
                let decoded = ty
                    .abi_decode(topic.as_slice())
                    .map_err(|e| NetworkError::Decode(e.to_string()))?;
                Value::from_sol(decoded).map_err(NetworkError::Decode)?
            };
            slots.push(Some(value));
        } else {
            body_types.push(ty);
            slots.push(None);
        }
    }

    let mut body = from_sol_values(decode_params(body_types, data)?)?.into_iter();

    slots
        .into_iter()
        .map(|slot| match slot {
            Some(value) => Ok(value),
            None => body
                .next()
                .ok_or_else(|| NetworkError::Decode(format!("short data for {}", event.name))),
        })
        .collect()
}

/// Decode the logs that belong to an event of `blueprint`, skipping the others.
fn decode_events(blueprint: &ContractBlueprint, logs: &[RpcLog]) -> Vec<EmittedEvent> {
    let mut events = Vec::new();

    for log in logs {
        let Some(topic0) = log.topics.first() else {
            continue;
        };

        let Some(event) = blueprint
            .abi
            .events()
            .find(|e| !e.anonymous && e.selector() == *topic0)
        else {
            tracing::trace!(emitter = %log.address, topic = %topic0, "Skipping log with unknown event");
            continue;
        };

        match decode_log(event, &log.topics, &log.data) {
            Ok(args) => events.push(EmittedEvent {
                emitter: log.address,
                name: event.name.clone(),
                args,
            }),
            Err(e) => {
                tracing::warn!(event = %event.name, error = %e, "Failed to decode log");
            }
        }
    }

    events
}

impl Network for RpcNetwork {
    async fn chain_id(&self) -> Result<u64, NetworkError> {
        let id: U64 = self.call("eth_chainId", vec![]).await?;
        Ok(id.to())
    }

    async fn signers(&self) -> Result<Vec<Signer>, NetworkError> {
        let accounts: Vec<Address> = self.call("eth_accounts", vec![]).await?;
        Ok(accounts
            .into_iter()
            .enumerate()
            .map(|(index, address)| Signer { index, address })
            .collect())
    }

    async fn send(&self, tx: TxRequest) -> Result<Receipt, NetworkError> {
        let (to, data) = encode_input(&tx.kind)?;

        let mut request = serde_json::json!({
            "from": tx.from,
            "data": format!("0x{}", hex::encode(&data)),
            "value": tx.value,
        });
        if let Some(to) = to {
            request["to"] = serde_json::json!(to);
        }
        if let Some(gas) = tx.gas_limit {
            request["gas"] = serde_json::json!(U64::from(gas));
        }

        let tx_hash: B256 = self.call("eth_sendTransaction", vec![request]).await?;
        tracing::debug!(tx_hash = %tx_hash, from = %tx.from, "Transaction submitted");

        let receipt: RpcReceipt =
            rpc::wait_for("transaction receipt", self.receipt_timeout, || async {
                rpc::json_rpc_call::<Option<RpcReceipt>>(
                    &self.client,
                    self.url.as_str(),
                    "eth_getTransactionReceipt",
                    vec![serde_json::json!(tx_hash)],
                )
                .await
            })
            .await?;

        let gas_used: u64 = receipt.gas_used.to();
        let status = match receipt.status.map(|s| s.to::<u64>()) {
            Some(0) => match tx.gas_limit {
                Some(limit) if gas_used >= limit => TxStatus::OutOfGas {
                    limit,
                    required: gas_used,
                },
                _ => TxStatus::Reverted("execution reverted".to_string()),
            },
            _ => TxStatus::Success,
        };

        let blueprint = match &tx.kind {
            TxKind::Create { blueprint, .. } | TxKind::Call { blueprint, .. } => blueprint,
        };
        let events = if status == TxStatus::Success {
            decode_events(blueprint, &receipt.logs)
        } else {
            Vec::new()
        };

        Ok(Receipt {
            tx_hash: receipt.transaction_hash,
            status,
            contract_address: receipt.contract_address,
            events,
            gas_used,
        })
    }

    async fn read(
        &self,
        to: Address,
        blueprint: &ContractBlueprint,
        method: &str,
        args: &[Value],
    ) -> Result<Vec<Value>, NetworkError> {
        let data = abi::encode_call(blueprint, method, args)?;
        let output: Bytes = self
            .call(
                "eth_call",
                vec![
                    serde_json::json!({ "to": to, "data": format!("0x{}", hex::encode(&data)) }),
                    serde_json::json!("latest"),
                ],
            )
            .await?;

        let function = blueprint
            .function(method)
            .map_err(|e| NetworkError::Rejected(e.to_string()))?;
        let types = function
            .outputs
            .iter()
            .map(|p| p.resolve().map_err(|e| NetworkError::Decode(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        from_sol_values(decode_params(types, &output)?)
    }

    async fn code_exists(&self, address: Address) -> Result<bool, NetworkError> {
        let code: Bytes = self
            .call(
                "eth_getCode",
                vec![serde_json::json!(address), serde_json::json!("latest")],
            )
            .await?;
        Ok(!code.is_empty())
    }
}
