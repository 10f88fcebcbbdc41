//! In-memory network used for tests and dry runs.
//!
//! The ledger keeps balances, nonces and deployed contracts. Contract behavior is
//! supplied by native [`ContractLogic`] stand-ins registered per blueprint name;
//! nothing here executes bytecode.

mod stock;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use alloy_core::json_abi::StateMutability;
use alloy_core::primitives::utils::parse_ether;
use alloy_core::primitives::{Address, B256, U256, keccak256};
use alloy_signer_local::MnemonicBuilder;
use alloy_signer_local::coins_bip39::English;
use anyhow::Context;
use thiserror::Error;
use tokio::sync::Mutex;

pub use stock::{ACCOUNT_LEDGER, CUSTODY, LIVE_GIFTS, M1_ECDSA, stock_registry};

use super::abi;
use super::{EmittedEvent, Network, NetworkError, Receipt, Signer, TxKind, TxRequest, TxStatus};
use crate::blueprint::{BlueprintName, BlueprintRegistry, ContractBlueprint};
use crate::value::Value;

/// Mnemonic of the well-known development accounts.
pub const DEV_MNEMONIC: &str = "test test test test test test test test test test test junk";

/// Chain ID used by local development networks.
pub const DEFAULT_CHAIN_ID: u64 = 31337;

/// Number of development accounts derived by default.
pub const DEFAULT_ACCOUNT_COUNT: usize = 20;

/// Balance of each development account, in ether.
const DEFAULT_BALANCE_ETH: &str = "10000";

const TX_BASE_GAS: u64 = 21_000;
const CREATE_GAS: u64 = 32_000;
const CALLDATA_BYTE_GAS: u64 = 16;

/// A contract-level rejection, carrying the revert reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct Revert(pub String);

impl Revert {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Execution context of a constructor or a state-changing call.
#[derive(Debug)]
pub struct CallContext {
    pub sender: Address,
    /// Value attached to the transaction, in wei.
    pub value: U256,
    /// Address of the executing contract.
    pub this: Address,
    events: Vec<(String, Vec<Value>)>,
    transfers: Vec<(Address, U256)>,
}

impl CallContext {
    fn new(sender: Address, value: U256, this: Address) -> Self {
        Self {
            sender,
            value,
            this,
            events: Vec::new(),
            transfers: Vec::new(),
        }
    }

    /// Record an event emitted by the executing contract.
    pub fn emit(&mut self, name: &str, args: Vec<Value>) {
        self.events.push((name.to_string(), args));
    }

    /// Send `amount` wei from the executing contract to `to`.
    pub fn transfer(&mut self, to: Address, amount: U256) {
        self.transfers.push((to, amount));
    }
}

/// Native behavior of a deployed contract.
pub trait ContractLogic: Send + Sync {
    /// Execute a state-changing method.
    fn call(&mut self, ctx: &mut CallContext, method: &str, args: &[Value]) -> Result<(), Revert>;

    /// Execute a read-only method.
    fn view(&self, method: &str, _args: &[Value]) -> Result<Vec<Value>, Revert> {
        Err(Revert::new(format!("no view function {method}")))
    }
}

/// Builds the logic of a new contract from its constructor context and arguments.
pub type LogicFactory =
    Arc<dyn Fn(&mut CallContext, &[Value]) -> Result<Box<dyn ContractLogic>, Revert> + Send + Sync>;

#[derive(Debug, Clone, Default)]
struct Account {
    balance: U256,
    nonce: u64,
}

struct Deployed {
    blueprint: Arc<ContractBlueprint>,
    logic: Box<dyn ContractLogic>,
}

#[derive(Default)]
struct Ledger {
    block: u64,
    accounts: HashMap<Address, Account>,
    contracts: HashMap<Address, Deployed>,
}

/// Builder for a [`MemoryNetwork`].
pub struct MemoryNetworkBuilder {
    chain_id: u64,
    account_count: usize,
    initial_balance: Option<U256>,
    confirmation_delay: Duration,
    contracts: Vec<(ContractBlueprint, LogicFactory)>,
}

impl Default for MemoryNetworkBuilder {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            account_count: DEFAULT_ACCOUNT_COUNT,
            initial_balance: None,
            confirmation_delay: Duration::ZERO,
            contracts: Vec::new(),
        }
    }
}

impl MemoryNetworkBuilder {
    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Number of development accounts to derive from [`DEV_MNEMONIC`].
    pub fn accounts(mut self, count: usize) -> Self {
        self.account_count = count;
        self
    }

    /// Starting balance of every development account, in wei.
    pub fn initial_balance(mut self, balance: U256) -> Self {
        self.initial_balance = Some(balance);
        self
    }

    /// Delay before each transaction is confirmed.
    pub fn confirmation_delay(mut self, delay: Duration) -> Self {
        self.confirmation_delay = delay;
        self
    }

    /// Register a blueprint together with the stand-in that implements it.
    pub fn contract(mut self, blueprint: ContractBlueprint, factory: LogicFactory) -> Self {
        self.contracts.push((blueprint, factory));
        self
    }

    /// Register the stand-ins for `M1_ECDSA`, `AccountLedger`, `Custody` and `LiveGifts`.
    pub fn stock_contracts(self) -> anyhow::Result<Self> {
        stock::register(self)
    }

    pub fn build(self) -> anyhow::Result<MemoryNetwork> {
        let balance = match self.initial_balance {
            Some(balance) => balance,
            None => parse_ether(DEFAULT_BALANCE_ETH).context("Invalid default balance")?,
        };

        let mut signers = Vec::with_capacity(self.account_count);
        let mut ledger = Ledger::default();

        for index in 0..self.account_count {
            let derivation_index = u32::try_from(index).context("Too many accounts requested")?;
            let wallet = MnemonicBuilder::<English>::default()
                .phrase(DEV_MNEMONIC)
                .index(derivation_index)
                .context("Invalid account derivation index")?
                .build()
                .context("Failed to derive development account")?;

            let address = wallet.address();
            ledger.accounts.insert(
                address,
                Account {
                    balance,
                    nonce: 0,
                },
            );
            signers.push(Signer { index, address });
        }

        let mut blueprints = BlueprintRegistry::new();
        let mut logic = HashMap::new();
        for (blueprint, factory) in self.contracts {
            logic.insert(blueprint.name.clone(), factory);
            blueprints.insert(blueprint);
        }

        tracing::debug!(
            chain_id = self.chain_id,
            accounts = signers.len(),
            contracts = blueprints.len(),
            "In-memory network ready"
        );

        Ok(MemoryNetwork {
            chain_id: self.chain_id,
            signers,
            blueprints,
            logic,
            confirmation_delay: self.confirmation_delay,
            reachable: AtomicBool::new(true),
            ledger: Mutex::new(ledger),
        })
    }
}

/// An in-memory ledger implementing [`Network`].
pub struct MemoryNetwork {
    chain_id: u64,
    signers: Vec<Signer>,
    blueprints: BlueprintRegistry,
    logic: HashMap<BlueprintName, LogicFactory>,
    confirmation_delay: Duration,
    reachable: AtomicBool,
    ledger: Mutex<Ledger>,
}

impl MemoryNetwork {
    pub fn builder() -> MemoryNetworkBuilder {
        MemoryNetworkBuilder::default()
    }

    /// A network with the default accounts and the stock stand-ins.
    pub fn with_stock_contracts() -> anyhow::Result<Self> {
        Self::builder().stock_contracts()?.build()
    }

    /// Blueprints that have a stand-in on this network.
    pub fn blueprints(&self) -> &BlueprintRegistry {
        &self.blueprints
    }

    /// Simulate losing (or regaining) the connection to the network.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub async fn balance_of(&self, address: Address) -> U256 {
        self.ledger
            .lock()
            .await
            .accounts
            .get(&address)
            .map(|a| a.balance)
            .unwrap_or_default()
    }

    pub async fn block_number(&self) -> u64 {
        self.ledger.lock().await.block
    }

    fn ensure_reachable(&self) -> Result<(), NetworkError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(NetworkError::Unreachable(
                "in-memory network is offline".to_string(),
            ))
        }
    }

    fn required_gas(tx: &TxRequest) -> Result<u64, NetworkError> {
        let (calldata, create) = match &tx.kind {
            TxKind::Create { blueprint, args } => {
                let mut data = blueprint.bytecode.to_vec();
                data.extend(abi::encode_constructor_args(blueprint, args)?);
                (data, true)
            }
            TxKind::Call {
                blueprint,
                method,
                args,
                ..
            } => (abi::encode_call(blueprint, method, args)?, false),
        };

        let mut gas = TX_BASE_GAS + CALLDATA_BYTE_GAS * calldata.len() as u64;
        if create {
            gas += CREATE_GAS;
        }
        Ok(gas)
    }
}

fn tx_hash(chain_id: u64, from: Address, nonce: u64) -> B256 {
    let mut preimage = Vec::with_capacity(36);
    preimage.extend_from_slice(&chain_id.to_be_bytes());
    preimage.extend_from_slice(from.as_slice());
    preimage.extend_from_slice(&nonce.to_be_bytes());
    keccak256(preimage)
}

fn is_payable(mutability: StateMutability) -> bool {
    mutability == StateMutability::Payable
}

impl Ledger {
    /// Move `value` from `sender` into `this`, then pay out the transfers the
    /// contract requested. All-or-nothing.
    fn settle(
        &mut self,
        sender: Address,
        this: Address,
        value: U256,
        transfers: &[(Address, U256)],
    ) -> Result<(), Revert> {
        let available = self
            .accounts
            .get(&this)
            .map(|a| a.balance)
            .unwrap_or_default()
            + value;
        let outgoing = transfers
            .iter()
            .try_fold(U256::ZERO, |acc, (_, amount)| acc.checked_add(*amount))
            .ok_or_else(|| Revert::new("transfer amount overflow"))?;
        if outgoing > available {
            return Err(Revert::new("insufficient contract balance for transfer"));
        }

        let payer = self.accounts.entry(sender).or_default();
        payer.balance -= value;
        self.accounts.entry(this).or_default().balance = available - outgoing;
        for (to, amount) in transfers {
            self.accounts.entry(*to).or_default().balance += *amount;
        }

        Ok(())
    }
}

impl Network for MemoryNetwork {
    async fn chain_id(&self) -> Result<u64, NetworkError> {
        self.ensure_reachable()?;
        Ok(self.chain_id)
    }

    async fn signers(&self) -> Result<Vec<Signer>, NetworkError> {
        self.ensure_reachable()?;
        Ok(self.signers.clone())
    }

    async fn send(&self, tx: TxRequest) -> Result<Receipt, NetworkError> {
        self.ensure_reachable()?;
        let required = Self::required_gas(&tx)?;

        if !self.confirmation_delay.is_zero() {
            tokio::time::sleep(self.confirmation_delay).await;
        }

        let mut ledger = self.ledger.lock().await;

        let factory = match &tx.kind {
            TxKind::Create { blueprint, .. } => Some(
                self.logic
                    .get(&blueprint.name)
                    .cloned()
                    .ok_or_else(|| {
                        NetworkError::Unsupported(format!(
                            "no in-memory implementation for {}",
                            blueprint.name
                        ))
                    })?,
            ),
            TxKind::Call { .. } => None,
        };

        let account = ledger.accounts.get_mut(&tx.from).ok_or_else(|| {
            NetworkError::Rejected(format!("unknown account {}", tx.from))
        })?;
        if account.balance < tx.value {
            return Err(NetworkError::Rejected(format!(
                "insufficient funds for value {} from {}",
                tx.value, tx.from
            )));
        }

        let nonce = account.nonce;
        account.nonce += 1;
        ledger.block += 1;
        let hash = tx_hash(self.chain_id, tx.from, nonce);

        if let Some(limit) = tx.gas_limit.filter(|limit| *limit < required) {
            tracing::debug!(tx_hash = %hash, limit, required, "Transaction ran out of gas");
            return Ok(Receipt {
                tx_hash: hash,
                status: TxStatus::OutOfGas { limit, required },
                contract_address: None,
                events: Vec::new(),
                gas_used: limit,
            });
        }

        let outcome = match (tx.kind, factory) {
            (TxKind::Create { blueprint, args }, Some(factory)) => {
                let this = tx.from.create(nonce);
                let payable = blueprint
                    .abi
                    .constructor
                    .as_ref()
                    .is_some_and(|c| is_payable(c.state_mutability));

                let mut ctx = CallContext::new(tx.from, tx.value, this);
                let result = if !tx.value.is_zero() && !payable {
                    Err(Revert::new("constructor is not payable"))
                } else {
                    factory(&mut ctx, &args)
                };

                result
                    .and_then(|logic| {
                        ledger.settle(tx.from, this, tx.value, &ctx.transfers)?;
                        ledger.contracts.insert(this, Deployed { blueprint, logic });
                        Ok(())
                    })
                    .map(|()| (Some(this), this, ctx.events))
            }
            (TxKind::Call {
                to, method, args, ..
            }, _) => {
                let mut ctx = CallContext::new(tx.from, tx.value, to);
                let Ledger { contracts, .. } = &mut *ledger;

                let result = match contracts.get_mut(&to) {
                    None => Err(Revert::new(format!("no contract deployed at {to}"))),
                    Some(deployed) => match deployed.blueprint.function(&method) {
                        Err(_) => Err(Revert::new(format!("unknown method {method}"))),
                        Ok(f) if !tx.value.is_zero() && !is_payable(f.state_mutability) => {
                            Err(Revert::new(format!("{method} is not payable")))
                        }
                        Ok(_) => deployed.logic.call(&mut ctx, &method, &args),
                    },
                };

                result
                    .and_then(|()| ledger.settle(tx.from, to, tx.value, &ctx.transfers))
                    .map(|()| (None, to, ctx.events))
            }
            (TxKind::Create { blueprint, .. }, None) => {
                return Err(NetworkError::Unsupported(format!(
                    "no in-memory implementation for {}",
                    blueprint.name
                )));
            }
        };

        let receipt = match outcome {
            Ok((contract_address, emitter, events)) => Receipt {
                tx_hash: hash,
                status: TxStatus::Success,
                contract_address,
                events: events
                    .into_iter()
                    .map(|(name, args)| EmittedEvent {
                        emitter,
                        name,
                        args,
                    })
                    .collect(),
                gas_used: required,
            },
            Err(revert) => {
                tracing::debug!(tx_hash = %hash, reason = %revert, "Transaction reverted");
                Receipt {
                    tx_hash: hash,
                    status: TxStatus::Reverted(revert.0),
                    contract_address: None,
                    events: Vec::new(),
                    gas_used: required,
                }
            }
        };

        Ok(receipt)
    }

    async fn read(
        &self,
        to: Address,
        _blueprint: &ContractBlueprint,
        method: &str,
        args: &[Value],
    ) -> Result<Vec<Value>, NetworkError> {
        self.ensure_reachable()?;
        let ledger = self.ledger.lock().await;

        let deployed = ledger
            .contracts
            .get(&to)
            .ok_or_else(|| NetworkError::Rejected(format!("no contract deployed at {to}")))?;

        deployed
            .logic
            .view(method, args)
            .map_err(|revert| NetworkError::Rejected(format!("execution reverted: {revert}")))
    }

    async fn code_exists(&self, address: Address) -> Result<bool, NetworkError> {
        self.ensure_reachable()?;
        Ok(self.ledger.lock().await.contracts.contains_key(&address))
    }
}
