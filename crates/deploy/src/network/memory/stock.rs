//! Stand-ins for the stock contracts.
//!
//! They expose the constructor shapes of the compiled contracts and the little
//! observable behavior the harness checks: `Custody` remembers its ledger, and
//! `LiveGifts` forwards a gift to its receiver and emits `GiftSent`.

use std::sync::Arc;

use alloy_core::primitives::Address;

use super::{CallContext, ContractLogic, MemoryNetworkBuilder, Revert};
use crate::blueprint::{BlueprintRegistry, ContractBlueprint};
use crate::value::Value;

pub const M1_ECDSA: &str = "M1_ECDSA";
pub const ACCOUNT_LEDGER: &str = "AccountLedger";
pub const CUSTODY: &str = "Custody";
pub const LIVE_GIFTS: &str = "LiveGifts";

const CUSTODY_ABI: &[&str] = &[
    "constructor(address ledger)",
    "function ledger() view returns (address)",
];

const LIVE_GIFTS_ABI: &[&str] = &[
    "function sendGift(address receiver, string message) payable",
    "event GiftSent(address indexed sender, address indexed receiver, uint256 amount, string message)",
];

fn blueprints() -> anyhow::Result<Vec<ContractBlueprint>> {
    Ok(vec![
        ContractBlueprint::from_signatures(M1_ECDSA, &[])?,
        ContractBlueprint::from_signatures(ACCOUNT_LEDGER, &[])?,
        ContractBlueprint::from_signatures(CUSTODY, CUSTODY_ABI)?,
        ContractBlueprint::from_signatures(LIVE_GIFTS, LIVE_GIFTS_ABI)?,
    ])
}

/// Blueprints of the stock contracts, as the in-memory network knows them.
pub fn stock_registry() -> anyhow::Result<BlueprintRegistry> {
    Ok(blueprints()?
        .into_iter()
        .fold(BlueprintRegistry::new(), BlueprintRegistry::with))
}

pub(super) fn register(builder: MemoryNetworkBuilder) -> anyhow::Result<MemoryNetworkBuilder> {
    let mut builder = builder;
    for blueprint in blueprints()? {
        let factory: super::LogicFactory = match blueprint.name.as_str() {
            CUSTODY => Arc::new(new_custody),
            LIVE_GIFTS => Arc::new(new_live_gifts),
            _ => Arc::new(new_inert),
        };
        builder = builder.contract(blueprint, factory);
    }
    Ok(builder)
}

/// A contract without callable surface.
struct Inert;

impl ContractLogic for Inert {
    fn call(&mut self, _: &mut CallContext, method: &str, _: &[Value]) -> Result<(), Revert> {
        Err(Revert::new(format!("unknown method {method}")))
    }
}

fn new_inert(_: &mut CallContext, _: &[Value]) -> Result<Box<dyn ContractLogic>, Revert> {
    Ok(Box::new(Inert))
}

struct Custody {
    ledger: Address,
}

fn new_custody(_: &mut CallContext, args: &[Value]) -> Result<Box<dyn ContractLogic>, Revert> {
    let ledger = args
        .first()
        .and_then(Value::as_address)
        .ok_or_else(|| Revert::new("ledger address required"))?;

    if ledger == Address::ZERO {
        return Err(Revert::new("ledger is the zero address"));
    }

    Ok(Box::new(Custody { ledger }))
}

impl ContractLogic for Custody {
    fn call(&mut self, _: &mut CallContext, method: &str, _: &[Value]) -> Result<(), Revert> {
        Err(Revert::new(format!("unknown method {method}")))
    }

    fn view(&self, method: &str, _: &[Value]) -> Result<Vec<Value>, Revert> {
        match method {
            "ledger" => Ok(vec![Value::Address(self.ledger)]),
            other => Err(Revert::new(format!("no view function {other}"))),
        }
    }
}

struct LiveGifts;

fn new_live_gifts(_: &mut CallContext, _: &[Value]) -> Result<Box<dyn ContractLogic>, Revert> {
    Ok(Box::new(LiveGifts))
}

impl ContractLogic for LiveGifts {
    fn call(&mut self, ctx: &mut CallContext, method: &str, args: &[Value]) -> Result<(), Revert> {
        if method != "sendGift" {
            return Err(Revert::new(format!("unknown method {method}")));
        }

        let (Some(receiver), Some(message)) = (
            args.first().and_then(Value::as_address),
            args.get(1).and_then(Value::as_str),
        ) else {
            return Err(Revert::new("sendGift(address,string) arguments required"));
        };

        if receiver == Address::ZERO {
            return Err(Revert::new("invalid receiver"));
        }
        if ctx.value.is_zero() {
            return Err(Revert::new("gift value required"));
        }

        let message = message.to_string();
        let (sender, amount) = (ctx.sender, ctx.value);
        ctx.transfer(receiver, amount);
        ctx.emit(
            "GiftSent",
            vec![
                Value::Address(sender),
                Value::Address(receiver),
                Value::Uint(amount),
                Value::String(message),
            ],
        );

        Ok(())
    }
}
