//! Typed argument values exchanged with contracts.
//!
//! Values compare structurally: two addresses are equal when their 20 bytes are
//! equal, whatever casing they were written with, and amounts are always held in
//! wei.

use std::fmt;
use std::str::FromStr;

use alloy_core::dyn_abi::DynSolType;
use alloy_core::dyn_abi::DynSolValue;
use alloy_core::primitives::utils::parse_ether;
use alloy_core::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// A single constructor, method or event argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Address(Address),
    Uint(U256),
    Bool(bool),
    String(String),
    Bytes(Bytes),
}

impl Value {
    /// Build a uint value from an ether amount such as `"1.0"`.
    pub fn ether(amount: &str) -> Result<Self, String> {
        parse_ether(amount)
            .map(Value::Uint)
            .map_err(|e| format!("invalid ether amount '{amount}': {e}"))
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Value::Address(addr) => Some(*addr),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<U256> {
        match self {
            Value::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this value can be passed where `ty` is expected.
    pub fn conforms_to(&self, ty: &DynSolType) -> bool {
        match (self, ty) {
            (Value::Address(_), DynSolType::Address) => true,
            (Value::Uint(v), DynSolType::Uint(bits)) => *bits >= 256 || v.bit_len() <= *bits,
            (Value::Bool(_), DynSolType::Bool) => true,
            (Value::String(_), DynSolType::String) => true,
            (Value::Bytes(_), DynSolType::Bytes) => true,
            (Value::Bytes(b), DynSolType::FixedBytes(size)) => b.len() == *size,
            _ => false,
        }
    }

    /// Convert into an ABI value of type `ty`.
    pub fn to_sol(&self, ty: &DynSolType) -> Result<DynSolValue, String> {
        if !self.conforms_to(ty) {
            return Err(format!("{self} is not a valid {ty}"));
        }

        Ok(match (self, ty) {
            (Value::Address(addr), _) => DynSolValue::Address(*addr),
            (Value::Uint(v), DynSolType::Uint(bits)) => DynSolValue::Uint(*v, *bits),
            (Value::Bool(b), _) => DynSolValue::Bool(*b),
            (Value::String(s), _) => DynSolValue::String(s.clone()),
            (Value::Bytes(b), DynSolType::FixedBytes(size)) => {
                let mut word = [0u8; 32];
                word[..*size].copy_from_slice(b);
                DynSolValue::FixedBytes(word.into(), *size)
            }
            (Value::Bytes(b), _) => DynSolValue::Bytes(b.to_vec()),
            (Value::Uint(_), other) => return Err(format!("{self} is not a valid {other}")),
        })
    }

    /// Convert a decoded ABI value back into a [`Value`].
    pub fn from_sol(value: DynSolValue) -> Result<Self, String> {
        match value {
            DynSolValue::Address(addr) => Ok(Value::Address(addr)),
            DynSolValue::Uint(v, _) => Ok(Value::Uint(v)),
            DynSolValue::Bool(b) => Ok(Value::Bool(b)),
            DynSolValue::String(s) => Ok(Value::String(s)),
            DynSolValue::Bytes(b) => Ok(Value::Bytes(b.into())),
            DynSolValue::FixedBytes(word, size) => {
                Ok(Value::Bytes(Bytes::copy_from_slice(&word[..size])))
            }
            other => Err(format!("unsupported ABI value: {other:?}")),
        }
    }

    /// Parse a textual literal as a value of type `ty`.
    ///
    /// Unsigned integers accept decimal, `0x` hex, or an ether amount with an
    /// `ether`/`eth` suffix (`"1.5 ether"`), which is normalized to wei.
    pub fn parse_as(text: &str, ty: &DynSolType) -> Result<Self, String> {
        let text = text.trim();
        let value = match ty {
            DynSolType::Address => Address::from_str(text)
                .map(Value::Address)
                .map_err(|e| format!("invalid address '{text}': {e}"))?,
            DynSolType::Uint(_) => parse_uint(text)?,
            DynSolType::Bool => bool::from_str(text)
                .map(Value::Bool)
                .map_err(|_| format!("invalid bool '{text}'"))?,
            DynSolType::String => Value::String(text.to_string()),
            DynSolType::Bytes | DynSolType::FixedBytes(_) => Bytes::from_str(text)
                .map(Value::Bytes)
                .map_err(|e| format!("invalid bytes '{text}': {e}"))?,
            other => return Err(format!("unsupported parameter type {other}")),
        };

        if value.conforms_to(ty) {
            Ok(value)
        } else {
            Err(format!("{value} does not fit in {ty}"))
        }
    }
}

fn parse_uint(text: &str) -> Result<Value, String> {
    for suffix in [" ether", " eth", "ether", "eth"] {
        if let Some(amount) = text.strip_suffix(suffix) {
            return Value::ether(amount.trim());
        }
    }

    U256::from_str(text)
        .map(Value::Uint)
        .map_err(|e| format!("invalid unsigned integer '{text}': {e}"))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Address(addr) => write!(f, "{addr}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "{b}"),
        }
    }
}

impl From<Address> for Value {
    fn from(addr: Address) -> Self {
        Value::Address(addr)
    }
}

impl From<U256> for Value {
    fn from(v: U256) -> Self {
        Value::Uint(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(U256::from(v))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_equality_ignores_casing() {
        let checksummed =
            Value::parse_as("0x70997970C51812dc3A010C7d01b50e0d17dc79C8", &DynSolType::Address)
                .unwrap();
        let lower =
            Value::parse_as("0x70997970c51812dc3a010c7d01b50e0d17dc79c8", &DynSolType::Address)
                .unwrap();
        assert_eq!(checksummed, lower);
    }

    #[test]
    fn test_parse_ether_amounts() {
        let one_eth = U256::from(1_000_000_000_000_000_000u128);
        assert_eq!(Value::ether("1.0").unwrap(), Value::Uint(one_eth));
        assert_eq!(
            Value::parse_as("1 ether", &DynSolType::Uint(256)).unwrap(),
            Value::Uint(one_eth)
        );
        assert_eq!(
            Value::parse_as("0.5eth", &DynSolType::Uint(256)).unwrap(),
            Value::Uint(one_eth / U256::from(2))
        );
        assert_eq!(
            Value::parse_as("1000000000000000000", &DynSolType::Uint(256)).unwrap(),
            Value::Uint(one_eth)
        );
    }

    #[test]
    fn test_parse_rejects_malformed_literals() {
        assert!(Value::parse_as("0x1234", &DynSolType::Address).is_err());
        assert!(Value::parse_as("yes", &DynSolType::Bool).is_err());
        assert!(Value::parse_as("-1", &DynSolType::Uint(256)).is_err());
        assert!(Value::parse_as("300", &DynSolType::Uint(8)).is_err());
    }

    #[test]
    fn test_conformance() {
        assert!(Value::from(5u64).conforms_to(&DynSolType::Uint(8)));
        assert!(!Value::from(256u64).conforms_to(&DynSolType::Uint(8)));
        assert!(!Value::from("text").conforms_to(&DynSolType::Address));
        assert!(Value::Address(Address::ZERO).conforms_to(&DynSolType::Address));
    }

    #[test]
    fn test_sol_conversion_keeps_uint_width() {
        let sol = Value::from(7u64).to_sol(&DynSolType::Uint(64)).unwrap();
        assert_eq!(sol, DynSolValue::Uint(U256::from(7), 64));
        assert_eq!(Value::from_sol(sol).unwrap(), Value::from(7u64));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from("A gift!").to_string(), "\"A gift!\"");
        assert_eq!(Value::from(42u64).to_string(), "42");
    }
}
