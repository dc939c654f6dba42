use alloy::primitives::{Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::error::GatewayError;

/// Arbitrary-precision, non-negative token or native-currency quantity.
///
/// Backed by a 256-bit unsigned integer, which is the widest quantity either
/// contract can hold. Always rendered as a decimal string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(pub U256);

impl Amount {
    pub const ZERO: Self = Self(U256::ZERO);
}

impl From<U256> for Amount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_amount(self))
    }
}

impl FromStr for Amount {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_amount(s)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_amount(self))
    }
}

/// Parses a `0x`-prefixed, 40 hex character address.
pub fn parse_address(address: &str) -> Result<Address, GatewayError> {
    if address.is_empty() {
        return Err(GatewayError::InvalidFormat(
            "address cannot be empty".to_string(),
        ));
    }

    let hex_part = address.strip_prefix("0x").ok_or_else(|| {
        GatewayError::InvalidFormat(format!("address '{}' must start with '0x'", address))
    })?;

    if hex_part.len() != 40 {
        return Err(GatewayError::InvalidFormat(format!(
            "address '{}' must have exactly 40 hex characters after '0x', got {}",
            address,
            hex_part.len()
        )));
    }

    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(GatewayError::InvalidFormat(format!(
            "address '{}' contains non-hexadecimal characters",
            address
        )));
    }

    let bytes = hex::decode(hex_part)
        .map_err(|e| GatewayError::InvalidFormat(format!("address '{}': {}", address, e)))?;
    Ok(Address::from_slice(&bytes))
}

/// Lower-case `0x` + 40 hex characters, no checksum casing.
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

pub fn format_hash(hash: &B256) -> String {
    format!("0x{}", hex::encode(hash.as_slice()))
}

/// Parses a non-negative decimal integer.
///
/// Leading zeros are accepted on input; values that do not fit in 256 bits
/// are rejected.
pub fn parse_amount(value: &str) -> Result<Amount, GatewayError> {
    if value.is_empty() {
        return Err(GatewayError::InvalidFormat(
            "amount cannot be empty".to_string(),
        ));
    }

    if !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(GatewayError::InvalidFormat(format!(
            "amount '{}' must contain only decimal digits",
            value
        )));
    }

    U256::from_str_radix(value, 10)
        .map(Amount)
        .map_err(|e| GatewayError::InvalidFormat(format!("amount '{}': {}", value, e)))
}

/// Canonical decimal rendering: no leading zeros, "0" for zero.
pub fn format_amount(amount: &Amount) -> String {
    amount.0.to_string()
}

/// Parses a hex secp256k1 private key, with or without a `0x` prefix.
pub fn parse_signing_key(key: &str) -> Result<PrivateKeySigner, GatewayError> {
    let key = key.trim();
    let key = key.strip_prefix("0x").unwrap_or(key);

    PrivateKeySigner::from_str(key)
        .map_err(|e| GatewayError::InvalidFormat(format!("invalid private key: {}", e)))
}

/// Narrows an on-chain uint to `u64`, used for timestamps.
pub fn u256_to_u64(value: U256, field: &str) -> Result<u64, GatewayError> {
    if value > U256::from(u64::MAX) {
        return Err(GatewayError::InvalidFormat(format!(
            "{} value {} does not fit in 64 bits",
            field, value
        )));
    }
    Ok(value.to::<u64>())
}

pub fn serialize_address<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_address(address))
}

pub fn serialize_hash<S: Serializer>(hash: &B256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_hash(hash))
}
