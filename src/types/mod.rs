// Common types shared by every adapter

pub mod conversions;

use num_bigint::BigInt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A block height paired with its unix timestamp (seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockReference {
    pub block_number: u64,
    pub block_timestamp: u64,
}

impl BlockReference {
    pub fn new(block_number: u64, block_timestamp: u64) -> Self {
        Self {
            block_number,
            block_timestamp,
        }
    }
}

impl std::fmt::Display for BlockReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match chrono::DateTime::from_timestamp(self.block_timestamp as i64, 0) {
            Some(ts) => write!(f, "#{} ({})", self.block_number, ts.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "#{} (ts={})", self.block_number, self.block_timestamp),
        }
    }
}

/// One address-keyed amount reported by a single source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceEntry {
    /// Lowercase hex address
    pub address: String,
    /// Amount in the token's smallest unit
    pub amount: BigInt,
}

impl BalanceEntry {
    pub fn new(address: &str, amount: BigInt) -> Self {
        Self {
            address: conversions::normalize_address(address),
            amount,
        }
    }
}

/// Final CSV row. Field order matches the output header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    pub block_number: u64,
    pub timestamp: u64,
    pub user_address: String,
    pub token_address: String,
    #[serde(serialize_with = "serialize_bigint")]
    pub token_balance: BigInt,
    pub token_symbol: String,
    pub usd_price: Decimal,
}

impl OutputRow {
    pub fn new(
        block: &BlockReference,
        user_address: &str,
        token_address: &str,
        token_balance: BigInt,
        token_symbol: &str,
    ) -> Self {
        Self {
            block_number: block.block_number,
            timestamp: block.block_timestamp,
            user_address: conversions::normalize_address(user_address),
            token_address: conversions::normalize_address(token_address),
            token_balance,
            token_symbol: token_symbol.to_string(),
            usd_price: Decimal::ZERO,
        }
    }

    /// Identity of a row for de-duplication: one row per (block, user, token).
    pub fn key(&self) -> (u64, &str, &str) {
        (self.block_number, &self.user_address, &self.token_address)
    }
}

// Plain base-10 digits; never scientific notation
fn serialize_bigint<S: serde::Serializer>(value: &BigInt, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&value.to_string())
}
