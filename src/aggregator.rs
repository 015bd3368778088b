//! # Multi-Source Balance Aggregator
//!
//! Merges several independently fetched address → amount series into a single
//! holder map. Amounts are `BigInt`s end to end; token quantities routinely exceed
//! 2^53 and carry 18-decimal scaling, so no floating point is involved anywhere.
//!
//! Addresses in the exclusion set (protocol contracts whose balances are not real
//! end-user holdings) are dropped before summing. Per-source subtotals are sent to
//! the reporter for cross-checking and never feed back into the merge.

use crate::reporter::{Reporter, RunEvent};
use crate::types::conversions::normalize_address;
use crate::types::{BalanceEntry, OutputRow};
use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::Zero;
use std::collections::{BTreeMap, HashSet};

/// All entries reported by one venue.
#[derive(Debug, Clone, Default)]
pub struct BalanceSource {
    pub name: String,
    pub entries: Vec<BalanceEntry>,
}

impl BalanceSource {
    pub fn new(name: &str, entries: Vec<BalanceEntry>) -> Self {
        Self {
            name: name.to_string(),
            entries,
        }
    }

    /// Sum of every entry, exclusions included.
    pub fn subtotal(&self) -> BigInt {
        self.entries.iter().map(|e| &e.amount).sum()
    }
}

/// Addresses dropped before a merge. Membership is case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    addresses: HashSet<String>,
}

impl ExclusionSet {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            addresses: addresses
                .into_iter()
                .map(|a| normalize_address(a.as_ref()))
                .collect(),
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.addresses.contains(&normalize_address(address))
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.addresses.iter()
    }
}

/// Address → grand total across all non-excluded sources, sorted by address.
pub type BalanceMap = BTreeMap<String, BigInt>;

pub fn merge(sources: &[BalanceSource], exclusions: &ExclusionSet, reporter: &dyn Reporter) -> BalanceMap {
    let mut totals = BalanceMap::new();

    for source in sources {
        reporter.report(RunEvent::SourceSubtotal {
            source: source.name.clone(),
            entries: source.entries.len(),
            total: source.subtotal(),
        });

        for entry in &source.entries {
            if exclusions.contains(&entry.address) {
                continue;
            }
            *totals
                .entry(normalize_address(&entry.address))
                .or_insert_with(BigInt::zero) += &entry.amount;
        }
    }

    totals
}

pub fn grand_total(balances: &BalanceMap) -> BigInt {
    balances.values().sum()
}

/// Sums rows sharing the same (block, user, token), keeping the position of the
/// first occurrence. Rows whose summed balance is zero are kept; dropping dust is
/// an adapter decision.
pub fn consolidate_rows(rows: Vec<OutputRow>) -> Vec<OutputRow> {
    let mut merged: IndexMap<(u64, String, String), OutputRow> = IndexMap::with_capacity(rows.len());

    for row in rows {
        let (block_number, user, token) = row.key();
        let key = (block_number, user.to_string(), token.to_string());
        match merged.get_mut(&key) {
            Some(existing) => existing.token_balance += &row.token_balance,
            None => {
                merged.insert(key, row);
            }
        }
    }

    merged.into_values().collect()
}
