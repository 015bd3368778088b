//! veNFT lock snapshot.
//!
//! Reads three rounds of multicalls pinned to the snapshot block:
//! `balanceOf(user)` for every user, `tokenOfOwnerByIndex(user, i)` for every
//! owned index, then `locked(tokenId)` for every token. Locked amounts are summed
//! per user into one row.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use ethers::abi::{AbiDecode, AbiEncode};
use ethers::types::{Address, Bytes, U256};
use log::debug;
use num_bigint::BigInt;
use num_traits::Zero;
use std::sync::Arc;

use crate::contracts::voting_escrow::{BalanceOfReturn, TokenOfOwnerByIndexReturn};
use crate::contracts::{BalanceOfCall, LockedCall, LockedReturn, TokenOfOwnerByIndexCall};
use crate::multicall::{BatchCaller, Call};
use crate::orchestrator::SubFetcher;
use crate::types::conversions::{address_to_string, i128_to_bigint};
use crate::types::{BlockReference, OutputRow};

// Sanity bound on balanceOf before it is used as a loop count
const MAX_TOKENS_PER_OWNER: u64 = 100_000;

pub struct VeNftAdapter {
    name: String,
    caller: Arc<dyn BatchCaller>,
    contract: Address,
    users: Vec<Address>,
    token_address: String,
    token_symbol: String,
}

impl VeNftAdapter {
    pub fn new(
        name: &str,
        caller: Arc<dyn BatchCaller>,
        contract: Address,
        users: Vec<Address>,
        token_address: &str,
        token_symbol: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            caller,
            contract,
            users,
            token_address: token_address.to_string(),
            token_symbol: token_symbol.to_string(),
        }
    }

    fn call(&self, call_data: Vec<u8>) -> Call {
        Call {
            target: self.contract,
            call_data: Bytes::from(call_data),
        }
    }

    async fn round<R: AbiDecode>(&self, label: &str, calls: Vec<Call>, block: u64) -> Result<Vec<R>> {
        let expected = calls.len();
        let results = self.caller.call_batch(calls, block).await?;
        if results.len() != expected {
            bail!("{}: {} returned {} results for {} calls", self.name, label, results.len(), expected);
        }
        results
            .into_iter()
            .enumerate()
            .map(|(i, data)| {
                let data = data.ok_or_else(|| anyhow!("{}: {} call #{} reverted", self.name, label, i))?;
                R::decode(data.as_ref()).with_context(|| format!("{}: bad {} result #{}", self.name, label, i))
            })
            .collect()
    }

    /// Total locked amount per configured user, in configuration order.
    pub async fn locked_by_user(&self, block: u64) -> Result<Vec<(Address, BigInt)>> {
        let balance_calls = self
            .users
            .iter()
            .map(|&owner| self.call(BalanceOfCall { owner }.encode()))
            .collect();
        let counts: Vec<BalanceOfReturn> = self.round("balanceOf", balance_calls, block).await?;

        let mut owners = Vec::new();
        let mut index_calls = Vec::new();
        for (user_idx, (&owner, count)) in self.users.iter().zip(&counts).enumerate() {
            if count.0 > U256::from(MAX_TOKENS_PER_OWNER) {
                bail!("{}: implausible balanceOf {} for {:?}", self.name, count.0, owner);
            }
            for index in 0..count.0.as_u64() {
                owners.push(user_idx);
                index_calls.push(self.call(
                    TokenOfOwnerByIndexCall {
                        owner,
                        index: U256::from(index),
                    }
                    .encode(),
                ));
            }
        }
        debug!("[{}] {} users own {} veNFTs", self.name, self.users.len(), index_calls.len());

        let token_ids: Vec<TokenOfOwnerByIndexReturn> =
            self.round("tokenOfOwnerByIndex", index_calls, block).await?;
        let locked_calls = token_ids
            .iter()
            .map(|id| self.call(LockedCall { token_id: id.0 }.encode()))
            .collect();
        let locks: Vec<LockedReturn> = self.round("locked", locked_calls, block).await?;

        let mut totals = vec![BigInt::zero(); self.users.len()];
        for (user_idx, lock) in owners.into_iter().zip(locks) {
            totals[user_idx] += i128_to_bigint(lock.amount);
        }
        Ok(self.users.iter().copied().zip(totals).collect())
    }
}

#[async_trait]
impl SubFetcher for VeNftAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, block: &BlockReference) -> Result<Vec<OutputRow>> {
        let totals = self.locked_by_user(block.block_number).await?;
        Ok(totals
            .into_iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(user, amount)| {
                OutputRow::new(
                    block,
                    &address_to_string(user),
                    &self.token_address,
                    amount,
                    &self.token_symbol,
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::IVotingEscrowCalls;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory escrow: owner → [(token id, locked amount)].
    struct FakeEscrow {
        holdings: HashMap<Address, Vec<(u64, i128)>>,
        batches: Mutex<Vec<usize>>,
        revert_locked: bool,
    }

    impl FakeEscrow {
        fn answer(&self, data: &[u8]) -> Option<Bytes> {
            let encoded = match IVotingEscrowCalls::decode(data).ok()? {
                IVotingEscrowCalls::BalanceOf(c) => {
                    let n = self.holdings.get(&c.owner).map_or(0, |t| t.len());
                    BalanceOfReturn(U256::from(n)).encode()
                }
                IVotingEscrowCalls::TokenOfOwnerByIndex(c) => {
                    let (id, _) = self.holdings.get(&c.owner)?[c.index.as_usize()];
                    TokenOfOwnerByIndexReturn(U256::from(id)).encode()
                }
                IVotingEscrowCalls::Locked(c) => {
                    if self.revert_locked {
                        return None;
                    }
                    let amount = self
                        .holdings
                        .values()
                        .flatten()
                        .find(|(id, _)| U256::from(*id) == c.token_id)
                        .map(|(_, amount)| *amount)?;
                    LockedReturn {
                        amount,
                        end: U256::from(1_900_000_000u64),
                    }
                    .encode()
                }
            };
            Some(Bytes::from(encoded))
        }
    }

    #[async_trait]
    impl BatchCaller for FakeEscrow {
        async fn call_batch(&self, calls: Vec<Call>, _block: u64) -> Result<Vec<Option<Bytes>>> {
            self.batches.lock().unwrap().push(calls.len());
            Ok(calls.iter().map(|c| self.answer(&c.call_data)).collect())
        }
    }

    fn user(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn escrow(revert_locked: bool) -> Arc<FakeEscrow> {
        Arc::new(FakeEscrow {
            holdings: HashMap::from([
                (user(1), vec![(11, 100), (12, 250)]),
                (user(2), vec![(21, 7)]),
            ]),
            batches: Mutex::new(Vec::new()),
            revert_locked,
        })
    }

    fn adapter(caller: Arc<FakeEscrow>) -> VeNftAdapter {
        VeNftAdapter::new(
            "zerolend-venft",
            caller,
            user(0xe5c0),
            vec![user(1), user(2), user(3)],
            "0x78354f8dccb269a615a7e0a24f9b0718fdc3c7a7",
            "ZERO",
        )
    }

    #[tokio::test]
    async fn test_locked_amounts_summed_per_user() {
        let fake = escrow(false);
        let rows = adapter(fake.clone()).fetch(&BlockReference::new(5, 6)).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].user_address, address_to_string(user(1)));
        assert_eq!(rows[0].token_balance, BigInt::from(350));
        assert_eq!(rows[1].token_balance, BigInt::from(7));
        // balanceOf x3, tokenOfOwnerByIndex x3, locked x3
        assert_eq!(*fake.batches.lock().unwrap(), vec![3, 3, 3]);
    }

    #[tokio::test]
    async fn test_reverted_call_fails_the_block() {
        let err = adapter(escrow(true)).fetch(&BlockReference::new(5, 6)).await.unwrap_err();
        assert!(err.to_string().contains("locked"));
    }
}
