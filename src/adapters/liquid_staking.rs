//! # Liquid-Staking Holder Snapshot
//!
//! A liquid-staking token is held directly by users and also indirectly through
//! venues (Pendle SY, Balancer pools, yield tokenizers...). The venue contracts
//! show up as large direct holders, so they go in the exclusion set and each
//! venue's own per-user share list is fetched instead.
//!
//! All series are merged by the aggregator into one holder → amount map and
//! emitted as one row per holder.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use num_traits::Zero;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::adapters::EntityId;
use crate::aggregator::{grand_total, merge, BalanceMap, BalanceSource, ExclusionSet};
use crate::orchestrator::SubFetcher;
use crate::pagination::{fetch_all, PaginationStrategy};
use crate::reporter::SharedReporter;
use crate::settings::VenueKind;
use crate::subgraph::{SubgraphClient, SubgraphCollection};
use crate::types::conversions::{parse_amount, parse_decimal_amount};
use crate::types::{BalanceEntry, BlockReference, OutputRow};

const USER_BALANCES: &str = r#"
query PositionsQuery($block: Int!, $lastId: ID!, $first: Int!, $blacklisted: [ID!]!) {
  userBalances(
    where: { balance_gt: "0", id_gt: $lastId, id_not_in: $blacklisted }
    block: { number: $block }
    orderBy: id
    orderDirection: asc
    first: $first
  ) {
    id
    balance
  }
}
"#;

const PENDLE_SHARES: &str = r#"
query PendleShares($block: Int!, $lastId: ID!, $first: Int!) {
  userShares(
    where: { share_gt: "0", id_gt: $lastId }
    block: { number: $block }
    orderBy: id
    orderDirection: asc
    first: $first
  ) {
    id
    user
    share
  }
}
"#;

const BALANCER_SHARES: &str = r#"
query PoolShares($block: Int!, $lastId: ID!, $first: Int!, $poolId: String!) {
  poolShares(
    where: { balance_gt: "0", id_gt: $lastId, poolId: $poolId }
    block: { number: $block }
    orderBy: id
    orderDirection: asc
    first: $first
  ) {
    id
    userAddress { id }
    balance
  }
}
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct UserBalance {
    pub id: String,
    pub balance: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PendleShare {
    pub id: String,
    pub user: String,
    pub share: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancerShare {
    pub id: String,
    pub user_address: EntityId,
    pub balance: String,
}

/// One venue holding the token on behalf of users.
pub struct VenueSource {
    pub name: String,
    pub kind: VenueKind,
    pub client: Arc<SubgraphClient>,
    pub decimals: Option<u32>,
    pub pool_id: Option<String>,
}

pub struct LiquidStakingAdapter {
    name: String,
    holders: Arc<SubgraphClient>,
    venues: Vec<VenueSource>,
    token_address: String,
    token_symbol: String,
    start_block: u64,
    exclusions: ExclusionSet,
    page_size: usize,
    reporter: SharedReporter,
}

impl LiquidStakingAdapter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        holders: Arc<SubgraphClient>,
        venues: Vec<VenueSource>,
        token_address: &str,
        token_symbol: &str,
        start_block: u64,
        exclusions: ExclusionSet,
        page_size: usize,
        reporter: SharedReporter,
    ) -> Self {
        Self {
            name: name.to_string(),
            holders,
            venues,
            token_address: token_address.to_string(),
            token_symbol: token_symbol.to_string(),
            start_block,
            exclusions,
            page_size,
            reporter,
        }
    }

    async fn fetch_collection<T>(
        &self,
        source_name: &str,
        client: &Arc<SubgraphClient>,
        query: &str,
        collection: &str,
        variables: Map<String, Value>,
        id_of: fn(&T) -> &str,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let source: SubgraphCollection<T> =
            SubgraphCollection::new(source_name, Arc::clone(client), query, collection, variables);
        let items = fetch_all(
            &source,
            id_of,
            self.page_size,
            PaginationStrategy::Cursor,
            self.reporter.as_ref(),
        )
        .await
        .with_context(|| format!("Failed to fetch {} {}", source_name, collection))?;
        Ok(items)
    }

    async fn fetch_holders(&self, block: &BlockReference) -> Result<BalanceSource> {
        let mut variables = block_variables(block);
        let blacklisted: Vec<&String> = self.exclusions.iter().collect();
        variables.insert("blacklisted".to_string(), json!(blacklisted));

        let holders: Vec<UserBalance> = self
            .fetch_collection(
                &self.name,
                &self.holders,
                USER_BALANCES,
                "userBalances",
                variables,
                |h: &UserBalance| h.id.as_str(),
            )
            .await?;
        Ok(BalanceSource::new(&self.name, user_balance_entries(&holders, None)?))
    }

    async fn fetch_venue(&self, venue: &VenueSource, block: &BlockReference) -> Result<BalanceSource> {
        let mut variables = block_variables(block);
        let entries = match venue.kind {
            VenueKind::UserBalance => {
                variables.insert("blacklisted".to_string(), json!(Vec::<String>::new()));
                let items: Vec<UserBalance> = self
                    .fetch_collection(
                        &venue.name,
                        &venue.client,
                        USER_BALANCES,
                        "userBalances",
                        variables,
                        |h: &UserBalance| h.id.as_str(),
                    )
                    .await?;
                user_balance_entries(&items, venue.decimals)?
            }
            VenueKind::PendleShare => {
                let items: Vec<PendleShare> = self
                    .fetch_collection(
                        &venue.name,
                        &venue.client,
                        PENDLE_SHARES,
                        "userShares",
                        variables,
                        |s: &PendleShare| s.id.as_str(),
                    )
                    .await?;
                pendle_entries(&items, venue.decimals)?
            }
            VenueKind::BalancerShare => {
                let pool_id = venue
                    .pool_id
                    .as_deref()
                    .with_context(|| format!("{}: missing pool_id", venue.name))?;
                variables.insert("poolId".to_string(), json!(pool_id));
                let items: Vec<BalancerShare> = self
                    .fetch_collection(
                        &venue.name,
                        &venue.client,
                        BALANCER_SHARES,
                        "poolShares",
                        variables,
                        |s: &BalancerShare| s.id.as_str(),
                    )
                    .await?;
                balancer_entries(&items, venue.decimals)?
            }
        };
        Ok(BalanceSource::new(&venue.name, entries))
    }
}

#[async_trait]
impl SubFetcher for LiquidStakingAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, block: &BlockReference) -> Result<Vec<OutputRow>> {
        if block.block_number < self.start_block {
            return Ok(Vec::new());
        }

        let mut sources = Vec::with_capacity(self.venues.len() + 1);
        sources.push(self.fetch_holders(block).await?);
        for venue in &self.venues {
            sources.push(self.fetch_venue(venue, block).await?);
        }

        let balances = merge(&sources, &self.exclusions, self.reporter.as_ref());
        info!(
            "[{}] block {}: {} holders, total {} {}",
            self.name,
            block.block_number,
            balances.len(),
            grand_total(&balances),
            self.token_symbol
        );

        Ok(holders_to_rows(block, &balances, &self.token_address, &self.token_symbol))
    }
}

fn block_variables(block: &BlockReference) -> Map<String, Value> {
    let mut variables = Map::new();
    variables.insert("block".to_string(), json!(block.block_number));
    variables
}

fn amount(raw: &str, decimals: Option<u32>) -> Result<num_bigint::BigInt> {
    Ok(match decimals {
        Some(d) => parse_decimal_amount(raw, d)?,
        None => parse_amount(raw)?,
    })
}

pub fn user_balance_entries(items: &[UserBalance], decimals: Option<u32>) -> Result<Vec<BalanceEntry>> {
    items
        .iter()
        .map(|i| Ok(BalanceEntry::new(&i.id, amount(&i.balance, decimals)?)))
        .collect()
}

pub fn pendle_entries(items: &[PendleShare], decimals: Option<u32>) -> Result<Vec<BalanceEntry>> {
    items
        .iter()
        .map(|i| Ok(BalanceEntry::new(&i.user, amount(&i.share, decimals)?)))
        .collect()
}

pub fn balancer_entries(items: &[BalancerShare], decimals: Option<u32>) -> Result<Vec<BalanceEntry>> {
    items
        .iter()
        .map(|i| Ok(BalanceEntry::new(&i.user_address.id, amount(&i.balance, decimals)?)))
        .collect()
}

/// One row per holder with a non-zero merged balance, in address order.
pub fn holders_to_rows(
    block: &BlockReference,
    balances: &BalanceMap,
    token_address: &str,
    token_symbol: &str,
) -> Vec<OutputRow> {
    balances
        .iter()
        .filter(|(_, total)| !total.is_zero())
        .map(|(holder, total)| OutputRow::new(block, holder, token_address, total.clone(), token_symbol))
        .collect()
}
