use anyhow::{Context, Result};
use async_trait::async_trait;
use num_traits::Zero;
use serde::Deserialize;
use serde_json::{json, Map};
use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::EntityId;
use crate::orchestrator::SubFetcher;
use crate::pagination::{fetch_all, PaginationStrategy};
use crate::reporter::SharedReporter;
use crate::subgraph::{SubgraphClient, SubgraphCollection};
use crate::types::conversions::{normalize_address, parse_amount};
use crate::types::{BlockReference, OutputRow};

const USER_RESERVES_BY_ID: &str = r#"
query UserReserves($block: Int!, $lastId: ID!, $first: Int!) {
  userReserves(
    block: { number: $block }
    where: {
      and: [
        { or: [{ currentTotalDebt_gt: 0 }, { currentATokenBalance_gt: 0 }] }
        { id_gt: $lastId }
      ]
    }
    orderBy: id
    orderDirection: asc
    first: $first
  ) {
    id
    user { id }
    currentTotalDebt
    currentATokenBalance
    reserve { underlyingAsset symbol name }
  }
}
"#;

const USER_RESERVES_BY_OFFSET: &str = r#"
query UserReserves($block: Int!, $skip: Int!, $first: Int!) {
  userReserves(
    block: { number: $block }
    where: { or: [{ currentTotalDebt_gt: 0 }, { currentATokenBalance_gt: 0 }] }
    orderBy: id
    orderDirection: asc
    first: $first
    skip: $skip
  ) {
    id
    user { id }
    currentTotalDebt
    currentATokenBalance
    reserve { underlyingAsset symbol name }
  }
}
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct Reserve {
    #[serde(rename = "underlyingAsset")]
    pub underlying_asset: String,
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// One user's position in one reserve of an Aave-style lending pool.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserReserve {
    pub id: String,
    pub user: EntityId,
    pub current_total_debt: String,
    pub current_a_token_balance: String,
    pub reserve: Reserve,
}

/// Net lending position per (user, reserve): supplied minus borrowed.
///
/// Positions that net to exactly zero are dropped. `token_remap` rewrites the
/// reported asset address, for pools whose underlying asset must be told apart
/// from the same asset in another pool.
pub struct LendingReservesAdapter {
    name: String,
    client: Arc<SubgraphClient>,
    strategy: PaginationStrategy,
    page_size: usize,
    token_remap: HashMap<String, String>,
    reporter: SharedReporter,
}

impl LendingReservesAdapter {
    pub fn new(
        name: &str,
        client: Arc<SubgraphClient>,
        strategy: PaginationStrategy,
        page_size: usize,
        token_remap: HashMap<String, String>,
        reporter: SharedReporter,
    ) -> Self {
        Self {
            name: name.to_string(),
            client,
            strategy,
            page_size,
            token_remap: token_remap
                .into_iter()
                .map(|(from, to)| (normalize_address(&from), normalize_address(&to)))
                .collect(),
            reporter,
        }
    }

    fn query(&self) -> &'static str {
        match self.strategy {
            PaginationStrategy::Cursor => USER_RESERVES_BY_ID,
            PaginationStrategy::Offset => USER_RESERVES_BY_OFFSET,
        }
    }
}

#[async_trait]
impl SubFetcher for LendingReservesAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, block: &BlockReference) -> Result<Vec<OutputRow>> {
        let mut variables = Map::new();
        variables.insert("block".to_string(), json!(block.block_number));
        let collection: SubgraphCollection<UserReserve> = SubgraphCollection::new(
            &self.name,
            Arc::clone(&self.client),
            self.query(),
            "userReserves",
            variables,
        );

        let reserves = fetch_all(
            &collection,
            |r: &UserReserve| r.id.as_str(),
            self.page_size,
            self.strategy,
            self.reporter.as_ref(),
        )
        .await
        .with_context(|| format!("Failed to fetch {} reserves for block {}", self.name, block.block_number))?;

        reserves_to_rows(block, &reserves, &self.token_remap)
    }
}

pub fn reserves_to_rows(
    block: &BlockReference,
    reserves: &[UserReserve],
    token_remap: &HashMap<String, String>,
) -> Result<Vec<OutputRow>> {
    let mut rows = Vec::with_capacity(reserves.len());
    for reserve in reserves {
        let supplied = parse_amount(&reserve.current_a_token_balance)?;
        let borrowed = parse_amount(&reserve.current_total_debt)?;
        let balance = supplied - borrowed;
        if balance.is_zero() {
            continue;
        }

        let asset = normalize_address(&reserve.reserve.underlying_asset);
        let token_address = token_remap.get(&asset).cloned().unwrap_or(asset);
        rows.push(OutputRow::new(
            block,
            &reserve.user.id,
            &token_address,
            balance,
            &reserve.reserve.symbol,
        ));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn reserves() -> Vec<UserReserve> {
        serde_json::from_value(json!([
            {
                "id": "0xaa-usdc",
                "user": { "id": "0xAA" },
                "currentTotalDebt": "400",
                "currentATokenBalance": "1000",
                "reserve": { "underlyingAsset": "0xUSDC", "symbol": "USDC", "name": "USD Coin" }
            },
            {
                "id": "0xbb-usdc",
                "user": { "id": "0xbb" },
                "currentTotalDebt": "500",
                "currentATokenBalance": "500",
                "reserve": { "underlyingAsset": "0xusdc", "symbol": "USDC", "name": "USD Coin" }
            },
            {
                "id": "0xcc-weth",
                "user": { "id": "0xcc" },
                "currentTotalDebt": "2000000000000000000000",
                "currentATokenBalance": "0",
                "reserve": { "underlyingAsset": "0x5FBDF89403270a1846f5ae7d113a989f850d1566", "symbol": "WETH" }
            }
        ]))
        .unwrap()
    }

    #[test]
    fn test_net_balance_drops_zero_and_keeps_negative() {
        let block = BlockReference::new(10, 20);
        let rows = reserves_to_rows(&block, &reserves(), &HashMap::new()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].user_address, "0xaa");
        assert_eq!(rows[0].token_balance, BigInt::from(600));
        assert_eq!(rows[0].token_address, "0xusdc");
        assert_eq!(rows[1].token_balance, "-2000000000000000000000".parse::<BigInt>().unwrap());
    }

    #[test]
    fn test_token_remap_is_case_insensitive() {
        let block = BlockReference::new(10, 20);
        let remap = HashMap::from([(
            "0x5fbdf89403270a1846f5ae7d113a989f850d1566".to_string(),
            "0x000000000000000000000000000000000000f0c5".to_string(),
        )]);
        let rows = reserves_to_rows(&block, &reserves(), &remap).unwrap();
        assert_eq!(rows[1].token_address, "0x000000000000000000000000000000000000f0c5");
        assert_eq!(rows[0].token_address, "0xusdc");
    }

    #[test]
    fn test_bad_amount_is_error() {
        let mut bad = reserves();
        bad[0].current_total_debt = "1.5".to_string();
        assert!(reserves_to_rows(&BlockReference::new(1, 1), &bad, &HashMap::new()).is_err());
    }
}
