use anyhow::{Context, Result};
use async_trait::async_trait;
use num_bigint::BigInt;
use serde::Deserialize;
use serde_json::{json, Map};
use std::sync::Arc;

use crate::orchestrator::SubFetcher;
use crate::pagination::{fetch_all, PaginationStrategy};
use crate::reporter::SharedReporter;
use crate::subgraph::{SubgraphClient, SubgraphCollection};
use crate::types::conversions::parse_amount;
use crate::types::{BlockReference, OutputRow};

const TOKEN_BALANCES: &str = r#"
query TokenBalances($block: Int!, $lastId: ID!, $first: Int!) {
  tokenBalances(
    block: { number: $block }
    where: { id_gt: $lastId, balance_omni_gt: "0" }
    orderBy: id
    orderDirection: asc
    first: $first
  ) {
    id
    balance_omni
  }
}
"#;

/// Staked balance of one account; `id` is the staker address.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenBalance {
    pub id: String,
    pub balance_omni: String,
}

/// Single-sided staking positions of a fixed token.
pub struct StakingAdapter {
    name: String,
    client: Arc<SubgraphClient>,
    token_address: String,
    token_symbol: String,
    min_balance: BigInt,
    page_size: usize,
    reporter: SharedReporter,
}

impl StakingAdapter {
    pub fn new(
        name: &str,
        client: Arc<SubgraphClient>,
        token_address: &str,
        token_symbol: &str,
        min_balance: u64,
        page_size: usize,
        reporter: SharedReporter,
    ) -> Self {
        Self {
            name: name.to_string(),
            client,
            token_address: token_address.to_string(),
            token_symbol: token_symbol.to_string(),
            min_balance: BigInt::from(min_balance),
            page_size,
            reporter,
        }
    }
}

#[async_trait]
impl SubFetcher for StakingAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, block: &BlockReference) -> Result<Vec<OutputRow>> {
        let mut variables = Map::new();
        variables.insert("block".to_string(), json!(block.block_number));
        let collection: SubgraphCollection<TokenBalance> = SubgraphCollection::new(
            &self.name,
            Arc::clone(&self.client),
            TOKEN_BALANCES,
            "tokenBalances",
            variables,
        );

        let balances = fetch_all(
            &collection,
            |b: &TokenBalance| b.id.as_str(),
            self.page_size,
            PaginationStrategy::Cursor,
            self.reporter.as_ref(),
        )
        .await
        .with_context(|| format!("Failed to fetch {} stakers for block {}", self.name, block.block_number))?;

        stakes_to_rows(
            block,
            &balances,
            &self.token_address,
            &self.token_symbol,
            &self.min_balance,
        )
    }
}

/// Rows at or below `min_balance` are dust and dropped.
pub fn stakes_to_rows(
    block: &BlockReference,
    balances: &[TokenBalance],
    token_address: &str,
    token_symbol: &str,
    min_balance: &BigInt,
) -> Result<Vec<OutputRow>> {
    let mut rows = Vec::with_capacity(balances.len());
    for stake in balances {
        let amount = parse_amount(&stake.balance_omni)?;
        if &amount <= min_balance {
            continue;
        }
        rows.push(OutputRow::new(block, &stake.id, token_address, amount, token_symbol));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dust_filtered() {
        let balances: Vec<TokenBalance> = serde_json::from_value(json!([
            { "id": "0x01", "balance_omni": "1" },
            { "id": "0x02", "balance_omni": "2" },
            { "id": "0x03", "balance_omni": "5000000000000000000000000" }
        ]))
        .unwrap();
        let block = BlockReference::new(3, 4);
        let rows = stakes_to_rows(
            &block,
            &balances,
            "0x78354f8dccb269a615a7e0a24f9b0718fdc3c7a7",
            "ZERO",
            &BigInt::from(1),
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].user_address, "0x02");
        assert_eq!(rows[1].token_symbol, "ZERO");
        assert_eq!(rows[1].token_balance.to_string(), "5000000000000000000000000");
    }
}
