// Protocol Adapters Module
// Each adapter turns one protocol's positions at a block into output rows

pub mod lending;
pub mod liquid_staking;
pub mod staking;
pub mod ve_nft;

use anyhow::{bail, Context, Result};
use ethers::providers::{Http, Provider};
use log::info;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::aggregator::ExclusionSet;
use crate::multicall::Multicall;
use crate::orchestrator::SubFetcher;
use crate::rate_gate::RateGateRegistry;
use crate::reporter::SharedReporter;
use crate::settings::Settings;
use crate::subgraph::SubgraphClient;
use crate::types::conversions::string_to_address;

pub use lending::LendingReservesAdapter;
pub use liquid_staking::{LiquidStakingAdapter, VenueSource};
pub use staking::StakingAdapter;
pub use ve_nft::VeNftAdapter;

/// Nested subgraph entity reference (`user { id }`).
#[derive(Debug, Clone, Deserialize)]
pub struct EntityId {
    pub id: String,
}

/// Builds every configured sub-fetcher, in `Settings::adapter_names` order.
///
/// `selected` restricts the run to the named adapters; empty means all. Subgraph
/// clients talking to the same endpoint share one rate gate from `registry`.
pub fn build_sub_fetchers(
    settings: &Settings,
    selected: &[String],
    registry: &RateGateRegistry,
    reporter: SharedReporter,
) -> Result<Vec<Arc<dyn SubFetcher>>> {
    let known = settings.adapter_names();
    for name in selected {
        if !known.contains(name) {
            bail!("Unknown adapter {:?} (configured: {})", name, known.join(", "));
        }
    }
    let wanted = |name: &str| selected.is_empty() || selected.iter().any(|s| s == name);

    let timeout = Duration::from_millis(settings.subgraph.request_timeout_ms);
    let page_size = settings.subgraph.page_size;
    let mut clients: HashMap<String, Arc<SubgraphClient>> = HashMap::new();
    let mut client_for = |endpoint: &str| -> Result<Arc<SubgraphClient>> {
        if let Some(client) = clients.get(endpoint) {
            return Ok(Arc::clone(client));
        }
        let client = Arc::new(SubgraphClient::new(endpoint, registry.gate_for(endpoint)?, timeout)?);
        clients.insert(endpoint.to_string(), Arc::clone(&client));
        Ok(client)
    };

    let adapters = &settings.adapters;
    let mut fetchers: Vec<Arc<dyn SubFetcher>> = Vec::new();

    for pool in adapters.lending.iter().filter(|p| wanted(&p.name)) {
        fetchers.push(Arc::new(LendingReservesAdapter::new(
            &pool.name,
            client_for(&pool.endpoint)?,
            pool.strategy,
            page_size,
            pool.token_remap.clone(),
            Arc::clone(&reporter),
        )));
    }

    for staking in adapters.staking.iter().filter(|s| wanted(&s.name)) {
        fetchers.push(Arc::new(StakingAdapter::new(
            &staking.name,
            client_for(&staking.endpoint)?,
            &staking.token_address,
            &staking.token_symbol,
            staking.min_balance,
            page_size,
            Arc::clone(&reporter),
        )));
    }

    for lst in adapters.liquid_staking.iter().filter(|l| wanted(&l.name)) {
        let venues = lst
            .venues
            .iter()
            .map(|v| -> Result<VenueSource> {
                Ok(VenueSource {
                    name: v.name.clone(),
                    kind: v.kind,
                    client: client_for(&v.endpoint)?,
                    decimals: v.decimals,
                    pool_id: v.pool_id.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        fetchers.push(Arc::new(LiquidStakingAdapter::new(
            &lst.name,
            client_for(&lst.endpoint)?,
            venues,
            &lst.token_address,
            &lst.token_symbol,
            lst.start_block,
            ExclusionSet::new(&lst.exclusions),
            page_size,
            Arc::clone(&reporter),
        )));
    }

    for ve in adapters.ve_nft.iter().filter(|v| wanted(&v.name)) {
        let provider = Provider::<Http>::try_from(ve.rpc_url.as_str())
            .with_context(|| format!("{}: invalid RPC URL", ve.name))?;
        let multicall = Multicall::new(
            Arc::new(provider),
            string_to_address(&ve.multicall_address)?,
            ve.batch_size,
        )
        .with_batch_delay(Duration::from_millis(ve.batch_delay_ms));
        let users = ve
            .users
            .iter()
            .map(|u| string_to_address(u))
            .collect::<crate::error::Result<Vec<_>>>()?;
        fetchers.push(Arc::new(VeNftAdapter::new(
            &ve.name,
            Arc::new(multicall),
            string_to_address(&ve.contract_address)?,
            users,
            &ve.token_address,
            &ve.token_symbol,
        )));
    }

    info!(
        "Built {} sub-fetchers over {} rate-limited endpoints",
        fetchers.len(),
        registry.len()
    );
    Ok(fetchers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::NoopReporter;

    const SETTINGS: &str = r#"
        [[adapters.lending]]
        name = "foxy"
        endpoint = "https://api.example.com/foxy"

        [[adapters.staking]]
        name = "omni"
        endpoint = "https://api.example.com/foxy"
        token_address = "0x78354f8dccb269a615a7e0a24f9b0718fdc3c7a7"
        token_symbol = "ZERO"
    "#;

    #[test]
    fn test_selection_and_shared_gates() {
        let settings = Settings::from_toml_str(SETTINGS).unwrap();
        let registry = RateGateRegistry::new(5, Duration::from_secs(1)).unwrap();

        let all = build_sub_fetchers(&settings, &[], &registry, Arc::new(NoopReporter)).unwrap();
        let names: Vec<&str> = all.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["foxy", "omni"]);
        // Same endpoint, one gate
        assert_eq!(registry.len(), 1);

        let one = build_sub_fetchers(&settings, &["omni".to_string()], &registry, Arc::new(NoopReporter)).unwrap();
        assert_eq!(one.len(), 1);

        assert!(build_sub_fetchers(&settings, &["nope".to_string()], &registry, Arc::new(NoopReporter)).is_err());
    }
}
