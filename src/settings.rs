use crate::pagination::{PaginationStrategy, DEFAULT_PAGE_SIZE};
use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Run {
    #[serde(default = "default_blocks_csv")]
    pub blocks_csv: String,
    #[serde(default = "default_output_csv")]
    pub output_csv: String,
    /// Blocks processed at the same time; 1 keeps the run fully sequential
    #[serde(default = "default_max_concurrent_blocks")]
    pub max_concurrent_blocks: usize,
    /// Sum rows sharing (block, user, token) before writing
    #[serde(default = "default_true")]
    pub consolidate_duplicates: bool,
}

fn default_blocks_csv() -> String {
    "hourly_blocks.csv".to_string()
}
fn default_output_csv() -> String {
    "outputData.csv".to_string()
}
fn default_max_concurrent_blocks() -> usize {
    1
}
fn default_true() -> bool {
    true
}

impl Default for Run {
    fn default() -> Self {
        Self {
            blocks_csv: default_blocks_csv(),
            output_csv: default_output_csv(),
            max_concurrent_blocks: default_max_concurrent_blocks(),
            consolidate_duplicates: default_true(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Retry {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimit {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_max_requests() -> u32 {
    5
}
fn default_window_ms() -> u64 {
    1000
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Subgraph {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}
fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for Subgraph {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// A lending-pool subgraph exposing Aave-style `userReserves`.
#[derive(Debug, Deserialize, Clone)]
pub struct LendingPool {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub strategy: PaginationStrategy,
    /// underlying asset -> address written to the output instead
    #[serde(default)]
    pub token_remap: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Staking {
    pub name: String,
    pub endpoint: String,
    pub token_address: String,
    pub token_symbol: String,
    /// Rows at or below this balance are dropped as dust
    #[serde(default = "default_staking_min_balance")]
    pub min_balance: u64,
}

fn default_staking_min_balance() -> u64 {
    1
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VenueKind {
    /// `userBalances { id balance }`
    UserBalance,
    /// `userShares { id user share }`
    PendleShare,
    /// `poolShares { id userAddress { id } balance }`
    BalancerShare,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Venue {
    pub name: String,
    pub kind: VenueKind,
    pub endpoint: String,
    /// Set when the venue reports decimal token units instead of base units
    #[serde(default)]
    pub decimals: Option<u32>,
    /// Balancer pool id, required for `balancer_share`
    #[serde(default)]
    pub pool_id: Option<String>,
}

/// A liquid-staking token whose holders are spread across several venues.
#[derive(Debug, Deserialize, Clone)]
pub struct LiquidStaking {
    pub name: String,
    pub endpoint: String,
    pub token_address: String,
    pub token_symbol: String,
    #[serde(default)]
    pub start_block: u64,
    /// Contract addresses holding the token on behalf of users
    #[serde(default)]
    pub exclusions: Vec<String>,
    #[serde(default)]
    pub venues: Vec<Venue>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VeNft {
    pub name: String,
    pub rpc_url: String,
    pub multicall_address: String,
    pub contract_address: String,
    pub token_address: String,
    pub token_symbol: String,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default = "default_ve_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_ve_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

fn default_ve_batch_size() -> usize {
    500
}
fn default_ve_batch_delay_ms() -> u64 {
    200
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Adapters {
    #[serde(default)]
    pub lending: Vec<LendingPool>,
    #[serde(default)]
    pub staking: Vec<Staking>,
    #[serde(default)]
    pub liquid_staking: Vec<LiquidStaking>,
    #[serde(default)]
    pub ve_nft: Vec<VeNft>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub run: Run,
    #[serde(default)]
    pub retry: Retry,
    #[serde(default)]
    pub rate_limit: RateLimit,
    #[serde(default)]
    pub subgraph: Subgraph,
    #[serde(default)]
    pub adapters: Adapters,
}

impl Settings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;
        Self::finish(s.try_deserialize()?)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from_str(raw, config::FileFormat::Toml))
            .build()?;
        Self::finish(s.try_deserialize()?)
    }

    fn finish(mut settings: Self) -> Result<Self, ConfigError> {
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = env::var("SNAPSHOT_BLOCKS_CSV") {
            if !path.trim().is_empty() {
                self.run.blocks_csv = path.trim().to_string();
            }
        }
        if let Ok(path) = env::var("SNAPSHOT_OUTPUT_CSV") {
            if !path.trim().is_empty() {
                self.run.output_csv = path.trim().to_string();
            }
        }
        // One RPC for every veNFT adapter; per-adapter URLs live in Config.toml
        if let Ok(rpc_url) = env::var("SNAPSHOT_RPC_URL") {
            if !rpc_url.trim().is_empty() {
                for ve in &mut self.adapters.ve_nft {
                    ve.rpc_url = rpc_url.trim().to_string();
                }
            }
        }
        if let Ok(raw_users) = env::var("SNAPSHOT_VE_NFT_USERS") {
            if let Some(users) = parse_string_list(&raw_users) {
                if !users.is_empty() {
                    for ve in &mut self.adapters.ve_nft {
                        ve.users = users.clone();
                    }
                }
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.subgraph.page_size == 0 {
            return Err(ConfigError::Message("subgraph.page_size must be > 0".to_string()));
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_ms == 0 {
            return Err(ConfigError::Message(
                "rate_limit.max_requests and rate_limit.window_ms must be > 0".to_string(),
            ));
        }

        let endpoints = self
            .adapters
            .lending
            .iter()
            .map(|p| (&p.name, &p.endpoint))
            .chain(self.adapters.staking.iter().map(|s| (&s.name, &s.endpoint)))
            .chain(self.adapters.liquid_staking.iter().flat_map(|l| {
                std::iter::once((&l.name, &l.endpoint))
                    .chain(l.venues.iter().map(|v| (&v.name, &v.endpoint)))
            }))
            .chain(self.adapters.ve_nft.iter().map(|v| (&v.name, &v.rpc_url)));
        for (name, endpoint) in endpoints {
            url::Url::parse(endpoint).map_err(|e| {
                ConfigError::Message(format!("{}: invalid endpoint {:?}: {}", name, endpoint, e))
            })?;
        }

        for venue in self.adapters.liquid_staking.iter().flat_map(|l| &l.venues) {
            if venue.kind == VenueKind::BalancerShare && venue.pool_id.is_none() {
                return Err(ConfigError::Message(format!(
                    "{}: balancer_share venues need a pool_id",
                    venue.name
                )));
            }
        }

        Ok(())
    }

    /// Names of every configured adapter, in the order they run for each block.
    pub fn adapter_names(&self) -> Vec<String> {
        let a = &self.adapters;
        a.lending
            .iter()
            .map(|p| p.name.clone())
            .chain(a.staking.iter().map(|s| s.name.clone()))
            .chain(a.liquid_staking.iter().map(|l| l.name.clone()))
            .chain(a.ve_nft.iter().map(|v| v.name.clone()))
            .collect()
    }
}

/// Accepts a JSON array (`["a","b"]`) or a plain comma-separated list.
fn parse_string_list(input: &str) -> Option<Vec<String>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Some(vec![]);
    }

    if trimmed.starts_with('[') {
        if let Ok(v) = serde_json::from_str::<Vec<String>>(trimmed) {
            return Some(v);
        }
    }

    let parts: Vec<String> = trimmed
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
        .collect();
    Some(parts)
}
