//! # Balance Snapshot SDK
//!
//! A Rust library for building per-block balance snapshots of DeFi positions
//! (lending, staking, liquid-staking and vote-escrow locks) from GraphQL
//! subgraphs and on-chain reads, written out as one CSV.
//!
//! ## Overview
//!
//! For each block listed in an input CSV, every configured sub-fetcher reports
//! the balances it knows about at that block. The run is resilient: a failing
//! sub-fetcher is retried, then skipped for that block only.
//!
//! ## Architecture
//!
//! ### Transport Layer
//! Rate-limited subgraph requests (`rate_gate`, `subgraph`), bounded retries
//! (`retry`) and Multicall3 batching for contract reads (`multicall`).
//!
//! ### Pagination Layer
//! Cursor (`id_gt`) and offset (`skip`) pagination over any `PageSource`.
//!
//! ### Aggregation Layer
//! Arbitrary-precision merging of several balance series with an exclusion set.
//!
//! ### Orchestration Layer
//! Block-by-block driver over a list of `SubFetcher`s, with run events routed to
//! a `Reporter`.

// Core Types
/// Common types and data structures
pub mod types;
/// Error types
pub mod error;

// Transport
/// Per-endpoint request rate limiting
pub mod rate_gate;
/// Bounded retry executor
pub mod retry;
/// GraphQL subgraph client
pub mod subgraph;
/// Multicall batch RPC utilities
pub mod multicall;

// Data Assembly
/// Cursor and offset pagination
pub mod pagination;
/// Balance merging across sources
pub mod aggregator;
/// Block-driven snapshot orchestrator
pub mod orchestrator;

// Protocol Adapters
/// Per-protocol sub-fetchers (lending, staking, liquid staking, veNFT)
pub mod adapters;

// Contracts (Public ABIs Only)
/// Smart contract ABIs (read-only)
pub mod contracts;

// Input / Output
/// Block list CSV reader
pub mod block_input;
/// Snapshot CSV writer
pub mod output;

// Infrastructure
/// Run event reporting
pub mod reporter;
/// Metrics and observability
pub mod metrics;

// Settings & Configuration
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use error::{Result, SnapshotError};
pub use orchestrator::{Orchestrator, OrchestratorConfig, SubFetcher};
pub use settings::Settings;
pub use types::{BalanceEntry, BlockReference, OutputRow};
