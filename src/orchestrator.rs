//! # Block-Driven Orchestrator
//!
//! Runs every configured sub-fetcher for every requested block and concatenates
//! the rows they return.
//!
//! ## Failure Policy
//!
//! Each (block, sub-fetcher) pair is one unit of work, wrapped in the retry
//! executor. When retries are exhausted the failure is reported as
//! `RunEvent::SubFetcherSkipped` and that pair contributes no rows; the run moves
//! on to the next sub-fetcher and the next block. The orchestrator itself never
//! fails.
//!
//! ## Ordering
//!
//! Blocks are emitted in input order and, within a block, sub-fetchers in list
//! order. With `max_concurrent_blocks > 1` several blocks are in flight at once,
//! but results are buffered in order so the output is identical to a sequential
//! run. Rate gates are shared `Arc`s, so the request limit stays global.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use balance_snapshot_sdk::orchestrator::{Orchestrator, OrchestratorConfig};
//! use balance_snapshot_sdk::reporter::LogReporter;
//! use std::sync::Arc;
//!
//! # async fn run(fetchers: Vec<Arc<dyn balance_snapshot_sdk::orchestrator::SubFetcher>>,
//! #              blocks: Vec<balance_snapshot_sdk::types::BlockReference>) {
//! let orchestrator = Orchestrator::new(fetchers, OrchestratorConfig::default(), Arc::new(LogReporter));
//! let rows = orchestrator.run(&blocks).await;
//! # }
//! ```

use crate::aggregator::consolidate_rows;
use crate::reporter::{skipped_event, RunEvent, SharedReporter};
use crate::retry::{retry, RetryPolicy};
use crate::types::{BlockReference, OutputRow};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};

/// One per-protocol snapshot source.
///
/// Implementations should be idempotent for a given block: the orchestrator may
/// call `fetch` several times for the same block when earlier attempts fail.
#[async_trait]
pub trait SubFetcher: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, block: &BlockReference) -> anyhow::Result<Vec<OutputRow>>;
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub retry: RetryPolicy,
    pub max_concurrent_blocks: usize,
    pub consolidate_duplicates: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_concurrent_blocks: 1,
            consolidate_duplicates: true,
        }
    }
}

pub struct Orchestrator {
    fetchers: Vec<Arc<dyn SubFetcher>>,
    config: OrchestratorConfig,
    reporter: SharedReporter,
}

impl Orchestrator {
    pub fn new(
        fetchers: Vec<Arc<dyn SubFetcher>>,
        config: OrchestratorConfig,
        reporter: SharedReporter,
    ) -> Self {
        Self {
            fetchers,
            config,
            reporter,
        }
    }

    pub fn fetcher_names(&self) -> Vec<&str> {
        self.fetchers.iter().map(|f| f.name()).collect()
    }

    /// Snapshots every block and returns all rows in processing order.
    pub async fn run(&self, blocks: &[BlockReference]) -> Vec<OutputRow> {
        info!(
            "Snapshot run: {} blocks x {} sub-fetchers (concurrency {})",
            blocks.len(),
            self.fetchers.len(),
            self.config.max_concurrent_blocks.max(1)
        );

        let per_block: Vec<Vec<OutputRow>> = stream::iter(blocks)
            .map(|block| self.run_block(block))
            .buffered(self.config.max_concurrent_blocks.max(1))
            .collect()
            .await;

        let rows: Vec<OutputRow> = per_block.into_iter().flatten().collect();
        info!("Snapshot run complete: {} rows", rows.len());
        rows
    }

    /// Runs every sub-fetcher for one block; failed sub-fetchers contribute nothing.
    pub async fn run_block(&self, block: &BlockReference) -> Vec<OutputRow> {
        let span = info_span!("block", number = block.block_number);
        async move {
            debug!("Processing block {}", block);
            let mut rows = Vec::new();

            for fetcher in &self.fetchers {
                let operation = format!("{}@{}", fetcher.name(), block.block_number);
                let result = retry(&operation, &self.config.retry, self.reporter.as_ref(), || {
                    fetcher.fetch(block)
                })
                .await;

                match result {
                    Ok(fetched) => {
                        self.reporter.report(RunEvent::SubFetcherCompleted {
                            block_number: block.block_number,
                            fetcher: fetcher.name().to_string(),
                            rows: fetched.len(),
                        });
                        rows.extend(fetched);
                    }
                    Err(e) => {
                        self.reporter.report(skipped_event(block, fetcher.name(), &e));
                    }
                }
            }

            if self.config.consolidate_duplicates {
                consolidate_rows(rows)
            } else {
                rows
            }
        }
        .instrument(span)
        .await
    }
}
