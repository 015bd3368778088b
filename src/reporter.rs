//! # Run Reporter
//!
//! Structured progress events emitted by the fetcher, retry executor, aggregator
//! and orchestrator. Components receive an `Arc<dyn Reporter>` instead of logging
//! directly, so tests can observe the exact event sequence.
//!
//! `LogReporter` is the production implementation: every event becomes a `log`
//! record (and a metrics counter when the `observability` feature is enabled).

use crate::metrics;
use crate::types::BlockReference;
use log::{debug, info, warn};
use num_bigint::BigInt;
use std::sync::{Arc, Mutex};

/// A single observable event during a snapshot run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    PageFetched {
        source: String,
        page: usize,
        items: usize,
        cursor: String,
    },
    RetryAttempt {
        operation: String,
        attempt: u32,
        max_attempts: u32,
        error: String,
    },
    SourceSubtotal {
        source: String,
        entries: usize,
        total: BigInt,
    },
    SubFetcherCompleted {
        block_number: u64,
        fetcher: String,
        rows: usize,
    },
    SubFetcherSkipped {
        block_number: u64,
        fetcher: String,
        error: String,
    },
}

pub trait Reporter: Send + Sync {
    fn report(&self, event: RunEvent);
}

pub type SharedReporter = Arc<dyn Reporter>;

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, event: RunEvent) {
        match event {
            RunEvent::PageFetched {
                source,
                page,
                items,
                cursor,
            } => {
                metrics::increment_pages_fetched(&source, items);
                debug!("[{}] page {} -> {} items (cursor {})", source, page, items, cursor);
            }
            RunEvent::RetryAttempt {
                operation,
                attempt,
                max_attempts,
                error,
            } => {
                metrics::increment_retry_attempt(&operation);
                warn!(
                    "⚠️ {} attempt {}/{} failed: {}",
                    operation, attempt, max_attempts, error
                );
            }
            RunEvent::SourceSubtotal {
                source,
                entries,
                total,
            } => {
                info!("[{}] {} entries, subtotal {}", source, entries, total);
            }
            RunEvent::SubFetcherCompleted {
                block_number,
                fetcher,
                rows,
            } => {
                metrics::increment_rows_emitted(&fetcher, rows);
                info!("✅ block {} [{}] {} rows", block_number, fetcher, rows);
            }
            RunEvent::SubFetcherSkipped {
                block_number,
                fetcher,
                error,
            } => {
                metrics::increment_fetcher_skipped(&fetcher);
                log::error!(
                    "🚨 block {} [{}] skipped after retries: {}",
                    block_number,
                    fetcher,
                    error
                );
            }
        }
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn report(&self, _event: RunEvent) {}
}

/// Keeps every event in memory; used by tests and by callers that want a
/// post-run summary.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn skipped(&self) -> Vec<(u64, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RunEvent::SubFetcherSkipped {
                    block_number,
                    fetcher,
                    ..
                } => Some((block_number, fetcher)),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: RunEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

pub fn skipped_event(block: &BlockReference, fetcher: &str, error: &anyhow::Error) -> RunEvent {
    RunEvent::SubFetcherSkipped {
        block_number: block.block_number,
        fetcher: fetcher.to_string(),
        error: format!("{:#}", error),
    }
}
