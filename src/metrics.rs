// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, histogram};

// NOTE: When observability feature is disabled, provide stub implementations.
// The stubs still consume their arguments so callers see no unused parameters.
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = ($name, $value $(, $label, $label_value)*);
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = ($name, $value $(, $label, $label_value)*);
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $desc:expr) => {{
        let _ = ($name, $desc);
    }};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, histogram};

/// Initializes the descriptions for all the metrics in the application.
/// This should be called once at startup.
pub fn describe_metrics() {
    describe_counter!("snapshot_pages_fetched_total", "Pages fetched from paged collections.");
    describe_counter!("snapshot_items_fetched_total", "Items accumulated by paginated fetches.");
    describe_counter!("snapshot_retry_attempts_total", "Failed attempts that were retried or exhausted.");
    describe_counter!("snapshot_fetcher_skipped_total", "Sub-fetchers skipped after exhausting retries.");
    describe_counter!("snapshot_rows_emitted_total", "Output rows produced per sub-fetcher.");
}

pub fn increment_pages_fetched(source: &str, items: usize) {
    counter!("snapshot_pages_fetched_total", 1, "source" => source.to_string());
    counter!("snapshot_items_fetched_total", items as u64, "source" => source.to_string());
}

pub fn increment_retry_attempt(operation: &str) {
    counter!("snapshot_retry_attempts_total", 1, "operation" => operation.to_string());
}

pub fn increment_fetcher_skipped(fetcher: &str) {
    counter!("snapshot_fetcher_skipped_total", 1, "fetcher" => fetcher.to_string());
}

pub fn increment_rows_emitted(fetcher: &str, rows: usize) {
    counter!("snapshot_rows_emitted_total", rows as u64, "fetcher" => fetcher.to_string());
}

pub fn record_multicall_batch_size(size: usize) {
    histogram!("snapshot_multicall_batch_size", size as f64);
}
