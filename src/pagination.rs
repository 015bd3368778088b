//! # Paginated Collection Fetcher
//!
//! Drains a remote paged collection into memory, one page per request.
//!
//! Two strategies are supported:
//!
//! - **Cursor**: each request asks for items with an id greater than the last id
//!   seen (seeded to the zero address). Used by every subgraph collection that
//!   supports `id_gt`/`user_gt` filters.
//! - **Offset**: each request skips the number of items already received. Used by
//!   sources that can't filter on id. Both are exact as long as the collection is
//!   not mutated during the fetch; neither guards against concurrent writes.
//!
//! Termination: an empty page stops the loop, and so does a page shorter than
//! `page_size`. A page of exactly `page_size` items always costs one more
//! request, since a full page can't be told apart from "more remain".
//!
//! Any page error aborts the whole fetch; partial results are never returned.

use crate::error::{Result, SnapshotError};
use crate::reporter::{Reporter, RunEvent};
use crate::types::conversions::ZERO_ADDRESS;
use async_trait::async_trait;

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Position of the next page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// Items with an id strictly greater than this one
    After(String),
    /// Items after skipping this many
    Skip(usize),
}

impl PageCursor {
    fn initial(strategy: PaginationStrategy) -> Self {
        match strategy {
            PaginationStrategy::Cursor => PageCursor::After(ZERO_ADDRESS.to_string()),
            PaginationStrategy::Offset => PageCursor::Skip(0),
        }
    }
}

impl std::fmt::Display for PageCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageCursor::After(id) => write!(f, "id > {}", id),
            PageCursor::Skip(n) => write!(f, "skip {}", n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationStrategy {
    #[default]
    Cursor,
    Offset,
}

/// A remote collection that can be read one page at a time.
#[async_trait]
pub trait PageSource<T: Send>: Send + Sync {
    /// Label used in progress events.
    fn name(&self) -> &str;

    async fn fetch_page(&self, cursor: &PageCursor, page_size: usize) -> Result<Vec<T>>;
}

/// Fetches every item of `source`, in page order.
///
/// `id_of` extracts the identifier used as the next cursor; it is only called on
/// the last item of each page and only under `PaginationStrategy::Cursor`.
pub async fn fetch_all<T, S, F>(
    source: &S,
    id_of: F,
    page_size: usize,
    strategy: PaginationStrategy,
    reporter: &dyn Reporter,
) -> Result<Vec<T>>
where
    T: Send,
    S: PageSource<T> + ?Sized,
    F: Fn(&T) -> &str,
{
    if page_size == 0 {
        return Err(SnapshotError::InvalidConfig(format!(
            "page size for {} must be non-zero",
            source.name()
        )));
    }

    let mut items: Vec<T> = Vec::new();
    let mut cursor = PageCursor::initial(strategy);
    let mut page_index = 0usize;

    loop {
        let page = source.fetch_page(&cursor, page_size).await?;
        page_index += 1;
        let page_len = page.len();

        if page_len == 0 {
            reporter.report(RunEvent::PageFetched {
                source: source.name().to_string(),
                page: page_index,
                items: 0,
                cursor: cursor.to_string(),
            });
            break;
        }

        cursor = match cursor {
            PageCursor::After(_) => match page.last() {
                Some(last) => PageCursor::After(id_of(last).to_string()),
                None => break,
            },
            PageCursor::Skip(offset) => PageCursor::Skip(offset + page_len),
        };
        items.extend(page);

        reporter.report(RunEvent::PageFetched {
            source: source.name().to_string(),
            page: page_index,
            items: page_len,
            cursor: cursor.to_string(),
        });

        if page_len < page_size {
            break;
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::{NoopReporter, RecordingReporter};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: String,
    }

    /// In-memory collection sorted by id, answering both cursor and offset pages.
    struct VecSource {
        items: Vec<Item>,
        requests: AtomicUsize,
        fail_on_request: Option<usize>,
    }

    impl VecSource {
        fn with_len(k: usize) -> Self {
            Self {
                items: (0..k).map(|i| Item { id: format!("0x{:040x}", i + 1) }).collect(),
                requests: AtomicUsize::new(0),
                fail_on_request: None,
            }
        }

        fn requests(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageSource<Item> for VecSource {
        fn name(&self) -> &str {
            "vec"
        }

        async fn fetch_page(&self, cursor: &PageCursor, page_size: usize) -> Result<Vec<Item>> {
            let n = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_request == Some(n) {
                return Err(SnapshotError::InvalidAmount("simulated".to_string()));
            }
            let page = match cursor {
                PageCursor::After(last) => self
                    .items
                    .iter()
                    .filter(|i| i.id.as_str() > last.as_str())
                    .take(page_size)
                    .cloned()
                    .collect(),
                PageCursor::Skip(skip) => self.items.iter().skip(*skip).take(page_size).cloned().collect(),
            };
            Ok(page)
        }
    }

    fn expected_requests(k: usize, p: usize) -> usize {
        if k == 0 {
            return 1;
        }
        k.div_ceil(p) + usize::from(k % p == 0)
    }

    #[tokio::test]
    async fn test_request_count_and_no_duplicates() {
        for strategy in [PaginationStrategy::Cursor, PaginationStrategy::Offset] {
            for (k, p) in [(0, 3), (1, 3), (2, 3), (3, 3), (4, 3), (6, 3), (7, 3), (10, 1)] {
                let source = VecSource::with_len(k);
                let items = fetch_all(&source, |i: &Item| i.id.as_str(), p, strategy, &NoopReporter)
                    .await
                    .unwrap();

                assert_eq!(items.len(), k, "k={} p={} {:?}", k, p, strategy);
                assert_eq!(items, source.items, "items out of order or duplicated");
                assert_eq!(
                    source.requests(),
                    expected_requests(k, p),
                    "k={} p={} {:?}",
                    k,
                    p,
                    strategy
                );
            }
        }
    }

    #[tokio::test]
    async fn test_full_page_then_empty_page() {
        let source = VecSource::with_len(1000);
        let items = fetch_all(
            &source,
            |i: &Item| i.id.as_str(),
            DEFAULT_PAGE_SIZE,
            PaginationStrategy::Cursor,
            &NoopReporter,
        )
        .await
        .unwrap();
        assert_eq!(items.len(), 1000);
        assert_eq!(source.requests(), 2);
    }

    #[tokio::test]
    async fn test_error_aborts_without_partial_result() {
        let mut source = VecSource::with_len(10);
        source.fail_on_request = Some(2);
        let result = fetch_all(&source, |i: &Item| i.id.as_str(), 3, PaginationStrategy::Cursor, &NoopReporter).await;
        assert!(result.is_err());
        assert_eq!(source.requests(), 2);
    }

    #[tokio::test]
    async fn test_zero_page_size_rejected() {
        let source = VecSource::with_len(3);
        let result = fetch_all(&source, |i: &Item| i.id.as_str(), 0, PaginationStrategy::Cursor, &NoopReporter).await;
        assert!(matches!(result, Err(SnapshotError::InvalidConfig(_))));
        assert_eq!(source.requests(), 0);
    }

    #[tokio::test]
    async fn test_reports_cursor_progress() {
        let source = VecSource::with_len(4);
        let reporter = RecordingReporter::new();
        fetch_all(&source, |i: &Item| i.id.as_str(), 2, PaginationStrategy::Cursor, &reporter)
            .await
            .unwrap();

        let pages: Vec<(usize, usize, String)> = reporter
            .events()
            .into_iter()
            .filter_map(|e| match e {
                RunEvent::PageFetched { page, items, cursor, .. } => Some((page, items, cursor)),
                _ => None,
            })
            .collect();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], (1, 2, format!("id > 0x{:040x}", 2)));
        assert_eq!(pages[1], (2, 2, format!("id > 0x{:040x}", 4)));
        assert_eq!(pages[2].1, 0);
    }
}
