use std::collections::VecDeque;
use std::future::Future;
use std::io::{self, BufRead};

use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::PopularPages;
use crate::error::FetchError;
use crate::model::{Namespace, WorkItem};

#[derive(Debug, Error)]
pub enum SourceError {
    /// A listing page could not be fetched; the next call asks for the same page again.
    #[error("listing request failed: {0}")]
    Page(#[from] FetchError),
    /// One input line was not UTF-8; reading continues with the following line.
    #[error("line {line} is not valid UTF-8")]
    InvalidLine { line: usize },
    #[error("failed to read identifiers: {0}")]
    Io(#[from] io::Error),
}

/// Lazy, finite producer of work items.
pub trait IdentifierSource {
    fn next_item(&mut self) -> impl Future<Output = Result<Option<WorkItem>, SourceError>> + Send;

    /// Pagination cursor, for sources that have one.
    fn cursor(&self) -> Option<u32> {
        None
    }
}

/// Walks pages `1..=page_budget` of the popularity listing.
#[derive(Debug)]
pub struct PopularListing<'a, P> {
    pages: &'a P,
    page_budget: u32,
    next_page: u32,
    last_requested: Option<u32>,
    buffer: VecDeque<WorkItem>,
    exhausted: bool,
}

impl<'a, P> PopularListing<'a, P> {
    pub fn new(pages: &'a P, page_budget: u32) -> Self {
        Self {
            pages,
            page_budget,
            next_page: 1,
            last_requested: None,
            buffer: VecDeque::new(),
            exhausted: page_budget == 0,
        }
    }
}

impl<P> IdentifierSource for PopularListing<'_, P>
where
    P: PopularPages + Sync,
{
    async fn next_item(&mut self) -> Result<Option<WorkItem>, SourceError> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            if self.exhausted {
                return Ok(None);
            }

            let page = self.next_page;
            self.last_requested = Some(page);
            let entries = self.pages.popular_page(page).await?;
            self.next_page += 1;

            if entries.is_empty() {
                info!(page, "listing returned an empty page; no more items");
                self.exhausted = true;
                continue;
            }

            debug!(page, count = entries.len(), "listing page fetched");
            self.buffer
                .extend(entries.into_iter().map(|entry| WorkItem::internal(entry.id)));
            if page >= self.page_budget {
                self.exhausted = true;
            }
        }
    }

    fn cursor(&self) -> Option<u32> {
        self.last_requested
    }
}

/// One identifier per input line; whitespace trimmed, blank lines skipped.
#[derive(Debug)]
pub struct EnumeratedIds<R> {
    reader: R,
    namespace: Namespace,
    buffer: Vec<u8>,
    line_number: usize,
}

impl<R: BufRead> EnumeratedIds<R> {
    pub fn new(reader: R, namespace: Namespace) -> Self {
        Self {
            reader,
            namespace,
            buffer: Vec::new(),
            line_number: 0,
        }
    }

    fn read_next(&mut self) -> Result<Option<WorkItem>, SourceError> {
        loop {
            self.buffer.clear();
            if self.reader.read_until(b'\n', &mut self.buffer)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let Ok(line) = std::str::from_utf8(&self.buffer) else {
                return Err(SourceError::InvalidLine {
                    line: self.line_number,
                });
            };
            let id = line.trim();
            if !id.is_empty() {
                return Ok(Some(WorkItem::new(id, self.namespace)));
            }
        }
    }
}

impl<R> IdentifierSource for EnumeratedIds<R>
where
    R: BufRead + Send,
{
    async fn next_item(&mut self) -> Result<Option<WorkItem>, SourceError> {
        self.read_next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ListingEntry;
    use crate::error::Catalog;
    use std::io::Cursor;
    use std::sync::Mutex;

    struct FakePages {
        pages: Vec<Result<Vec<ListingEntry>, FetchError>>,
        requested: Mutex<Vec<u32>>,
    }

    impl FakePages {
        fn new(pages: Vec<Result<Vec<ListingEntry>, FetchError>>) -> Self {
            Self {
                pages,
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    impl PopularPages for FakePages {
        async fn popular_page(&self, page: u32) -> Result<Vec<ListingEntry>, FetchError> {
            self.requested.lock().unwrap().push(page);
            self.pages
                .get(page as usize - 1)
                .cloned()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn entries(ids: &[&str]) -> Vec<ListingEntry> {
        ids.iter()
            .map(|id| ListingEntry {
                id: id.to_string(),
                title: None,
            })
            .collect()
    }

    async fn drain<S: IdentifierSource>(source: &mut S) -> Vec<String> {
        let mut ids = Vec::new();
        while let Some(item) = source.next_item().await.expect("item") {
            ids.push(item.id().to_string());
        }
        ids
    }

    #[tokio::test]
    async fn enumerated_ids_trim_and_skip_blank_lines() {
        let input = Cursor::new("  tt0111161 \n\n\t\ntt0068646\r\ntt0071562");
        let mut source = EnumeratedIds::new(input, Namespace::External);

        let first = source.next_item().await.expect("read").expect("item");
        assert_eq!(first.id(), "tt0111161");
        assert_eq!(first.namespace(), Namespace::External);
        assert_eq!(drain(&mut source).await, vec!["tt0068646", "tt0071562"]);
        assert!(source.next_item().await.expect("read").is_none());
        assert_eq!(source.cursor(), None);
    }

    #[tokio::test]
    async fn listing_respects_page_budget() {
        let pages = FakePages::new(vec![
            Ok(entries(&["1", "2"])),
            Ok(entries(&["3"])),
            Ok(entries(&["4"])),
        ]);
        let mut listing = PopularListing::new(&pages, 2);

        assert_eq!(drain(&mut listing).await, vec!["1", "2", "3"]);
        assert_eq!(*pages.requested.lock().unwrap(), vec![1, 2]);
        assert_eq!(listing.cursor(), Some(2));
    }

    #[tokio::test]
    async fn listing_stops_cleanly_past_the_last_page() {
        let pages = FakePages::new(vec![Ok(entries(&["10"]))]);
        let mut listing = PopularListing::new(&pages, 5);

        assert_eq!(drain(&mut listing).await, vec!["10"]);
        assert_eq!(*pages.requested.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn failed_page_is_requested_again() {
        let pages = FakePages::new(vec![
            Ok(entries(&["1"])),
            Err(FetchError::status(Catalog::Tmdb, "popular page 2", 503)),
            Ok(entries(&["3"])),
        ]);
        let mut listing = PopularListing::new(&pages, 3);

        let first = listing.next_item().await.expect("page 1").expect("item");
        assert_eq!(first.namespace(), Namespace::Internal);
        let err = listing.next_item().await.unwrap_err();
        assert!(matches!(err, SourceError::Page(_)));
        assert_eq!(listing.cursor(), Some(2));
        assert!(listing.next_item().await.is_err());
        assert_eq!(*pages.requested.lock().unwrap(), vec![1, 2, 2]);
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_reported_and_skipped() {
        let input = Cursor::new(b"tt0111161\ntt\xff\xfe\n\ntt0068646\n".to_vec());
        let mut source = EnumeratedIds::new(input, Namespace::External);

        let first = source.next_item().await.expect("read").expect("item");
        assert_eq!(first.id(), "tt0111161");
        let err = source.next_item().await.unwrap_err();
        assert!(matches!(err, SourceError::InvalidLine { line: 2 }));
        let third = source.next_item().await.expect("read").expect("item");
        assert_eq!(third.id(), "tt0068646");
        assert!(source.next_item().await.expect("read").is_none());
    }

    #[tokio::test]
    async fn zero_budget_yields_nothing() {
        let pages = FakePages::new(vec![Ok(entries(&["1"]))]);
        let mut listing = PopularListing::new(&pages, 0);
        assert!(listing.next_item().await.expect("empty").is_none());
        assert!(pages.requested.lock().unwrap().is_empty());
    }
}
