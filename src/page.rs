//! Paged-fetch state machine: one state value per list, driven through
//! `start_initial_fetch` and `load_more`, preserving fetched items across
//! transient tail failures.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Fetch failures, split only as far as the UI policy needs: `Cancelled`
/// re-arms a silent retry, everything else carries a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request cancelled")]
    Cancelled,
    #[error("no network connection")]
    Offline,
    #[error("{0}")]
    Other(String),
}

/// One page of results plus continuation bookkeeping. APIs signal "more
/// pages" either with an opaque token or with a running total; a page may
/// carry both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
    pub total_available: Option<u64>,
}

/// Window requested from the paged-fetch collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Number of items already loaded; 0 for the first page.
    pub offset: u64,
    /// Continuation token from the previous page, when the API issued one.
    pub page_token: Option<String>,
    pub page_size: u32,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    type Item: Send;

    async fn fetch_page(&self, request: PageRequest) -> Result<Page<Self::Item>, FetchError>;
}

/// Sub-state of a top-level `Loading` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingKind {
    /// Nothing fetched yet; an initial fetch should be started.
    Idle,
    /// A previous attempt was cancelled; a fresh fetch should be started.
    Retry,
    /// Initial fetch in flight.
    Loading,
}

/// Trailing sub-state of a `Success` list, rendered at the list's tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailState {
    Success,
    Loading,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListState<T> {
    Loading(LoadingKind),
    Error(String),
    Success { items: Vec<T>, tail: TailState },
}

impl<T> ListState<T> {
    /// The taskShouldRun predicate: true only when an initial fetch is
    /// wanted and none is in flight.
    pub fn should_start(&self) -> bool {
        matches!(
            self,
            ListState::Loading(LoadingKind::Idle) | ListState::Loading(LoadingKind::Retry)
        )
    }

    pub fn items(&self) -> &[T] {
        match self {
            ListState::Success { items, .. } => items,
            _ => &[],
        }
    }
}

/// Single-owner controller for one paged list. All mutation goes through
/// [`start_initial_fetch`](Self::start_initial_fetch) and
/// [`load_more`](Self::load_more); callers must serialize invocations
/// against the same instance (the exclusive borrow enforces this).
pub struct PagedList<F: PageFetcher> {
    fetcher: F,
    page_size: u32,
    state: ListState<F::Item>,
    next_page_token: Option<String>,
    total_available: Option<u64>,
}

impl<F: PageFetcher> PagedList<F> {
    pub fn new(fetcher: F, page_size: u32) -> Self {
        Self {
            fetcher,
            page_size,
            state: ListState::Loading(LoadingKind::Idle),
            next_page_token: None,
            total_available: None,
        }
    }

    pub fn state(&self) -> &ListState<F::Item> {
        &self.state
    }

    pub fn total_available(&self) -> Option<u64> {
        self.total_available
    }

    /// Whether the continuation bookkeeping says further pages exist: a
    /// token is present, or fewer items are loaded than the reported total.
    pub fn has_more(&self) -> bool {
        let ListState::Success { items, .. } = &self.state else {
            return false;
        };
        if self.next_page_token.is_some() {
            return true;
        }
        match self.total_available {
            Some(total) => (items.len() as u64) < total,
            None => false,
        }
    }

    /// Explicit full-list retry: drops fetched items and continuation state.
    /// The only transition that discards data.
    pub fn reset(&mut self) {
        self.state = ListState::Loading(LoadingKind::Retry);
        self.next_page_token = None;
        self.total_available = None;
    }

    /// Fetch the first page. A no-op unless the state says an initial fetch
    /// is wanted (`Loading(Idle)` or `Loading(Retry)`).
    #[instrument(skip_all)]
    pub async fn start_initial_fetch(&mut self) {
        if !self.state.should_start() {
            debug!("initial fetch not wanted in current state");
            return;
        }
        self.state = ListState::Loading(LoadingKind::Loading);

        let request = PageRequest {
            offset: 0,
            page_token: None,
            page_size: self.page_size,
        };
        match self.fetcher.fetch_page(request).await {
            Ok(page) => {
                self.next_page_token = page.next_page_token;
                self.total_available = page.total_available;
                debug!(count = page.items.len(), "initial page loaded");
                self.state = ListState::Success {
                    items: page.items,
                    tail: TailState::Success,
                };
            }
            Err(FetchError::Cancelled) => {
                self.state = ListState::Loading(LoadingKind::Retry);
            }
            Err(err) => {
                warn!(%err, "initial fetch failed");
                self.state = ListState::Error(err.to_string());
            }
        }
    }

    /// Fetch the next page and append it. A no-op unless the list is in a
    /// successful state with a retryable tail and the bookkeeping says more
    /// pages exist. Already-fetched items survive every failure here; only
    /// [`reset`](Self::reset) discards them.
    #[instrument(skip_all)]
    pub async fn load_more(&mut self) {
        let tail_ready = matches!(
            &self.state,
            ListState::Success {
                tail: TailState::Success | TailState::Error(_),
                ..
            }
        );
        if !tail_ready || !self.has_more() {
            debug!("load more not wanted in current state");
            return;
        }

        let ListState::Success { items, tail } = &mut self.state else {
            return;
        };
        *tail = TailState::Loading;
        let request = PageRequest {
            offset: items.len() as u64,
            page_token: self.next_page_token.clone(),
            page_size: self.page_size,
        };

        match self.fetcher.fetch_page(request).await {
            Ok(page) => {
                self.next_page_token = page.next_page_token;
                if page.total_available.is_some() {
                    self.total_available = page.total_available;
                }
                let ListState::Success { items, tail } = &mut self.state else {
                    return;
                };
                debug!(count = page.items.len(), "further page loaded");
                items.extend(page.items);
                *tail = TailState::Success;
            }
            Err(FetchError::Cancelled) => {
                // Items stay; the tail is re-armed so a later attempt can
                // run without an alarming message.
                let ListState::Success { tail, .. } = &mut self.state else {
                    return;
                };
                *tail = TailState::Success;
            }
            Err(err) => {
                warn!(%err, "further page failed");
                let ListState::Success { tail, .. } = &mut self.state else {
                    return;
                };
                *tail = TailState::Error(err.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Plays back a fixed sequence of page results and records the requests
    /// it saw.
    struct ScriptedFetcher {
        responses: Mutex<VecDeque<Result<Page<u32>, FetchError>>>,
        requests: Arc<Mutex<Vec<PageRequest>>>,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<Result<Page<u32>, FetchError>>) -> Self {
            Self {
                responses: Mutex::new(VecDeque::from(responses)),
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn requests_handle(&self) -> Arc<Mutex<Vec<PageRequest>>> {
            Arc::clone(&self.requests)
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        type Item = u32;

        async fn fetch_page(&self, request: PageRequest) -> Result<Page<u32>, FetchError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Other("script exhausted".into())))
        }
    }

    fn page(items: Vec<u32>, total: u64) -> Result<Page<u32>, FetchError> {
        Ok(Page {
            items,
            next_page_token: None,
            total_available: Some(total),
        })
    }

    #[tokio::test]
    async fn initial_fetch_moves_idle_to_success() {
        let fetcher = ScriptedFetcher::new(vec![page(vec![1, 2, 3], 3)]);
        let mut list = PagedList::new(fetcher, 5);
        assert!(list.state().should_start());

        list.start_initial_fetch().await;

        assert_eq!(list.state().items(), &[1, 2, 3]);
        assert!(!list.has_more());
    }

    #[tokio::test]
    async fn cancelled_initial_fetch_invites_retry() {
        let fetcher = ScriptedFetcher::new(vec![Err(FetchError::Cancelled), page(vec![7], 1)]);
        let mut list = PagedList::new(fetcher, 5);

        list.start_initial_fetch().await;
        assert_eq!(
            list.state(),
            &ListState::Loading(LoadingKind::Retry)
        );
        assert!(list.state().should_start());

        list.start_initial_fetch().await;
        assert_eq!(list.state().items(), &[7]);
    }

    #[tokio::test]
    async fn hard_error_on_initial_fetch_carries_message() {
        let fetcher = ScriptedFetcher::new(vec![Err(FetchError::Offline)]);
        let mut list = PagedList::new(fetcher, 5);

        list.start_initial_fetch().await;

        assert_eq!(
            list.state(),
            &ListState::Error("no network connection".into())
        );
        assert!(!list.state().should_start());
    }

    #[tokio::test]
    async fn start_while_successful_issues_no_fetch() {
        let fetcher = ScriptedFetcher::new(vec![page(vec![1], 1)]);
        let requests = fetcher.requests_handle();
        let mut list = PagedList::new(fetcher, 5);

        list.start_initial_fetch().await;
        list.start_initial_fetch().await;

        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn load_more_appends_pages_in_request_order() {
        let fetcher = ScriptedFetcher::new(vec![
            page(vec![1, 2, 3, 4, 5], 12),
            page(vec![6, 7, 8, 9, 10], 12),
            page(vec![11, 12], 12),
        ]);
        let requests = fetcher.requests_handle();
        let mut list = PagedList::new(fetcher, 5);

        list.start_initial_fetch().await;
        assert_eq!(list.state().items().len(), 5);
        assert!(list.has_more());

        list.load_more().await;
        assert_eq!(list.state().items().len(), 10);
        assert!(list.has_more());

        list.load_more().await;
        assert_eq!(
            list.state().items(),
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]
        );
        assert!(!list.has_more());

        // Loaded count == total available: a further call issues no fetch.
        list.load_more().await;
        let seen = requests.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1].offset, 5);
        assert_eq!(seen[2].offset, 10);
    }

    #[tokio::test]
    async fn failed_load_more_keeps_items_and_shows_tail_error() {
        let fetcher = ScriptedFetcher::new(vec![
            page(vec![1, 2], 4),
            Err(FetchError::Other("boom".into())),
            page(vec![3, 4], 4),
        ]);
        let mut list = PagedList::new(fetcher, 2);

        list.start_initial_fetch().await;
        list.load_more().await;

        assert_eq!(
            list.state(),
            &ListState::Success {
                items: vec![1, 2],
                tail: TailState::Error("boom".into()),
            }
        );

        // The tail error is retryable.
        list.load_more().await;
        assert_eq!(list.state().items(), &[1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn cancelled_load_more_keeps_items_and_rearms_tail() {
        let fetcher = ScriptedFetcher::new(vec![
            page(vec![1, 2], 4),
            Err(FetchError::Cancelled),
            page(vec![3, 4], 4),
        ]);
        let mut list = PagedList::new(fetcher, 2);

        list.start_initial_fetch().await;
        list.load_more().await;

        assert_eq!(
            list.state(),
            &ListState::Success {
                items: vec![1, 2],
                tail: TailState::Success,
            }
        );

        list.load_more().await;
        assert_eq!(list.state().items(), &[1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn token_continuation_drives_has_more() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(Page {
                items: vec![1, 2],
                next_page_token: Some("cursor-2".into()),
                total_available: None,
            }),
            Ok(Page {
                items: vec![3],
                next_page_token: None,
                total_available: None,
            }),
        ]);
        let requests = fetcher.requests_handle();
        let mut list = PagedList::new(fetcher, 2);

        list.start_initial_fetch().await;
        assert!(list.has_more());

        list.load_more().await;
        assert!(!list.has_more());

        let seen = requests.lock().unwrap();
        assert_eq!(seen[1].page_token.as_deref(), Some("cursor-2"));
    }

    #[tokio::test]
    async fn reset_is_the_only_transition_that_discards_items() {
        let fetcher = ScriptedFetcher::new(vec![page(vec![1, 2], 4), page(vec![9, 9], 2)]);
        let mut list = PagedList::new(fetcher, 2);

        list.start_initial_fetch().await;
        assert_eq!(list.state().items(), &[1, 2]);

        list.reset();
        assert_eq!(list.state(), &ListState::Loading(LoadingKind::Retry));
        assert!(!list.has_more());

        list.start_initial_fetch().await;
        assert_eq!(list.state().items(), &[9, 9]);
    }

    #[tokio::test]
    async fn total_refreshes_on_every_page() {
        let fetcher = ScriptedFetcher::new(vec![
            page(vec![1, 2], 3),
            // The total grew while paging; the newest figure wins.
            page(vec![3, 4], 5),
        ]);
        let mut list = PagedList::new(fetcher, 2);

        list.start_initial_fetch().await;
        assert_eq!(list.total_available(), Some(3));

        list.load_more().await;
        assert_eq!(list.total_available(), Some(5));
        assert!(list.has_more());
    }
}
