//! Case list view state: filtering, pagination and debounced search.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::client::CaseRepository;
use crate::debounce::SearchDebouncer;
use crate::model::{CasesFilter, PatientCase};
use crate::store::Observable;
use crate::{ReviewError, ReviewResult, DEFAULT_PAGE_SIZE};

/// Everything a list view renders, replaced as one value so `cases` and
/// `total` can never disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseListSnapshot {
    pub cases: Vec<PatientCase>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub filter: CasesFilter,
    /// `Some` while showing free-text search results instead of the
    /// filtered listing.
    pub query: Option<String>,
}

impl CaseListSnapshot {
    #[must_use]
    fn empty(page_size: u32) -> Self {
        Self {
            cases: Vec::new(),
            total: 0,
            page: 1,
            page_size,
            filter: CasesFilter::default(),
            query: None,
        }
    }

    #[must_use]
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.page_size))
    }

    /// 1-based inclusive range of displayed positions, `(0, 0)` when empty.
    #[must_use]
    pub fn displayed_range(&self) -> (u64, u64) {
        if self.total == 0 {
            return (0, 0);
        }
        let page = u64::from(self.page.max(1));
        let size = u64::from(self.page_size);
        let start = (page - 1) * size + 1;
        let end = (page * size).min(self.total);
        (start, end)
    }
}

pub struct CaseListState {
    repo: Arc<dyn CaseRepository>,
    snapshot: Observable<CaseListSnapshot>,
    loading: Observable<bool>,
    last_error: Observable<Option<ReviewError>>,
    debouncer: Mutex<SearchDebouncer>,
}

impl CaseListState {
    #[must_use]
    pub fn new(repo: Arc<dyn CaseRepository>) -> Self {
        Self {
            repo,
            snapshot: Observable::new(CaseListSnapshot::empty(DEFAULT_PAGE_SIZE)),
            loading: Observable::new(false),
            last_error: Observable::new(None),
            debouncer: Mutex::new(SearchDebouncer::new()),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> &Observable<CaseListSnapshot> {
        &self.snapshot
    }

    #[must_use]
    pub fn loading(&self) -> &Observable<bool> {
        &self.loading
    }

    #[must_use]
    pub fn last_error(&self) -> &Observable<Option<ReviewError>> {
        &self.last_error
    }

    /// Replaces the active filter, resets to page 1 and reloads. Setting the
    /// filter already in effect is a no-op (no remote call).
    pub async fn set_filter(&self, filter: CasesFilter) -> ReviewResult<()> {
        let current = self.snapshot.get();
        if current.filter == filter && current.query.is_none() {
            debug!("filter unchanged, skipping reload");
            return Ok(());
        }
        self.snapshot.update(|s| {
            s.filter = filter;
            s.page = 1;
            s.query = None;
        });
        self.debouncer_guard().reset();
        self.reload().await
    }

    /// Jumps to `page`. Range checking is the caller's job; a page past the
    /// end comes back empty.
    pub async fn set_page(&self, page: u32) -> ReviewResult<()> {
        self.snapshot.update(|s| s.page = page);
        self.reload().await
    }

    pub async fn set_page_size(&self, page_size: u32) -> ReviewResult<()> {
        self.snapshot.update(|s| {
            s.page_size = page_size;
            s.page = 1;
        });
        self.reload().await
    }

    /// Fetches the current filter/page from the repository and publishes the
    /// result atomically. On failure the previous snapshot stays visible and
    /// the error is published.
    pub async fn reload(&self) -> ReviewResult<()> {
        let current = self.snapshot.get();
        self.loading.set(true);
        let outcome = self
            .repo
            .list_cases(&current.filter, current.page, current.page_size)
            .await;
        self.loading.set(false);
        match outcome {
            Ok(page) => {
                self.snapshot.update(|s| {
                    s.cases = page.cases;
                    s.total = page.total;
                    s.page = page.page;
                    s.query = None;
                });
                self.last_error.set(None);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "case list reload failed");
                let err = ReviewError::from(e);
                self.last_error.set(Some(err.clone()));
                Err(err)
            }
        }
    }

    /// Debounced free-text search. Keystrokes inside the quiet window
    /// supersede earlier ones and a query identical to the last one issued is
    /// dropped; superseded and duplicate submissions resolve to `Ok(())`
    /// without touching the repository. A blank query reverts to the filtered
    /// listing. Shells call this once per keystroke, each from its own task.
    pub async fn search(&self, query: &str) -> ReviewResult<()> {
        if query.trim().is_empty() {
            self.debouncer_guard().reset();
            return self.reload().await;
        }

        let (token, delay) = self.debouncer_guard().submit(query);
        tokio::time::sleep(delay).await;
        let Some(query) = self.debouncer_guard().fire(token) else {
            return Ok(());
        };

        debug!(%query, "issuing case search");
        self.loading.set(true);
        let outcome = self.repo.search_cases(&query).await;
        self.loading.set(false);
        match outcome {
            Ok(cases) => {
                self.snapshot.update(|s| {
                    s.total = cases.len() as u64;
                    s.cases = cases;
                    s.page = 1;
                    s.query = Some(query);
                });
                self.last_error.set(None);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "case search failed");
                let err = ReviewError::from(e);
                self.last_error.set(Some(err.clone()));
                Err(err)
            }
        }
    }

    fn debouncer_guard(&self) -> MutexGuard<'_, SearchDebouncer> {
        match self.debouncer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
