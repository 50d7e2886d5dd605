//! Delta pagination over a folder's bookmark listing.
//!
//! The listing endpoint has no cursor. Instead the client sends the ids it
//! already has (`have`) and the server omits them, so each request returns the
//! next slice of unseen items. [`PaginationCursor`] tracks what has been seen
//! and decides when to stop; [`DeltaPaginator`] issues the requests.
//!
//! # State machine
//!
//! ```text
//! FETCHING --(batch has unseen ids)--> FETCHING
//! FETCHING --(empty batch)-----------> DONE(Exhausted)
//! FETCHING --(every id already seen)-> DONE(NoNewItems)
//! FETCHING --(iteration bound)-------> DONE(IterationLimit)
//! ```

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, instrument, warn};

use crate::api::{ApiError, BookmarkApi, BookmarkQuery, RemoteItem};

/// Largest page the listing endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Default cap on the number of ids sent in the exclusion hint.
pub const DEFAULT_MAX_HAVE_IDS: usize = 1000;

/// Default safety bound on listing requests per run.
pub const DEFAULT_MAX_ITERATIONS: u32 = 200;

/// Why pagination stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The server returned an empty batch.
    Exhausted,
    /// Every id in the batch had already been seen.
    NoNewItems,
    /// The iteration bound was reached before the listing converged.
    IterationLimit,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted => write!(f, "exhausted"),
            Self::NoNewItems => write!(f, "no new items"),
            Self::IterationLimit => write!(f, "iteration limit"),
        }
    }
}

/// Issues listing requests with an exclusion hint.
#[derive(Debug, Clone)]
pub struct DeltaPaginator {
    page_size: u32,
    max_have_ids: usize,
}

impl Default for DeltaPaginator {
    fn default() -> Self {
        Self::new(MAX_PAGE_SIZE, DEFAULT_MAX_HAVE_IDS)
    }
}

impl DeltaPaginator {
    /// Creates a paginator. `page_size` is clamped to `1..=500`.
    #[must_use]
    pub fn new(page_size: u32, max_have_ids: usize) -> Self {
        Self {
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            max_have_ids,
        }
    }

    /// Returns the effective page size.
    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Builds the exclusion hint: the highest `max_have_ids` ids, descending.
    #[must_use]
    pub fn exclusion_hint(&self, already_seen: &BTreeSet<u64>) -> Vec<u64> {
        already_seen
            .iter()
            .rev()
            .take(self.max_have_ids)
            .copied()
            .collect()
    }

    /// Requests the next batch of items not in `already_seen`.
    ///
    /// The server may still return seen ids (when the hint was truncated);
    /// callers filter through [`PaginationCursor::absorb`].
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] from the listing call after retries.
    #[instrument(skip(self, api, already_seen), fields(seen = already_seen.len()))]
    pub async fn next_batch(
        &self,
        api: &dyn BookmarkApi,
        folder_id: &str,
        already_seen: &BTreeSet<u64>,
    ) -> Result<Vec<RemoteItem>, ApiError> {
        let query = BookmarkQuery {
            folder_id: folder_id.to_string(),
            limit: self.page_size,
            have: self.exclusion_hint(already_seen),
        };
        if query.have.len() < already_seen.len() {
            debug!(
                sent = query.have.len(),
                total = already_seen.len(),
                "exclusion hint truncated"
            );
        }
        let batch = api.list_bookmarks(&query).await?;
        debug!(count = batch.len(), "received batch");
        Ok(batch)
    }
}

/// Tracks seen ids and the pagination state across batches.
#[derive(Debug, Clone)]
pub struct PaginationCursor {
    seen: BTreeSet<u64>,
    iterations: u32,
    max_iterations: u32,
    stop: Option<StopReason>,
}

impl PaginationCursor {
    /// Starts pagination with ids that are already known.
    #[must_use]
    pub fn new(initial_seen: impl IntoIterator<Item = u64>, max_iterations: u32) -> Self {
        Self {
            seen: initial_seen.into_iter().collect(),
            iterations: 0,
            max_iterations,
            stop: None,
        }
    }

    /// Ids seen so far, including the initial set.
    #[must_use]
    pub fn seen(&self) -> &BTreeSet<u64> {
        &self.seen
    }

    /// Number of batches requested so far.
    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Why pagination stopped, once it has.
    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    /// True once a stop condition was reached.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.stop.is_some()
    }

    /// Claims the next iteration. Returns false when pagination is done,
    /// moving to `IterationLimit` if the bound is hit.
    pub fn begin_iteration(&mut self) -> bool {
        if self.stop.is_some() {
            return false;
        }
        if self.iterations >= self.max_iterations {
            warn!(
                iterations = self.iterations,
                seen = self.seen.len(),
                "pagination iteration limit reached; listing did not converge"
            );
            self.stop = Some(StopReason::IterationLimit);
            return false;
        }
        self.iterations += 1;
        true
    }

    /// Feeds a batch and returns the items with previously unseen ids.
    ///
    /// Duplicates within the batch are dropped. An empty batch ends
    /// pagination with `Exhausted`; a batch with nothing new ends it with
    /// `NoNewItems`.
    pub fn absorb(&mut self, batch: Vec<RemoteItem>) -> Vec<RemoteItem> {
        if batch.is_empty() {
            self.stop = Some(StopReason::Exhausted);
            return Vec::new();
        }

        let mut in_batch = HashSet::with_capacity(batch.len());
        let fresh: Vec<RemoteItem> = batch
            .into_iter()
            .filter(|item| !self.seen.contains(&item.bookmark_id) && in_batch.insert(item.bookmark_id))
            .collect();

        if fresh.is_empty() {
            self.stop = Some(StopReason::NoNewItems);
        } else {
            self.seen.extend(fresh.iter().map(|item| item.bookmark_id));
        }
        fresh
    }
}
