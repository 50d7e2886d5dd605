//! Orchestrates one archive run.
//!
//! [`SyncEngine`] resolves the folder, pages through the listing with the
//! ledger's archived ids as the exclusion hint, and runs every unseen item
//! through the [`ItemTransformer`]. Each outcome is recorded only after the
//! document write has finished, and the ledger is checkpointed every
//! [`SyncOptions::checkpoint_every`] items, after every batch, and once more
//! before `run` returns, including on error.
//!
//! # Example
//!
//! ```no_run
//! use archiver_core::archive::ItemTransformer;
//! use archiver_core::ledger::ManifestStore;
//! use archiver_core::sync::{SyncEngine, SyncOptions};
//! # use archiver_core::api::BookmarkApi;
//!
//! # async fn example(api: &dyn BookmarkApi) -> Result<(), archiver_core::sync::SyncError> {
//! let engine = SyncEngine::new(
//!     SyncOptions::default(),
//!     ItemTransformer::new("./vault"),
//!     ManifestStore::new("./manifest.json"),
//! );
//! let report = engine.run(api, "archive").await?;
//! println!("archived {}", report.archived);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::api::{ApiError, BookmarkApi, RemoteItem, Sleeper, TokioSleeper};
use crate::archive::{ItemTransformer, TransformError};
use crate::folders::resolve_folder;
use crate::ledger::{Ledger, LedgerEntry, LedgerError, ManifestStore};
use crate::paginator::{
    DEFAULT_MAX_HAVE_IDS, DEFAULT_MAX_ITERATIONS, DeltaPaginator, MAX_PAGE_SIZE,
    PaginationCursor, StopReason,
};

/// Default number of processed items between ledger checkpoints.
pub const DEFAULT_CHECKPOINT_EVERY: usize = 20;

/// Default pause after each content fetch.
pub const DEFAULT_ITEM_DELAY: Duration = Duration::from_secs(1);

/// Errors that abort a run.
///
/// Per-item failures never abort; they are counted in [`SyncReport`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// Folder resolution, listing, or a content fetch failed after retries
    /// or was refused for bad credentials.
    #[error("remote API error: {0}")]
    Api(#[from] ApiError),

    /// The ledger could not be loaded or persisted.
    #[error("manifest error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Tunables for a run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Listing page size, clamped to `1..=500`.
    pub page_size: u32,
    /// Cap on ids sent in the exclusion hint.
    pub max_have_ids: usize,
    /// Safety bound on listing requests.
    pub max_iterations: u32,
    /// Items processed between ledger checkpoints (minimum 1).
    pub checkpoint_every: usize,
    /// Pause after each content fetch.
    pub item_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            max_have_ids: DEFAULT_MAX_HAVE_IDS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
            item_delay: DEFAULT_ITEM_DELAY,
        }
    }
}

/// Outcome counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Resolved folder id.
    pub folder_id: String,
    /// Items written and recorded as `success`.
    pub archived: usize,
    /// Items recorded as `text_fetch_failed`.
    pub fetch_failed: usize,
    /// Items recorded as `markdown_conversion_failed`.
    pub conversion_failed: usize,
    /// Items whose document could not be written; left unrecorded.
    pub persist_failed: usize,
    /// Listed items skipped because the ledger already had them.
    pub skipped: usize,
    /// Listing requests issued.
    pub batches: u32,
    /// Why pagination stopped.
    pub stop_reason: Option<StopReason>,
}

impl SyncReport {
    /// Items that went through the transformer this run.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.archived + self.fetch_failed + self.conversion_failed + self.persist_failed
    }

    /// True if any item failed this run.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.fetch_failed + self.conversion_failed + self.persist_failed > 0
    }
}

/// Runs the archive pipeline against a [`BookmarkApi`].
pub struct SyncEngine {
    options: SyncOptions,
    paginator: DeltaPaginator,
    transformer: ItemTransformer,
    store: ManifestStore,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("options", &self.options)
            .field("transformer", &self.transformer)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Creates an engine that pauses with `tokio::time::sleep`.
    #[must_use]
    pub fn new(options: SyncOptions, transformer: ItemTransformer, store: ManifestStore) -> Self {
        let paginator = DeltaPaginator::new(options.page_size, options.max_have_ids);
        Self {
            options,
            paginator,
            transformer,
            store,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replaces the sleeper used for the per-item delay.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Archives every unseen item of `folder_name`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Api`] if folder resolution, a listing request,
    /// or a content fetch fails after retries or on rejected credentials,
    /// or [`SyncError::Ledger`] if the ledger cannot be loaded or persisted.
    /// The ledger is persisted before either is returned.
    #[instrument(skip(self, api), fields(folder = folder_name))]
    pub async fn run(&self, api: &dyn BookmarkApi, folder_name: &str) -> Result<SyncReport, SyncError> {
        let mut ledger = self.store.load()?;
        let mut report = SyncReport::default();

        let outcome = self.drive(api, folder_name, &mut ledger, &mut report).await;
        let persisted = self.store.persist(&ledger);

        match outcome {
            Ok(()) => {
                persisted?;
                info!(
                    archived = report.archived,
                    fetch_failed = report.fetch_failed,
                    conversion_failed = report.conversion_failed,
                    persist_failed = report.persist_failed,
                    skipped = report.skipped,
                    batches = report.batches,
                    stop = ?report.stop_reason,
                    "sync complete"
                );
                Ok(report)
            }
            Err(err) => {
                if let Err(persist_err) = persisted {
                    warn!(error = %persist_err, "final manifest persist failed");
                }
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        api: &dyn BookmarkApi,
        folder_name: &str,
        ledger: &mut Ledger,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let folder = resolve_folder(api, folder_name).await?;
        report.folder_id = folder.folder_id().to_string();
        info!(folder_id = %report.folder_id, known = ledger.len(), "starting sync");

        let mut cursor = PaginationCursor::new(ledger.success_ids(), self.options.max_iterations);
        let checkpoint_every = self.options.checkpoint_every.max(1);
        let mut since_checkpoint = 0usize;

        while cursor.begin_iteration() {
            let batch = self
                .paginator
                .next_batch(api, folder.folder_id(), cursor.seen())
                .await?;
            report.batches = cursor.iterations();

            let fresh = cursor.absorb(batch);
            debug!(fresh = fresh.len(), "batch absorbed");

            for item in fresh {
                if ledger.contains(item.bookmark_id) {
                    report.skipped += 1;
                    continue;
                }

                self.process_item(api, &item, ledger, report).await?;
                if !self.options.item_delay.is_zero() {
                    self.sleeper.sleep(self.options.item_delay).await;
                }

                since_checkpoint += 1;
                if since_checkpoint >= checkpoint_every {
                    self.store.persist(ledger)?;
                    since_checkpoint = 0;
                }
            }

            self.store.persist(ledger)?;
        }

        report.stop_reason = cursor.stop_reason();
        Ok(())
    }

    async fn process_item(
        &self,
        api: &dyn BookmarkApi,
        item: &RemoteItem,
        ledger: &mut Ledger,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        match self.transformer.process(api, item).await {
            Ok(document) => {
                info!(item_id = item.bookmark_id, path = %document.path.display(), "archived");
                ledger.record(
                    item.bookmark_id,
                    LedgerEntry::success(item.title.clone(), document.path),
                );
                report.archived += 1;
            }
            Err(TransformError::Unavailable { source }) => {
                warn!(
                    item_id = item.bookmark_id,
                    error = %source,
                    "content service unavailable; stopping"
                );
                return Err(source.into());
            }
            Err(err) => self.record_failure(item, &err, ledger, report),
        }
        Ok(())
    }

    fn record_failure(
        &self,
        item: &RemoteItem,
        err: &TransformError,
        ledger: &mut Ledger,
        report: &mut SyncReport,
    ) {
        warn!(item_id = item.bookmark_id, error = %err, "item failed");
        match err {
            TransformError::FetchFailed { .. } => report.fetch_failed += 1,
            TransformError::ConversionFailed { .. } => report.conversion_failed += 1,
            TransformError::PersistFailed { .. } => report.persist_failed += 1,
            TransformError::Unavailable { .. } => {}
        }
        if let Some(status) = err.ledger_status() {
            ledger.record(
                item.bookmark_id,
                LedgerEntry::failed(status, item.title.clone(), err.message()),
            );
        } else {
            debug!(
                item_id = item.bookmark_id,
                dir = %self.transformer.output_dir().display(),
                "write failure left unrecorded for retry"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::api::{BookmarkQuery, Folder, RawTimestamp};
    use crate::archive::FixedClock;
    use crate::ledger::EntryStatus;

    // ==================== Fakes ====================

    #[derive(Default)]
    struct FakeState {
        list_calls: Vec<BookmarkQuery>,
        text_calls: Vec<u64>,
        /// Manifest ids observed on disk at each `get_text` call.
        manifest_seen_at_fetch: Vec<Vec<String>>,
    }

    /// In-memory remote listing items in descending id order.
    struct FakeApi {
        items: Vec<RemoteItem>,
        texts: HashMap<u64, Result<String, u16>>,
        honor_have: bool,
        fail_list_on_call: Option<usize>,
        endless: bool,
        manifest: Option<PathBuf>,
        state: Mutex<FakeState>,
    }

    impl FakeApi {
        fn new(ids: &[u64]) -> Self {
            let mut ids = ids.to_vec();
            ids.sort_unstable_by(|a, b| b.cmp(a));
            Self {
                items: ids.iter().map(|id| item(*id, &format!("Item {id}"))).collect(),
                texts: ids
                    .iter()
                    .map(|id| (*id, Ok(format!("<p>Body of {id}</p>"))))
                    .collect(),
                honor_have: true,
                fail_list_on_call: None,
                endless: false,
                manifest: None,
                state: Mutex::new(FakeState::default()),
            }
        }

        fn text_calls(&self) -> Vec<u64> {
            self.state.lock().unwrap().text_calls.clone()
        }

        fn list_calls(&self) -> Vec<BookmarkQuery> {
            self.state.lock().unwrap().list_calls.clone()
        }
    }

    #[async_trait]
    impl BookmarkApi for FakeApi {
        async fn list_folders(&self) -> Result<Vec<Folder>, ApiError> {
            Ok(Vec::new())
        }

        async fn list_bookmarks(&self, query: &BookmarkQuery) -> Result<Vec<RemoteItem>, ApiError> {
            let mut state = self.state.lock().unwrap();
            state.list_calls.push(query.clone());
            let call = state.list_calls.len();
            if self.fail_list_on_call == Some(call) {
                return Err(ApiError::RetryExhausted {
                    attempts: 5,
                    last: Box::new(ApiError::http_status("/bookmarks/list", 503, None)),
                });
            }
            if self.endless {
                let id = 10_000 + call as u64;
                return Ok(vec![item(id, "endless")]);
            }
            let limit = query.limit as usize;
            Ok(self
                .items
                .iter()
                .filter(|i| !self.honor_have || !query.have.contains(&i.bookmark_id))
                .take(limit)
                .cloned()
                .collect())
        }

        async fn get_text(&self, bookmark_id: u64) -> Result<String, ApiError> {
            let mut state = self.state.lock().unwrap();
            state.text_calls.push(bookmark_id);
            if let Some(path) = &self.manifest {
                let ids: Vec<String> = fs::read_to_string(path)
                    .ok()
                    .and_then(|raw| serde_json::from_str::<HashMap<String, serde_json::Value>>(&raw).ok())
                    .map(|map| map.into_keys().collect())
                    .unwrap_or_default();
                state.manifest_seen_at_fetch.push(ids);
            }
            match self.texts.get(&bookmark_id) {
                Some(Ok(text)) => Ok(text.clone()),
                Some(Err(503)) => Err(ApiError::RetryExhausted {
                    attempts: 5,
                    last: Box::new(ApiError::http_status("/bookmarks/get_text", 503, None)),
                }),
                Some(Err(status)) => Err(ApiError::http_status("/bookmarks/get_text", *status, None)),
                None => Ok("<p>endless</p>".to_string()),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    fn item(id: u64, title: &str) -> RemoteItem {
        RemoteItem {
            bookmark_id: id,
            title: title.to_string(),
            url: format!("https://example.com/{id}"),
            folder_id: None,
            time_saved: Some(RawTimestamp::Integer(1_700_000_000)),
            time: None,
        }
    }

    fn options(page_size: u32) -> SyncOptions {
        SyncOptions {
            page_size,
            checkpoint_every: 20,
            item_delay: Duration::from_millis(10),
            ..SyncOptions::default()
        }
    }

    fn engine(dir: &Path, manifest: &Path, options: SyncOptions) -> (SyncEngine, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let transformer = ItemTransformer::new(dir).with_clock(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )));
        let engine = SyncEngine::new(options, transformer, ManifestStore::new(manifest))
            .with_sleeper(sleeper.clone());
        (engine, sleeper)
    }

    fn markdown_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "md"))
            .count()
    }

    // ==================== Run Tests ====================

    #[tokio::test]
    async fn test_run_archives_every_item_across_batches() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        let out = dir.path().join("vault");
        let api = FakeApi::new(&[1, 2, 3]);
        let (engine, sleeper) = engine(&out, &manifest, options(2));

        let report = engine.run(&api, "archive").await.unwrap();

        assert_eq!(report.folder_id, "archive");
        assert_eq!(report.archived, 3);
        assert_eq!(report.batches, 3);
        assert_eq!(report.stop_reason, Some(StopReason::Exhausted));
        assert_eq!(markdown_files(&out), 3);

        let calls = api.list_calls();
        assert!(calls[0].have.is_empty());
        assert_eq!(calls[1].have, vec![3, 2]);
        assert_eq!(calls[2].have, vec![3, 2, 1]);

        assert_eq!(sleeper.sleeps.lock().unwrap().len(), 3);

        let ledger = ManifestStore::new(&manifest).load().unwrap();
        assert_eq!(ledger.summary().success, 3);
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        let out = dir.path().join("vault");
        let api = FakeApi::new(&[1, 2, 3]);
        let (engine, _) = engine(&out, &manifest, options(500));

        engine.run(&api, "archive").await.unwrap();
        let fetched = api.text_calls().len();
        let second = engine.run(&api, "archive").await.unwrap();

        assert_eq!(second.archived, 0);
        assert_eq!(api.text_calls().len(), fetched);
        assert_eq!(markdown_files(&out), 3);
        assert_eq!(api.list_calls().last().unwrap().have, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_item_42_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        let mut api = FakeApi::new(&[]);
        api.items = vec![item(42, "Foo/Bar?")];
        api.texts = HashMap::from([(42, Ok("<p>Hello</p>".to_string()))]);
        let (engine, _) = engine(dir.path(), &manifest, options(500));

        let report = engine.run(&api, "archive").await.unwrap();
        assert_eq!(report.archived, 1);

        let path = dir.path().join("2023-11-14 – FooBar.md");
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("instapaper_id: 42\n"));
        assert!(written.contains("date_saved: 2023-11-14\n"));

        let ledger = ManifestStore::new(&manifest).load().unwrap();
        let entry = ledger.get(42).unwrap();
        assert_eq!(entry.status, EntryStatus::Success);
        assert_eq!(entry.output_path.as_deref(), Some(path.as_path()));

        engine.run(&api, "archive").await.unwrap();
        assert_eq!(api.text_calls(), vec![42]);
    }

    #[tokio::test]
    async fn test_quoted_title_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        let mut api = FakeApi::new(&[]);
        api.items = vec![item(42, "A \"Quoted\" Title")];
        api.texts = HashMap::from([(42, Ok("<p>Quoted body</p>".to_string()))]);
        let (engine, _) = engine(dir.path(), &manifest, options(500));

        let first = engine.run(&api, "archive").await.unwrap();
        assert_eq!(first.archived, 1);

        let path = dir.path().join("2023-11-14 – A Quoted Title.md");
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("---\ntitle: \"A \\\"Quoted\\\" Title\"\n"));
        assert!(written.contains("instapaper_id: 42\n"));

        let second = engine.run(&api, "archive").await.unwrap();
        assert_eq!(second.archived, 0);
        assert_eq!(api.text_calls(), vec![42]);
        assert_eq!(markdown_files(dir.path()), 1);
    }

    #[tokio::test]
    async fn test_unavailable_content_service_aborts_without_ledgering() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        let out = dir.path().join("vault");
        let mut api = FakeApi::new(&[1, 2, 3]);
        api.texts.insert(2, Err(503));
        let (engine, _) = engine(&out, &manifest, options(500));

        let err = engine.run(&api, "archive").await.unwrap_err();
        assert!(matches!(err, SyncError::Api(ApiError::RetryExhausted { .. })));
        assert_eq!(api.text_calls(), vec![3, 2]);

        let ledger = ManifestStore::new(&manifest).load().unwrap();
        assert!(ledger.is_success(3));
        assert!(!ledger.contains(2));
        assert!(!ledger.contains(1));

        let recovered = FakeApi::new(&[1, 2, 3]);
        let report = engine.run(&recovered, "archive").await.unwrap();
        assert_eq!(report.archived, 2);
        assert_eq!(recovered.text_calls(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_ledgered_and_skipped_later() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        let mut api = FakeApi::new(&[1, 2]);
        api.texts.insert(2, Err(400));
        let (engine, _) = engine(dir.path(), &manifest, options(500));

        let first = engine.run(&api, "archive").await.unwrap();
        assert_eq!(first.archived, 1);
        assert_eq!(first.fetch_failed, 1);

        let second = engine.run(&api, "archive").await.unwrap();
        assert_eq!(second.skipped, 1);
        assert_eq!(second.fetch_failed, 0);
        assert_eq!(api.text_calls().iter().filter(|id| **id == 2).count(), 1);

        let ledger = ManifestStore::new(&manifest).load().unwrap();
        assert_eq!(ledger.get(2).unwrap().status, EntryStatus::TextFetchFailed);
    }

    #[tokio::test]
    async fn test_conversion_failure_is_ledgered() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        let mut api = FakeApi::new(&[5]);
        api.texts.insert(5, Ok("<p>\0</p>".to_string()));
        let (engine, _) = engine(dir.path(), &manifest, options(500));

        let report = engine.run(&api, "archive").await.unwrap();
        assert_eq!(report.conversion_failed, 1);
        assert!(report.has_failures());

        let ledger = ManifestStore::new(&manifest).load().unwrap();
        assert_eq!(
            ledger.get(5).unwrap().status,
            EntryStatus::MarkdownConversionFailed
        );
    }

    #[tokio::test]
    async fn test_write_failure_is_not_ledgered_and_retried_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let api = FakeApi::new(&[7]);

        let (broken, _) = engine(&blocker, &manifest, options(500));
        let report = broken.run(&api, "archive").await.unwrap();
        assert_eq!(report.persist_failed, 1);
        assert!(ManifestStore::new(&manifest).load().unwrap().is_empty());

        let (fixed, _) = engine(&dir.path().join("vault"), &manifest, options(500));
        let report = fixed.run(&api, "archive").await.unwrap();
        assert_eq!(report.archived, 1);
        assert_eq!(api.text_calls(), vec![7, 7]);
    }

    // ==================== Pagination Tests ====================

    #[tokio::test]
    async fn test_iteration_bound_stops_endless_listing() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        let mut api = FakeApi::new(&[]);
        api.endless = true;
        let mut opts = options(500);
        opts.max_iterations = 3;
        let (engine, _) = engine(dir.path(), &manifest, opts);

        let report = engine.run(&api, "archive").await.unwrap();
        assert_eq!(report.stop_reason, Some(StopReason::IterationLimit));
        assert_eq!(report.batches, 3);
        assert_eq!(api.list_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_converges_when_server_ignores_have() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        let mut api = FakeApi::new(&[1, 2]);
        api.honor_have = false;
        let (engine, _) = engine(dir.path(), &manifest, options(500));

        let report = engine.run(&api, "archive").await.unwrap();
        assert_eq!(report.archived, 2);
        assert_eq!(report.stop_reason, Some(StopReason::NoNewItems));
        assert_eq!(report.batches, 2);
    }

    #[tokio::test]
    async fn test_listing_error_persists_progress_and_rerun_converges() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        let out = dir.path().join("vault");
        let mut interrupted = FakeApi::new(&[1, 2, 3, 4]);
        interrupted.fail_list_on_call = Some(2);
        let (engine, _) = engine(&out, &manifest, options(2));

        let err = engine.run(&interrupted, "archive").await.unwrap_err();
        assert!(matches!(err, SyncError::Api(ApiError::RetryExhausted { .. })));
        assert_eq!(ManifestStore::new(&manifest).load().unwrap().len(), 2);

        let api = FakeApi::new(&[1, 2, 3, 4]);
        let report = engine.run(&api, "archive").await.unwrap();
        assert_eq!(report.archived, 2);
        assert_eq!(api.text_calls(), vec![2, 1]);
        assert_eq!(markdown_files(&out), 4);
    }

    // ==================== Checkpoint Tests ====================

    #[tokio::test]
    async fn test_checkpoint_persists_within_batch() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        let mut api = FakeApi::new(&[1, 2, 3]);
        api.manifest = Some(manifest.clone());
        let mut opts = options(500);
        opts.checkpoint_every = 1;
        let (engine, _) = engine(dir.path(), &manifest, opts);

        engine.run(&api, "archive").await.unwrap();

        let seen = api.state.lock().unwrap().manifest_seen_at_fetch.clone();
        assert!(seen[0].is_empty());
        assert_eq!(seen[1], vec!["3".to_string()]);
        assert_eq!(seen[2].len(), 2);
    }

    #[tokio::test]
    async fn test_zero_delay_does_not_sleep() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        let api = FakeApi::new(&[1]);
        let mut opts = options(500);
        opts.item_delay = Duration::ZERO;
        let (engine, sleeper) = engine(dir.path(), &manifest, opts);

        engine.run(&api, "archive").await.unwrap();
        assert!(sleeper.sleeps.lock().unwrap().is_empty());
    }
}
