//! Per-item fetch, convert, and persist.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::document::{
    ArchivedDocument, Clock, DateSource, DocumentMetadata, SystemClock, render_document,
    resolve_save_date,
};
use super::filename::document_filename;
use super::markdown;
use crate::api::{ApiError, BookmarkApi, FailureType, RemoteItem, classify_error};
use crate::atomic::write_atomic;
use crate::ledger::EntryStatus;

/// Why an item could not be archived.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The content could not be fetched, or was empty.
    #[error("text fetch failed: {message}")]
    FetchFailed {
        /// What went wrong.
        message: String,
    },

    /// The fetched content could not be converted.
    #[error("markdown conversion failed: {message}")]
    ConversionFailed {
        /// What went wrong.
        message: String,
    },

    /// The document could not be written.
    #[error("failed to write {}: {source}", path.display())]
    PersistFailed {
        /// Target path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The content service could not be reached or rejected the session.
    ///
    /// Says nothing about the item itself, so the caller should stop.
    #[error("content service unavailable: {source}")]
    Unavailable {
        /// The fetch error.
        #[source]
        source: ApiError,
    },
}

impl TransformError {
    /// Ledger status to record for this failure, if it should be recorded.
    ///
    /// Write failures and service outages are not recorded so the item is
    /// retried next run.
    #[must_use]
    pub fn ledger_status(&self) -> Option<EntryStatus> {
        match self {
            Self::FetchFailed { .. } => Some(EntryStatus::TextFetchFailed),
            Self::ConversionFailed { .. } => Some(EntryStatus::MarkdownConversionFailed),
            Self::PersistFailed { .. } | Self::Unavailable { .. } => None,
        }
    }

    /// The failure detail without the variant prefix.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::FetchFailed { message } | Self::ConversionFailed { message } => message.clone(),
            Self::PersistFailed { source, .. } => source.to_string(),
            Self::Unavailable { source } => source.to_string(),
        }
    }
}

/// Turns remote items into Markdown files in an output directory.
pub struct ItemTransformer {
    output_dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ItemTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemTransformer")
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl ItemTransformer {
    /// Creates a transformer writing into `output_dir` using the system clock.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for save-date fallback.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Fetches, converts, and writes one item.
    ///
    /// # Errors
    ///
    /// - [`TransformError::FetchFailed`] when the service refuses this item
    ///   (permanent HTTP status or remote error) or returns blank content
    /// - [`TransformError::Unavailable`] when retries ran out or the
    ///   credentials were rejected
    /// - [`TransformError::ConversionFailed`] when the markup cannot be converted
    /// - [`TransformError::PersistFailed`] when the file cannot be written
    #[instrument(skip(self, api, item), fields(item_id = item.bookmark_id))]
    pub async fn process(
        &self,
        api: &dyn BookmarkApi,
        item: &RemoteItem,
    ) -> Result<ArchivedDocument, TransformError> {
        let html = api.get_text(item.bookmark_id).await.map_err(|e| {
            if is_item_failure(&e) {
                TransformError::FetchFailed {
                    message: e.to_string(),
                }
            } else {
                TransformError::Unavailable { source: e }
            }
        })?;
        if html.trim().is_empty() {
            return Err(TransformError::FetchFailed {
                message: "empty content".to_string(),
            });
        }

        let body = markdown::convert(&html).map_err(|e| TransformError::ConversionFailed {
            message: e.to_string(),
        })?;

        let save_date = resolve_save_date(item, self.clock.as_ref());
        if save_date.source != DateSource::TimeSaved {
            debug!(source = %save_date.source, "save date not from time_saved");
        }
        let metadata = DocumentMetadata::from_item(item, save_date);
        let path = self
            .output_dir
            .join(document_filename(save_date.date, &item.title));

        let rendered = render_document(&metadata, &body);
        if let Err(source) = write_atomic(&path, rendered.as_bytes()) {
            warn!(path = %path.display(), error = %source, "failed to write document");
            return Err(TransformError::PersistFailed { path, source });
        }

        debug!(path = %path.display(), bytes = rendered.len(), "document written");
        Ok(ArchivedDocument {
            item_id: item.bookmark_id,
            path,
            metadata,
        })
    }
}

/// Fetch errors that describe the item rather than the service.
fn is_item_failure(error: &ApiError) -> bool {
    matches!(error, ApiError::HttpStatus { .. } | ApiError::Remote { .. })
        && classify_error(error) == FailureType::Permanent
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::api::{BookmarkQuery, Folder, RawTimestamp};
    use crate::archive::document::FixedClock;

    struct TextFake {
        texts: HashMap<u64, Result<String, u16>>,
    }

    #[async_trait]
    impl BookmarkApi for TextFake {
        async fn list_folders(&self) -> Result<Vec<Folder>, ApiError> {
            Ok(Vec::new())
        }

        async fn list_bookmarks(&self, _query: &BookmarkQuery) -> Result<Vec<RemoteItem>, ApiError> {
            Ok(Vec::new())
        }

        async fn get_text(&self, bookmark_id: u64) -> Result<String, ApiError> {
            match self.texts.get(&bookmark_id) {
                Some(Ok(text)) => Ok(text.clone()),
                Some(Err(503)) => Err(ApiError::RetryExhausted {
                    attempts: 5,
                    last: Box::new(ApiError::http_status("/bookmarks/get_text", 503, None)),
                }),
                Some(Err(status)) => Err(ApiError::http_status("/bookmarks/get_text", *status, None)),
                None => Err(ApiError::http_status("/bookmarks/get_text", 404, None)),
            }
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

    fn transformer(dir: &Path) -> ItemTransformer {
        ItemTransformer::new(dir).with_clock(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )))
    }

    #[tokio::test]
    async fn test_process_writes_document() {
        let dir = tempfile::tempdir().unwrap();
        let api = TextFake {
            texts: HashMap::from([(42, Ok("<p>Hello <b>world</b></p>".to_string()))]),
        };

        let doc = transformer(dir.path())
            .process(&api, &item(42, "Foo/Bar?"))
            .await
            .unwrap();

        assert_eq!(doc.path, dir.path().join("2023-11-14 – FooBar.md"));
        let written = fs::read_to_string(&doc.path).unwrap();
        assert!(written.starts_with("---\ntitle: \"Foo/Bar?\"\n"));
        assert!(written.contains("instapaper_id: 42\n"));
        assert!(written.ends_with("---\n\nHello **world**\n"));
    }

    #[tokio::test]
    async fn test_fetch_error_is_fetch_failed() {
        let dir = tempfile::tempdir().unwrap();
        let api = TextFake {
            texts: HashMap::from([(1, Err(400))]),
        };
        let err = transformer(dir.path()).process(&api, &item(1, "x")).await.unwrap_err();
        assert_eq!(err.ledger_status(), Some(EntryStatus::TextFetchFailed));
        assert!(err.message().contains("400"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_unavailable_and_not_ledgered() {
        let dir = tempfile::tempdir().unwrap();
        let api = TextFake {
            texts: HashMap::from([(1, Err(503))]),
        };
        let err = transformer(dir.path()).process(&api, &item(1, "x")).await.unwrap_err();
        assert!(matches!(
            err,
            TransformError::Unavailable {
                source: ApiError::RetryExhausted { attempts: 5, .. }
            }
        ));
        assert_eq!(err.ledger_status(), None);
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let api = TextFake {
            texts: HashMap::from([(1, Err(401))]),
        };
        let err = transformer(dir.path()).process(&api, &item(1, "x")).await.unwrap_err();
        assert!(matches!(err, TransformError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_blank_content_is_fetch_failed() {
        let dir = tempfile::tempdir().unwrap();
        let api = TextFake {
            texts: HashMap::from([(1, Ok("  \n".to_string()))]),
        };
        let err = transformer(dir.path()).process(&api, &item(1, "x")).await.unwrap_err();
        assert!(matches!(err, TransformError::FetchFailed { .. }));
    }

    #[tokio::test]
    async fn test_unconvertible_content_is_conversion_failed() {
        let dir = tempfile::tempdir().unwrap();
        let api = TextFake {
            texts: HashMap::from([(1, Ok("<p>\0</p>".to_string()))]),
        };
        let err = transformer(dir.path()).process(&api, &item(1, "x")).await.unwrap_err();
        assert_eq!(err.ledger_status(), Some(EntryStatus::MarkdownConversionFailed));
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_write_failure_is_persist_failed_and_not_ledgered() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();
        let api = TextFake {
            texts: HashMap::from([(1, Ok("<p>text</p>".to_string()))]),
        };
        let err = transformer(&blocker).process(&api, &item(1, "x")).await.unwrap_err();
        assert!(matches!(err, TransformError::PersistFailed { .. }));
        assert_eq!(err.ledger_status(), None);
    }
}
