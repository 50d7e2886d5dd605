//! Folder name resolution.
//!
//! Users name folders by title; the API addresses them by id. The three
//! built-in folders are addressed by their names directly.

use tracing::{debug, instrument, warn};

use crate::api::{ApiError, BookmarkApi};

/// Folder names the service understands without a lookup.
pub const BUILTIN_FOLDERS: [&str; 3] = ["unread", "starred", "archive"];

/// Default folder when none is configured.
pub const DEFAULT_FOLDER: &str = "archive";

/// How a folder name was turned into an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderResolution {
    /// One of [`BUILTIN_FOLDERS`]; no remote call was made.
    Builtin(String),
    /// A user folder whose title matched exactly.
    Matched {
        /// Resolved folder id.
        folder_id: String,
        /// The matching title.
        title: String,
    },
    /// No folder matched; the name is passed through unchanged.
    Literal(String),
}

impl FolderResolution {
    /// The identifier to send to the API.
    #[must_use]
    pub fn folder_id(&self) -> &str {
        match self {
            Self::Builtin(id) | Self::Literal(id) => id,
            Self::Matched { folder_id, .. } => folder_id,
        }
    }

    /// True when the name did not match any known folder.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }
}

/// Resolves a folder name to the identifier the API expects.
///
/// Built-in names resolve without a remote call. Other names are matched
/// exactly against folder titles; with no match the name is used literally.
///
/// # Errors
///
/// Returns the [`ApiError`] from listing folders.
#[instrument(skip(api))]
pub async fn resolve_folder(api: &dyn BookmarkApi, name: &str) -> Result<FolderResolution, ApiError> {
    if BUILTIN_FOLDERS.contains(&name) {
        debug!(folder = name, "built-in folder");
        return Ok(FolderResolution::Builtin(name.to_string()));
    }

    let folders = api.list_folders().await?;
    if let Some(folder) = folders.into_iter().find(|f| f.title == name) {
        debug!(folder_id = %folder.folder_id, "matched folder title");
        return Ok(FolderResolution::Matched {
            folder_id: folder.folder_id,
            title: folder.title,
        });
    }

    warn!(folder = name, "no folder with this title; using the name as a folder id");
    Ok(FolderResolution::Literal(name.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::api::{BookmarkQuery, Folder, RemoteItem};

    struct FolderFake {
        folders: Vec<Folder>,
        list_calls: AtomicUsize,
    }

    impl FolderFake {
        fn new(folders: Vec<(&str, &str)>) -> Self {
            Self {
                folders: folders
                    .into_iter()
                    .map(|(id, title)| Folder {
                        folder_id: id.to_string(),
                        title: title.to_string(),
                    })
                    .collect(),
                list_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BookmarkApi for FolderFake {
        async fn list_folders(&self) -> Result<Vec<Folder>, ApiError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.folders.clone())
        }

        async fn list_bookmarks(&self, _query: &BookmarkQuery) -> Result<Vec<RemoteItem>, ApiError> {
            Ok(Vec::new())
        }

        async fn get_text(&self, _bookmark_id: u64) -> Result<String, ApiError> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_builtin_folders_skip_remote_call() {
        let api = FolderFake::new(vec![("1", "archive")]);
        for name in BUILTIN_FOLDERS {
            let resolved = resolve_folder(&api, name).await.unwrap();
            assert_eq!(resolved, FolderResolution::Builtin(name.to_string()));
        }
        assert_eq!(api.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_title_match_returns_folder_id() {
        let api = FolderFake::new(vec![("100", "Reading"), ("200", "Research")]);
        let resolved = resolve_folder(&api, "Research").await.unwrap();
        assert_eq!(resolved.folder_id(), "200");
        assert!(!resolved.is_literal());
    }

    #[tokio::test]
    async fn test_title_match_is_exact() {
        let api = FolderFake::new(vec![("100", "Reading")]);
        let resolved = resolve_folder(&api, "reading").await.unwrap();
        assert_eq!(resolved, FolderResolution::Literal("reading".to_string()));
    }

    #[tokio::test]
    async fn test_unmatched_name_used_literally() {
        let api = FolderFake::new(Vec::new());
        let resolved = resolve_folder(&api, "12345").await.unwrap();
        assert_eq!(resolved.folder_id(), "12345");
        assert!(resolved.is_literal());
        assert_eq!(api.list_calls.load(Ordering::SeqCst), 1);
    }
}
