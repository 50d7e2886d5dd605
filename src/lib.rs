//! Archiver Core Library
//!
//! This library provides the core functionality for the archiver tool, which
//! incrementally copies a bookmarking service's saved articles into local
//! Markdown files and never archives the same item twice.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`api`] - Signed session, retry engine, and response normalization
//! - [`folders`] - Folder name to folder id resolution
//! - [`paginator`] - Delta pagination over a folder listing
//! - [`ledger`] - Crash-safe manifest of processed items
//! - [`archive`] - Markdown conversion, document layout, and enrichment
//! - [`sync`] - The orchestrator tying the pipeline together
//! - [`config`] - Layered run configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod archive;
mod atomic;
pub mod config;
pub mod folders;
pub mod ledger;
pub mod paginator;
pub mod sync;

// Re-export commonly used types
pub use api::{ApiError, BookmarkApi, Credential, RemoteItem, RetryPolicy, Session};
pub use archive::{ItemTransformer, TransformError};
pub use config::{ArchiverConfig, ConfigError};
pub use folders::{FolderResolution, resolve_folder};
pub use ledger::{EntryStatus, Ledger, LedgerEntry, LedgerError, ManifestStore};
pub use paginator::{DeltaPaginator, PaginationCursor, StopReason};
pub use sync::{SyncEngine, SyncError, SyncOptions, SyncReport};
