//! Conversion of remote items into local Markdown documents.
//!
//! This module provides:
//! - Markup to Markdown conversion
//! - Deterministic, filesystem-safe filenames
//! - Save-date resolution and the metadata header block
//! - The per-item [`ItemTransformer`]
//! - Header-only enrichment with model annotations
//!
//! # Document layout
//!
//! ```text
//! ---
//! title: "Foo/Bar?"
//! original_url: "https://example.com/foo"
//! instapaper_id: 42
//! date_saved: 2023-11-14
//! date_saved_source: time_saved
//! ---
//!
//! Converted body...
//! ```

mod document;
pub mod enrichment;
mod filename;
pub mod markdown;
mod transformer;

pub use document::{
    ArchivedDocument, Clock, DateSource, DocumentMetadata, FixedClock, SaveDate, SystemClock,
    quote_header_value, render_document, resolve_save_date, split_header,
};
pub use enrichment::{Annotation, EnrichmentError, Enricher, enrich_document, merge_annotation};
pub use filename::{MAX_TITLE_CHARS, UNTITLED, document_filename, sanitize_title};
pub use markdown::ConversionError;
pub use transformer::{ItemTransformer, TransformError};
