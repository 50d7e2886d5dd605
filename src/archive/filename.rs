//! Deterministic filenames for archived documents.
//!
//! The filename depends only on the save date and the title, so re-archiving
//! an item after a lost ledger overwrites the same file instead of creating a
//! duplicate.

use chrono::NaiveDate;

/// Maximum number of title characters kept in a filename.
pub const MAX_TITLE_CHARS: usize = 80;

/// Used when a title sanitizes to nothing.
pub const UNTITLED: &str = "Untitled";

const FORBIDDEN_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Removes characters that are unsafe in filenames and truncates to
/// [`MAX_TITLE_CHARS`].
///
/// Strips `< > : " / \ | ? *` and control characters, then trims whitespace.
/// An empty result becomes [`UNTITLED`].
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c) && !c.is_control())
        .collect();
    let truncated: String = cleaned.trim().chars().take(MAX_TITLE_CHARS).collect();
    let truncated = truncated.trim_end();
    if truncated.is_empty() {
        UNTITLED.to_string()
    } else {
        truncated.to_string()
    }
}

/// Builds `"<YYYY-MM-DD> – <sanitized title>.md"`.
#[must_use]
pub fn document_filename(date: NaiveDate, title: &str) -> String {
    format!("{} \u{2013} {}.md", date.format("%Y-%m-%d"), sanitize_title(title))
}
