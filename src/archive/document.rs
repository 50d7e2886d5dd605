//! Archived document layout: metadata header, save date, and rendering.
//!
//! A document is a `---`-delimited block of `key: value` lines followed by a
//! blank line and the Markdown body:
//!
//! ```text
//! ---
//! title: "Foo/Bar?"
//! original_url: "https://example.com/a"
//! instapaper_id: 42
//! date_saved: 2023-11-14
//! date_saved_source: original - time_saved
//! ---
//!
//! Body text.
//! ```

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};

use crate::api::{RawTimestamp, RemoteItem};

const DELIMITER: &str = "---";

/// Source of the current time for save-date fallback.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// [`Clock`] frozen at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Which field produced the save date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    /// The primary `time_saved` field.
    TimeSaved,
    /// The secondary `time` field.
    Time,
    /// Neither field was present.
    Missing,
    /// A field was present but could not be interpreted.
    InvalidFormat(&'static str),
}

impl fmt::Display for DateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeSaved => f.write_str("original - time_saved"),
            Self::Time => f.write_str("original - time"),
            Self::Missing => f.write_str("fallback - missing"),
            Self::InvalidFormat(field) => write!(f, "fallback - invalid format ({field})"),
        }
    }
}

/// A resolved save date and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveDate {
    /// Calendar date in UTC.
    pub date: NaiveDate,
    /// The field that produced it.
    pub source: DateSource,
}

enum Candidate {
    Absent,
    Valid(NaiveDate),
    Invalid,
}

fn candidate(field: Option<&RawTimestamp>) -> Candidate {
    let Some(raw) = field else {
        return Candidate::Absent;
    };
    match raw {
        RawTimestamp::Integer(0) => return Candidate::Absent,
        RawTimestamp::Text(text) if text.trim().is_empty() => return Candidate::Absent,
        _ => {}
    }
    match raw
        .as_epoch_seconds()
        .filter(|secs| *secs > 0)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
    {
        Some(dt) => Candidate::Valid(dt.date_naive()),
        None => Candidate::Invalid,
    }
}

/// Chooses the save date: `time_saved`, then `time`, then the clock.
///
/// Zero and empty values count as absent. When neither field yields a date
/// the first unparseable field is named in the source.
#[must_use]
pub fn resolve_save_date(item: &RemoteItem, clock: &dyn Clock) -> SaveDate {
    let primary = candidate(item.time_saved.as_ref());
    let secondary = candidate(item.time.as_ref());

    let source = match (&primary, &secondary) {
        (Candidate::Valid(date), _) => {
            return SaveDate {
                date: *date,
                source: DateSource::TimeSaved,
            };
        }
        (_, Candidate::Valid(date)) => {
            return SaveDate {
                date: *date,
                source: DateSource::Time,
            };
        }
        (Candidate::Invalid, _) => DateSource::InvalidFormat("time_saved"),
        (_, Candidate::Invalid) => DateSource::InvalidFormat("time"),
        (Candidate::Absent, Candidate::Absent) => DateSource::Missing,
    };

    SaveDate {
        date: clock.now().date_naive(),
        source,
    }
}

/// Wraps `value` in double quotes, escaping backslashes and quotes.
///
/// Line breaks become spaces so the value stays on one header line.
#[must_use]
pub fn quote_header_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' | '\r' => out.push(' '),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Metadata written to the header of an archived document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// Item title, unescaped.
    pub title: String,
    /// Source URL.
    pub original_url: String,
    /// Remote item id.
    pub instapaper_id: u64,
    /// Save date.
    pub date_saved: NaiveDate,
    /// Where the save date came from.
    pub date_saved_source: DateSource,
    /// Folder the item was listed in, when known.
    pub folder_id: Option<String>,
}

impl DocumentMetadata {
    /// Builds metadata for `item` with an already resolved save date.
    #[must_use]
    pub fn from_item(item: &RemoteItem, save_date: SaveDate) -> Self {
        Self {
            title: item.title.clone(),
            original_url: item.url.clone(),
            instapaper_id: item.bookmark_id,
            date_saved: save_date.date,
            date_saved_source: save_date.source,
            folder_id: item.folder_id.clone(),
        }
    }

    /// Header lines in write order.
    #[must_use]
    pub fn header_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("title: {}", quote_header_value(&self.title)),
            format!("original_url: {}", quote_header_value(&self.original_url)),
            format!("instapaper_id: {}", self.instapaper_id),
            format!("date_saved: {}", self.date_saved.format("%Y-%m-%d")),
            format!("date_saved_source: {}", self.date_saved_source),
        ];
        if let Some(folder_id) = &self.folder_id {
            lines.push(format!("folder_id: {}", quote_header_value(folder_id)));
        }
        lines
    }
}

/// Renders a full document: header block, blank line, body, trailing newline.
#[must_use]
pub fn render_document(metadata: &DocumentMetadata, body: &str) -> String {
    let mut out = String::new();
    out.push_str(DELIMITER);
    out.push('\n');
    for line in metadata.header_lines() {
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push_str("\n\n");
    out.push_str(body.trim_end());
    out.push('\n');
    out
}

/// Splits a document into its header text and everything after the closing
/// delimiter line.
///
/// The header excludes both delimiter lines and its final newline. The
/// remainder is returned byte-for-byte. Returns `None` when the document
/// does not start with a header block.
#[must_use]
pub fn split_header(document: &str) -> Option<(&str, &str)> {
    let rest = document.strip_prefix("---\n")?;
    if let Some(body) = rest.strip_prefix("---\n") {
        return Some(("", body));
    }
    if rest == DELIMITER {
        return Some(("", ""));
    }
    if let Some(idx) = rest.find("\n---\n") {
        return Some((&rest[..idx], &rest[idx + 5..]));
    }
    rest.strip_suffix("\n---").map(|header| (header, ""))
}

/// A document written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedDocument {
    /// Remote item id.
    pub item_id: u64,
    /// Where the document was written.
    pub path: PathBuf,
    /// Header metadata.
    pub metadata: DocumentMetadata,
}
