//! Manifest ledger: the record of which items were archived.
//!
//! The ledger maps a stringified item id to the outcome of its last
//! processing attempt. It is loaded whole at startup and persisted by atomic
//! whole-file replace, so a crash at any point leaves either the previous or
//! the new snapshot on disk.
//!
//! # File format
//!
//! ```json
//! {
//!   "42": { "status": "success", "title": "Foo/Bar?", "output_path": "/vault/2023-11-14 – FooBar.md" },
//!   "43": { "status": "text_fetch_failed", "title": "Gone", "error_message": "HTTP 400 ..." }
//! }
//! ```
//!
//! A legacy format (a bare JSON array of archived ids) is still accepted.
//! The `success_migrated` status written by older tooling reads as
//! `success`. Entries that cannot be read (unknown status, wrong shape) are
//! dropped with a warning; only a document that is not JSON at all, or not
//! an object or array, is quarantined.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::atomic::write_atomic;

/// Errors produced by ledger persistence.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// I/O error reading, writing, or quarantining the ledger file.
    #[error("I/O error on manifest: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outcome recorded for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Archived; never reprocessed.
    #[serde(alias = "success_migrated")]
    Success,
    /// Content could not be fetched.
    TextFetchFailed,
    /// Content could not be converted to Markdown.
    MarkdownConversionFailed,
}

impl EntryStatus {
    /// The snake_case name used on disk.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::TextFetchFailed => "text_fetch_failed",
            Self::MarkdownConversionFailed => "markdown_conversion_failed",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "success" | "success_migrated" => Ok(Self::Success),
            "text_fetch_failed" => Ok(Self::TextFetchFailed),
            "markdown_conversion_failed" => Ok(Self::MarkdownConversionFailed),
            other => Err(format!(
                "unknown status '{other}' (expected success, text_fetch_failed, or markdown_conversion_failed)"
            )),
        }
    }
}

/// One ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Outcome of the last attempt.
    pub status: EntryStatus,
    /// Item title at the time it was processed.
    #[serde(default)]
    pub title: String,
    /// Failure detail for non-success entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Where the archived document was written.
    #[serde(default, alias = "file_path", skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl LedgerEntry {
    /// A successful archival written to `output_path`.
    #[must_use]
    pub fn success(title: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            status: EntryStatus::Success,
            title: title.into(),
            error_message: None,
            output_path: Some(output_path.into()),
        }
    }

    /// A failed attempt with the given status and message.
    #[must_use]
    pub fn failed(status: EntryStatus, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            title: title.into(),
            error_message: Some(message.into()),
            output_path: None,
        }
    }
}

/// Counts of ledger entries per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    /// `success` entries.
    pub success: usize,
    /// `text_fetch_failed` entries.
    pub text_fetch_failed: usize,
    /// `markdown_conversion_failed` entries.
    pub markdown_conversion_failed: usize,
}

impl LedgerSummary {
    /// Total entries.
    #[must_use]
    pub fn total(&self) -> usize {
        self.success + self.text_fetch_failed + self.markdown_conversion_failed
    }
}

/// In-memory ledger keyed by stringified item id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: BTreeMap<String, LedgerEntry>,
}

impl Ledger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records the outcome for `id`, replacing any previous entry.
    pub fn record(&mut self, id: u64, entry: LedgerEntry) {
        self.entries.insert(id.to_string(), entry);
    }

    /// Returns the entry for `id`.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<&LedgerEntry> {
        self.entries.get(&id.to_string())
    }

    /// True when `id` was archived successfully.
    #[must_use]
    pub fn is_success(&self, id: u64) -> bool {
        self.get(id)
            .is_some_and(|entry| entry.status == EntryStatus::Success)
    }

    /// True when `id` has any entry.
    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id.to_string())
    }

    /// Ids of successfully archived items. Non-numeric keys are skipped.
    pub fn success_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.status == EntryStatus::Success)
            .filter_map(|(key, _)| key.parse().ok())
    }

    /// All entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LedgerEntry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }

    /// Counts entries per status.
    #[must_use]
    pub fn summary(&self) -> LedgerSummary {
        self.entries
            .values()
            .fold(LedgerSummary::default(), |mut summary, entry| {
                match entry.status {
                    EntryStatus::Success => summary.success += 1,
                    EntryStatus::TextFetchFailed => summary.text_fetch_failed += 1,
                    EntryStatus::MarkdownConversionFailed => {
                        summary.markdown_conversion_failed += 1;
                    }
                }
                summary
            })
    }

    /// Removes every entry matching `predicate` and returns the removed keys.
    ///
    /// Removed items become eligible for processing on the next run.
    pub fn forget_where<F>(&mut self, mut predicate: F) -> Vec<String>
    where
        F: FnMut(&str, &LedgerEntry) -> bool,
    {
        let removed: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, entry)| predicate(key, entry))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &removed {
            self.entries.remove(key);
        }
        removed
    }
}

/// Loads and persists the ledger file.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    /// Creates a store for the ledger file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The ledger file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the ledger.
    ///
    /// - missing or blank file: empty ledger
    /// - legacy array of ids: each id becomes a `success` entry with an empty title
    /// - unreadable entries or ids: skipped with a warning
    /// - unparseable document: moved aside to `<name>.corrupt-<epoch>`, empty ledger
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Io`] if the file exists but cannot be read or
    /// quarantined.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<Ledger, LedgerError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no manifest yet; starting empty");
                return Ok(Ledger::new());
            }
            Err(err) => return Err(err.into()),
        };

        if raw.trim().is_empty() {
            debug!("manifest is blank; starting empty");
            return Ok(Ledger::new());
        }

        match parse_ledger(&raw) {
            Some(ledger) => {
                info!(entries = ledger.len(), "loaded manifest");
                Ok(ledger)
            }
            None => {
                let quarantined = self.quarantine()?;
                warn!(
                    quarantined = %quarantined.display(),
                    "manifest is corrupt; moved aside and starting empty"
                );
                Ok(Ledger::new())
            }
        }
    }

    /// Writes the ledger by atomic whole-file replace.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] on serialization or I/O failure; the previous
    /// snapshot is left intact.
    #[instrument(skip(self, ledger), fields(path = %self.path.display(), entries = ledger.len()))]
    pub fn persist(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        let json = serde_json::to_vec_pretty(ledger)?;
        write_atomic(&self.path, &json)?;
        debug!("manifest persisted");
        Ok(())
    }

    fn quarantine(&self) -> Result<PathBuf, LedgerError> {
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".corrupt-{epoch}"));
        let target = self.path.with_file_name(name);
        fs::rename(&self.path, &target)?;
        Ok(target)
    }
}

fn parse_ledger(raw: &str) -> Option<Ledger> {
    match serde_json::from_str::<Value>(raw).ok()? {
        Value::Object(map) => {
            let mut entries = BTreeMap::new();
            for (key, value) in map {
                match serde_json::from_value::<LedgerEntry>(value) {
                    Ok(entry) => {
                        entries.insert(key, entry);
                    }
                    Err(err) => warn!(key = %key, error = %err, "skipping unreadable manifest entry"),
                }
            }
            Some(Ledger { entries })
        }
        Value::Array(ids) => {
            let mut ledger = Ledger::new();
            for id in ids {
                let parsed = match &id {
                    Value::Number(n) => n.as_u64(),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                };
                let Some(parsed) = parsed else {
                    warn!(id = %id, "skipping unreadable legacy manifest id");
                    continue;
                };
                ledger.record(
                    parsed,
                    LedgerEntry {
                        status: EntryStatus::Success,
                        title: String::new(),
                        error_message: None,
                        output_path: None,
                    },
                );
            }
            Some(ledger)
        }
        _ => None,
    }
}
