//! Enrichment of archived documents with model-generated annotations.
//!
//! The model call lives behind [`Enricher`]; this module owns the response
//! format and the header merge. Merging rewrites only the header block of a
//! document: existing `ai_*` keys are replaced in place, new ones are
//! appended, and the body is preserved byte-for-byte.
//!
//! The annotator's response is a line-oriented block:
//!
//! ```text
//! TOPICS: Energy, Policy
//! PEOPLE: None
//! ORGANIZATIONS: IEA
//! LOCATIONS: Germany
//! CONCEPTS: grid storage, ai regulation
//! SENTIMENT: Neutral
//! EMOTION: Analytical
//! SUMMARY: First sentence.
//! Second sentence continues the summary.
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

use super::document::{quote_header_value, split_header};
use crate::atomic::write_atomic;

/// Sentiment recorded when the annotator gives none.
pub const DEFAULT_SENTIMENT: &str = "Neutral";

/// Emotion recorded when the annotator gives none.
pub const DEFAULT_EMOTION: &str = "Analytical";

const PRESERVED_ACRONYMS: [&str; 5] = ["AI", "USA", "US", "EU", "UK"];

/// Errors produced while enriching a document.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// The annotator failed.
    #[error("annotator failed: {0}")]
    Annotator(String),

    /// The document has no `---` header block.
    #[error("{} has no metadata header", path.display())]
    MissingHeader {
        /// Document path.
        path: PathBuf,
    },

    /// I/O error reading or writing the document.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Structured annotation for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// High-level themes.
    pub topics: Vec<String>,
    /// People mentioned.
    pub people: Vec<String>,
    /// Organizations mentioned.
    pub organizations: Vec<String>,
    /// Places mentioned.
    pub locations: Vec<String>,
    /// Abstract concepts, title-cased.
    pub concepts: Vec<String>,
    /// Overall sentiment.
    pub sentiment: String,
    /// Dominant emotional tone.
    pub emotion: String,
    /// Short summary.
    pub summary: String,
}

impl Default for Annotation {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            people: Vec::new(),
            organizations: Vec::new(),
            locations: Vec::new(),
            concepts: Vec::new(),
            sentiment: DEFAULT_SENTIMENT.to_string(),
            emotion: DEFAULT_EMOTION.to_string(),
            summary: String::new(),
        }
    }
}

impl Annotation {
    /// Header entries as `(key, rendered value)` in write order.
    #[must_use]
    pub fn header_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ai_topics", render_list(&self.topics)),
            ("ai_people", render_list(&self.people)),
            ("ai_orgs", render_list(&self.organizations)),
            ("ai_locations", render_list(&self.locations)),
            ("ai_concepts", render_list(&self.concepts)),
            ("ai_sentiment", quote_header_value(&self.sentiment)),
            ("ai_emotion", quote_header_value(&self.emotion)),
            ("ai_summary", quote_header_value(&self.summary)),
        ]
    }
}

/// Produces annotations for document bodies.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Annotates a Markdown body.
    async fn annotate(&self, body: &str) -> Result<Annotation, EnrichmentError>;
}

/// Parses the annotator's line-oriented response.
///
/// Unknown lines are ignored except directly after `SUMMARY:`, where they
/// continue the summary. `None` list entries are dropped.
#[must_use]
pub fn parse_annotation(text: &str) -> Annotation {
    let mut annotation = Annotation::default();
    let mut in_summary = false;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(value) = line.strip_prefix("TOPICS:") {
            annotation.topics = parse_list(value);
        } else if let Some(value) = line.strip_prefix("PEOPLE:") {
            annotation.people = parse_list(value);
        } else if let Some(value) = line.strip_prefix("ORGANIZATIONS:") {
            annotation.organizations = parse_list(value);
        } else if let Some(value) = line.strip_prefix("LOCATIONS:") {
            annotation.locations = parse_list(value);
        } else if let Some(value) = line.strip_prefix("CONCEPTS:") {
            annotation.concepts = parse_list(value).iter().map(|c| titleize_concept(c)).collect();
        } else if let Some(value) = line.strip_prefix("SENTIMENT:") {
            annotation.sentiment = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("EMOTION:") {
            annotation.emotion = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("SUMMARY:") {
            annotation.summary = value.trim().to_string();
            in_summary = true;
            continue;
        } else if in_summary {
            if !annotation.summary.is_empty() {
                annotation.summary.push(' ');
            }
            annotation.summary.push_str(line);
            continue;
        }
        in_summary = false;
    }

    annotation
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty() && !entry.eq_ignore_ascii_case("none"))
        .map(str::to_string)
        .collect()
}

fn titleize_concept(concept: &str) -> String {
    concept
        .split_whitespace()
        .map(|word| {
            let upper = word.to_uppercase();
            if PRESERVED_ACRONYMS.contains(&upper.as_str()) {
                return upper;
            }
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|i| quote_header_value(i)).collect();
    format!("[{}]", quoted.join(", "))
}

/// Returns `document` with the annotation merged into its header.
///
/// Returns `None` if the document has no header block.
#[must_use]
pub fn merge_annotation_text(document: &str, annotation: &Annotation) -> Option<String> {
    let (header, body) = split_header(document)?;

    // Each entry is a key line plus any indented or list continuation lines.
    let mut entries: Vec<(Option<String>, Vec<&str>)> = Vec::new();
    for line in header.lines() {
        let is_continuation =
            line.starts_with(' ') || line.starts_with('\t') || line.starts_with("- ");
        if is_continuation && let Some((_, lines)) = entries.last_mut() {
            lines.push(line);
            continue;
        }
        entries.push((header_key(line), vec![line]));
    }

    let mut appended = Vec::new();
    let mut replacements: Vec<(usize, String)> = Vec::new();
    for (key, value) in annotation.header_entries() {
        let rendered = format!("{key}: {value}");
        match entries
            .iter()
            .position(|(existing, _)| existing.as_deref() == Some(key))
        {
            Some(index) => replacements.push((index, rendered)),
            None => appended.push(rendered),
        }
    }

    let mut lines: Vec<String> = Vec::new();
    for (index, (_, original)) in entries.iter().enumerate() {
        match replacements.iter().find(|(i, _)| *i == index) {
            Some((_, rendered)) => lines.push(rendered.clone()),
            None => lines.extend(original.iter().map(|l| (*l).to_string())),
        }
    }
    lines.extend(appended);

    Some(format!("---\n{}\n---\n{body}", lines.join("\n")))
}

fn header_key(line: &str) -> Option<String> {
    let (key, _) = line.split_once(':')?;
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid.then(|| key.to_string())
}

/// Merges `annotation` into the header of the document at `path`.
///
/// # Errors
///
/// Returns [`EnrichmentError::MissingHeader`] if the file has no header, or
/// [`EnrichmentError::Io`] on read or write failure.
#[instrument(skip(path, annotation), fields(path = %path.display()))]
pub fn merge_annotation(path: &Path, annotation: &Annotation) -> Result<(), EnrichmentError> {
    let document = fs::read_to_string(path)?;
    let merged = merge_annotation_text(&document, annotation).ok_or_else(|| {
        EnrichmentError::MissingHeader {
            path: path.to_path_buf(),
        }
    })?;
    write_atomic(path, merged.as_bytes())?;
    debug!("annotation merged");
    Ok(())
}

/// Annotates the document at `path` and merges the result into its header.
///
/// # Errors
///
/// Returns any [`EnrichmentError`] from reading, annotating, or merging.
#[instrument(skip(enricher, path), fields(path = %path.display()))]
pub async fn enrich_document(
    enricher: &dyn Enricher,
    path: &Path,
) -> Result<Annotation, EnrichmentError> {
    let document = fs::read_to_string(path)?;
    let (_, body) = split_header(&document).ok_or_else(|| EnrichmentError::MissingHeader {
        path: path.to_path_buf(),
    })?;
    let annotation = enricher.annotate(body.trim()).await?;
    merge_annotation(path, &annotation)?;
    Ok(annotation)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    const RESPONSE: &str = "TOPICS: Energy, Policy\n\
PEOPLE: None\n\
ORGANIZATIONS: IEA, none\n\
LOCATIONS: Germany\n\
CONCEPTS: grid storage, ai regulation, usa trade policy\n\
SENTIMENT: Positive\n\
EMOTION: Hopeful\n\
SUMMARY: Storage is getting cheaper.\n\
Policy is catching up.\n";

    const DOCUMENT: &str = "---\ntitle: \"Grid\"\ninstapaper_id: 7\nai_topics: [\"Old\"]\ntags:\n  - keep\n---\n\nBody with --- dashes\nand \"quotes\".\n";

    // ==================== Parsing Tests ====================

    #[test]
    fn test_parse_annotation_fields() {
        let annotation = parse_annotation(RESPONSE);
        assert_eq!(annotation.topics, vec!["Energy", "Policy"]);
        assert!(annotation.people.is_empty());
        assert_eq!(annotation.organizations, vec!["IEA"]);
        assert_eq!(annotation.locations, vec!["Germany"]);
        assert_eq!(
            annotation.concepts,
            vec!["Grid Storage", "AI Regulation", "USA Trade Policy"]
        );
        assert_eq!(annotation.sentiment, "Positive");
        assert_eq!(annotation.emotion, "Hopeful");
        assert_eq!(
            annotation.summary,
            "Storage is getting cheaper. Policy is catching up."
        );
    }

    #[test]
    fn test_parse_annotation_defaults() {
        let annotation = parse_annotation("");
        assert_eq!(annotation, Annotation::default());
        assert_eq!(annotation.sentiment, DEFAULT_SENTIMENT);
        assert_eq!(annotation.emotion, DEFAULT_EMOTION);
    }

    #[test]
    fn test_summary_continuation_stops_at_next_key() {
        let annotation = parse_annotation("SUMMARY: One.\nTwo.\nSENTIMENT: Negative\nstray line");
        assert_eq!(annotation.summary, "One. Two.");
        assert_eq!(annotation.sentiment, "Negative");
    }

    // ==================== Merge Tests ====================

    #[test]
    fn test_merge_replaces_existing_keys_and_appends_new() {
        let annotation = parse_annotation(RESPONSE);
        let merged = merge_annotation_text(DOCUMENT, &annotation).unwrap();
        let (header, _) = split_header(&merged).unwrap();
        let lines: Vec<&str> = header.lines().collect();

        assert_eq!(lines[0], "title: \"Grid\"");
        assert_eq!(lines[2], "ai_topics: [\"Energy\", \"Policy\"]");
        assert_eq!(lines[3], "tags:");
        assert_eq!(lines[4], "  - keep");
        assert!(lines.contains(&"ai_people: []"));
        assert!(lines.contains(&"ai_summary: \"Storage is getting cheaper. Policy is catching up.\""));
        assert_eq!(header.matches("ai_topics").count(), 1);
    }

    #[test]
    fn test_merge_preserves_body_bytes() {
        let annotation = parse_annotation(RESPONSE);
        let merged = merge_annotation_text(DOCUMENT, &annotation).unwrap();
        let (_, original_body) = split_header(DOCUMENT).unwrap();
        let (_, merged_body) = split_header(&merged).unwrap();
        assert_eq!(merged_body, original_body);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let annotation = parse_annotation(RESPONSE);
        let once = merge_annotation_text(DOCUMENT, &annotation).unwrap();
        let twice = merge_annotation_text(&once, &annotation).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_without_header_is_none() {
        assert!(merge_annotation_text("plain body", &Annotation::default()).is_none());
    }

    // ==================== File Tests ====================

    struct CannedEnricher {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Enricher for CannedEnricher {
        async fn annotate(&self, body: &str) -> Result<Annotation, EnrichmentError> {
            self.seen.lock().unwrap().push(body.to_string());
            Ok(parse_annotation(RESPONSE))
        }
    }

    #[tokio::test]
    async fn test_enrich_document_passes_body_and_rewrites_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        fs::write(&path, DOCUMENT).unwrap();

        let enricher = CannedEnricher {
            seen: Mutex::new(Vec::new()),
        };
        let annotation = enrich_document(&enricher, &path).await.unwrap();
        assert_eq!(annotation.sentiment, "Positive");
        assert_eq!(
            enricher.seen.lock().unwrap()[0],
            "Body with --- dashes\nand \"quotes\"."
        );

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("ai_emotion: \"Hopeful\""));
        assert!(written.ends_with("\n---\n\nBody with --- dashes\nand \"quotes\".\n"));
    }

    #[test]
    fn test_merge_annotation_missing_header_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        fs::write(&path, "no header").unwrap();
        let err = merge_annotation(&path, &Annotation::default()).unwrap_err();
        assert!(matches!(err, EnrichmentError::MissingHeader { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "no header");
    }
}
