//! Response decoding and wire-shape normalization.
//!
//! The remote service is inconsistent about payload shapes. Bookmark listings
//! arrive either as an object with an embedded `bookmarks` array or as a flat
//! array of typed records (`user`, `meta`, `bookmark`, ...). Errors arrive as
//! `{"type": "error", ...}` objects, sometimes wrapped in an array. This module
//! turns all of those into typed values so callers never see the raw shapes.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use super::error::RemoteError;
use super::oauth::TokenPair;

/// Errors decoding a 2xx payload into the expected structure.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The top-level JSON value is neither of the accepted shapes.
    #[error("unexpected payload shape: expected {expected}, found {found}")]
    UnexpectedShape {
        /// What the decoder accepts.
        expected: &'static str,
        /// JSON type that was found.
        found: &'static str,
    },

    /// A record inside an accepted shape failed to decode.
    #[error("invalid record at index {index}: {source}")]
    InvalidRecord {
        /// Position of the record in its array.
        index: usize,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// The body is not valid JSON at all.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A saved-at timestamp as sent by the service.
///
/// Usually integer seconds since the Unix epoch, occasionally a float or a
/// numeric string. Anything else is kept so the caller can report it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// Integer epoch seconds.
    Integer(i64),
    /// Fractional epoch seconds.
    Float(f64),
    /// String, possibly numeric.
    Text(String),
    /// Any other JSON value.
    Other(Value),
}

impl RawTimestamp {
    /// Interprets the value as whole epoch seconds, if possible.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_epoch_seconds(&self) -> Option<i64> {
        match self {
            Self::Integer(secs) => Some(*secs),
            Self::Float(secs) if secs.is_finite() => Some(secs.trunc() as i64),
            Self::Text(text) => {
                let trimmed = text.trim();
                trimmed.parse::<i64>().ok().or_else(|| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.trunc() as i64)
                })
            }
            Self::Float(_) | Self::Other(_) => None,
        }
    }
}

/// One saved article as listed by the service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteItem {
    /// Unique identifier of the bookmark.
    #[serde(deserialize_with = "deserialize_id")]
    pub bookmark_id: u64,
    /// Title; may be empty.
    #[serde(default, deserialize_with = "deserialize_nullable_string")]
    pub title: String,
    /// Source URL; may be empty.
    #[serde(default, deserialize_with = "deserialize_nullable_string")]
    pub url: String,
    /// Folder the bookmark lives in, when reported.
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub folder_id: Option<String>,
    /// Primary saved-at field.
    #[serde(default)]
    pub time_saved: Option<RawTimestamp>,
    /// Secondary saved-at field.
    #[serde(default)]
    pub time: Option<RawTimestamp>,
}

/// A user-defined folder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Folder {
    /// Folder identifier (numeric on the wire, kept as a string).
    #[serde(deserialize_with = "deserialize_required_id")]
    pub folder_id: String,
    /// Display title.
    #[serde(default, deserialize_with = "deserialize_nullable_string")]
    pub title: String,
}

/// Normalizes a `/bookmarks/list` payload into bookmark records.
///
/// - object: the embedded `bookmarks` array verbatim (missing or null → empty)
/// - array: only elements whose `type` is `"bookmark"`
///
/// A bookmark record that does not decode is skipped with a warning.
///
/// # Errors
///
/// Returns [`DecodeError`] for any other shape.
pub fn decode_bookmark_list(value: Value) -> Result<Vec<RemoteItem>, DecodeError> {
    match value {
        Value::Object(mut map) => match map.remove("bookmarks") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(records)) => Ok(decode_records(records)),
            Some(other) => Err(DecodeError::UnexpectedShape {
                expected: "array of bookmarks",
                found: json_type_name(&other),
            }),
        },
        Value::Array(records) => {
            let bookmarks = records
                .into_iter()
                .filter(|record| record_type(record) == Some("bookmark"))
                .collect();
            Ok(decode_records(bookmarks))
        }
        other => Err(DecodeError::UnexpectedShape {
            expected: "object or array",
            found: json_type_name(&other),
        }),
    }
}

/// Normalizes a `/folders/list` payload, keeping only `type == "folder"`.
///
/// # Errors
///
/// Returns [`DecodeError`] if the payload is not an array or a folder record
/// is undecodable.
pub fn decode_folders(value: Value) -> Result<Vec<Folder>, DecodeError> {
    let Value::Array(records) = value else {
        return Err(DecodeError::UnexpectedShape {
            expected: "array",
            found: json_type_name(&value),
        });
    };

    records
        .into_iter()
        .filter(|record| record_type(record) == Some("folder"))
        .enumerate()
        .map(|(index, record)| {
            serde_json::from_value(record).map_err(|source| DecodeError::InvalidRecord { index, source })
        })
        .collect()
}

/// Extracts a structured API error from a body, if it is one.
///
/// Accepts `{"type": "error", "error_code": .., "message": ..}` or a
/// one-element array containing such an object.
#[must_use]
pub fn parse_remote_error(value: &Value) -> Option<RemoteError> {
    let object = match value {
        Value::Array(items) if items.len() == 1 => &items[0],
        Value::Object(_) => value,
        _ => return None,
    };

    if record_type(object) != Some("error") {
        return None;
    }

    let code = object.get("error_code").and_then(|c| {
        c.as_i64()
            .or_else(|| c.as_str().and_then(|s| s.trim().parse().ok()))
    })?;
    let message = object
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(RemoteError { code, message })
}

/// Parses the form-encoded xAuth token response.
///
/// Returns `None` unless both `oauth_token` and `oauth_token_secret` are
/// present and non-empty.
#[must_use]
pub fn parse_token_response(body: &str) -> Option<TokenPair> {
    let mut token = None;
    let mut token_secret = None;
    for (key, value) in url::form_urlencoded::parse(body.trim().as_bytes()) {
        match key.as_ref() {
            "oauth_token" => token = Some(value.into_owned()),
            "oauth_token_secret" => token_secret = Some(value.into_owned()),
            _ => {}
        }
    }

    match (token, token_secret) {
        (Some(token), Some(token_secret)) if !token.is_empty() && !token_secret.is_empty() => {
            Some(TokenPair {
                token,
                token_secret,
            })
        }
        _ => None,
    }
}

fn decode_records(records: Vec<Value>) -> Vec<RemoteItem> {
    let total = records.len();
    let items: Vec<RemoteItem> = records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value(record) {
            Ok(item) => Some(item),
            Err(source) => {
                warn!(index, error = %source, "skipping undecodable bookmark record");
                None
            }
        })
        .collect();
    if items.len() < total {
        warn!(skipped = total - items.len(), kept = items.len(), "bookmark batch had bad records");
    }
    items
}

fn record_type(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(u64),
    Text(String),
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match WireId::deserialize(deserializer)? {
        WireId::Number(id) => Ok(id),
        WireId::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid bookmark id: {text:?}"))),
    }
}

fn deserialize_required_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match WireId::deserialize(deserializer)? {
        WireId::Number(id) => id.to_string(),
        WireId::Text(text) => text,
    })
}

fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<WireId>::deserialize(deserializer)?.map(|id| match id {
            WireId::Number(id) => id.to_string(),
            WireId::Text(text) => text,
        }),
    )
}

fn deserialize_nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
