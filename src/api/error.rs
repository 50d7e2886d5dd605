//! Error types for remote API calls.
//!
//! Every failure a remote call can produce is expressed as an [`ApiError`].
//! The retry engine classifies these into retryable and fatal failures; see
//! [`classify_error`](super::classify_error).

use thiserror::Error;

/// A structured error object returned by the remote service.
///
/// The service reports failures as `{"type": "error", "error_code": ..,
/// "message": ..}`, sometimes wrapped in a one-element array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// Numeric error code reported by the service.
    pub code: i64,
    /// Human-readable message reported by the service.
    pub message: String,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "API error {}: {}", self.code, self.message)
    }
}

/// Errors that can occur while talking to the remote bookmark service.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection-level failure (DNS, refused connection, reset, TLS).
    #[error("transport error calling {endpoint}: {source}")]
    Transport {
        /// Endpoint path that was being called.
        endpoint: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The request exceeded the HTTP client's timeout.
    #[error("timeout calling {endpoint}")]
    Timeout {
        /// Endpoint path that timed out.
        endpoint: String,
    },

    /// Non-2xx HTTP response.
    #[error("HTTP {status} calling {endpoint}{}", format_remote(.remote.as_ref()))]
    HttpStatus {
        /// Endpoint path that returned the status.
        endpoint: String,
        /// The HTTP status code.
        status: u16,
        /// Structured error parsed from the response body, if any.
        remote: Option<RemoteError>,
    },

    /// 2xx response whose body is a structured API error object.
    #[error("{remote} (calling {endpoint})")]
    Remote {
        /// Endpoint path that reported the error.
        endpoint: String,
        /// The structured error.
        remote: RemoteError,
    },

    /// 2xx response whose body does not decode as the expected payload.
    #[error("malformed response from {endpoint}: {reason}")]
    Malformed {
        /// Endpoint path that returned the body.
        endpoint: String,
        /// What was wrong with the body.
        reason: String,
    },

    /// Credentials were rejected; never retried.
    #[error("authentication failed: {reason}")]
    Auth {
        /// Why authentication failed.
        reason: String,
    },

    /// A retryable failure persisted past the retry budget.
    #[error("giving up after {attempts} attempts: {last}")]
    RetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The last observed error.
        #[source]
        last: Box<ApiError>,
    },

    /// The configured base URL or endpoint could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The HTTP client could not be constructed.
    #[error("{reason}")]
    ClientBuild {
        /// Why construction failed.
        reason: String,
    },
}

fn format_remote(remote: Option<&RemoteError>) -> String {
    remote.map_or_else(String::new, |r| format!(" ({r})"))
}

impl ApiError {
    /// Creates a transport error, promoting timeouts to [`ApiError::Timeout`].
    pub fn transport(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        let endpoint = endpoint.into();
        if source.is_timeout() {
            Self::Timeout { endpoint }
        } else {
            Self::Transport { endpoint, source }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(endpoint: impl Into<String>, status: u16, remote: Option<RemoteError>) -> Self {
        Self::HttpStatus {
            endpoint: endpoint.into(),
            status,
            remote,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(endpoint: impl Into<String>) -> Self {
        Self::Timeout {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a malformed-payload error.
    pub fn malformed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates an authentication error.
    pub fn auth(reason: impl Into<String>) -> Self {
        Self::Auth {
            reason: reason.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a client construction error.
    pub fn client_build(reason: impl Into<String>) -> Self {
        Self::ClientBuild {
            reason: reason.into(),
        }
    }

    /// Returns the structured remote error attached to this failure, if any.
    #[must_use]
    pub fn remote_error(&self) -> Option<&RemoteError> {
        match self {
            Self::HttpStatus { remote, .. } => remote.as_ref(),
            Self::Remote { remote, .. } => Some(remote),
            Self::RetryExhausted { last, .. } => last.remote_error(),
            _ => None,
        }
    }
}
