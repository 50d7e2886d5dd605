//! Remote bookmark API client.
//!
//! This module provides:
//! - OAuth 1.0a request signing and the xAuth token bootstrap
//! - A signed [`Session`] implementing [`BookmarkApi`]
//! - Retry with exponential backoff and error classification
//! - Normalization of the service's inconsistent response shapes
//!
//! # Example
//!
//! ```no_run
//! use archiver_core::api::{
//!     BookmarkApi, Credential, HttpTimeouts, RetryPolicy, Session, build_http_client,
//! };
//!
//! # async fn example() -> Result<(), archiver_core::api::ApiError> {
//! let http = build_http_client(HttpTimeouts::default())?;
//! let credential = Credential {
//!     consumer_key: "key".into(),
//!     consumer_secret: "secret".into(),
//!     username: "reader@example.com".into(),
//!     password: "password".into(),
//! };
//! let session = Session::establish(
//!     http,
//!     &credential,
//!     "https://www.instapaper.com/api/1",
//!     RetryPolicy::default(),
//! )
//! .await?;
//! let folders = session.list_folders().await?;
//! println!("{} folders", folders.len());
//! # Ok(())
//! # }
//! ```

mod error;
mod http_client;
pub mod oauth;
pub mod response;
mod retry;
mod session;

pub use error::{ApiError, RemoteError};
pub use http_client::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS, HttpTimeouts, build_http_client,
    default_user_agent,
};
pub use oauth::{Credential, TokenPair};
pub use response::{DecodeError, Folder, RawTimestamp, RemoteItem, decode_bookmark_list};
pub use retry::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy,
    Sleeper, TokioSleeper, classify_error, execute_with_retry,
};
pub use session::{BookmarkApi, BookmarkQuery, DEFAULT_API_BASE, Session};
