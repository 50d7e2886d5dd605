//! Signed session against the remote bookmark API.
//!
//! A [`Session`] is created once per run by exchanging account credentials
//! for an access token (xAuth), then signs every later call with both the
//! consumer and token secrets. All calls are `POST` with form parameters and
//! run through the retry engine.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use tracing::{debug, info, instrument};
use url::Url;

use super::oauth::{Credential, RequestSigner};
use super::response::{
    Folder, RemoteItem, decode_bookmark_list, decode_folders, parse_remote_error,
    parse_token_response,
};
use super::retry::{RetryPolicy, Sleeper, TokioSleeper, execute_with_retry};
use super::ApiError;

/// Production API base URL.
pub const DEFAULT_API_BASE: &str = "https://www.instapaper.com/api/1";

const ACCESS_TOKEN: &str = "/oauth/access_token";
const FOLDERS_LIST: &str = "/folders/list";
const BOOKMARKS_LIST: &str = "/bookmarks/list";
const BOOKMARKS_GET_TEXT: &str = "/bookmarks/get_text";

/// Parameters for one `/bookmarks/list` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkQuery {
    /// Folder to list.
    pub folder_id: String,
    /// Page-size ceiling.
    pub limit: u32,
    /// Ids the server should omit. Sent comma-joined in the given order.
    pub have: Vec<u64>,
}

impl BookmarkQuery {
    fn form_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("limit".to_string(), self.limit.to_string()),
            ("folder_id".to_string(), self.folder_id.clone()),
        ];
        if !self.have.is_empty() {
            let have = self
                .have
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(",");
            params.push(("have".to_string(), have));
        }
        params
    }
}

/// Remote operations the pipeline needs.
///
/// [`Session`] is the HTTP implementation; tests substitute in-memory fakes.
#[async_trait]
pub trait BookmarkApi: Send + Sync {
    /// Lists the user's folders.
    async fn list_folders(&self) -> Result<Vec<Folder>, ApiError>;

    /// Lists one page of bookmarks.
    async fn list_bookmarks(&self, query: &BookmarkQuery) -> Result<Vec<RemoteItem>, ApiError>;

    /// Fetches the processed markup of one bookmark.
    async fn get_text(&self, bookmark_id: u64) -> Result<String, ApiError>;
}

/// An authenticated, read-only session.
pub struct Session {
    http: Client,
    base_url: String,
    signer: RequestSigner,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url)
            .field("signer", &self.signer)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Exchanges `credential` for an access token and returns a bound session.
    ///
    /// # Errors
    ///
    /// - [`ApiError::Auth`] when the service rejects the credentials (401/403)
    ///   or the response lacks a token pair
    /// - [`ApiError::RetryExhausted`] when transient failures persist
    /// - [`ApiError::InvalidUrl`] when `base_url` is not a valid URL
    pub async fn establish(
        http: Client,
        credential: &Credential,
        base_url: &str,
        policy: RetryPolicy,
    ) -> Result<Self, ApiError> {
        Self::establish_with_sleeper(http, credential, base_url, policy, Arc::new(TokioSleeper))
            .await
    }

    /// Same as [`establish`](Self::establish) with a custom [`Sleeper`].
    ///
    /// # Errors
    ///
    /// See [`establish`](Self::establish).
    #[instrument(skip(http, credential, policy, sleeper))]
    pub async fn establish_with_sleeper(
        http: Client,
        credential: &Credential,
        base_url: &str,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, ApiError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|_| ApiError::invalid_url(&base_url))?;

        let mut session = Self {
            http,
            base_url,
            signer: RequestSigner::consumer_only(credential),
            policy,
            sleeper,
        };

        let params = vec![
            ("x_auth_username".to_string(), credential.username.clone()),
            ("x_auth_password".to_string(), credential.password.clone()),
            ("x_auth_mode".to_string(), "client_auth".to_string()),
        ];

        let body = {
            let this = &session;
            let params = &params;
            execute_with_retry(&this.policy, this.sleeper.as_ref(), ACCESS_TOKEN, || async move {
                this.post(ACCESS_TOKEN, params).await
            })
            .await
            .map_err(|error| match error {
                ApiError::HttpStatus {
                    status: 401 | 403,
                    remote,
                    ..
                } => ApiError::auth(remote.map_or_else(
                    || "credentials rejected".to_string(),
                    |r| r.message,
                )),
                other => other,
            })?
        };

        let token = parse_token_response(&body).ok_or_else(|| {
            ApiError::auth("token response is missing oauth_token or oauth_token_secret")
        })?;

        session.signer = session.signer.with_token(token);
        info!("session established");
        Ok(session)
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url, ApiError> {
        let full = format!("{}{endpoint}", self.base_url);
        Url::parse(&full).map_err(|_| ApiError::invalid_url(full))
    }

    /// One signed `POST`; returns the body of a 2xx response.
    async fn post(&self, endpoint: &str, params: &[(String, String)]) -> Result<String, ApiError> {
        let url = self.endpoint_url(endpoint)?;
        let authorization = self.signer.authorization_header("POST", &url, params)?;

        debug!(endpoint, "POST");
        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, authorization)
            .form(params)
            .send()
            .await
            .map_err(|e| ApiError::transport(endpoint, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::transport(endpoint, e))?;

        if !status.is_success() {
            let remote = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|value| parse_remote_error(&value));
            return Err(ApiError::http_status(endpoint, status.as_u16(), remote));
        }

        Ok(body)
    }

    /// Signed `POST` expecting a JSON body that is not an API error object.
    async fn post_json(&self, endpoint: &str, params: &[(String, String)]) -> Result<Value, ApiError> {
        let body = self.post(endpoint, params).await?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| ApiError::malformed(endpoint, e.to_string()))?;

        if let Some(remote) = parse_remote_error(&value) {
            return Err(ApiError::Remote {
                endpoint: endpoint.to_string(),
                remote,
            });
        }

        Ok(value)
    }
}

#[async_trait]
impl BookmarkApi for Session {
    #[instrument(skip(self))]
    async fn list_folders(&self) -> Result<Vec<Folder>, ApiError> {
        let params: Vec<(String, String)> = Vec::new();
        let params = &params;
        execute_with_retry(&self.policy, self.sleeper.as_ref(), FOLDERS_LIST, || async move {
            let value = self.post_json(FOLDERS_LIST, params).await?;
            decode_folders(value).map_err(|e| ApiError::malformed(FOLDERS_LIST, e.to_string()))
        })
        .await
    }

    #[instrument(skip(self, query), fields(folder_id = %query.folder_id, limit = query.limit, have = query.have.len()))]
    async fn list_bookmarks(&self, query: &BookmarkQuery) -> Result<Vec<RemoteItem>, ApiError> {
        let params = query.form_params();
        let params = &params;
        execute_with_retry(&self.policy, self.sleeper.as_ref(), BOOKMARKS_LIST, || async move {
            let value = self.post_json(BOOKMARKS_LIST, params).await?;
            decode_bookmark_list(value)
                .map_err(|e| ApiError::malformed(BOOKMARKS_LIST, e.to_string()))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_text(&self, bookmark_id: u64) -> Result<String, ApiError> {
        let params = vec![("bookmark_id".to_string(), bookmark_id.to_string())];
        let params = &params;
        execute_with_retry(&self.policy, self.sleeper.as_ref(), BOOKMARKS_GET_TEXT, || async move {
            self.post(BOOKMARKS_GET_TEXT, params).await
        })
        .await
    }
}
