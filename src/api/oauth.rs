//! OAuth 1.0a (RFC 5849) HMAC-SHA1 request signing.
//!
//! The remote service authenticates every call with an `Authorization: OAuth`
//! header. The header carries the consumer key, an optional access token, a
//! nonce, a timestamp, and an HMAC-SHA1 signature over the normalized request.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distributions::Alphanumeric;
use sha1::Sha1;
use url::Url;

use super::ApiError;

type HmacSha1 = Hmac<Sha1>;

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";
const NONCE_LEN: usize = 32;

/// Consumer and account credentials supplied at startup.
///
/// Never persisted by the library. `Debug` output redacts the secrets.
#[derive(Clone)]
pub struct Credential {
    /// OAuth consumer key issued to the application.
    pub consumer_key: String,
    /// OAuth consumer secret issued to the application.
    pub consumer_secret: String,
    /// Account username (usually an email address).
    pub username: String,
    /// Account password. May be empty for accounts without one.
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"[REDACTED]")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Access token pair obtained from the xAuth bootstrap exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// `oauth_token`
    pub token: String,
    /// `oauth_token_secret`
    pub token_secret: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("token", &"[REDACTED]")
            .field("token_secret", &"[REDACTED]")
            .finish()
    }
}

/// Signs requests on behalf of a consumer and, once bootstrapped, a token.
#[derive(Clone)]
pub struct RequestSigner {
    consumer_key: String,
    consumer_secret: String,
    token: Option<TokenPair>,
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("consumer_key", &self.consumer_key)
            .field("has_token", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    /// Creates a signer that signs with the consumer credentials only.
    #[must_use]
    pub fn consumer_only(credential: &Credential) -> Self {
        Self {
            consumer_key: credential.consumer_key.clone(),
            consumer_secret: credential.consumer_secret.clone(),
            token: None,
        }
    }

    /// Returns a copy of this signer that also signs with `token`.
    #[must_use]
    pub fn with_token(mut self, token: TokenPair) -> Self {
        self.token = Some(token);
        self
    }

    /// Builds the `Authorization` header value for a request.
    ///
    /// `params` are the form-encoded body parameters; query parameters are
    /// taken from `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Auth`] if the signing key is rejected by the MAC.
    pub fn authorization_header(
        &self,
        method: &str,
        url: &Url,
        params: &[(String, String)],
    ) -> Result<String, ApiError> {
        let nonce = generate_nonce();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        self.authorization_header_with(method, url, params, &nonce, &timestamp)
    }

    /// Same as [`authorization_header`](Self::authorization_header) with a
    /// fixed nonce and timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Auth`] if the signing key is rejected by the MAC.
    pub fn authorization_header_with(
        &self,
        method: &str,
        url: &Url,
        params: &[(String, String)],
        nonce: &str,
        timestamp: &str,
    ) -> Result<String, ApiError> {
        let mut oauth_params: Vec<(String, String)> = vec![
            ("oauth_consumer_key".into(), self.consumer_key.clone()),
            ("oauth_nonce".into(), nonce.to_string()),
            ("oauth_signature_method".into(), SIGNATURE_METHOD.into()),
            ("oauth_timestamp".into(), timestamp.to_string()),
        ];
        if let Some(token) = &self.token {
            oauth_params.push(("oauth_token".into(), token.token.clone()));
        }
        oauth_params.push(("oauth_version".into(), OAUTH_VERSION.into()));

        let mut all_params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        all_params.extend(params.iter().cloned());
        all_params.extend(oauth_params.iter().cloned());

        let base = signature_base_string(method, url, &all_params);
        let token_secret = self.token.as_ref().map_or("", |t| t.token_secret.as_str());
        let signature = sign(&base, &self.consumer_secret, token_secret)?;
        oauth_params.push(("oauth_signature".into(), signature));

        let fields = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("OAuth {fields}"))
    }
}

/// RFC 3986 percent-encoding: everything except `A-Z a-z 0-9 - . _ ~`.
#[must_use]
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Builds the RFC 5849 §3.4.1 signature base string.
///
/// `params` must include query, body, and `oauth_*` parameters (excluding
/// `oauth_signature`).
#[must_use]
pub fn signature_base_string(method: &str, url: &Url, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let normalized = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(&base_string_uri(url)),
        percent_encode(&normalized)
    )
}

/// Scheme, host, non-default port, and path; no query or fragment.
fn base_string_uri(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    match url.port() {
        Some(port) => format!("{}://{host}:{port}{}", url.scheme(), url.path()),
        None => format!("{}://{host}{}", url.scheme(), url.path()),
    }
}

/// HMAC-SHA1 of `base` keyed with the encoded secrets, base64-encoded.
///
/// # Errors
///
/// Returns [`ApiError::Auth`] if the key cannot initialize the MAC.
pub fn sign(base: &str, consumer_secret: &str, token_secret: &str) -> Result<String, ApiError> {
    let key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    );
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| ApiError::auth(format!("invalid signing key: {e}")))?;
    mac.update(base.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}
