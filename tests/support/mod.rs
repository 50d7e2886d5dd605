//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::net::TcpListener;
use std::panic::Location;
use std::sync::Mutex;
use std::time::Duration;

use archiver_core::api::{Credential, RetryPolicy, Sleeper};
use async_trait::async_trait;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Base path the mock API is mounted under.
pub const API_PREFIX: &str = "/api/1";

#[must_use]
pub fn socket_tests_required() -> bool {
    std::env::var("ARCHIVER_REQUIRE_SOCKET_TESTS")
        .ok()
        .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

#[track_caller]
#[must_use]
pub fn should_skip_socket_bound_test() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return false;
    }

    let location = Location::caller();
    let message = format!(
        "[socket-bound-test] cannot bind localhost socket at {}:{}; wiremock-based test cannot run in this environment",
        location.file(),
        location.line()
    );
    if socket_tests_required() {
        panic!("{message}. Set ARCHIVER_REQUIRE_SOCKET_TESTS=0 to allow local skip behavior.");
    }

    eprintln!(
        "{message}. Skipping test. Set ARCHIVER_REQUIRE_SOCKET_TESTS=1 to fail-fast instead."
    );
    true
}

pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if should_skip_socket_bound_test() {
        None
    } else {
        Some(MockServer::start().await)
    }
}

/// API base URL for `server`.
pub fn api_base(server: &MockServer) -> String {
    format!("{}{API_PREFIX}", server.uri())
}

/// Full mock path for an endpoint such as `/bookmarks/list`.
pub fn api_path(endpoint: &str) -> String {
    format!("{API_PREFIX}{endpoint}")
}

pub fn credential() -> Credential {
    Credential {
        consumer_key: "consumer-key".to_string(),
        consumer_secret: "consumer-secret".to_string(),
        username: "reader@example.com".to_string(),
        password: "hunter2".to_string(),
    }
}

/// Three attempts with millisecond backoff.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5), 2.0)
}

/// Mounts a successful xAuth token exchange.
pub async fn mount_access_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(api_path("/oauth/access_token")))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("oauth_token=tok-123&oauth_token_secret=sec-456"),
        )
        .mount(server)
        .await;
}

/// Records requested sleeps instead of waiting.
#[derive(Default)]
pub struct RecordingSleeper {
    pub sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn recorded(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}
