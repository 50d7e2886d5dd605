//! Run configuration.
//!
//! Values are layered, lowest priority first:
//!
//! 1. built-in defaults
//! 2. a TOML file (`--config`, else `<config dir>/archiver/config.toml`)
//! 3. environment variables (a `.env` file is loaded first if present)
//! 4. command-line overrides
//!
//! Credentials come only from the environment and are never written back.
//!
//! ```toml
//! folder = "Research"
//! output_dir = "/home/me/vault/Instapaper"
//! page_size = 200
//! item_delay_ms = 500
//! max_retries = 5
//! ```

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{
    Credential, DEFAULT_API_BASE, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_CONNECT_TIMEOUT_SECS,
    DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT_SECS, HttpTimeouts, RetryPolicy,
};
use crate::folders::DEFAULT_FOLDER;
use crate::paginator::{DEFAULT_MAX_HAVE_IDS, DEFAULT_MAX_ITERATIONS, MAX_PAGE_SIZE};
use crate::sync::{DEFAULT_CHECKPOINT_EVERY, SyncOptions};

/// Largest accepted retry attempt count.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

/// Environment variable holding the OAuth consumer key.
pub const ENV_CONSUMER_KEY: &str = "INSTAPAPER_CONSUMER_KEY";
/// Environment variable holding the OAuth consumer secret.
pub const ENV_CONSUMER_SECRET: &str = "INSTAPAPER_CONSUMER_SECRET";
/// Environment variable holding the account username.
pub const ENV_USERNAME: &str = "INSTAPAPER_USERNAME";
/// Environment variable holding the account password.
pub const ENV_PASSWORD: &str = "INSTAPAPER_PASSWORD";

const ENV_FOLDER: &str = "INSTAPAPER_FOLDER";
const ENV_OUTPUT_DIR: &str = "ARCHIVER_OUTPUT_DIR";
const ENV_MANIFEST: &str = "ARCHIVER_MANIFEST";
const ENV_API_BASE: &str = "ARCHIVER_API_BASE";

const DEFAULT_ITEM_DELAY_MS: u64 = 1_000;
const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_DELAY_MS: u64 = 60_000;
const DEFAULT_MANIFEST_NAME: &str = ".instapaper_manifest.json";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A required credential variable is unset or blank.
    #[error("missing credential: set {var}")]
    MissingCredential {
        /// The environment variable to set.
        var: &'static str,
    },

    /// A value is outside its accepted range.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Optional values read from the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// API base URL.
    pub api_base_url: Option<String>,
    /// Folder name or id.
    pub folder: Option<String>,
    /// Output directory for documents.
    pub output_dir: Option<PathBuf>,
    /// Ledger file path.
    pub manifest: Option<PathBuf>,
    /// Listing page size.
    pub page_size: Option<u32>,
    /// Exclusion hint cap.
    pub max_have_ids: Option<usize>,
    /// Listing request bound.
    pub max_iterations: Option<u32>,
    /// Items between ledger checkpoints.
    pub checkpoint_every: Option<usize>,
    /// Pause after each content fetch, in milliseconds.
    pub item_delay_ms: Option<u64>,
    /// Attempts per API call.
    pub max_retries: Option<u32>,
    /// First backoff delay, in milliseconds.
    pub base_delay_ms: Option<u64>,
    /// Backoff cap, in milliseconds.
    pub max_delay_ms: Option<u64>,
    /// TCP connect timeout, in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Whole-request timeout, in seconds.
    pub request_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Reads and parses `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Folder name or id.
    pub folder: Option<String>,
    /// Output directory.
    pub output_dir: Option<PathBuf>,
    /// Ledger file path.
    pub manifest: Option<PathBuf>,
    /// Attempts per API call.
    pub max_retries: Option<u32>,
    /// Pause after each content fetch, in milliseconds.
    pub item_delay_ms: Option<u64>,
}

/// Resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct ArchiverConfig {
    /// API base URL.
    pub api_base_url: String,
    /// Folder name or id to archive.
    pub folder: String,
    /// Output directory for documents.
    pub output_dir: PathBuf,
    /// Ledger file path.
    pub manifest_path: PathBuf,
    /// Listing page size.
    pub page_size: u32,
    /// Exclusion hint cap.
    pub max_have_ids: usize,
    /// Listing request bound.
    pub max_iterations: u32,
    /// Items between ledger checkpoints.
    pub checkpoint_every: usize,
    /// Pause after each content fetch.
    pub item_delay: Duration,
    /// Attempts per API call.
    pub max_retries: u32,
    /// First backoff delay.
    pub base_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    /// HTTP client timeouts.
    pub timeouts: HttpTimeouts,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            api_base_url: DEFAULT_API_BASE.to_string(),
            folder: DEFAULT_FOLDER.to_string(),
            output_dir: home.join("Obsidian").join("Vault").join("Instapaper"),
            manifest_path: home.join(DEFAULT_MANIFEST_NAME),
            page_size: MAX_PAGE_SIZE,
            max_have_ids: DEFAULT_MAX_HAVE_IDS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
            item_delay: Duration::from_millis(DEFAULT_ITEM_DELAY_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            timeouts: HttpTimeouts {
                connect: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
                request: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            },
        }
    }
}

impl ArchiverConfig {
    /// Loads configuration from every layer.
    ///
    /// A missing default config file is not an error; a missing explicit
    /// `config_path` is.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or a
    /// resolved value is out of range.
    pub fn load(
        config_path: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        load_dotenv();

        let mut config = Self::default();
        let file = match config_path {
            Some(path) => Some(FileConfig::from_path(path)?),
            None => match default_config_path() {
                Some(path) if path.is_file() => Some(FileConfig::from_path(&path)?),
                _ => None,
            },
        };
        if let Some(file) = file {
            config.apply_file(file);
        }
        config.apply_env(|key| env::var(key).ok());
        config.apply_overrides(overrides);
        config.validate()?;
        debug!(?config, "configuration resolved");
        Ok(config)
    }

    /// Applies values present in the TOML layer.
    pub fn apply_file(&mut self, file: FileConfig) {
        if let Some(url) = file.api_base_url {
            self.api_base_url = url;
        }
        if let Some(folder) = file.folder {
            self.folder = folder;
        }
        if let Some(dir) = file.output_dir {
            self.output_dir = expand_home(&dir);
        }
        if let Some(manifest) = file.manifest {
            self.manifest_path = expand_home(&manifest);
        }
        if let Some(page_size) = file.page_size {
            self.page_size = page_size;
        }
        if let Some(max_have_ids) = file.max_have_ids {
            self.max_have_ids = max_have_ids;
        }
        if let Some(max_iterations) = file.max_iterations {
            self.max_iterations = max_iterations;
        }
        if let Some(checkpoint_every) = file.checkpoint_every {
            self.checkpoint_every = checkpoint_every;
        }
        if let Some(ms) = file.item_delay_ms {
            self.item_delay = Duration::from_millis(ms);
        }
        if let Some(max_retries) = file.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(ms) = file.base_delay_ms {
            self.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.max_delay_ms {
            self.max_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = file.connect_timeout_secs {
            self.timeouts.connect = Duration::from_secs(secs);
        }
        if let Some(secs) = file.request_timeout_secs {
            self.timeouts.request = Duration::from_secs(secs);
        }
    }

    /// Applies environment values returned by `lookup`. Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        if let Some(url) = get(ENV_API_BASE) {
            self.api_base_url = url;
        }
        if let Some(folder) = get(ENV_FOLDER) {
            self.folder = folder;
        }
        if let Some(dir) = get(ENV_OUTPUT_DIR) {
            self.output_dir = expand_home(Path::new(&dir));
        }
        if let Some(manifest) = get(ENV_MANIFEST) {
            self.manifest_path = expand_home(Path::new(&manifest));
        }
    }

    /// Applies command-line overrides.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(folder) = &overrides.folder {
            self.folder.clone_from(folder);
        }
        if let Some(dir) = &overrides.output_dir {
            self.output_dir = expand_home(dir);
        }
        if let Some(manifest) = &overrides.manifest {
            self.manifest_path = expand_home(manifest);
        }
        if let Some(max_retries) = overrides.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(ms) = overrides.item_delay_ms {
            self.item_delay = Duration::from_millis(ms);
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first out-of-range field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(invalid("page_size", format!("must be between 1 and {MAX_PAGE_SIZE}")));
        }
        if !(1..=MAX_RETRY_ATTEMPTS).contains(&self.max_retries) {
            return Err(invalid(
                "max_retries",
                format!("must be between 1 and {MAX_RETRY_ATTEMPTS}"),
            ));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations", "must be >= 1".to_string()));
        }
        if self.checkpoint_every == 0 {
            return Err(invalid("checkpoint_every", "must be >= 1".to_string()));
        }
        if self.max_delay < self.base_delay {
            return Err(invalid(
                "max_delay_ms",
                "must not be smaller than base_delay_ms".to_string(),
            ));
        }
        if self.timeouts.connect.is_zero() || self.timeouts.request.is_zero() {
            return Err(invalid("timeouts", "must be >= 1 second".to_string()));
        }
        if self.folder.trim().is_empty() {
            return Err(invalid("folder", "cannot be empty".to_string()));
        }
        url::Url::parse(&self.api_base_url)
            .map_err(|e| invalid("api_base_url", e.to_string()))?;
        Ok(())
    }

    /// Retry policy for API calls.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.base_delay, self.max_delay, DEFAULT_BACKOFF_MULTIPLIER)
    }

    /// Orchestrator tunables.
    #[must_use]
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            page_size: self.page_size,
            max_have_ids: self.max_have_ids,
            max_iterations: self.max_iterations,
            checkpoint_every: self.checkpoint_every,
            item_delay: self.item_delay,
        }
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidValue { field, reason }
}

/// Reads the credential from the process environment.
///
/// # Errors
///
/// Returns [`ConfigError::MissingCredential`] naming the first unset variable.
pub fn credential_from_env() -> Result<Credential, ConfigError> {
    credential_from_lookup(|key| env::var(key).ok())
}

/// Reads the credential through `lookup`.
///
/// The password may be absent; the other three values are required.
///
/// # Errors
///
/// Returns [`ConfigError::MissingCredential`] naming the first unset variable.
pub fn credential_from_lookup<F>(lookup: F) -> Result<Credential, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let required = |var: &'static str| {
        lookup(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingCredential { var })
    };
    Ok(Credential {
        consumer_key: required(ENV_CONSUMER_KEY)?,
        consumer_secret: required(ENV_CONSUMER_SECRET)?,
        username: required(ENV_USERNAME)?,
        password: lookup(ENV_PASSWORD).unwrap_or_default(),
    })
}

/// `<config dir>/archiver/config.toml`, when a config dir is known.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("archiver").join("config.toml"))
}

fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => {
            debug!(path = %path.display(), "loaded .env");
            return;
        }
        Err(err) if err.not_found() => {}
        Err(err) => warn!(error = %err, "ignoring unreadable .env"),
    }
    let Some(path) = dirs::config_dir().map(|dir| dir.join("archiver").join(".env")) else {
        return;
    };
    if path.is_file() {
        load_dotenv_file(&path);
    }
}

/// Loads `path` into the environment; failures are logged, not returned.
fn load_dotenv_file(path: &Path) -> bool {
    match dotenvy::from_path(path) {
        Ok(()) => {
            debug!(path = %path.display(), "loaded .env");
            true
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unreadable .env");
            false
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
