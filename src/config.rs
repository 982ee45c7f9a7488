//! TOML configuration for the `rix` CLI and HTTP server.
//!
//! ```toml
//! [db]
//! path = "./data/rix.sqlite"
//!
//! [storage]
//! backend = "filesystem"        # or "s3"
//! root = "./data/vectors"
//! # bucket = "repo-vectors"
//! # region = "auto"
//! # endpoint_url = "https://<account>.r2.cloudflarestorage.com"
//!
//! [github]
//! token_env = "GITHUB_TOKEN"
//! issues_per_sync = 1
//! pull_requests_per_sync = 1
//! files_per_pull_request = 100
//!
//! [embedding]
//! provider = "openai"           # disabled | openai | ollama
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [sync]
//! discard_corrupt_store = false
//! call_timeout_secs = 120
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use repo_index_core::SyncOptions;

/// GitHub GraphQL caps `first:` on connections at 100.
pub const GITHUB_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Directory for the `filesystem` backend.
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    /// S3-compatible endpoint (R2, MinIO). Enables path-style addressing.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_storage_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_backend() -> String {
    "filesystem".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_storage_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_one")]
    pub issues_per_sync: u32,
    #[serde(default = "default_one")]
    pub pull_requests_per_sync: u32,
    #[serde(default = "default_files_per_pull_request")]
    pub files_per_pull_request: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            api_url: default_api_url(),
            issues_per_sync: 1,
            pull_requests_per_sync: 1,
            files_per_pull_request: default_files_per_pull_request(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_api_url() -> String {
    "https://api.github.com/graphql".to_string()
}
fn default_one() -> u32 {
    1
}
fn default_files_per_pull_request() -> u32 {
    GITHUB_PAGE_LIMIT
}

impl GithubConfig {
    /// The token from the configured environment variable, if set and non-empty.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (Ollama host, OpenAI-compatible gateway).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Start over instead of failing when the stored index cannot be decoded.
    #[serde(default)]
    pub discard_corrupt_store: bool,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            discard_corrupt_store: false,
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

fn default_call_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Allowed CORS origin. Any origin when unset.
    #[serde(default)]
    pub cors_origin: Option<String>,
}

impl Config {
    /// Engine tuning derived from `[github]` and `[sync]`.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            issues_first: self.github.issues_per_sync,
            pull_requests_first: self.github.pull_requests_per_sync,
            files_first: self.github.files_per_pull_request,
            discard_corrupt_store: self.sync.discard_corrupt_store,
            call_timeout: Duration::from_secs(self.sync.call_timeout_secs),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate storage
    match config.storage.backend.as_str() {
        "filesystem" => {
            if config.storage.root.is_none() {
                bail!("storage.root must be set when backend is 'filesystem'");
            }
        }
        "s3" => {
            if config.storage.bucket.as_deref().map_or(true, str::is_empty) {
                bail!("storage.bucket must be set when backend is 's3'");
            }
        }
        other => bail!(
            "Unknown storage backend: '{}'. Must be filesystem or s3.",
            other
        ),
    }

    // Validate github batch sizes
    let github = &config.github;
    if github.issues_per_sync == 0 {
        bail!("github.issues_per_sync must be > 0");
    }
    if github.pull_requests_per_sync == 0 {
        bail!("github.pull_requests_per_sync must be > 0");
    }
    if github.files_per_pull_request == 0 || github.files_per_pull_request > GITHUB_PAGE_LIMIT {
        bail!(
            "github.files_per_pull_request must be in [1, {}]",
            GITHUB_PAGE_LIMIT
        );
    }
    if github.issues_per_sync > GITHUB_PAGE_LIMIT
        || github.pull_requests_per_sync > GITHUB_PAGE_LIMIT
    {
        bail!(
            "github.issues_per_sync and github.pull_requests_per_sync must be <= {}",
            GITHUB_PAGE_LIMIT
        );
    }

    if config.sync.call_timeout_secs == 0 {
        bail!("sync.call_timeout_secs must be > 0");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(config)
}
