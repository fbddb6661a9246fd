//! Configuration for the ACME server.
//!
//! A [`clap`] parser resolves the config file path, then [`serde_json`]
//! deserializes it, with missing fields falling back to environment
//! variables or hardcoded defaults.

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

/// CLI arguments for the ACME server.
#[derive(Parser, Debug)]
#[command(name = "acmed")]
#[command(about = "ACME (RFC 8555) certificate issuance server")]
struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Server configuration.
///
/// Fields use serde defaults that fall back to environment variables, then
/// to hardcoded defaults, so the server is runnable with no config file at
/// all.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "defaults::default_port")]
    pub port: u16,
    #[serde(default = "defaults::default_host")]
    pub host: IpAddr,
    /// Base URL this server publishes in `Location` headers and the
    /// directory document (e.g. `https://acme.example.org`).
    #[serde(default = "defaults::default_base_url")]
    pub base_url: String,

    /// Nonce TTL in seconds (ACME §4.1, default 300s).
    #[serde(default = "defaults::default_nonce_ttl_secs")]
    pub nonce_ttl_secs: u64,

    /// Allowed JWS `alg` values (ACME §4.2). Default: RS256, ES256, ES384.
    #[serde(default = "defaults::default_allowed_algs")]
    pub allowed_algs: Vec<String>,

    /// Whether `termsOfServiceAgreed` is required on `newAccount` (ACME §4.3).
    #[serde(default = "defaults::default_true")]
    pub terms_of_service_required: bool,
    #[serde(default)]
    pub terms_of_service_url: Option<String>,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub caa_identities: Vec<String>,

    /// Challenge types offered per new authorization (ACME §4.4).
    #[serde(default = "defaults::default_challenge_types")]
    pub challenge_types: Vec<String>,

    /// Whether wildcard DNS identifiers are accepted (ACME §4.4; default off).
    #[serde(default)]
    pub allow_wildcard: bool,

    /// Max HTTP redirects followed during `http-01` validation (ACME §4.6).
    #[serde(default = "defaults::default_http01_redirect_limit")]
    pub http01_redirect_limit: usize,

    /// Hard wall-clock timeout for a single validation attempt, in seconds
    /// (ACME §5, default 30s).
    #[serde(default = "defaults::default_validation_timeout_secs")]
    pub validation_timeout_secs: u64,

    /// Hard wall-clock timeout for a CA handler invocation, in seconds
    /// (ACME §5, default 120s).
    #[serde(default = "defaults::default_ca_timeout_secs")]
    pub ca_timeout_secs: u64,

    /// Order/authorization lifetime in seconds from creation.
    #[serde(default = "defaults::default_order_ttl_secs")]
    pub order_ttl_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: defaults::default_port(),
            host: defaults::default_host(),
            base_url: defaults::default_base_url(),
            nonce_ttl_secs: defaults::default_nonce_ttl_secs(),
            allowed_algs: defaults::default_allowed_algs(),
            terms_of_service_required: defaults::default_true(),
            terms_of_service_url: None,
            website_url: None,
            caa_identities: Vec::new(),
            challenge_types: defaults::default_challenge_types(),
            allow_wildcard: false,
            http01_redirect_limit: defaults::default_http01_redirect_limit(),
            validation_timeout_secs: defaults::default_validation_timeout_secs(),
            ca_timeout_secs: defaults::default_ca_timeout_secs(),
            order_ttl_secs: defaults::default_order_ttl_secs(),
        }
    }
}

pub mod defaults {
    use std::env;
    use std::net::IpAddr;

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HOST: &str = "0.0.0.0";

    pub fn default_port() -> u16 {
        env::var("ACME_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    pub fn default_host() -> IpAddr {
        env::var("ACME_HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(DEFAULT_HOST.parse().unwrap()))
    }

    pub fn default_base_url() -> String {
        env::var("ACME_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
    }

    pub fn default_nonce_ttl_secs() -> u64 {
        300
    }

    pub fn default_allowed_algs() -> Vec<String> {
        vec!["RS256".to_string(), "ES256".to_string(), "ES384".to_string()]
    }

    pub fn default_true() -> bool {
        true
    }

    pub fn default_challenge_types() -> Vec<String> {
        vec!["http-01".to_string(), "dns-01".to_string(), "tls-alpn-01".to_string()]
    }

    pub fn default_http01_redirect_limit() -> usize {
        10
    }

    pub fn default_validation_timeout_secs() -> u64 {
        30
    }

    pub fn default_ca_timeout_secs() -> u64 {
        120
    }

    pub fn default_order_ttl_secs() -> i64 {
        7 * 24 * 3600
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Config {
    /// Loads configuration from CLI arguments and a JSON file.
    ///
    /// The config file path comes from `--config`/`CONFIG` (default
    /// `./config.json`). If the file does not exist, falls back to
    /// [`Config::default`] entirely, so the server is runnable with zero
    /// setup.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        if !cli_args.config.exists() {
            return Ok(Config::default());
        }
        Self::load_from_path(&cli_args.config)
    }

    fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}
