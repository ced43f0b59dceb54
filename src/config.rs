//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf};

/// Signature algorithms the verifier understands.
pub const SUPPORTED_ALGORITHMS: [&str; 2] = ["rsa-sha256", "hs2019"];

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub federation: FederationConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "forge.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://forge.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Federation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Cap in bytes for inbound bodies, fetched documents and delivery responses
    pub max_size: usize,
    /// Accepted signature algorithms; the first one is advertised on outbound requests
    pub algorithms: Vec<String>,
    /// RSA modulus size for generated local keypairs
    pub key_bits: usize,
    /// Domain used to synthesize emails for remote actors (default: noreply.<domain>)
    pub no_reply_address: Option<String>,
    /// Allow fetching from loopback/private addresses (development only)
    pub allow_private_hosts: bool,
    /// Transport-level timeout for remote requests
    pub request_timeout_seconds: u64,
    /// User-Agent sent on outbound requests
    pub user_agent: String,
}

impl FederationConfig {
    /// Domain part of synthesized placeholder emails.
    pub fn no_reply_domain(&self, server_domain: &str) -> String {
        self.no_reply_address
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("noreply.{}", server_domain))
    }

    /// Algorithm name placed in outbound Signature headers.
    pub fn signing_algorithm(&self) -> &str {
        self.algorithms
            .first()
            .map(String::as_str)
            .unwrap_or(SUPPORTED_ALGORITHMS[0])
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FORGEFED__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "data/forgefed.db")?
            .set_default("federation.max_size", 4 * 1024 * 1024)?
            .set_default("federation.algorithms", vec!["rsa-sha256", "hs2019"])?
            .set_default("federation.key_bits", 4096)?
            .set_default("federation.allow_private_hosts", false)?
            .set_default("federation.request_timeout_seconds", 30)?
            .set_default(
                "federation.user_agent",
                format!("forgefed/{}", env!("CARGO_PKG_VERSION")),
            )?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (FORGEFED__*)
            .add_source(
                Environment::with_prefix("FORGEFED")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("federation.algorithms")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_KEY_BITS: usize = 1024;

        if self.federation.max_size == 0 {
            return Err(crate::error::AppError::Config(
                "federation.max_size must be greater than 0".to_string(),
            ));
        }

        if self.federation.algorithms.is_empty() {
            return Err(crate::error::AppError::Config(
                "federation.algorithms must list at least one algorithm".to_string(),
            ));
        }

        if let Some(unknown) = self
            .federation
            .algorithms
            .iter()
            .find(|algorithm| !SUPPORTED_ALGORITHMS.contains(&algorithm.as_str()))
        {
            return Err(crate::error::AppError::Config(format!(
                "federation.algorithms contains unsupported algorithm: {}",
                unknown
            )));
        }

        if self.federation.key_bits < MIN_KEY_BITS {
            return Err(crate::error::AppError::Config(format!(
                "federation.key_bits must be at least {}",
                MIN_KEY_BITS
            )));
        }

        if is_local_server_domain(&self.server.domain) {
            if !self.server.protocol.eq_ignore_ascii_case("https") {
                tracing::warn!(
                    host = %normalized_server_host(&self.server.domain),
                    protocol = %self.server.protocol,
                    "Serving federation IRIs over plain http for local development"
                );
            }
        } else if !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}
