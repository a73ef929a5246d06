//! Server configuration for the Tandem HTTP API.
//!
//! This module provides configuration types for the REST server, supporting
//! both programmatic configuration and environment variable overrides.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TANDEM_SERVER_PORT` | 8080 | Server port |
//! | `TANDEM_SERVER_HOST` | 127.0.0.1 | Host to bind |
//! | `TANDEM_LOG_LEVEL` | info | Log level |
//! | `TANDEM_MAX_BODY_SIZE` | 10485760 | Max request body (bytes) |
//! | `TANDEM_REQUEST_TIMEOUT` | 240 | Request timeout (seconds) |
//! | `TANDEM_ENABLE_CORS` | true | Enable CORS |
//! | `TANDEM_CORS_ORIGINS` | * | Allowed origins |
//! | `TANDEM_CORS_METHODS` | GET,POST,OPTIONS | Allowed methods |
//! | `TANDEM_CORS_HEADERS` | Content-Type,Authorization,Accept,X-Request-Id | Allowed headers |
//! | `TANDEM_DOCUMENT_STORE` | sqlite | Document store (`sqlite` or `memory`) |
//! | `TANDEM_DATABASE_URL` | | SQLite file path, or `:memory:` |
//! | `TANDEM_DATABASE_ID` | tandem | Document database identifier |
//! | `TANDEM_OBJECT_STORE_ROOT` | | Directory holding one folder per bucket; in-memory when unset |
//! | `TANDEM_TRANSACTION_MODE` | auto | `auto`, `native` or `fallback` |
//! | `TANDEM_DEFAULT_TTL` | 3m | Default transaction time-to-live |
//! | `TANDEM_MAX_TTL` | 10m | Maximum transaction time-to-live |
//! | `TANDEM_MAX_TICKETS_PER_BOOKING` | 10 | Ticket limit per booking |
//!
//! With the `s3` feature, buckets live in S3 (or an S3-compatible service)
//! once `TANDEM_S3_REGION` or `TANDEM_S3_ENDPOINT` is set:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TANDEM_S3_REGION` | us-east-1 | S3 region |
//! | `TANDEM_S3_ENDPOINT` | | Custom endpoint, e.g. MinIO |
//! | `TANDEM_S3_ACCESS_KEY_ID` | | Static access key id |
//! | `TANDEM_S3_SECRET_ACCESS_KEY` | | Static secret access key |
//! | `TANDEM_S3_ALLOW_HTTP` | false | Allow plain HTTP |
//! | `TANDEM_S3_VIRTUAL_HOSTED_STYLE` | false | Use virtual-hosted-style requests |
//!
//! # Example
//!
//! ```rust
//! use tandem_rest::ServerConfig;
//!
//! // Create from environment
//! let config = ServerConfig::from_env();
//!
//! // Or create programmatically
//! let config = ServerConfig {
//!     port: 3000,
//!     host: "0.0.0.0".to_string(),
//!     enable_cors: true,
//!     ..Default::default()
//! };
//! assert_eq!(config.socket_addr(), "0.0.0.0:3000");
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
#[cfg(feature = "s3")]
use tandem_persistence::backends::objects::S3ObjectConfig;
use tandem_persistence::backends::objects::ObjectStoreConfig;
use tandem_persistence::config::{CoordinatorConfig, ModePreference};

/// Which document store the server runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DocumentStoreKind {
    /// SQLite, in a file or in memory.
    #[default]
    Sqlite,
    /// In-process store, lost on exit.
    Memory,
}

impl fmt::Display for DocumentStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentStoreKind::Sqlite => write!(f, "sqlite"),
            DocumentStoreKind::Memory => write!(f, "memory"),
        }
    }
}

/// S3 settings shared by every bucket.
#[cfg(feature = "s3")]
#[derive(Debug, Clone, Default, clap::Args)]
pub struct S3Args {
    /// S3 region.
    #[arg(long = "s3-region", env = "TANDEM_S3_REGION")]
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible services.
    #[arg(long = "s3-endpoint", env = "TANDEM_S3_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Static access key id.
    #[arg(long = "s3-access-key-id", env = "TANDEM_S3_ACCESS_KEY_ID")]
    pub access_key_id: Option<String>,

    /// Static secret access key.
    #[arg(
        long = "s3-secret-access-key",
        env = "TANDEM_S3_SECRET_ACCESS_KEY",
        hide_env_values = true
    )]
    pub secret_access_key: Option<String>,

    /// Allow plain HTTP (local MinIO).
    #[arg(long = "s3-allow-http", env = "TANDEM_S3_ALLOW_HTTP", default_value = "false")]
    pub allow_http: bool,

    /// Use virtual-hosted-style requests.
    #[arg(
        long = "s3-virtual-hosted-style",
        env = "TANDEM_S3_VIRTUAL_HOSTED_STYLE",
        default_value = "false"
    )]
    pub virtual_hosted_style: bool,
}

#[cfg(feature = "s3")]
impl S3Args {
    /// Returns whether S3 was selected.
    pub fn is_selected(&self) -> bool {
        self.region.is_some() || self.endpoint.is_some()
    }

    /// Builds the adapter settings, or `None` when S3 was not selected.
    pub fn object_config(&self) -> Option<S3ObjectConfig> {
        if !self.is_selected() {
            return None;
        }
        Some(S3ObjectConfig {
            region: self
                .region
                .clone()
                .unwrap_or_else(|| "us-east-1".to_string()),
            endpoint: self.endpoint.clone(),
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            allow_http: self.allow_http,
            virtual_hosted_style_request: self.virtual_hosted_style,
        })
    }
}

fn parse_mode(value: &str) -> Result<ModePreference, String> {
    match value.to_ascii_lowercase().as_str() {
        "auto" => Ok(ModePreference::Auto),
        "native" => Ok(ModePreference::Native),
        "fallback" => Ok(ModePreference::Fallback),
        other => Err(format!(
            "unknown transaction mode '{}', expected auto, native or fallback",
            other
        )),
    }
}

/// Server configuration for the Tandem HTTP API.
///
/// This struct can be constructed from environment variables using [`ServerConfig::from_env`],
/// from command line arguments using [`ServerConfig::parse`], or programmatically.
#[derive(Debug, Clone, Parser)]
#[command(name = "tandem")]
#[command(about = "Tandem transaction coordinator HTTP server")]
pub struct ServerConfig {
    /// Port to listen on.
    #[arg(short, long, env = "TANDEM_SERVER_PORT", default_value = "8080")]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "TANDEM_SERVER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "TANDEM_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Maximum request body size in bytes.
    #[arg(long, env = "TANDEM_MAX_BODY_SIZE", default_value = "10485760")]
    pub max_body_size: usize,

    /// Request timeout in seconds. Must exceed the default time-to-live.
    #[arg(long, env = "TANDEM_REQUEST_TIMEOUT", default_value = "240")]
    pub request_timeout: u64,

    /// Enable CORS.
    #[arg(long, env = "TANDEM_ENABLE_CORS", default_value = "true")]
    pub enable_cors: bool,

    /// Allowed CORS origins (comma-separated, or * for all).
    #[arg(long, env = "TANDEM_CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,

    /// Allowed CORS methods (comma-separated, or * for all).
    #[arg(long, env = "TANDEM_CORS_METHODS", default_value = "GET,POST,OPTIONS")]
    pub cors_methods: String,

    /// Allowed CORS headers (comma-separated, or * for all).
    #[arg(
        long,
        env = "TANDEM_CORS_HEADERS",
        default_value = "Content-Type,Authorization,Accept,X-Request-Id"
    )]
    pub cors_headers: String,

    /// Enable request ID tracking.
    #[arg(long, env = "TANDEM_ENABLE_REQUEST_ID", default_value = "true")]
    pub enable_request_id: bool,

    /// Document store backend.
    #[arg(long, env = "TANDEM_DOCUMENT_STORE", value_enum, default_value_t = DocumentStoreKind::Sqlite)]
    pub document_store: DocumentStoreKind,

    /// SQLite database path (`:memory:` for an in-memory database).
    #[arg(long, env = "TANDEM_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Document database identifier.
    #[arg(long, env = "TANDEM_DATABASE_ID", default_value = "tandem")]
    pub database_id: String,

    /// Directory holding one folder per bucket. Objects stay in memory when unset.
    #[arg(long, env = "TANDEM_OBJECT_STORE_ROOT")]
    pub object_store_root: Option<PathBuf>,

    /// Transaction execution mode (auto, native, fallback).
    #[arg(long, env = "TANDEM_TRANSACTION_MODE", default_value = "auto", value_parser = parse_mode)]
    pub mode: ModePreference,

    /// Default transaction time-to-live (e.g. "3m", "90s").
    #[arg(long, env = "TANDEM_DEFAULT_TTL", default_value = "3m", value_parser = humantime::parse_duration)]
    pub default_ttl: Duration,

    /// Maximum transaction time-to-live.
    #[arg(long, env = "TANDEM_MAX_TTL", default_value = "10m", value_parser = humantime::parse_duration)]
    pub max_ttl: Duration,

    /// Maximum tickets per booking.
    #[arg(long, env = "TANDEM_MAX_TICKETS_PER_BOOKING", default_value = "10")]
    pub max_tickets_per_booking: u32,

    /// S3 object storage.
    #[cfg(feature = "s3")]
    #[command(flatten)]
    pub s3: S3Args,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            log_level: "info".to_string(),
            max_body_size: 10 * 1024 * 1024, // 10MB
            request_timeout: 240,
            enable_cors: true,
            cors_origins: "*".to_string(),
            cors_methods: "GET,POST,OPTIONS".to_string(),
            cors_headers: "Content-Type,Authorization,Accept,X-Request-Id".to_string(),
            enable_request_id: true,
            document_store: DocumentStoreKind::Sqlite,
            database_url: None,
            database_id: "tandem".to_string(),
            object_store_root: None,
            mode: ModePreference::Auto,
            default_ttl: Duration::from_secs(180),
            max_ttl: Duration::from_secs(600),
            max_tickets_per_booking: 10,
            #[cfg(feature = "s3")]
            s3: S3Args::default(),
        }
    }
}

impl ServerConfig {
    /// Creates a new ServerConfig from environment variables.
    ///
    /// This is a convenience method that parses environment variables without
    /// requiring command line arguments.
    pub fn from_env() -> Self {
        // Try to parse from environment, falling back to defaults
        Self::try_parse().unwrap_or_default()
    }

    /// Returns the socket address to bind to.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the SQLite database path, defaulting to `tandem.db`.
    pub fn database_path(&self) -> &str {
        self.database_url.as_deref().unwrap_or("tandem.db")
    }

    /// Projects the coordinator settings out of the server configuration.
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            database_id: self.database_id.clone(),
            default_ttl: self.default_ttl,
            max_ttl: self.max_ttl,
            mode: self.mode,
            max_tickets_per_booking: self.max_tickets_per_booking,
            ..Default::default()
        }
    }

    /// Returns the object storage selection.
    ///
    /// S3, when configured, takes the place of the local and in-memory stores.
    pub fn object_store_config(&self) -> ObjectStoreConfig {
        #[cfg(feature = "s3")]
        {
            if let Some(s3) = self.s3.object_config() {
                return ObjectStoreConfig::S3(s3);
            }
        }
        match &self.object_store_root {
            Some(root) => ObjectStoreConfig::Local { root: root.clone() },
            None => ObjectStoreConfig::Memory,
        }
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.port == 0 {
            errors.push("Port cannot be 0".to_string());
        }

        if self.max_body_size == 0 {
            errors.push("Max body size cannot be 0".to_string());
        }

        if self.request_timeout == 0 {
            errors.push("Request timeout cannot be 0".to_string());
        }

        if Duration::from_secs(self.request_timeout) <= self.default_ttl {
            errors.push(format!(
                "Request timeout ({}s) must exceed the default time-to-live ({})",
                self.request_timeout,
                humantime::format_duration(self.default_ttl)
            ));
        }

        #[cfg(feature = "s3")]
        {
            if self.s3.is_selected() && self.object_store_root.is_some() {
                errors.push(
                    "Object store root and S3 settings are mutually exclusive".to_string(),
                );
            }
            if self.s3.access_key_id.is_some() != self.s3.secret_access_key.is_some() {
                errors.push(
                    "S3 access key id and secret access key must be set together".to_string(),
                );
            }
        }

        if let Err(e) = self.coordinator_config().validate() {
            errors.push(e.to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration suitable for testing.
    ///
    /// This uses ephemeral port 0, in-memory stores, and short timeouts.
    pub fn for_testing() -> Self {
        Self {
            port: 0, // Let OS assign port
            host: "127.0.0.1".to_string(),
            log_level: "debug".to_string(),
            max_body_size: 1024 * 1024,
            request_timeout: 10,
            enable_cors: false,
            cors_origins: "*".to_string(),
            cors_methods: "*".to_string(),
            cors_headers: "*".to_string(),
            enable_request_id: false,
            document_store: DocumentStoreKind::Memory,
            database_url: None,
            database_id: "tandem-test".to_string(),
            object_store_root: None,
            mode: ModePreference::Auto,
            default_ttl: Duration::from_secs(5),
            max_ttl: Duration::from_secs(30),
            max_tickets_per_booking: 10,
            #[cfg(feature = "s3")]
            s3: S3Args::default(),
        }
    }
}
