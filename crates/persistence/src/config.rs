//! Coordinator configuration.
//!
//! All recognized fields are enumerated here once and passed explicitly into
//! [`TransactionCoordinator::new`](crate::coordinator::TransactionCoordinator::new).
//! Every field has a default, so an empty document deserializes to a usable
//! configuration.
//!
//! # Example
//!
//! ```
//! use tandem_persistence::config::{CoordinatorConfig, ModePreference};
//! use std::time::Duration;
//!
//! let config: CoordinatorConfig = serde_json::from_str(r#"{
//!     "database_id": "tandem-prod",
//!     "default_ttl": "2m",
//!     "mode": "fallback",
//!     "conflict_retry": { "max_retries": 5, "backoff": "50ms" }
//! }"#).unwrap();
//!
//! assert_eq!(config.default_ttl, Duration::from_secs(120));
//! assert_eq!(config.mode, ModePreference::Fallback);
//! assert_eq!(config.buckets.avatars, "avatars");
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Identifier of the document database.
    #[serde(default = "default_database_id")]
    pub database_id: String,

    /// Object storage bucket identifiers.
    #[serde(default)]
    pub buckets: BucketConfig,

    /// Time-to-live applied when `begin` is called without one.
    #[serde(with = "humantime_serde", default = "default_ttl")]
    pub default_ttl: Duration,

    /// Upper bound for any requested time-to-live.
    #[serde(with = "humantime_serde", default = "default_max_ttl")]
    pub max_ttl: Duration,

    /// Execution mode selection.
    #[serde(default)]
    pub mode: ModePreference,

    /// Retry policy for direct conflict-check reads.
    #[serde(default)]
    pub conflict_retry: RetryConfig,

    /// Maximum tickets per booking.
    #[serde(default = "default_max_tickets_per_booking")]
    pub max_tickets_per_booking: u32,
}

fn default_database_id() -> String {
    "tandem".to_string()
}

fn default_ttl() -> Duration {
    Duration::from_secs(180)
}

fn default_max_ttl() -> Duration {
    Duration::from_secs(600)
}

fn default_max_tickets_per_booking() -> u32 {
    10
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            database_id: default_database_id(),
            buckets: BucketConfig::default(),
            default_ttl: default_ttl(),
            max_ttl: default_max_ttl(),
            mode: ModePreference::default(),
            conflict_retry: RetryConfig::default(),
            max_tickets_per_booking: default_max_tickets_per_booking(),
        }
    }
}

impl CoordinatorConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_id.trim().is_empty() {
            return Err(ConfigError::EmptyDatabaseId);
        }

        for (role, name) in self.buckets.iter() {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyBucket(role.to_string()));
            }
        }

        if self.default_ttl.is_zero() || self.max_ttl.is_zero() {
            return Err(ConfigError::ZeroTtl);
        }

        if self.default_ttl > self.max_ttl {
            return Err(ConfigError::DefaultTtlAboveMax {
                default_ttl: humantime::format_duration(self.default_ttl).to_string(),
                max_ttl: humantime::format_duration(self.max_ttl).to_string(),
            });
        }

        if self.max_tickets_per_booking == 0 {
            return Err(ConfigError::ZeroTicketLimit);
        }

        Ok(())
    }
}

/// Object storage bucket identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Bucket for user avatars.
    #[serde(default = "default_avatars_bucket")]
    pub avatars: String,

    /// Bucket for user QR assets.
    #[serde(default = "default_qr_codes_bucket")]
    pub qr_codes: String,

    /// Bucket for ticket QR images.
    #[serde(default = "default_tickets_bucket")]
    pub tickets: String,
}

fn default_avatars_bucket() -> String {
    "avatars".to_string()
}

fn default_qr_codes_bucket() -> String {
    "qr-codes".to_string()
}

fn default_tickets_bucket() -> String {
    "tickets".to_string()
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            avatars: default_avatars_bucket(),
            qr_codes: default_qr_codes_bucket(),
            tickets: default_tickets_bucket(),
        }
    }
}

impl BucketConfig {
    /// Iterates `(role, bucket name)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("avatars", self.avatars.as_str()),
            ("qr_codes", self.qr_codes.as_str()),
            ("tickets", self.tickets.as_str()),
        ]
        .into_iter()
    }

    /// Returns the bucket names.
    pub fn names(&self) -> Vec<String> {
        self.iter().map(|(_, name)| name.to_string()).collect()
    }
}

/// Which execution mode the coordinator should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModePreference {
    /// Native when the store declares it, fallback otherwise.
    #[default]
    Auto,
    /// Require native transactions; construction fails without them.
    Native,
    /// Always use the compensating fallback.
    Fallback,
}

/// Retry policy for conflict-check reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between attempts.
    #[serde(with = "humantime_serde", default = "default_backoff")]
    pub backoff: Duration,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff() -> Duration {
    Duration::from_millis(100)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff: default_backoff(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The database identifier is blank.
    #[error("database_id must not be empty")]
    EmptyDatabaseId,

    /// A bucket identifier is blank.
    #[error("bucket '{0}' must not be empty")]
    EmptyBucket(String),

    /// A time-to-live is zero.
    #[error("default_ttl and max_ttl must be greater than zero")]
    ZeroTtl,

    /// The default time-to-live exceeds the maximum.
    #[error("default_ttl ({default_ttl}) must not exceed max_ttl ({max_ttl})")]
    DefaultTtlAboveMax {
        /// The configured default.
        default_ttl: String,
        /// The configured maximum.
        max_ttl: String,
    },

    /// Bookings could never succeed.
    #[error("max_tickets_per_booking must be at least 1")]
    ZeroTicketLimit,
}

/// Serde module for Duration with humantime format.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(180));
        assert_eq!(config.conflict_retry.max_retries, 3);
        assert_eq!(config.conflict_retry.backoff, Duration::from_millis(100));
        assert_eq!(config.mode, ModePreference::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: CoordinatorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.database_id, "tandem");
        assert_eq!(config.buckets, BucketConfig::default());
        assert_eq!(config.max_tickets_per_booking, 10);
    }

    #[test]
    fn test_humantime_round_trip() {
        let config = CoordinatorConfig {
            default_ttl: Duration::from_secs(90),
            ..Default::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["default_ttl"], "1m 30s");
        let back: CoordinatorConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.default_ttl, Duration::from_secs(90));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = CoordinatorConfig::default();
        config.buckets.tickets = " ".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyBucket("tickets".to_string()))
        );

        let config = CoordinatorConfig {
            default_ttl: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTtl));

        let config = CoordinatorConfig {
            default_ttl: Duration::from_secs(900),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DefaultTtlAboveMax { .. })
        ));
    }

    #[test]
    fn test_bucket_names() {
        assert_eq!(
            BucketConfig::default().names(),
            vec!["avatars", "qr-codes", "tickets"]
        );
    }
}
