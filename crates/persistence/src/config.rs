//! Configuration for connecting to the document store and reconciling it.
//!
//! All structs deserialize with per-field defaults, so a partial document
//! (or none at all) yields a working configuration. Durations are written in
//! `humantime` form (`"500ms"`, `"15m"`, `"7days"`).
//!
//! # Example
//!
//! ```
//! use parkline_persistence::config::ReconcileConfig;
//!
//! let config: ReconcileConfig = serde_json::from_str(r#"{
//!     "languages": ["en", "de", "fr"],
//!     "purge_batch_size": 500,
//!     "expiry": { "session": "12h" }
//! }"#).unwrap();
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.expiry.session.as_secs(), 12 * 3600);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::BASELINE_LANGUAGE;

/// Top-level reconciliation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// How to reach the store.
    #[serde(default)]
    pub connection: ConnectOptions,

    /// Supported two-letter language codes. Must include `en`.
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,

    /// Number of stale value IDs removed per purge batch.
    #[serde(default = "default_purge_batch_size")]
    pub purge_batch_size: usize,

    /// Lifetimes of the expiring collections.
    #[serde(default)]
    pub expiry: ExpiryConfig,

    /// Retry behaviour for collection and TTL index provisioning.
    #[serde(default)]
    pub provisioning: RetryConfig,
}

fn default_languages() -> Vec<String> {
    vec![BASELINE_LANGUAGE.to_string()]
}

fn default_purge_batch_size() -> usize {
    1000
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            connection: ConnectOptions::default(),
            languages: default_languages(),
            purge_batch_size: default_purge_batch_size(),
            expiry: ExpiryConfig::default(),
            provisioning: RetryConfig::default(),
        }
    }
}

impl ReconcileConfig {
    /// Sets the supported languages.
    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the purge batch size.
    pub fn with_purge_batch_size(mut self, size: usize) -> Self {
        self.purge_batch_size = size;
        self
    }

    /// Returns the supported languages lowercased, deduplicated, in their
    /// configured order.
    pub fn normalized_languages(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.languages.len());
        for lang in &self.languages {
            let lang = lang.trim().to_ascii_lowercase();
            if !out.contains(&lang) {
                out.push(lang);
            }
        }
        out
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let languages = self.normalized_languages();
        if languages.is_empty() {
            errors.push("At least one supported language is required".to_string());
        }
        for lang in &languages {
            if lang.len() != 2 || !lang.chars().all(|c| c.is_ascii_lowercase()) {
                errors.push(format!("Invalid language code '{}'", lang));
            }
        }
        if !languages.iter().any(|l| l == BASELINE_LANGUAGE) {
            errors.push(format!(
                "Supported languages must include the baseline '{}'",
                BASELINE_LANGUAGE
            ));
        }

        if self.purge_batch_size == 0 {
            errors.push("Purge batch size cannot be 0".to_string());
        }

        for (name, ttl) in self.expiry.entries() {
            if ttl.as_secs() == 0 {
                errors.push(format!("Expiry for {} must be at least one second", name));
            }
        }

        if self.provisioning.max_attempts == 0 {
            errors.push("Provisioning attempts cannot be 0".to_string());
        }

        if self.connection.uri.trim().is_empty() {
            errors.push("Connection URI cannot be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Like [`validate`](Self::validate), as a single error value.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()
            .map_err(|errors| ConfigError::Invalid { errors })
    }
}

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Connection string.
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Database name, used when the URI does not name one.
    #[serde(default = "default_database")]
    pub database: String,

    /// Transport security.
    #[serde(default)]
    pub tls: TlsSettings,

    /// Log every command sent to the store at debug level.
    #[serde(default)]
    pub debug: bool,
}

fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database() -> String {
    "parkline".to_string()
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            database: default_database(),
            tls: TlsSettings::default(),
            debug: false,
        }
    }
}

impl ConnectOptions {
    /// Creates options for the given URI.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    /// Enables TLS with the given CA file.
    pub fn with_tls(mut self, ca_file: Option<PathBuf>, cert_key_file: Option<PathBuf>) -> Self {
        self.tls = TlsSettings {
            enabled: true,
            ca_file,
            cert_key_file,
        };
        self
    }

    /// Turns command logging on or off.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// TLS settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsSettings {
    /// Whether to use TLS.
    #[serde(default)]
    pub enabled: bool,

    /// PEM file with the certificate authority to trust.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    /// PEM file holding the client certificate and private key.
    #[serde(default)]
    pub cert_key_file: Option<PathBuf>,
}

/// Lifetimes of the expiring collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryConfig {
    /// Login sessions.
    #[serde(with = "humantime_serde", default = "default_session_ttl")]
    pub session: Duration,

    /// Pending email verification tokens.
    #[serde(with = "humantime_serde", default = "default_email_verification_ttl")]
    pub email_verification: Duration,

    /// Temporary reservation holds on a parking spot.
    #[serde(with = "humantime_serde", default = "default_reservation_hold_ttl")]
    pub reservation_hold: Duration,
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(7 * 24 * 3600)
}

fn default_email_verification_ttl() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_reservation_hold_ttl() -> Duration {
    Duration::from_secs(15 * 60)
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            session: default_session_ttl(),
            email_verification: default_email_verification_ttl(),
            reservation_hold: default_reservation_hold_ttl(),
        }
    }
}

impl ExpiryConfig {
    fn entries(&self) -> [(&'static str, Duration); 3] {
        [
            ("sessions", self.session),
            ("email verifications", self.email_verification),
            ("reservation holds", self.reservation_hold),
        ]
    }
}

/// Retry configuration for provisioning steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    #[serde(with = "humantime_serde", default = "default_initial_delay")]
    pub initial_delay: Duration,

    /// Maximum delay between attempts.
    #[serde(with = "humantime_serde", default = "default_max_delay")]
    pub max_delay: Duration,

    /// Backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
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
    fn test_default_config() {
        let config = ReconcileConfig::default();
        assert_eq!(config.languages, vec!["en"]);
        assert_eq!(config.purge_batch_size, 1000);
        assert_eq!(config.provisioning.max_attempts, 3);
        assert_eq!(config.provisioning.initial_delay, Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_empty_object() {
        let config: ReconcileConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.connection.database, "parkline");
        assert_eq!(config.expiry.reservation_hold, Duration::from_secs(900));
    }

    #[test]
    fn test_deserialize_humantime() {
        let config: ReconcileConfig = serde_json::from_str(
            r#"{"provisioning": {"initial_delay": "250ms", "max_attempts": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.provisioning.initial_delay, Duration::from_millis(250));
        assert_eq!(config.provisioning.max_attempts, 5);
    }

    #[test]
    fn test_normalized_languages() {
        let config = ReconcileConfig::default().with_languages(["EN", "de", " fr", "de"]);
        assert_eq!(config.normalized_languages(), vec!["en", "de", "fr"]);
    }

    #[test]
    fn test_validate_requires_baseline() {
        let config = ReconcileConfig::default().with_languages(["de", "fr"]);
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("baseline")));
    }

    #[test]
    fn test_validate_rejects_bad_codes() {
        let config = ReconcileConfig::default().with_languages(["en", "deu", "f1"]);
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = ReconcileConfig::default().with_purge_batch_size(0);
        assert!(config.check().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = ReconcileConfig::default();
        config.expiry.session = Duration::from_millis(10);
        let errors = config.validate().unwrap_err();
        assert!(errors[0].contains("sessions"));
    }
}
