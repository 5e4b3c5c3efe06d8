//! Command line configuration.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PARKLINE_DB_URI` | mongodb://localhost:27017 | Connection URI |
//! | `PARKLINE_DB_NAME` | parkline | Database used when the URI names none |
//! | `PARKLINE_DB_TLS` | false | Enable TLS |
//! | `PARKLINE_DB_TLS_CA_FILE` | | CA certificate file |
//! | `PARKLINE_DB_TLS_CERT_KEY_FILE` | | Client certificate and key file |
//! | `PARKLINE_DB_DEBUG` | false | Log every database command |
//! | `PARKLINE_LOG_LEVEL` | info | Log level |
//! | `PARKLINE_LANGUAGES` | en | Supported languages (comma-separated) |
//! | `PARKLINE_PURGE_BATCH_SIZE` | 1000 | Stale values removed per batch |
//! | `PARKLINE_SESSION_TTL` | 7d | Session lifetime |
//! | `PARKLINE_EMAIL_VERIFICATION_TTL` | 24h | Email verification lifetime |
//! | `PARKLINE_RESERVATION_HOLD_TTL` | 15m | Reservation hold lifetime |
//! | `PARKLINE_PROVISION_RETRIES` | 3 | Attempts per collection |
//! | `PARKLINE_PROVISION_BASE_DELAY` | 500ms | Delay after the first failed attempt |

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use parkline_persistence::EntityFamilyKind;
use parkline_persistence::config::{ConnectOptions, ExpiryConfig, ReconcileConfig, RetryConfig};

/// Parkline database tool configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "parkline-dbctl")]
#[command(about = "Initializes the Parkline database and repairs multilingual content")]
pub struct DbctlConfig {
    /// Connection URI.
    #[arg(
        long,
        env = "PARKLINE_DB_URI",
        default_value = "mongodb://localhost:27017",
        global = true
    )]
    pub db_uri: String,

    /// Database name, used when the URI does not name one.
    #[arg(long, env = "PARKLINE_DB_NAME", default_value = "parkline", global = true)]
    pub db_name: String,

    /// Connect with TLS.
    #[arg(long, env = "PARKLINE_DB_TLS", default_value = "false", global = true)]
    pub tls: bool,

    /// CA certificate file for TLS.
    #[arg(long, env = "PARKLINE_DB_TLS_CA_FILE", global = true)]
    pub tls_ca_file: Option<PathBuf>,

    /// Client certificate and private key file for TLS.
    #[arg(long, env = "PARKLINE_DB_TLS_CERT_KEY_FILE", global = true)]
    pub tls_cert_key_file: Option<PathBuf>,

    /// Log every command sent to the database.
    #[arg(long, env = "PARKLINE_DB_DEBUG", default_value = "false", global = true)]
    pub db_debug: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "PARKLINE_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Supported languages (comma-separated two-letter codes).
    #[arg(
        long,
        env = "PARKLINE_LANGUAGES",
        default_value = "en",
        value_delimiter = ',',
        global = true
    )]
    pub languages: Vec<String>,

    /// Stale values removed per purge batch.
    #[arg(long, env = "PARKLINE_PURGE_BATCH_SIZE", default_value = "1000", global = true)]
    pub purge_batch_size: usize,

    /// Session lifetime.
    #[arg(
        long,
        env = "PARKLINE_SESSION_TTL",
        default_value = "7d",
        value_parser = humantime::parse_duration,
        global = true
    )]
    pub session_ttl: Duration,

    /// Email verification lifetime.
    #[arg(
        long,
        env = "PARKLINE_EMAIL_VERIFICATION_TTL",
        default_value = "24h",
        value_parser = humantime::parse_duration,
        global = true
    )]
    pub email_verification_ttl: Duration,

    /// Reservation hold lifetime.
    #[arg(
        long,
        env = "PARKLINE_RESERVATION_HOLD_TTL",
        default_value = "15m",
        value_parser = humantime::parse_duration,
        global = true
    )]
    pub reservation_hold_ttl: Duration,

    /// Attempts per collection when provisioning.
    #[arg(long, env = "PARKLINE_PROVISION_RETRIES", default_value = "3", global = true)]
    pub provision_retries: u32,

    /// Delay after the first failed provisioning attempt; doubles after each
    /// further failure.
    #[arg(
        long,
        env = "PARKLINE_PROVISION_BASE_DELAY",
        default_value = "500ms",
        value_parser = humantime::parse_duration,
        global = true
    )]
    pub provision_base_delay: Duration,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Provision collections, reconcile indexes and synchronize every family.
    Init {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Synchronize a single multilingual family.
    Sync {
        /// Family to repair.
        #[arg(value_enum)]
        family: FamilyArg,
    },
}

/// Family names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FamilyArg {
    /// Locations.
    Location,
    /// Countries.
    Country,
    /// Parking spots.
    ParkingSpot,
}

impl From<FamilyArg> for EntityFamilyKind {
    fn from(family: FamilyArg) -> Self {
        match family {
            FamilyArg::Location => EntityFamilyKind::Location,
            FamilyArg::Country => EntityFamilyKind::Country,
            FamilyArg::ParkingSpot => EntityFamilyKind::ParkingSpot,
        }
    }
}

impl DbctlConfig {
    /// Builds the library configuration.
    pub fn reconcile_config(&self) -> ReconcileConfig {
        let mut connection = ConnectOptions::new(self.db_uri.clone()).with_debug(self.db_debug);
        connection.database = self.db_name.clone();
        if self.tls {
            connection =
                connection.with_tls(self.tls_ca_file.clone(), self.tls_cert_key_file.clone());
        }

        ReconcileConfig {
            connection,
            languages: self.languages.iter().map(|l| l.trim().to_string()).collect(),
            purge_batch_size: self.purge_batch_size,
            expiry: ExpiryConfig {
                session: self.session_ttl,
                email_verification: self.email_verification_ttl,
                reservation_hold: self.reservation_hold_ttl,
            },
            provisioning: RetryConfig {
                max_attempts: self.provision_retries,
                initial_delay: self.provision_base_delay,
                ..RetryConfig::default()
            },
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = self.reconcile_config().validate().err().unwrap_or_default();

        if !self.tls && (self.tls_ca_file.is_some() || self.tls_cert_key_file.is_some()) {
            errors.push("TLS files are set but TLS is disabled".to_string());
        }

        if !matches!(
            self.log_level.to_ascii_lowercase().as_str(),
            "error" | "warn" | "info" | "debug" | "trace"
        ) {
            errors.push(format!("Unknown log level '{}'", self.log_level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration suitable for testing.
    #[cfg(test)]
    pub fn for_testing(command: Command) -> Self {
        Self {
            db_uri: "mongodb://localhost:27017/parkline_test".to_string(),
            db_name: "parkline_test".to_string(),
            tls: false,
            tls_ca_file: None,
            tls_cert_key_file: None,
            db_debug: false,
            log_level: "debug".to_string(),
            languages: vec!["en".to_string(), "de".to_string()],
            purge_batch_size: 10,
            session_ttl: Duration::from_secs(60),
            email_verification_ttl: Duration::from_secs(60),
            reservation_hold_ttl: Duration::from_secs(60),
            provision_retries: 1,
            provision_base_delay: Duration::from_millis(1),
            command,
        }
    }
}
