//! # Configuration Management
//!
//! Process configuration for certforge, loaded from `CERTFORGE_*` environment
//! variables (a `.env` file is honoured by the binary through `dotenvy`).

use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{errors::Error, secrets::SecretString, Result};

const DEFAULT_CA_CERT_PATH: &str = "./root_ca_files/RootCA.crt";
const DEFAULT_CA_KEY_PATH: &str = "./root_ca_files/RootCA.key";
const DEFAULT_WORK_DIR: &str = "./temp_files";
const DEFAULT_WORK_PREFIX: &str = "cert_";
const DEFAULT_EVENT_TOPIC: &str = "certificate_creation";

/// Application configuration
#[derive(Debug, Clone, Validate)]
pub struct Config {
    pub ca: CaConfig,

    #[validate(nested)]
    pub signer: SignerConfig,

    #[validate(nested)]
    pub api: ApiServerConfig,

    #[validate(nested)]
    pub observability: ObservabilityConfig,

    /// Topic issuance outcome events are published on
    #[validate(length(min = 1, message = "Event topic cannot be empty"))]
    pub event_topic: String,
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let is_dev = lookup("CERTFORGE_DEV").map(|v| parse_flag(&v)).unwrap_or(false);

        let config = Self {
            ca: CaConfig::from_lookup(&lookup)?,
            signer: SignerConfig::from_lookup(&lookup)?,
            api: ApiServerConfig::from_lookup(&lookup, is_dev)?,
            observability: ObservabilityConfig::from_lookup(&lookup)?,
            event_topic: lookup("CERTFORGE_EVENT_TOPIC")
                .unwrap_or_else(|| DEFAULT_EVENT_TOPIC.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;

        if self.ca.passphrase.is_empty() {
            return Err(Error::config("CERTFORGE_CA_PASSPHRASE must be set"));
        }

        Ok(())
    }
}

/// Location of the root CA material and the passphrase protecting its key
#[derive(Debug, Clone)]
pub struct CaConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub passphrase: SecretString,
}

impl CaConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let passphrase = lookup("CERTFORGE_CA_PASSPHRASE")
            .ok_or_else(|| Error::config("CERTFORGE_CA_PASSPHRASE must be set"))?;

        Ok(Self {
            cert_path: lookup("CERTFORGE_CA_CERT_PATH")
                .unwrap_or_else(|| DEFAULT_CA_CERT_PATH.to_string())
                .into(),
            key_path: lookup("CERTFORGE_CA_KEY_PATH")
                .unwrap_or_else(|| DEFAULT_CA_KEY_PATH.to_string())
                .into(),
            passphrase: SecretString::new(passphrase),
        })
    }
}

/// Which signing strategy backs the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SignerStrategy {
    /// Sign in memory with rcgen
    #[default]
    InProcess,
    /// Drive the openssl CLI through CSR + extension file + sign steps
    External,
}

impl SignerStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignerStrategy::InProcess => "in-process",
            SignerStrategy::External => "external",
        }
    }
}

impl fmt::Display for SignerStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignerStrategy {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "in-process" | "in_process" | "inprocess" => Ok(SignerStrategy::InProcess),
            "external" | "openssl" => Ok(SignerStrategy::External),
            other => Err(Error::config(format!(
                "Unknown signer strategy '{}': expected 'in-process' or 'external'",
                other
            ))),
        }
    }
}

/// Signer configuration
#[derive(Debug, Clone, Validate)]
pub struct SignerConfig {
    pub strategy: SignerStrategy,

    /// Binary invoked by the external-tool pipeline
    pub openssl_bin: PathBuf,

    /// Root of the per-artifact temporary directories
    pub work_dir: PathBuf,

    /// Prefix of every work-item file name
    #[validate(length(min = 1, max = 32, message = "Work file prefix must be 1-32 characters"))]
    pub file_prefix: String,

    /// Size of the bounded worker pool for blocking work
    #[validate(range(min = 1, max = 64, message = "Max concurrent jobs must be between 1 and 64"))]
    pub max_concurrent_jobs: usize,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            strategy: SignerStrategy::default(),
            openssl_bin: PathBuf::from("openssl"),
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            file_prefix: DEFAULT_WORK_PREFIX.to_string(),
            max_concurrent_jobs: 4,
        }
    }
}

impl SignerConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let strategy = match lookup("CERTFORGE_SIGNER") {
            Some(value) => value.parse()?,
            None => defaults.strategy,
        };

        let max_concurrent_jobs = match lookup("CERTFORGE_MAX_CONCURRENT_JOBS") {
            Some(value) => value.parse().map_err(|e| {
                Error::config(format!("Invalid CERTFORGE_MAX_CONCURRENT_JOBS '{}': {}", value, e))
            })?,
            None => defaults.max_concurrent_jobs,
        };

        Ok(Self {
            strategy,
            openssl_bin: lookup("CERTFORGE_OPENSSL_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.openssl_bin),
            work_dir: lookup("CERTFORGE_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            file_prefix: lookup("CERTFORGE_WORK_PREFIX")
                .unwrap_or(defaults.file_prefix),
            max_concurrent_jobs,
        })
    }
}

/// HTTP request layer configuration
#[derive(Debug, Clone, Validate)]
pub struct ApiServerConfig {
    #[validate(length(min = 1, message = "Bind address cannot be empty"))]
    pub bind_address: String,

    #[validate(range(min = 1, message = "API port must be between 1 and 65535"))]
    pub port: u16,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 9200,
        }
    }
}

impl ApiServerConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>, is_dev: bool) -> Result<Self> {
        let default_address = if is_dev { "127.0.0.1" } else { "0.0.0.0" };

        let port = match lookup("CERTFORGE_API_PORT") {
            Some(value) => value.parse().map_err(|e| {
                Error::config(format!("Invalid CERTFORGE_API_PORT '{}': {}", value, e))
            })?,
            None => Self::default().port,
        };

        Ok(Self {
            bind_address: lookup("CERTFORGE_API_BIND_ADDRESS")
                .unwrap_or_else(|| default_address.to_string()),
            port,
        })
    }

    /// Get the server bind address
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Validate)]
pub struct ObservabilityConfig {
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Prometheus exporter port (0 = disabled)
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "certforge".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
            metrics_port: 0,
        }
    }
}

impl ObservabilityConfig {
    /// Logging configuration straight from the environment. The binary needs it
    /// before the rest of the configuration can be reported.
    pub fn from_env() -> Self {
        let lookup = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self::from_lookup(&lookup).unwrap_or_default()
    }

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let metrics_port = match lookup("CERTFORGE_METRICS_PORT") {
            Some(value) => value.parse().map_err(|e| {
                Error::config(format!("Invalid CERTFORGE_METRICS_PORT '{}': {}", value, e))
            })?,
            None => defaults.metrics_port,
        };

        Ok(Self {
            service_name: defaults.service_name,
            log_level: lookup("CERTFORGE_LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logging: lookup("CERTFORGE_LOG_JSON").map(|v| parse_flag(&v)).unwrap_or(false),
            metrics_port,
        })
    }

    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
