//! Configuration settings for the webhook gate.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::GateError;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub gate: GateOptions,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Raw gate options, before validation.
///
/// Every field has a default so partial configuration files are accepted;
/// [`Policy::configure`](super::Policy::configure) decides whether the
/// result is usable.
#[derive(Debug, Clone, Deserialize)]
pub struct GateOptions {
    /// Master switch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// File holding the hex secret and optional algorithm hint.
    #[serde(default = "default_secret_file")]
    pub secret_file: PathBuf,
    /// Directory handed to the nonce ledger.
    #[serde(default)]
    pub nonce_dir: Option<PathBuf>,
    /// Freshness window in seconds.
    #[serde(default = "default_ttl")]
    pub ttl_seconds: i64,
    /// Extra slack for clock drift between sender and receiver.
    #[serde(default = "default_clock_skew")]
    pub ttl_clock_skew_tolerance: i64,
    /// Exact addresses and IPv4 CIDR blocks. Non-string entries are ignored.
    #[serde(default)]
    pub allowed_ips: Vec<serde_json::Value>,
    /// `sha256` or `sha512`. Unset lets the secret source choose.
    #[serde(default)]
    pub algo: Option<String>,
    /// Bind method, path and query into the signature.
    #[serde(default)]
    pub bind_context: bool,
    #[serde(default = "default_header_signature")]
    pub header_signature: String,
    #[serde(default = "default_header_timestamp")]
    pub header_timestamp: String,
    #[serde(default = "default_header_nonce")]
    pub header_nonce: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Whether authorization decisions are written to the audit log.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Path to the audit log file.
    #[serde(default = "default_audit_log_path")]
    pub log_path: PathBuf,
}

// Default value functions
fn default_enabled() -> bool {
    true
}

fn default_secret_file() -> PathBuf {
    PathBuf::from("/etc/hookgate/secret.json")
}

fn default_ttl() -> i64 {
    300
}

fn default_clock_skew() -> i64 {
    60
}

fn default_header_signature() -> String {
    "X-Signature".to_string()
}

fn default_header_timestamp() -> String {
    "X-Timestamp".to_string()
}

fn default_header_nonce() -> String {
    "X-Nonce".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_audit_enabled() -> bool {
    false
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from("/var/log/hookgate/audit.log")
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            secret_file: default_secret_file(),
            nonce_dir: None,
            ttl_seconds: default_ttl(),
            ttl_clock_skew_tolerance: default_clock_skew(),
            allowed_ips: Vec::new(),
            algo: None,
            bind_context: false,
            header_signature: default_header_signature(),
            header_timestamp: default_header_timestamp(),
            header_nonce: default_header_nonce(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            log_path: default_audit_log_path(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GateError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| GateError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            GateError::Config { message } => GateError::Config {
                message: format!("{} ('{}')", message, path.display()),
            },
            other => other,
        })
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, GateError> {
        let settings: Settings = toml::from_str(content).map_err(|e| GateError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate the settings that are not covered by policy configuration.
    fn validate(&self) -> Result<(), GateError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(GateError::Config {
                message: format!(
                    "Invalid log level '{}'. Valid levels: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(GateError::Config {
                message: format!(
                    "Invalid log format '{}'. Valid formats: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        Ok(())
    }
}
