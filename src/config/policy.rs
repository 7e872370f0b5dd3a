//! Validated gate policy.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::GateOptions;
use crate::auth::{Algorithm, CanonicalMode, FileSecretSource, SecretSource};
use crate::error::GateError;

/// Header keys the gate reads from the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderNames {
    pub signature: String,
    pub timestamp: String,
    pub nonce: String,
}

impl Default for HeaderNames {
    fn default() -> Self {
        let options = GateOptions::default();
        Self {
            signature: options.header_signature,
            timestamp: options.header_timestamp,
            nonce: options.header_nonce,
        }
    }
}

/// Immutable gate configuration.
///
/// Built once by [`Policy::configure`] and shared read-only across requests.
#[derive(Clone)]
pub struct Policy {
    pub(crate) enabled: bool,
    pub(crate) secret: Vec<u8>,
    pub(crate) algorithm: Algorithm,
    pub(crate) ttl_seconds: u64,
    pub(crate) clock_skew_seconds: u64,
    pub(crate) allowed_sources: Vec<String>,
    pub(crate) bind_context: bool,
    pub(crate) headers: HeaderNames,
    pub(crate) nonce_dir: Option<PathBuf>,
}

impl Policy {
    /// Validate options, reading the secret from `options.secret_file`.
    pub fn configure(options: &GateOptions) -> Result<Self, GateError> {
        let source = FileSecretSource::new(options.secret_file.clone());
        Self::configure_with(options, &source)
    }

    /// Validate options, reading the secret from `source`.
    ///
    /// A disabled gate accepts incomplete options and never reads the source.
    pub fn configure_with(
        options: &GateOptions,
        source: &dyn SecretSource,
    ) -> Result<Self, GateError> {
        let explicit_algo = options
            .algo
            .as_deref()
            .map(|a| a.trim().to_ascii_lowercase())
            .filter(|a| !a.is_empty());

        let headers = HeaderNames {
            signature: options.header_signature.trim().to_string(),
            timestamp: options.header_timestamp.trim().to_string(),
            nonce: options.header_nonce.trim().to_string(),
        };

        let allowed_sources = filter_sources(&options.allowed_ips);
        let nonce_dir = options
            .nonce_dir
            .clone()
            .filter(|dir| !dir.as_os_str().is_empty());

        if !options.enabled {
            debug!("Webhook gate disabled, skipping validation");
            return Ok(Self {
                enabled: false,
                secret: Vec::new(),
                algorithm: explicit_algo
                    .as_deref()
                    .and_then(Algorithm::parse)
                    .unwrap_or_default(),
                ttl_seconds: u64::try_from(options.ttl_seconds).unwrap_or(0),
                clock_skew_seconds: u64::try_from(options.ttl_clock_skew_tolerance).unwrap_or(0),
                allowed_sources,
                bind_context: options.bind_context,
                headers,
                nonce_dir,
            });
        }

        if options.ttl_seconds < 1 {
            return Err(config_error(format!(
                "ttl_seconds must be at least 1, got {}",
                options.ttl_seconds
            )));
        }

        if options.ttl_clock_skew_tolerance < 0 {
            return Err(config_error(format!(
                "ttl_clock_skew_tolerance must not be negative, got {}",
                options.ttl_clock_skew_tolerance
            )));
        }

        let explicit = match explicit_algo.as_deref() {
            Some(name) => Some(Algorithm::parse(name).ok_or_else(|| {
                config_error(format!(
                    "Unsupported algorithm '{}'. Valid algorithms: [\"sha256\", \"sha512\"]",
                    name
                ))
            })?),
            None => None,
        };

        if nonce_dir.is_none() {
            return Err(config_error("nonce_dir must be set when the gate is enabled"));
        }

        for (option, value) in [
            ("header_signature", &headers.signature),
            ("header_timestamp", &headers.timestamp),
            ("header_nonce", &headers.nonce),
        ] {
            if value.is_empty() {
                return Err(config_error(format!("{} must not be empty", option)));
            }
        }

        let resolved = source
            .resolve()
            .map_err(|e| config_error(format!("Failed to resolve HMAC secret: {}", e)))?;

        if resolved.secret.is_empty() {
            return Err(config_error("HMAC secret is empty"));
        }

        // Explicit configuration wins over the source's hint.
        let algorithm = match (explicit, resolved.algorithm.as_deref()) {
            (Some(algorithm), _) => algorithm,
            (None, Some(hint)) => Algorithm::parse(hint).ok_or_else(|| {
                config_error(format!("Unsupported algorithm hint '{}' from secret source", hint))
            })?,
            (None, None) => Algorithm::default(),
        };

        debug!(
            algorithm = %algorithm,
            ttl_seconds = options.ttl_seconds,
            clock_skew = options.ttl_clock_skew_tolerance,
            allowed_sources = allowed_sources.len(),
            bind_context = options.bind_context,
            "Webhook gate policy configured"
        );

        Ok(Self {
            enabled: true,
            secret: resolved.secret,
            algorithm,
            ttl_seconds: options.ttl_seconds as u64,
            clock_skew_seconds: options.ttl_clock_skew_tolerance as u64,
            allowed_sources,
            bind_context: options.bind_context,
            headers,
            nonce_dir,
        })
    }

    /// A policy that denies everything with `Disabled`.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            secret: Vec::new(),
            algorithm: Algorithm::default(),
            ttl_seconds: 0,
            clock_skew_seconds: 0,
            allowed_sources: Vec::new(),
            bind_context: false,
            headers: HeaderNames::default(),
            nonce_dir: None,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn clock_skew_seconds(&self) -> u64 {
        self.clock_skew_seconds
    }

    pub fn allowed_sources(&self) -> &[String] {
        &self.allowed_sources
    }

    pub fn bind_context(&self) -> bool {
        self.bind_context
    }

    pub fn canonical_mode(&self) -> CanonicalMode {
        CanonicalMode::from_bind_context(self.bind_context)
    }

    pub fn headers(&self) -> &HeaderNames {
        &self.headers
    }

    pub fn nonce_dir(&self) -> Option<&Path> {
        self.nonce_dir.as_deref()
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("enabled", &self.enabled)
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("clock_skew_seconds", &self.clock_skew_seconds)
            .field("allowed_sources", &self.allowed_sources)
            .field("bind_context", &self.bind_context)
            .field("headers", &self.headers)
            .field("nonce_dir", &self.nonce_dir)
            .finish()
    }
}

/// Keep only non-empty string entries.
fn filter_sources(entries: &[serde_json::Value]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| entry.as_str())
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn config_error(message: impl Into<String>) -> GateError {
    GateError::Config {
        message: message.into(),
    }
}
