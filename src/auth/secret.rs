//! HMAC secret resolution.
//!
//! A [`SecretSource`] yields the raw key bytes and an optional algorithm
//! hint. Sources are read once, when the policy is configured.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::GateError;

/// Secret material produced by a [`SecretSource`].
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// Decoded key bytes.
    pub secret: Vec<u8>,
    /// Algorithm hint (`"sha256"` or `"sha512"`), unvalidated.
    pub algorithm: Option<String>,
}

impl std::fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecret")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Provider of the HMAC secret.
pub trait SecretSource: Send + Sync {
    /// Load the secret. Must not have side effects.
    fn resolve(&self) -> Result<ResolvedSecret, GateError>;
}

/// On-disk document shape.
#[derive(Debug, Deserialize)]
struct SecretDocument {
    secret: String,
    #[serde(default)]
    algo: Option<String>,
}

impl SecretDocument {
    fn into_resolved(self, origin: &str) -> Result<ResolvedSecret, GateError> {
        let secret = decode_hex_secret(&self.secret, origin)?;
        Ok(ResolvedSecret {
            secret,
            algorithm: self.algo,
        })
    }
}

fn decode_hex_secret(value: &str, origin: &str) -> Result<Vec<u8>, GateError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(GateError::Secret {
            message: format!("Secret from {} is empty", origin),
        });
    }
    hex::decode(value).map_err(|e| GateError::Secret {
        message: format!("Secret from {} is not valid hex: {}", origin, e),
    })
}

/// Secret stored in a JSON (or `.toml`) file: `{"secret": "<hex>", "algo": "sha256"}`.
#[derive(Debug, Clone)]
pub struct FileSecretSource {
    path: PathBuf,
}

impl FileSecretSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Refuse secret files that group or others can access.
    #[cfg(unix)]
    fn check_permissions(&self, metadata: &std::fs::Metadata) -> Result<(), GateError> {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(GateError::Secret {
                message: format!(
                    "Secret file {} has insecure permissions {:04o}, expected 0600 or 0400",
                    self.path.display(),
                    mode & 0o777
                ),
            });
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(&self, _metadata: &std::fs::Metadata) -> Result<(), GateError> {
        Ok(())
    }
}

impl SecretSource for FileSecretSource {
    fn resolve(&self) -> Result<ResolvedSecret, GateError> {
        let origin = self.path.display().to_string();

        let metadata = std::fs::metadata(&self.path).map_err(|e| GateError::Secret {
            message: format!("Failed to read secret metadata from {}: {}", origin, e),
        })?;
        self.check_permissions(&metadata)?;

        let content = std::fs::read_to_string(&self.path).map_err(|e| GateError::Secret {
            message: format!("Failed to read secret from {}: {}", origin, e),
        })?;

        let is_toml = self
            .path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        let document: SecretDocument = if is_toml {
            toml::from_str(&content).map_err(|e| GateError::Secret {
                message: format!("Secret file {} has unexpected shape: {}", origin, e),
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| GateError::Secret {
                message: format!("Secret file {} has unexpected shape: {}", origin, e),
            })?
        };

        document.into_resolved(&origin)
    }
}

/// Secret read from environment variables `{PREFIX}_SECRET` and `{PREFIX}_ALGO`.
#[derive(Debug, Clone)]
pub struct EnvSecretSource {
    prefix: String,
}

impl EnvSecretSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for EnvSecretSource {
    fn default() -> Self {
        Self::new("HOOKGATE")
    }
}

impl SecretSource for EnvSecretSource {
    fn resolve(&self) -> Result<ResolvedSecret, GateError> {
        let secret_var = format!("{}_SECRET", self.prefix);
        let value = std::env::var(&secret_var).map_err(|e| GateError::Secret {
            message: format!("Environment variable {} unavailable: {}", secret_var, e),
        })?;
        let secret = decode_hex_secret(&value, &secret_var)?;
        let algorithm = std::env::var(format!("{}_ALGO", self.prefix)).ok();
        Ok(ResolvedSecret { secret, algorithm })
    }
}

/// Secret held in memory, for embedding and tests.
#[derive(Debug, Clone)]
pub struct StaticSecretSource {
    resolved: ResolvedSecret,
}

impl StaticSecretSource {
    pub fn new(secret: impl Into<Vec<u8>>, algorithm: Option<&str>) -> Self {
        Self {
            resolved: ResolvedSecret {
                secret: secret.into(),
                algorithm: algorithm.map(str::to_string),
            },
        }
    }

    /// Build from a hex string, validating it like the file source does.
    pub fn from_hex(secret_hex: &str, algorithm: Option<&str>) -> Result<Self, GateError> {
        let secret = decode_hex_secret(secret_hex, "static source")?;
        Ok(Self::new(secret, algorithm))
    }
}

impl SecretSource for StaticSecretSource {
    fn resolve(&self) -> Result<ResolvedSecret, GateError> {
        if self.resolved.secret.is_empty() {
            return Err(GateError::Secret {
                message: "Static secret is empty".to_string(),
            });
        }
        Ok(self.resolved.clone())
    }
}
