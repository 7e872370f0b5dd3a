//! Error types for the webhook gate.

use thiserror::Error;

/// Main error type for the gate.
#[derive(Error, Debug)]
pub enum GateError {
    /// Configuration-related errors. Always fatal at startup.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Secret source errors.
    #[error("Secret error: {message}")]
    Secret { message: String },

    /// Authorization denials.
    #[error("Authentication error: {kind}")]
    Auth { kind: AuthErrorKind },

    /// Nonce ledger storage faults.
    #[error("Nonce ledger error: {message}")]
    Ledger { message: String },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GateError {
    /// Shorthand for a denial with the given reason.
    pub fn denied(kind: AuthErrorKind) -> Self {
        Self::Auth { kind }
    }

    /// The denial reason, if this error is a denial.
    pub fn auth_kind(&self) -> Option<&AuthErrorKind> {
        match self {
            Self::Auth { kind } => Some(kind),
            _ => None,
        }
    }
}

impl From<AuthErrorKind> for GateError {
    fn from(kind: AuthErrorKind) -> Self {
        Self::Auth { kind }
    }
}

/// Reasons an authorization attempt is denied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorKind {
    #[error("Webhook authentication is disabled")]
    Disabled,

    #[error("Webhook authentication is not configured: {message}")]
    NotConfigured { message: String },

    #[error("Source address {address} is not allowed")]
    SourceNotAllowed { address: String },

    #[error("Missing required headers: {}", .headers.join(", "))]
    MissingHeaders { headers: Vec<String> },

    #[error("Malformed signature: expected {expected_len} hex characters")]
    MalformedSignature { expected_len: usize },

    #[error("Timestamp {timestamp} outside the freshness window")]
    TimestampOutOfWindow { timestamp: i64 },

    #[error("Nonce rejected (reused or ledger unavailable)")]
    NonceRejected,

    #[error("Invalid signature")]
    InvalidSignature,
}

impl AuthErrorKind {
    /// Stable machine-readable code for telemetry and audit records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Disabled => "DISABLED",
            Self::NotConfigured { .. } => "NOT_CONFIGURED",
            Self::SourceNotAllowed { .. } => "SOURCE_NOT_ALLOWED",
            Self::MissingHeaders { .. } => "MISSING_HEADERS",
            Self::MalformedSignature { .. } => "MALFORMED_SIGNATURE",
            Self::TimestampOutOfWindow { .. } => "TIMESTAMP_OUT_OF_WINDOW",
            Self::NonceRejected => "NONCE_REJECTED",
            Self::InvalidSignature => "INVALID_SIGNATURE",
        }
    }
}
