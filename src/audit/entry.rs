//! Audit entry types.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::GateError;
use crate::protocol::RequestContext;

/// A single audit log entry.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// RFC 3339 timestamp of the decision.
    pub timestamp: String,
    /// Unique identifier for the request.
    pub request_id: Uuid,
    pub client_address: String,
    pub method: String,
    pub target: String,
    pub result: AuditResult,
    /// Time spent in the gate, in milliseconds.
    pub duration_ms: u64,
}

impl AuditEntry {
    /// Build an entry from the outcome of
    /// [`WebhookGate::assert_authorized`](crate::auth::WebhookGate::assert_authorized).
    pub fn from_outcome(
        request_id: Uuid,
        ctx: &RequestContext,
        outcome: &Result<(), GateError>,
        duration_ms: u64,
    ) -> Self {
        let result = match outcome {
            Ok(()) => AuditResult::Authorized,
            Err(GateError::Auth { kind }) => AuditResult::Denied {
                code: kind.code().to_string(),
                message: kind.to_string(),
            },
            Err(other) => AuditResult::Denied {
                code: "INTERNAL_ERROR".to_string(),
                message: other.to_string(),
            },
        };

        Self {
            timestamp: Utc::now().to_rfc3339(),
            request_id,
            client_address: ctx.client_address.clone(),
            method: ctx.method.clone(),
            target: ctx.target.clone(),
            result,
            duration_ms,
        }
    }
}

/// Decision recorded in the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status")]
pub enum AuditResult {
    #[serde(rename = "authorized")]
    Authorized,
    #[serde(rename = "denied")]
    Denied { code: String, message: String },
}
