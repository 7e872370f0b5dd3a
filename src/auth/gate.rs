//! The webhook authorization pipeline.
//!
//! Checks run in a fixed order and the first failure is terminal:
//!
//! 1. gate enabled and configured
//! 2. source address allow-list (when non-empty)
//! 3. signature, timestamp and nonce headers present
//! 4. signature has the hex shape of the configured algorithm
//! 5. timestamp inside the freshness window
//! 6. nonce not seen before (ledger check-and-store)
//! 7. HMAC over the canonical string matches

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::FutureExt;
use ring::hmac;
use tracing::{debug, warn};

use super::{canonical, signature, NonceLedger};
use crate::config::Policy;
use crate::error::{AuthErrorKind, GateError};
use crate::protocol::RequestContext;

/// Outcome of one authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Authorized,
    Denied(AuthErrorKind),
}

impl Verdict {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized)
    }
}

/// Result of [`WebhookGate::guard`]: never an error, always a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardOutcome {
    pub allowed: bool,
    /// Why the request was refused. `None` when allowed.
    pub reason: Option<String>,
}

impl GuardOutcome {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Inbound webhook gate.
///
/// Holds no per-request state; one instance can serve concurrent requests.
pub struct WebhookGate {
    policy: Arc<Policy>,
    key: hmac::Key,
    ledger: Arc<dyn NonceLedger>,
}

impl WebhookGate {
    /// Create a gate from a configured policy and a nonce ledger.
    pub fn new(policy: impl Into<Arc<Policy>>, ledger: Arc<dyn NonceLedger>) -> Self {
        let policy = policy.into();
        let key = signature::signing_key(policy.algorithm(), policy.secret());
        Self {
            policy,
            key,
            ledger,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Authorize a request against the current system time.
    pub async fn assert_authorized(&self, ctx: &RequestContext) -> Result<(), GateError> {
        self.assert_authorized_at(ctx, unix_now()).await
    }

    /// Authorize a request as if the current time were `now` (UNIX seconds).
    pub async fn assert_authorized_at(
        &self,
        ctx: &RequestContext,
        now: i64,
    ) -> Result<(), GateError> {
        match self.run_checks(ctx, now).await {
            Ok(()) => {
                debug!(client = %ctx.client_address, "Webhook request authorized");
                Ok(())
            }
            Err(kind) => {
                warn!(
                    client = %ctx.client_address,
                    code = kind.code(),
                    reason = %kind,
                    "Webhook request denied"
                );
                Err(GateError::denied(kind))
            }
        }
    }

    /// Authorize and return a [`Verdict`] instead of an error.
    pub async fn verdict(&self, ctx: &RequestContext) -> Verdict {
        self.verdict_at(ctx, unix_now()).await
    }

    pub async fn verdict_at(&self, ctx: &RequestContext, now: i64) -> Verdict {
        match self.run_checks(ctx, now).await {
            Ok(()) => Verdict::Authorized,
            Err(kind) => Verdict::Denied(kind),
        }
    }

    /// Non-failing wrapper around [`WebhookGate::assert_authorized`].
    ///
    /// Every failure, including a panic inside the nonce ledger, becomes
    /// `allowed = false` with a reason.
    pub async fn guard(&self, ctx: &RequestContext) -> GuardOutcome {
        self.guard_at(ctx, unix_now()).await
    }

    pub async fn guard_at(&self, ctx: &RequestContext, now: i64) -> GuardOutcome {
        match AssertUnwindSafe(self.assert_authorized_at(ctx, now))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => GuardOutcome::allowed(),
            Ok(Err(e)) => GuardOutcome::denied(e.to_string()),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(client = %ctx.client_address, error = %message, "Webhook gate fault");
                GuardOutcome::denied(format!("Internal error: {}", message))
            }
        }
    }

    async fn run_checks(&self, ctx: &RequestContext, now: i64) -> Result<(), AuthErrorKind> {
        let policy = &*self.policy;

        // 1. Enabled and configured
        if !policy.enabled() {
            return Err(AuthErrorKind::Disabled);
        }
        if policy.secret().is_empty() {
            return Err(AuthErrorKind::NotConfigured {
                message: "HMAC secret is not set".to_string(),
            });
        }
        if policy.nonce_dir().is_none() {
            return Err(AuthErrorKind::NotConfigured {
                message: "nonce ledger location is not set".to_string(),
            });
        }

        // 2. Source allow-list
        let sources = policy.allowed_sources();
        if !sources.is_empty() && !super::is_allowed(&ctx.client_address, sources) {
            return Err(AuthErrorKind::SourceNotAllowed {
                address: ctx.client_address.clone(),
            });
        }

        // 3. Header presence
        let names = policy.headers();
        let provided = (
            ctx.header(&names.signature),
            ctx.header(&names.timestamp),
            ctx.header(&names.nonce),
        );
        let (sig, ts_raw, nonce) = match provided {
            (Some(sig), Some(ts), Some(nonce)) => (sig, ts, nonce),
            (sig, ts, nonce) => {
                let headers = [
                    (sig, &names.signature),
                    (ts, &names.timestamp),
                    (nonce, &names.nonce),
                ]
                .into_iter()
                .filter(|(value, _)| value.is_none())
                .map(|(_, name)| name.clone())
                .collect();
                return Err(AuthErrorKind::MissingHeaders { headers });
            }
        };

        // 4. Signature shape
        let algorithm = policy.algorithm();
        if !signature::is_well_formed(sig, algorithm) {
            return Err(AuthErrorKind::MalformedSignature {
                expected_len: algorithm.hex_len(),
            });
        }

        // 5. Timestamp window (both bounds inclusive)
        let ts = self.check_timestamp(ts_raw, now)?;

        // 6. Nonce uniqueness
        match self
            .ledger
            .check_and_store(nonce, self.nonce_retention())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(client = %ctx.client_address, "Nonce already recorded");
                return Err(AuthErrorKind::NonceRejected);
            }
            Err(e) => {
                warn!(error = %e, "Nonce ledger failure");
                return Err(AuthErrorKind::NonceRejected);
            }
        }

        // 7. Signature verification
        let message = canonical::build(
            policy.canonical_mode(),
            ts,
            nonce,
            &ctx.body,
            &ctx.method,
            &ctx.target,
        );
        if !signature::verify(&self.key, &message, sig) {
            return Err(AuthErrorKind::InvalidSignature);
        }

        Ok(())
    }

    fn check_timestamp(&self, raw: &str, now: i64) -> Result<i64, AuthErrorKind> {
        let ts = raw.parse::<i64>().unwrap_or(0);
        if ts <= 0 {
            return Err(AuthErrorKind::TimestampOutOfWindow { timestamp: ts });
        }

        let ttl = i128::from(self.policy.ttl_seconds());
        let skew = i128::from(self.policy.clock_skew_seconds());
        let age = i128::from(now) - i128::from(ts);

        if age > ttl + skew || -age > skew {
            return Err(AuthErrorKind::TimestampOutOfWindow { timestamp: ts });
        }

        Ok(ts)
    }

    /// How long a nonce must stay recorded.
    ///
    /// A timestamp is accepted from `skew` seconds in the future until
    /// `ttl + skew` seconds in the past, so the record must outlive that
    /// whole span.
    fn nonce_retention(&self) -> Duration {
        let ttl = self.policy.ttl_seconds();
        let skew = self.policy.clock_skew_seconds();
        Duration::from_secs(ttl.saturating_add(skew.saturating_mul(2)))
    }
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Algorithm, CanonicalMode, MemoryNonceLedger, Signer};
    use crate::config::HeaderNames;
    use async_trait::async_trait;
    use std::path::PathBuf;

    const NOW: i64 = 1_700_000_000;
    const SECRET: &[u8] = b"test-secret-key-32-bytes-long!!";

    fn policy() -> Policy {
        Policy {
            enabled: true,
            secret: SECRET.to_vec(),
            algorithm: Algorithm::Sha256,
            ttl_seconds: 300,
            clock_skew_seconds: 60,
            allowed_sources: Vec::new(),
            bind_context: false,
            headers: HeaderNames::default(),
            nonce_dir: Some(PathBuf::from("/tmp/hookgate-test")),
        }
    }

    fn gate_with(policy: Policy) -> WebhookGate {
        WebhookGate::new(policy, Arc::new(MemoryNonceLedger::new()))
    }

    fn signed_request(policy: &Policy, ts: i64, nonce: &str, body: &[u8]) -> RequestContext {
        let signer = Signer::from_policy(policy);
        let signed = signer.sign(ts, nonce, body, "POST", "/hooks/deploy?env=prod");
        RequestContext::new("10.0.0.5")
            .with_headers(signer.header_pairs(&signed))
            .with_body(body.to_vec())
            .with_method("POST")
            .with_target("/hooks/deploy?env=prod")
    }

    fn denial(result: Result<(), GateError>) -> AuthErrorKind {
        match result {
            Err(GateError::Auth { kind }) => kind,
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_valid_request() {
        let gate = gate_with(policy());
        let ctx = signed_request(gate.policy(), NOW - 5, "n-valid", b"{}");
        assert!(gate.assert_authorized_at(&ctx, NOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled() {
        let gate = gate_with(Policy::disabled());
        let ctx = signed_request(&policy(), NOW, "n", b"");
        assert_eq!(
            denial(gate.assert_authorized_at(&ctx, NOW).await),
            AuthErrorKind::Disabled
        );
    }

    #[tokio::test]
    async fn test_not_configured() {
        let mut p = policy();
        p.secret.clear();
        let gate = gate_with(p);
        let ctx = RequestContext::new("10.0.0.5");
        assert!(matches!(
            denial(gate.assert_authorized_at(&ctx, NOW).await),
            AuthErrorKind::NotConfigured { .. }
        ));

        let mut p = policy();
        p.nonce_dir = None;
        let gate = gate_with(p);
        assert!(matches!(
            denial(gate.assert_authorized_at(&ctx, NOW).await),
            AuthErrorKind::NotConfigured { .. }
        ));
    }

    #[tokio::test]
    async fn test_source_allow_list() {
        let mut p = policy();
        p.allowed_sources = vec!["10.0.1.0/24".to_string()];
        let gate = gate_with(p.clone());
        let ctx = signed_request(&p, NOW, "n-src", b"");
        assert_eq!(
            denial(gate.assert_authorized_at(&ctx, NOW).await),
            AuthErrorKind::SourceNotAllowed {
                address: "10.0.0.5".to_string()
            }
        );

        p.allowed_sources = vec!["not-an-ip/99".to_string(), "10.0.0.0/24".to_string()];
        let gate = gate_with(p.clone());
        assert!(gate.assert_authorized_at(&ctx, NOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_allow_list_is_unrestricted() {
        let gate = gate_with(policy());
        let mut ctx = signed_request(gate.policy(), NOW, "n-any", b"");
        ctx.client_address = "203.0.113.99".to_string();
        assert!(gate.assert_authorized_at(&ctx, NOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_headers() {
        let gate = gate_with(policy());
        let ctx = RequestContext::new("10.0.0.5").with_header("X-Nonce", "abc");
        assert_eq!(
            denial(gate.assert_authorized_at(&ctx, NOW).await),
            AuthErrorKind::MissingHeaders {
                headers: vec!["X-Signature".to_string(), "X-Timestamp".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_case_variant_duplicate_header_denied() {
        let gate = gate_with(policy());
        let mut ctx = signed_request(gate.policy(), NOW, "n-dup", b"")
            .with_header("x-nonce", "n-dup")
            .with_header("X-NONCE", "other");
        ctx.headers.remove("X-Nonce");
        assert_eq!(
            denial(gate.assert_authorized_at(&ctx, NOW).await),
            AuthErrorKind::MissingHeaders {
                headers: vec!["X-Nonce".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_extreme_ttl_and_skew() {
        let mut p = policy();
        p.ttl_seconds = i64::MAX as u64;
        p.clock_skew_seconds = i64::MAX as u64;
        let gate = gate_with(p);
        let ctx = signed_request(gate.policy(), NOW - 86_400, "n-huge", b"{}");
        assert!(gate.assert_authorized_at(&ctx, NOW).await.is_ok());
        assert_eq!(
            denial(gate.assert_authorized_at(&ctx, NOW).await),
            AuthErrorKind::NonceRejected
        );
    }

    #[tokio::test]
    async fn test_malformed_signature() {
        let gate = gate_with(policy());
        let mut ctx = signed_request(gate.policy(), NOW, "n-mal", b"");
        ctx.headers
            .insert("X-Signature".to_string(), "zz".repeat(32));
        assert_eq!(
            denial(gate.assert_authorized_at(&ctx, NOW).await),
            AuthErrorKind::MalformedSignature { expected_len: 64 }
        );

        ctx.headers.insert("X-Signature".to_string(), "ab".repeat(64));
        assert_eq!(
            denial(gate.assert_authorized_at(&ctx, NOW).await),
            AuthErrorKind::MalformedSignature { expected_len: 64 }
        );
    }

    #[tokio::test]
    async fn test_sha512_expects_128_chars() {
        let mut p = policy();
        p.algorithm = Algorithm::Sha512;
        let gate = gate_with(p.clone());
        let ctx = signed_request(&p, NOW, "n-512", b"payload");
        assert_eq!(ctx.header("X-Signature").map(str::len), Some(128));
        assert!(gate.assert_authorized_at(&ctx, NOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_timestamp_boundaries() {
        let gate = gate_with(policy());
        let limit = 300 + 60;

        let ctx = signed_request(gate.policy(), NOW - limit, "n-old-edge", b"");
        assert!(gate.assert_authorized_at(&ctx, NOW).await.is_ok());

        let ctx = signed_request(gate.policy(), NOW - limit - 1, "n-old-over", b"");
        assert!(matches!(
            denial(gate.assert_authorized_at(&ctx, NOW).await),
            AuthErrorKind::TimestampOutOfWindow { .. }
        ));

        let ctx = signed_request(gate.policy(), NOW + 60, "n-future-edge", b"");
        assert!(gate.assert_authorized_at(&ctx, NOW).await.is_ok());

        let ctx = signed_request(gate.policy(), NOW + 61, "n-future-over", b"");
        assert!(matches!(
            denial(gate.assert_authorized_at(&ctx, NOW).await),
            AuthErrorKind::TimestampOutOfWindow { .. }
        ));
    }

    #[tokio::test]
    async fn test_timestamp_not_positive_or_garbage() {
        let gate = gate_with(policy());
        for raw in ["0", "-5", "abc", "1.5"] {
            let mut ctx = signed_request(gate.policy(), NOW, "n-ts", b"");
            ctx.headers.insert("X-Timestamp".to_string(), raw.to_string());
            assert!(matches!(
                denial(gate.assert_authorized_at(&ctx, NOW).await),
                AuthErrorKind::TimestampOutOfWindow { .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_replay_rejected_even_when_signature_valid() {
        let gate = gate_with(policy());
        let ctx = signed_request(gate.policy(), NOW, "n-replay", b"{}");
        assert!(gate.assert_authorized_at(&ctx, NOW).await.is_ok());
        assert_eq!(
            denial(gate.assert_authorized_at(&ctx, NOW).await),
            AuthErrorKind::NonceRejected
        );
    }

    #[tokio::test]
    async fn test_invalid_signature() {
        let gate = gate_with(policy());
        let mut ctx = signed_request(gate.policy(), NOW, "n-tamper", b"{\"amount\":1}");
        ctx.body = b"{\"amount\":1000}".to_vec();
        assert_eq!(
            denial(gate.assert_authorized_at(&ctx, NOW).await),
            AuthErrorKind::InvalidSignature
        );
    }

    #[tokio::test]
    async fn test_uppercase_signature_accepted() {
        let gate = gate_with(policy());
        let mut ctx = signed_request(gate.policy(), NOW, "n-upper", b"x");
        let upper = ctx.header("X-Signature").unwrap().to_ascii_uppercase();
        ctx.headers.insert("X-Signature".to_string(), upper);
        assert!(gate.assert_authorized_at(&ctx, NOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_context_binding() {
        let mut p = policy();
        p.bind_context = true;
        let gate = gate_with(p.clone());

        let ctx = signed_request(&p, NOW, "n-ctx-1", b"{}");
        assert!(gate.assert_authorized_at(&ctx, NOW).await.is_ok());

        let mut moved = signed_request(&p, NOW, "n-ctx-2", b"{}");
        moved.target = "/hooks/deploy?env=staging".to_string();
        assert_eq!(
            denial(gate.assert_authorized_at(&moved, NOW).await),
            AuthErrorKind::InvalidSignature
        );

        // Simple-mode signatures do not verify in context-bound mode.
        let simple = Signer::new(SECRET, Algorithm::Sha256, CanonicalMode::Simple);
        let signed = simple.sign(NOW, "n-ctx-3", b"{}", "POST", "/hooks/deploy?env=prod");
        let ctx = RequestContext::new("10.0.0.5")
            .with_headers(simple.header_pairs(&signed))
            .with_body(b"{}".to_vec())
            .with_method("POST")
            .with_target("/hooks/deploy?env=prod");
        assert_eq!(
            denial(gate.assert_authorized_at(&ctx, NOW).await),
            AuthErrorKind::InvalidSignature
        );
    }

    #[tokio::test]
    async fn test_custom_header_names() {
        let mut p = policy();
        p.headers = HeaderNames {
            signature: "HTTP_X_HOOK_SIGNATURE".to_string(),
            timestamp: "HTTP_X_HOOK_TIMESTAMP".to_string(),
            nonce: "HTTP_X_HOOK_NONCE".to_string(),
        };
        let gate = gate_with(p.clone());
        let ctx = signed_request(&p, NOW, "n-custom", b"");
        assert!(ctx.headers.contains_key("HTTP_X_HOOK_NONCE"));
        assert!(gate.assert_authorized_at(&ctx, NOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_order_source_before_headers() {
        let mut p = policy();
        p.allowed_sources = vec!["192.168.0.1".to_string()];
        let gate = gate_with(p);
        let ctx = RequestContext::new("10.0.0.5");
        assert!(matches!(
            denial(gate.assert_authorized_at(&ctx, NOW).await),
            AuthErrorKind::SourceNotAllowed { .. }
        ));
    }

    #[tokio::test]
    async fn test_stale_request_does_not_consume_nonce() {
        let ledger = Arc::new(MemoryNonceLedger::new());
        let gate = WebhookGate::new(policy(), ledger.clone());
        let ctx = signed_request(gate.policy(), NOW - 10_000, "n-stale", b"");
        assert!(gate.assert_authorized_at(&ctx, NOW).await.is_err());
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_nonce_retention_covers_full_window() {
        let gate = gate_with(policy());
        assert_eq!(gate.nonce_retention(), Duration::from_secs(300 + 120));
    }

    struct FailingLedger;

    #[async_trait]
    impl NonceLedger for FailingLedger {
        async fn check_and_store(&self, _nonce: &str, _ttl: Duration) -> Result<bool, GateError> {
            Err(GateError::Ledger {
                message: "disk full".to_string(),
            })
        }
    }

    struct PanickingLedger;

    #[async_trait]
    impl NonceLedger for PanickingLedger {
        async fn check_and_store(&self, _nonce: &str, _ttl: Duration) -> Result<bool, GateError> {
            panic!("ledger exploded");
        }
    }

    #[tokio::test]
    async fn test_ledger_failure_rejects_nonce() {
        let gate = WebhookGate::new(policy(), Arc::new(FailingLedger));
        let ctx = signed_request(gate.policy(), NOW, "n-fail", b"");
        assert_eq!(
            denial(gate.assert_authorized_at(&ctx, NOW).await),
            AuthErrorKind::NonceRejected
        );
    }

    #[tokio::test]
    async fn test_guard_reports_reason() {
        let gate = gate_with(policy());
        let ctx = signed_request(gate.policy(), NOW, "n-guard", b"");

        let outcome = gate.guard_at(&ctx, NOW).await;
        assert_eq!(
            outcome,
            GuardOutcome {
                allowed: true,
                reason: None
            }
        );

        let outcome = gate.guard_at(&ctx, NOW).await;
        assert!(!outcome.allowed);
        assert!(outcome.reason.unwrap().contains("Nonce rejected"));
    }

    #[tokio::test]
    async fn test_guard_absorbs_panics() {
        let gate = WebhookGate::new(policy(), Arc::new(PanickingLedger));
        let ctx = signed_request(gate.policy(), NOW, "n-panic", b"");
        let outcome = gate.guard_at(&ctx, NOW).await;
        assert!(!outcome.allowed);
        assert_eq!(
            outcome.reason.as_deref(),
            Some("Internal error: ledger exploded")
        );
    }

    #[tokio::test]
    async fn test_verdict() {
        let gate = gate_with(policy());
        let ctx = signed_request(gate.policy(), NOW, "n-verdict", b"");
        assert!(gate.verdict_at(&ctx, NOW).await.is_authorized());
        assert_eq!(
            gate.verdict_at(&ctx, NOW).await,
            Verdict::Denied(AuthErrorKind::NonceRejected)
        );
    }
}
