//! Canonical signing string construction.
//!
//! Both the gate and any client computing a signature must derive a
//! byte-identical string from the same inputs.
//!
//! ## Formats
//!
//! Simple mode:
//! ```text
//! {timestamp}.{nonce}.{raw body}
//! ```
//!
//! Context-bound mode (six `\n`-joined fields, no trailing separator):
//! ```text
//! {timestamp}
//! {nonce}
//! {METHOD}
//! {path}
//! {query}
//! {hex(sha256(body))}
//! ```

use ring::digest;

/// How the request is serialized before signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalMode {
    /// Timestamp, nonce and body only.
    Simple,
    /// Additionally binds the method, path and query string.
    ContextBound,
}

impl CanonicalMode {
    /// Mode selected by the `bind_context` option.
    pub fn from_bind_context(bind_context: bool) -> Self {
        if bind_context {
            Self::ContextBound
        } else {
            Self::Simple
        }
    }
}

/// Build the canonical byte string for a request.
///
/// `method` and `target` are only read in [`CanonicalMode::ContextBound`].
pub fn build(
    mode: CanonicalMode,
    timestamp: i64,
    nonce: &str,
    body: &[u8],
    method: &str,
    target: &str,
) -> Vec<u8> {
    match mode {
        CanonicalMode::Simple => {
            let prefix = format!("{}.{}.", timestamp, nonce);
            let mut out = Vec::with_capacity(prefix.len() + body.len());
            out.extend_from_slice(prefix.as_bytes());
            out.extend_from_slice(body);
            out
        }
        CanonicalMode::ContextBound => {
            let (path, query) = split_target(target);
            format!(
                "{}\n{}\n{}\n{}\n{}\n{}",
                timestamp,
                nonce,
                method.to_ascii_uppercase(),
                path,
                query,
                body_digest_hex(body)
            )
            .into_bytes()
        }
    }
}

/// Split a request target into a normalized path and the raw query string.
///
/// The path always starts with `/`; an empty path becomes `/`. The query has
/// no leading `?` and is empty when absent.
pub fn split_target(target: &str) -> (String, String) {
    let (raw_path, raw_query) = match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    };

    let path = raw_path.trim();
    let path = if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    (path, raw_query.trim().to_string())
}

/// Lowercase hex SHA-256 digest of the body.
pub fn body_digest_hex(body: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, body).as_ref())
}
