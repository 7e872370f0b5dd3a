//! Per-call request context.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata and raw body of one inbound request.
///
/// Created per call and discarded afterwards; the gate never stores it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Remote address as reported by the transport.
    pub client_address: String,
    /// Header map keyed the way the transport keys it.
    pub headers: HashMap<String, String>,
    /// Raw request body.
    pub body: Vec<u8>,
    /// HTTP method (only used in context-bound mode).
    pub method: String,
    /// Path plus optional query string (only used in context-bound mode).
    pub target: String,
}

impl RequestContext {
    pub fn new(client_address: impl Into<String>) -> Self {
        Self {
            client_address: client_address.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Look up a header by key.
    ///
    /// Exact key match wins; otherwise a single ASCII case-insensitive match
    /// is used. Several keys differing only in case (`x-nonce` and `X-NONCE`)
    /// are ambiguous and count as absent, so the gate denies with
    /// `MissingHeaders` instead of picking one by map order. Values are
    /// trimmed and empty values count as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        let value = match self.headers.get(name) {
            Some(value) => value,
            None => {
                let mut matches = self
                    .headers
                    .iter()
                    .filter(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value);
                let first = matches.next()?;
                if matches.next().is_some() {
                    return None;
                }
                first
            }
        };

        let value = value.trim();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

/// Serializable description of a request, as read by the command line tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestDocument {
    pub client_address: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Body as UTF-8 text.
    #[serde(default)]
    pub body: String,
}

impl From<RequestDocument> for RequestContext {
    fn from(doc: RequestDocument) -> Self {
        Self {
            client_address: doc.client_address,
            headers: doc.headers,
            body: doc.body.into_bytes(),
            method: doc.method,
            target: doc.target,
        }
    }
}
