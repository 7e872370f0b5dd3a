//! hookgate library
//!
//! Authentication gate for inbound webhooks. A request passes only if the
//! gate is enabled, its source address is allowed, it carries signature,
//! timestamp and nonce headers, the timestamp is fresh, the nonce has not
//! been seen before and the HMAC over its canonical form matches.
//!
//! Producing the HTTP response for a denied request is left to the caller.

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod protocol;
