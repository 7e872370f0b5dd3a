//! Authentication module.
//!
//! Handles source allow-listing, timestamp freshness, nonce tracking and
//! HMAC signature verification of inbound webhooks.

mod allowlist;
pub mod canonical;
mod gate;
mod nonce;
mod nonce_file;
mod secret;
mod signature;

pub use allowlist::is_allowed;
pub use canonical::CanonicalMode;
pub use gate::{GuardOutcome, Verdict, WebhookGate};
pub use nonce::{MemoryNonceLedger, NonceLedger};
pub use nonce_file::FileNonceLedger;
pub use secret::{
    EnvSecretSource, FileSecretSource, ResolvedSecret, SecretSource, StaticSecretSource,
};
pub use signature::{Algorithm, SignedHeaders, Signer};
