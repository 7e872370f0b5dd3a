//! Configuration module for the webhook gate.
//!
//! Loads settings from TOML files and turns the `[gate]` options into a
//! validated, immutable [`Policy`].

mod policy;
mod settings;

pub use policy::*;
pub use settings::*;
