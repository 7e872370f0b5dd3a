//! Request material handed to the gate.
//!
//! The transport layer maps whatever it receives (HTTP server request,
//! CGI environment, a JSON description on disk) into a [`RequestContext`].

mod request;

pub use request::{RequestContext, RequestDocument};
