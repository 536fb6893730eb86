//! rondo-api: HTTP entry point for rondo
//!
//! Every inbound request, whatever its path, is handed to the dispatcher:
//! - Upstream responses are relayed unmodified
//! - 503 when no upstream is live, 502 when forwarding fails

pub mod rest;

pub use rest::{create_router, serve};
