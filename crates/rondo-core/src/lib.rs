//! rondo-core: Core types for the rondo load balancer
//!
//! This crate provides the fundamental types shared by the other crates:
//! - Proxy configuration (listener, upstreams, health checks, logging)
//! - Error handling
//! - Upstream address parsing

pub mod config;
pub mod error;
pub mod upstream;

pub use config::*;
pub use error::*;
pub use upstream::*;
