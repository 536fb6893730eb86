//! rondo-network: Upstream selection and health checking
//!
//! This crate provides the request path and the liveness tracking behind it:
//! - Upstream targets and the reverse-proxy forwarding delegate
//! - Active health checking, one monitor task per upstream
//! - Round-robin dispatch over live upstreams
//! - Pool initialization tying targets to their monitors

pub mod balancer;
pub mod health;
pub mod pool;
pub mod proxy;
pub mod upstream;

pub use balancer::Dispatcher;
pub use health::{HealthMonitor, HealthSettings, HttpProber, Prober};
pub use pool::{initialize_upstreams, MonitorHandles, Upstreams};
pub use proxy::{Forwarder, ReverseProxy};
pub use upstream::{Upstream, UpstreamTarget};
