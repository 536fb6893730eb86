//! Upstream targets

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use rondo_core::RondoResult;
use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

use crate::proxy::Forwarder;

/// A backend the dispatcher can hand requests to
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Base address of the upstream
    fn address(&self) -> &str;

    /// Whether the upstream is currently believed to be healthy
    fn is_live(&self) -> bool;

    /// Forward a request and return the upstream's response
    async fn forward(&self, request: Request<Body>) -> RondoResult<Response<Body>>;
}

/// An upstream server with probe-driven liveness
pub struct UpstreamTarget {
    /// Parsed base address
    url: Url,
    /// Written only by this target's health monitor
    live: Mutex<bool>,
    /// Delegate that relays requests to `url`
    forwarder: Arc<dyn Forwarder>,
}

impl UpstreamTarget {
    /// Create a target that starts out dead until its first probe succeeds
    pub fn new(url: Url, forwarder: Arc<dyn Forwarder>) -> Self {
        Self {
            url,
            live: Mutex::new(false),
            forwarder,
        }
    }

    /// Parsed base address
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Store a new liveness value and return the previous one.
    pub(crate) fn set_live(&self, live: bool) -> bool {
        let mut guard = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, live)
    }
}

#[async_trait]
impl Upstream for UpstreamTarget {
    fn address(&self) -> &str {
        self.url.as_str()
    }

    fn is_live(&self) -> bool {
        *self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn forward(&self, request: Request<Body>) -> RondoResult<Response<Body>> {
        self.forwarder.forward(request).await
    }
}

impl std::fmt::Debug for UpstreamTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamTarget")
            .field("url", &self.url.as_str())
            .field("live", &self.is_live())
            .finish()
    }
}
