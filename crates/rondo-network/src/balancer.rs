//! Round-robin dispatch over live upstreams

use axum::body::Body;
use axum::http::{Request, Response};
use rondo_core::{RondoError, RondoResult};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::upstream::Upstream;

/// Selects the next live upstream and forwards requests to it
pub struct Dispatcher {
    /// Upstreams and cursor share one lock
    rotation: Mutex<Rotation>,
}

struct Rotation {
    /// Fixed after construction, never empty
    targets: Vec<Arc<dyn Upstream>>,
    /// Only meaningful modulo `targets.len()`
    cursor: usize,
}

impl Dispatcher {
    /// Create a dispatcher over a non-empty, ordered set of upstreams
    pub fn new(targets: Vec<Arc<dyn Upstream>>) -> RondoResult<Self> {
        if targets.is_empty() {
            return Err(RondoError::EmptyPool);
        }

        Ok(Self {
            rotation: Mutex::new(Rotation { targets, cursor: 0 }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Rotation> {
        self.rotation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of configured upstreams, live or not
    pub fn len(&self) -> usize {
        self.lock().targets.len()
    }

    /// Always false; construction rejects an empty pool
    pub fn is_empty(&self) -> bool {
        self.lock().targets.is_empty()
    }

    /// Addresses in rotation order
    pub fn addresses(&self) -> Vec<String> {
        self.lock()
            .targets
            .iter()
            .map(|t| t.address().to_string())
            .collect()
    }

    /// Pick the next live upstream in rotation order.
    ///
    /// Every examined position advances the cursor, including dead ones, and
    /// each position is examined at most once per call.
    pub fn select_next(&self) -> RondoResult<Arc<dyn Upstream>> {
        let mut rotation = self.lock();
        let len = rotation.targets.len();

        for _ in 0..len {
            let index = rotation.cursor % len;
            rotation.cursor = rotation.cursor.wrapping_add(1);

            let target = &rotation.targets[index];
            if target.is_live() {
                debug!(
                    address = %target.address(),
                    selected_index = index,
                    total_upstreams = len,
                    "Selected upstream"
                );
                return Ok(Arc::clone(target));
            }

            debug!(address = %target.address(), "Skipping dead upstream");
        }

        Err(RondoError::NoAvailableTarget)
    }

    /// Forward a request to the next live upstream.
    ///
    /// Returns [`RondoError::ServiceUnavailable`] without contacting any
    /// upstream when none is live; forwarding errors pass through untouched.
    pub async fn dispatch(&self, request: Request<Body>) -> RondoResult<Response<Body>> {
        let target = match self.select_next() {
            Ok(target) => target,
            Err(_) => {
                warn!("No available upstream to handle the request");
                return Err(RondoError::ServiceUnavailable);
            }
        };

        debug!(address = %target.address(), "Forwarding request");
        target.forward(request).await
    }

    #[cfg(test)]
    fn cursor(&self) -> usize {
        self.lock().cursor
    }

    #[cfg(test)]
    fn set_cursor(&self, cursor: usize) {
        self.lock().cursor = cursor;
    }
}
