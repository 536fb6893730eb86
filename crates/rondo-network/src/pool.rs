//! Upstream pool initialization
//!
//! Targets and their health monitors are created together: every target that
//! survives address parsing gets exactly one monitor task, spawned before the
//! target joins the pool.

use rondo_core::{parse_upstream, RondoError, RondoResult};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::balancer::Dispatcher;
use crate::health::{HealthMonitor, HealthSettings, Prober};
use crate::proxy::ReverseProxy;
use crate::upstream::{Upstream, UpstreamTarget};

/// Initialized upstream targets and their running monitors
pub struct Upstreams {
    targets: Vec<Arc<UpstreamTarget>>,
    monitors: MonitorHandles,
}

/// Join handles for the health monitor tasks
#[derive(Default)]
pub struct MonitorHandles {
    handles: Vec<JoinHandle<()>>,
}

/// Build targets for `addresses` in order and start their health monitors.
///
/// Addresses that fail to parse are logged and dropped. Monitors stop when
/// `cancel` is cancelled.
pub fn initialize_upstreams(
    addresses: &[String],
    settings: HealthSettings,
    prober: Arc<dyn Prober>,
    client: reqwest::Client,
    cancel: &CancellationToken,
) -> Upstreams {
    let mut targets = Vec::with_capacity(addresses.len());
    let mut handles = Vec::with_capacity(addresses.len());

    for address in addresses {
        let url = match parse_upstream(address) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Dropping upstream");
                continue;
            }
        };

        let forwarder = Arc::new(ReverseProxy::new(client.clone(), url.clone()));
        let target = Arc::new(UpstreamTarget::new(url, forwarder));
        let monitor = HealthMonitor::new(Arc::clone(&target), Arc::clone(&prober), settings);
        handles.push(monitor.spawn(cancel.clone()));

        info!(address = %target.address(), "Registered upstream");
        targets.push(target);
    }

    Upstreams {
        targets,
        monitors: MonitorHandles { handles },
    }
}

impl Upstreams {
    /// Targets in configuration order
    pub fn targets(&self) -> &[Arc<UpstreamTarget>] {
        &self.targets
    }

    /// Hand the targets to a dispatcher, keeping the monitor handles.
    ///
    /// Fails with [`RondoError::EmptyPool`] when no address was usable.
    pub fn into_dispatcher(self) -> RondoResult<(Dispatcher, MonitorHandles)> {
        if self.targets.is_empty() {
            return Err(RondoError::EmptyPool);
        }

        let targets = self
            .targets
            .into_iter()
            .map(|target| target as Arc<dyn Upstream>)
            .collect();

        Ok((Dispatcher::new(targets)?, self.monitors))
    }
}

impl MonitorHandles {
    /// Number of monitor tasks
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every monitor task to exit
    pub async fn join(self) {
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Health monitor task failed");
            }
        }
    }
}
