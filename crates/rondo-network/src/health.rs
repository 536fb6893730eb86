//! Active health checking for upstreams
//!
//! Every upstream gets one [`HealthMonitor`] task. Each interval the monitor
//! probes the upstream's base address a bounded number of times and stores the
//! outcome as the upstream's liveness. The monitor is the only writer of that
//! flag. Cancellation is observed between cycles, never during a probe.

use async_trait::async_trait;
use axum::http::StatusCode;
use rondo_core::{HealthCheckConfig, RondoError, RondoResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::upstream::{Upstream, UpstreamTarget};

/// Issues a single health probe against an address
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe `address` and return the response status.
    ///
    /// Transport failures and timeouts are returned as [`RondoError::Probe`].
    async fn probe(&self, address: &Url) -> RondoResult<StatusCode>;
}

/// Prober that sends `GET` requests over HTTP
pub struct HttpProber {
    /// HTTP client for health checks
    client: reqwest::Client,
    /// Per-attempt timeout
    timeout: Duration,
}

impl HttpProber {
    /// Create a new prober with the given per-attempt timeout
    pub fn new(timeout: Duration) -> RondoResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| RondoError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// Get the timeout duration
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, address: &Url) -> RondoResult<StatusCode> {
        self.client
            .get(address.clone())
            .send()
            .await
            .map(|response| response.status())
            .map_err(|e| RondoError::Probe(e.to_string()))
    }
}

/// Timing of the probe loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSettings {
    /// Time between probe cycles
    pub interval: Duration,
    /// Maximum probe attempts per cycle
    pub attempts: u32,
    /// Pause after a failed attempt before the next one
    pub retry_backoff: Duration,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self::from(&HealthCheckConfig::default())
    }
}

impl From<&HealthCheckConfig> for HealthSettings {
    fn from(config: &HealthCheckConfig) -> Self {
        Self {
            interval: config.interval(),
            attempts: config.attempts,
            retry_backoff: config.retry_backoff(),
        }
    }
}

/// Periodic liveness prober for a single upstream
pub struct HealthMonitor {
    target: Arc<UpstreamTarget>,
    prober: Arc<dyn Prober>,
    settings: HealthSettings,
}

impl HealthMonitor {
    pub fn new(
        target: Arc<UpstreamTarget>,
        prober: Arc<dyn Prober>,
        settings: HealthSettings,
    ) -> Self {
        Self {
            target,
            prober,
            settings,
        }
    }

    /// Start the probe loop on the runtime
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Probe every interval until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        let address = self.target.address().to_string();
        debug!(
            address = %address,
            interval = ?self.settings.interval,
            "Health monitor started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(address = %address, "Stopping health checks");
                    return;
                }
                _ = tokio::time::sleep(self.settings.interval) => {}
            }

            let live = self.check().await;
            let was_live = self.target.set_live(live);
            if was_live != live {
                info!(address = %address, live, "Upstream liveness changed");
            }
        }
    }

    /// Run one probe cycle and report whether the upstream is healthy.
    ///
    /// The first attempt that gets any response decides the outcome; only
    /// transport failures are retried.
    pub async fn check(&self) -> bool {
        let address = self.target.url();

        for attempt in 1..=self.settings.attempts {
            match self.prober.probe(address).await {
                Ok(status) => {
                    let healthy = status.is_success();
                    if !healthy {
                        warn!(address = %address, status = %status, "Health check failed");
                    }
                    return healthy;
                }
                Err(e) => {
                    debug!(address = %address, attempt, error = %e, "Health probe error");
                    if attempt < self.settings.attempts {
                        tokio::time::sleep(self.settings.retry_backoff).await;
                    }
                }
            }
        }

        warn!(
            address = %address,
            attempts = self.settings.attempts,
            "Upstream unreachable"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::Forwarder;
    use axum::body::Body;
    use axum::http::{Request, Response};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopForwarder;

    #[async_trait]
    impl Forwarder for NoopForwarder {
        async fn forward(&self, _request: Request<Body>) -> RondoResult<Response<Body>> {
            Ok(Response::new(Body::empty()))
        }
    }

    /// Fails the first `failures` probes, then answers with `status`
    struct ScriptedProber {
        calls: AtomicUsize,
        failures: usize,
        status: StatusCode,
    }

    impl ScriptedProber {
        fn new(failures: usize, status: StatusCode) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures,
                status,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn probe(&self, _address: &Url) -> RondoResult<StatusCode> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(RondoError::Probe("operation timed out".to_string()))
            } else {
                Ok(self.status)
            }
        }
    }

    fn target() -> Arc<UpstreamTarget> {
        Arc::new(UpstreamTarget::new(
            Url::parse("http://127.0.0.1:3000").unwrap(),
            Arc::new(NoopForwarder),
        ))
    }

    fn settings() -> HealthSettings {
        HealthSettings {
            interval: Duration::from_secs(10),
            attempts: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_settings_from_config() {
        let settings = HealthSettings::default();
        assert_eq!(settings, self::settings());
    }

    #[test]
    fn test_http_prober_creation() {
        let prober = HttpProber::new(Duration::from_secs(2)).unwrap();
        assert_eq!(prober.timeout(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_third_attempt() {
        let prober = ScriptedProber::new(2, StatusCode::OK);
        let monitor = HealthMonitor::new(target(), prober.clone(), settings());

        assert!(monitor.check().await);
        assert_eq!(prober.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_probe_caps_attempts() {
        let prober = ScriptedProber::new(usize::MAX, StatusCode::OK);
        let monitor = HealthMonitor::new(target(), prober.clone(), settings());

        let started = tokio::time::Instant::now();
        assert!(!monitor.check().await);
        assert_eq!(prober.calls(), 3);
        // Backoff only sits between attempts.
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_success_status_is_not_retried() {
        let prober = ScriptedProber::new(0, StatusCode::SERVICE_UNAVAILABLE);
        let monitor = HealthMonitor::new(target(), prober.clone(), settings());

        assert!(!monitor.check().await);
        assert_eq!(prober.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_updates_liveness_each_interval() {
        let target = target();
        let prober = ScriptedProber::new(2, StatusCode::NO_CONTENT);
        let cancel = CancellationToken::new();
        let handle =
            HealthMonitor::new(target.clone(), prober.clone(), settings()).spawn(cancel.clone());

        // No probe before the first interval elapses.
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(prober.calls(), 0);
        assert!(!target.is_live());

        // Cycle starts at 10s, two failures with backoff, success at 12s.
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(prober.calls(), 3);
        assert!(target.is_live());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_all_monitors() {
        let cancel = CancellationToken::new();
        let probers: Vec<_> = (0..3)
            .map(|_| ScriptedProber::new(0, StatusCode::OK))
            .collect();
        let handles: Vec<_> = probers
            .iter()
            .map(|prober| {
                HealthMonitor::new(target(), prober.clone(), settings()).spawn(cancel.clone())
            })
            .collect();

        tokio::time::sleep(Duration::from_secs(25)).await;
        let before: Vec<usize> = probers.iter().map(|p| p.calls()).collect();
        assert!(before.iter().all(|&calls| calls == 2));

        cancel.cancel();
        let joined = tokio::time::timeout(
            settings().interval,
            futures::future::join_all(handles),
        )
        .await
        .expect("monitors should stop within one interval");
        assert!(joined.iter().all(|result| result.is_ok()));

        tokio::time::sleep(Duration::from_secs(100)).await;
        let after: Vec<usize> = probers.iter().map(|p| p.calls()).collect();
        assert_eq!(before, after);
    }
}
