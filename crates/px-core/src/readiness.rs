//! Backend readiness polling
//!
//! During cold start the backend endpoint does not exist yet, and every call
//! fails with [`CallError::BackendNotReady`]. The generic retry path leaves
//! that error alone; instead [`ReadinessProbe`] polls a cheap read on its
//! own, longer schedule until the backend answers.

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::caller::{ApiRequest, RetryingCaller};
use crate::client::VersionInfo;
use crate::config::ReadinessConfig;
use crate::error::{CallError, TransportError};

/// Polls `/version` until the backend responds
#[derive(Debug, Clone, Copy)]
pub struct ReadinessProbe {
    config: ReadinessConfig,
}

impl ReadinessProbe {
    /// Create a probe from configuration
    pub fn new(config: ReadinessConfig) -> Self {
        Self { config }
    }

    /// Wait until the backend answers `/version`
    ///
    /// Each probe is a single round trip bounded by `probe_timeout`; probes
    /// are spaced by `interval`. Not-ready, timed-out and transport failures
    /// keep polling until `max_wait` has elapsed, after which the last of
    /// them is returned as is. A rejection means the backend is up but
    /// refused the probe, and is returned immediately.
    pub async fn wait_ready(
        &self,
        caller: &RetryingCaller,
        cancel: &CancellationToken,
    ) -> Result<VersionInfo, CallError> {
        let started = Instant::now();
        let deadline = started + self.config.max_wait;
        let request = ApiRequest::get("/version");
        let mut probes = 0u32;

        loop {
            probes += 1;

            let err = match caller
                .attempt_once(&request, self.config.probe_timeout)
                .await
                .and_then(|body| {
                    serde_json::from_str::<VersionInfo>(&body).map_err(|e| {
                        TransportError::decode(format!("invalid version response: {}", e)).into()
                    })
                }) {
                Ok(version) => {
                    tracing::info!(
                        probes,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Backend ready (version {})",
                        version.version
                    );
                    return Ok(version);
                }
                Err(err) => err,
            };

            if !keeps_polling(&err) {
                return Err(err);
            }
            tracing::trace!(probes, "Backend not ready yet: {}", err);

            if Instant::now() + self.config.interval >= deadline {
                tracing::warn!(
                    probes,
                    "Backend still not ready after {:?}: {}",
                    self.config.max_wait,
                    err
                );
                return Err(err);
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(CallError::BackendNotReady("readiness wait cancelled".to_string()));
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }
}

fn keeps_polling(err: &CallError) -> bool {
    matches!(
        err,
        CallError::BackendNotReady(_) | CallError::TimedOut { .. } | CallError::Transport(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::RequestCorrelator;
    use crate::policy::CallPolicy;
    use crate::transport::Transport;
    use async_trait::async_trait;
    use px_protocol::{InboundEnvelope, OutboundEnvelope};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Refuses connections for the first `refusals` sends, then answers
    struct ColdStartTransport {
        correlator: Arc<RequestCorrelator>,
        refusals: usize,
        sends: AtomicUsize,
    }

    #[async_trait]
    impl Transport for ColdStartTransport {
        async fn send(&self, envelope: OutboundEnvelope) -> Result<(), TransportError> {
            let n = self.sends.fetch_add(1, Ordering::SeqCst);
            if n < self.refusals {
                return Err(TransportError::not_ready("connection refused"));
            }
            self.correlator.dispatch(InboundEnvelope::ok(
                envelope.request_id,
                r#"{"version":"v1.18.0","meta":true}"#,
            ));
            Ok(())
        }
    }

    fn setup(refusals: usize) -> (RetryingCaller, Arc<ColdStartTransport>) {
        let correlator = Arc::new(RequestCorrelator::new());
        let transport = Arc::new(ColdStartTransport {
            correlator: Arc::clone(&correlator),
            refusals,
            sends: AtomicUsize::new(0),
        });
        let caller = RetryingCaller::new(correlator, transport.clone(), CallPolicy::default());
        (caller, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_backend_answers() {
        let (caller, transport) = setup(4);
        let probe = ReadinessProbe::new(ReadinessConfig::default());

        let version = probe
            .wait_ready(&caller, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(version.version, "v1.18.0");
        assert_eq!(transport.sends.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_wait() {
        let (caller, transport) = setup(usize::MAX);
        let probe = ReadinessProbe::new(ReadinessConfig {
            interval: Duration::from_millis(500),
            probe_timeout: Duration::from_secs(2),
            max_wait: Duration::from_secs(3),
        });
        let started = Instant::now();

        let err = probe
            .wait_ready(&caller, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_not_ready());
        // Probes at 0, 0.5, 1.0, 1.5, 2.0 and 2.5s; a seventh would land on the deadline
        assert_eq!(transport.sends.load(Ordering::SeqCst), 6);
        assert!(started.elapsed() <= Duration::from_secs(3));
    }

    /// Accepts every request and never answers
    struct SilentTransport;

    #[async_trait]
    impl Transport for SilentTransport {
        async fn send(&self, _envelope: OutboundEnvelope) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_keeps_last_error_kind() {
        let caller = RetryingCaller::new(
            Arc::new(RequestCorrelator::new()),
            Arc::new(SilentTransport),
            CallPolicy::default(),
        );
        let probe = ReadinessProbe::new(ReadinessConfig {
            interval: Duration::from_millis(500),
            probe_timeout: Duration::from_secs(1),
            max_wait: Duration::from_secs(4),
        });

        let err = probe
            .wait_ready(&caller, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CallError::TimedOut { ref path, .. } if path == "/version"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_polling() {
        let (caller, transport) = setup(usize::MAX);
        let probe = ReadinessProbe::new(ReadinessConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = probe.wait_ready(&caller, &cancel).await.unwrap_err();
        assert!(err.is_not_ready());
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }
}
