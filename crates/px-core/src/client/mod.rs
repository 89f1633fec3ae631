//! Typed controller client
//!
//! [`ControllerClient`] is the catalogue of named controller operations.
//! Each operation fixes its verb, path, [`OperationClass`] and cache use;
//! inputs that can never be accepted are rejected locally with
//! [`CallError::Validation`] before anything is sent.

mod types;

pub use types::{
    ConnectionInfo, ConnectionMetadata, ConnectionsSnapshot, DelayHistory, DelayResult, LogLevel,
    Mode, ProxiesSnapshot, ProxyNode, Rule, RuleList, RuntimeConfig, TunSettings, VersionInfo,
};

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::ResponseCache;
use crate::caller::{ApiRequest, RetryingCaller};
use crate::config::{CacheConfig, ClientConfig};
use crate::correlator::{spawn_inbound_listener, RequestCorrelator};
use crate::error::CallError;
use crate::policy::{CallPolicy, OperationClass};
use crate::readiness::ReadinessProbe;
use crate::transport::{StreamTransport, Transport};
use px_protocol::InboundEnvelope;

/// Signature of the running configuration resource
pub const CONFIGS_PATH: &str = "/configs";
/// Signature of the proxy snapshot resource
pub const PROXIES_PATH: &str = "/proxies";

/// Upper bound for a delay test timeout, in milliseconds
pub const MAX_DELAY_TIMEOUT_MS: u32 = 60_000;

/// Client for the backend controller API
pub struct ControllerClient {
    caller: RetryingCaller,
    config_cache: ResponseCache<RuntimeConfig>,
    proxies_cache: ResponseCache<ProxiesSnapshot>,
    ttls: CacheConfig,
    readiness: ReadinessProbe,
    /// Mode from the last successful configuration read
    last_mode: Mutex<Option<Mode>>,
    /// Stops the inbound listener
    cancel: CancellationToken,
    listener: Option<JoinHandle<()>>,
}

impl ControllerClient {
    /// Build a client over an existing caller
    ///
    /// The caller's correlator must already be fed by an inbound listener.
    pub fn new(caller: RetryingCaller, config: &ClientConfig) -> Self {
        Self {
            caller,
            config_cache: ResponseCache::new(),
            proxies_cache: ResponseCache::new(),
            ttls: config.cache,
            readiness: ReadinessProbe::new(config.readiness),
            last_mode: Mutex::new(None),
            cancel: CancellationToken::new(),
            listener: None,
        }
    }

    /// Build a client over `transport`, starting the inbound listener on `inbound`
    pub fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        inbound: mpsc::Receiver<InboundEnvelope>,
    ) -> Self {
        let correlator = Arc::new(RequestCorrelator::new());
        let policy = CallPolicy::new(config.timeouts, config.retry);
        let caller = RetryingCaller::new(Arc::clone(&correlator), transport, policy);

        let mut client = Self::new(caller, config);
        client.listener = Some(spawn_inbound_listener(
            correlator,
            inbound,
            client.cancel.clone(),
        ));
        client
    }

    /// Build a client that talks to `config.endpoint` over TCP
    ///
    /// Nothing is connected until the first call.
    pub fn connect_stream(config: &ClientConfig) -> Self {
        let (transport, inbound) =
            StreamTransport::new(config.endpoint.clone(), config.max_frame_length);
        tracing::debug!("Using controller endpoint {}", transport.address());
        Self::with_transport(config, Arc::new(transport), inbound)
    }

    /// Underlying caller
    pub fn caller(&self) -> &RetryingCaller {
        &self.caller
    }

    /// Stop the inbound listener; calls still pending are cancelled
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(listener) = self.listener.take() {
            if let Err(e) = listener.await {
                tracing::warn!("Inbound listener ended abnormally: {}", e);
            }
        }
    }

    /// Poll `/version` until the backend answers or the readiness budget runs out
    pub async fn wait_ready(&self, cancel: &CancellationToken) -> Result<VersionInfo, CallError> {
        self.readiness.wait_ready(&self.caller, cancel).await
    }

    /// Core version
    pub async fn version(&self) -> Result<VersionInfo, CallError> {
        self.caller
            .call_json(OperationClass::Quick, &ApiRequest::get("/version"))
            .await
    }

    /// Running configuration, served from cache within its TTL
    pub async fn running_config(&self) -> Result<RuntimeConfig, CallError> {
        let config = self
            .config_cache
            .get_cached(CONFIGS_PATH, self.ttls.config_ttl, || async move {
                self.caller
                    .call_json(OperationClass::Quick, &ApiRequest::get(CONFIGS_PATH))
                    .await
            })
            .await?;

        *self.last_mode.lock() = Some(config.mode);
        Ok(config)
    }

    /// Current routing mode
    ///
    /// Falls back to the last mode read successfully when the backend
    /// cannot be reached. The underlying error is still logged.
    pub async fn current_mode(&self) -> Result<Mode, CallError> {
        match self.running_config().await {
            Ok(config) => Ok(config.mode),
            Err(err) => {
                let last_known = *self.last_mode.lock();
                match last_known {
                    Some(mode) => {
                        tracing::warn!("Failed to read mode, using last known '{}': {}", mode, err);
                        Ok(mode)
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// Proxy nodes and groups, served from cache within its TTL
    pub async fn proxies(&self) -> Result<ProxiesSnapshot, CallError> {
        self.proxies_cache
            .get_cached(PROXIES_PATH, self.ttls.proxies_ttl, || async move {
                self.caller
                    .call_json(OperationClass::Normal, &ApiRequest::get(PROXIES_PATH))
                    .await
            })
            .await
    }

    /// Active connections
    pub async fn connections(&self) -> Result<ConnectionsSnapshot, CallError> {
        self.caller
            .call_json(OperationClass::Normal, &ApiRequest::get("/connections"))
            .await
    }

    /// Routing rules
    pub async fn rules(&self) -> Result<RuleList, CallError> {
        self.caller
            .call_json(OperationClass::Normal, &ApiRequest::get("/rules"))
            .await
    }

    /// Measure the delay of one node against `url`
    pub async fn test_delay(
        &self,
        node: &str,
        url: &str,
        timeout_ms: u32,
    ) -> Result<DelayResult, CallError> {
        let request = delay_request(node, url, timeout_ms)?;
        self.caller.call_json(OperationClass::Long, &request).await
    }

    /// Measure several nodes, at most `concurrency` at a time
    ///
    /// Results come back in input order. A node that fails validation or
    /// times out does not stop the others.
    pub async fn test_delays(
        &self,
        nodes: &[String],
        url: &str,
        timeout_ms: u32,
        concurrency: usize,
    ) -> Vec<(String, Result<DelayResult, CallError>)> {
        stream::iter(nodes)
            .map(|node| async move {
                let result = self.test_delay(node, url, timeout_ms).await;
                (node.clone(), result)
            })
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    /// Switch the routing mode
    pub async fn set_mode(&self, mode: &str) -> Result<Mode, CallError> {
        let mode: Mode = mode.parse()?;
        self.patch_configs(json!({ "mode": mode.as_str() })).await?;
        *self.last_mode.lock() = Some(mode);
        Ok(mode)
    }

    /// Change the core log level
    pub async fn set_log_level(&self, level: &str) -> Result<LogLevel, CallError> {
        let level: LogLevel = level.parse()?;
        self.patch_configs(json!({ "log-level": level.as_str() }))
            .await?;
        Ok(level)
    }

    /// Allow or refuse connections from the LAN
    pub async fn set_allow_lan(&self, enabled: bool) -> Result<(), CallError> {
        self.patch_configs(json!({ "allow-lan": enabled })).await
    }

    /// Toggle IPv6 support
    pub async fn set_ipv6(&self, enabled: bool) -> Result<(), CallError> {
        self.patch_configs(json!({ "ipv6": enabled })).await
    }

    /// Toggle TUN mode
    pub async fn set_tun_enabled(&self, enabled: bool) -> Result<(), CallError> {
        self.patch_configs(json!({ "tun": { "enable": enabled } }))
            .await
    }

    /// Ask the core to reload its configuration from `path`
    pub async fn reload_config(&self, path: &str) -> Result<(), CallError> {
        let path = require_non_empty("config path", path)?;
        let result = self
            .caller
            .call(
                OperationClass::Long,
                &ApiRequest::put("/configs?force=true", &json!({ "path": path })),
            )
            .await;

        self.config_cache.invalidate(CONFIGS_PATH);
        self.proxies_cache.invalidate(PROXIES_PATH);
        result.map(drop)
    }

    /// Select `node` inside proxy group `group`
    pub async fn select_proxy(&self, group: &str, node: &str) -> Result<(), CallError> {
        let group = require_non_empty("proxy group", group)?;
        let node = require_non_empty("proxy node", node)?;

        let path = format!("{}/{}", PROXIES_PATH, urlencoding::encode(group));
        let result = self
            .caller
            .call(
                OperationClass::Normal,
                &ApiRequest::put(path, &json!({ "name": node })),
            )
            .await;

        self.proxies_cache.invalidate(PROXIES_PATH);
        result.map(drop)
    }

    /// Close one tracked connection
    pub async fn close_connection(&self, id: &str) -> Result<(), CallError> {
        let id = require_non_empty("connection id", id)?;
        let path = format!("/connections/{}", urlencoding::encode(id));
        self.caller
            .call(OperationClass::Normal, &ApiRequest::delete(path))
            .await
            .map(drop)
    }

    /// Close every tracked connection
    pub async fn close_all_connections(&self) -> Result<(), CallError> {
        self.caller
            .call(OperationClass::Normal, &ApiRequest::delete("/connections"))
            .await
            .map(drop)
    }

    /// Refresh a proxy provider
    pub async fn update_proxy_provider(&self, name: &str) -> Result<(), CallError> {
        let name = require_non_empty("provider name", name)?;
        let path = format!("/providers/proxies/{}", urlencoding::encode(name));
        let result = self
            .caller
            .call(OperationClass::Long, &ApiRequest::put(path, &json!({})))
            .await;

        self.proxies_cache.invalidate(PROXIES_PATH);
        result.map(drop)
    }

    /// Flush the fake-ip cache
    pub async fn flush_fake_ip(&self) -> Result<(), CallError> {
        self.caller
            .call(OperationClass::Quick, &ApiRequest::post("/cache/fakeip/flush"))
            .await
            .map(drop)
    }

    /// PATCH `/configs` and invalidate the cached configuration
    ///
    /// The cache is cleared even if the call fails, since a timed-out patch
    /// may still have been applied.
    async fn patch_configs(&self, body: serde_json::Value) -> Result<(), CallError> {
        let result = self
            .caller
            .call(
                OperationClass::Normal,
                &ApiRequest::patch(CONFIGS_PATH, &body),
            )
            .await;

        self.config_cache.invalidate(CONFIGS_PATH);
        result.map(drop)
    }
}

impl Drop for ControllerClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn require_non_empty<'a>(what: &str, value: &'a str) -> Result<&'a str, CallError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CallError::Validation(format!("{} must not be empty", what)));
    }
    Ok(trimmed)
}

fn delay_request(node: &str, url: &str, timeout_ms: u32) -> Result<ApiRequest, CallError> {
    let node = require_non_empty("proxy node", node)?;
    let url = require_non_empty("test url", url)?;
    if timeout_ms == 0 || timeout_ms > MAX_DELAY_TIMEOUT_MS {
        return Err(CallError::Validation(format!(
            "Delay timeout must be between 1 and {} ms, got {}",
            MAX_DELAY_TIMEOUT_MS, timeout_ms
        )));
    }

    Ok(ApiRequest::get(format!(
        "{}/{}/delay?timeout={}&url={}",
        PROXIES_PATH,
        urlencoding::encode(node),
        timeout_ms,
        urlencoding::encode(url)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_request_encodes_segments() {
        let request = delay_request("HK 01/fast", "http://cp.cloudflare.com/generate_204", 5000)
            .unwrap();
        assert_eq!(
            request.path,
            "/proxies/HK%2001%2Ffast/delay?timeout=5000&url=http%3A%2F%2Fcp.cloudflare.com%2Fgenerate_204"
        );
    }

    #[test]
    fn test_delay_request_rejects_out_of_range_timeout() {
        assert!(matches!(
            delay_request("HK", "http://x", 0),
            Err(CallError::Validation(_))
        ));
        assert!(matches!(
            delay_request("HK", "http://x", MAX_DELAY_TIMEOUT_MS + 1),
            Err(CallError::Validation(_))
        ));
        assert!(delay_request("HK", "http://x", MAX_DELAY_TIMEOUT_MS).is_ok());
    }

    #[test]
    fn test_empty_names_are_rejected() {
        assert!(require_non_empty("proxy group", "   ").is_err());
        assert_eq!(require_non_empty("proxy group", " GLOBAL ").unwrap(), "GLOBAL");
    }
}
