//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_millis;
use px_protocol::DEFAULT_MAX_FRAME_LENGTH;

/// Configuration for the controller client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend controller address (host:port)
    pub endpoint: String,

    /// Maximum length of one envelope on the wire
    pub max_frame_length: usize,

    /// Timeout tiers per operation class
    pub timeouts: TimeoutConfig,

    /// Retry budget for transient transport failures
    pub retry: RetryConfig,

    /// Read-path cache TTLs
    pub cache: CacheConfig,

    /// Cold-start readiness polling
    pub readiness: ReadinessConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:9090".to_string(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            readiness: ReadinessConfig::default(),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

/// Timeout tier durations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Cheap reads
    #[serde(rename = "quick_ms", with = "duration_millis")]
    pub quick: Duration,

    /// Ordinary mutations and larger reads
    #[serde(rename = "normal_ms", with = "duration_millis")]
    pub normal: Duration,

    /// Calls that make the backend reload its configuration
    #[serde(rename = "long_ms", with = "duration_millis")]
    pub long: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            quick: Duration::from_secs(8),
            normal: Duration::from_secs(15),
            long: Duration::from_secs(30),
        }
    }
}

/// Bounded retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Fixed delay between attempts
    #[serde(rename = "backoff_ms", with = "duration_millis")]
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// TTLs for cached reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Running configuration snapshot
    #[serde(rename = "config_ttl_ms", with = "duration_millis")]
    pub config_ttl: Duration,

    /// Proxy group snapshot
    #[serde(rename = "proxies_ttl_ms", with = "duration_millis")]
    pub proxies_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            config_ttl: Duration::from_secs(1),
            proxies_ttl: Duration::from_millis(500),
        }
    }
}

/// Readiness polling configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Delay between probes
    #[serde(rename = "interval_ms", with = "duration_millis")]
    pub interval: Duration,

    /// Timeout for a single probe
    #[serde(rename = "probe_timeout_ms", with = "duration_millis")]
    pub probe_timeout: Duration,

    /// Total budget before giving up
    #[serde(rename = "max_wait_ms", with = "duration_millis")]
    pub max_wait: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            probe_timeout: Duration::from_secs(2),
            max_wait: Duration::from_secs(30),
        }
    }
}
