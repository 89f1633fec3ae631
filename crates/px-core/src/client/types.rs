//! Decoded controller resources and the enumerated inputs the client accepts

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CallError;

/// Routing mode of the proxy core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Mode {
    /// Route by rule set
    #[default]
    Rule,
    /// Send everything through the selected global node
    Global,
    /// Bypass the proxy entirely
    Direct,
}

impl Mode {
    /// Every accepted mode
    pub const ALL: [Mode; 3] = [Mode::Rule, Mode::Global, Mode::Direct];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Rule => "rule",
            Mode::Global => "global",
            Mode::Direct => "direct",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = CallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                CallError::Validation(format!(
                    "Unknown mode '{}', expected one of: rule, global, direct",
                    s
                ))
            })
    }
}

impl TryFrom<String> for Mode {
    type Error = CallError;

    fn try_from(value: String) -> Result<Self, CallError> {
        value.parse()
    }
}

/// Log level of the proxy core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Silent,
}

impl LogLevel {
    /// Every accepted level
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Silent,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Silent => "silent",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = CallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                CallError::Validation(format!(
                    "Unknown log level '{}', expected one of: debug, info, warning, error, silent",
                    s
                ))
            })
    }
}

impl TryFrom<String> for LogLevel {
    type Error = CallError;

    fn try_from(value: String) -> Result<Self, CallError> {
        value.parse()
    }
}

/// Response of `GET /version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    #[serde(default)]
    pub meta: bool,
}

/// TUN section of the running configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunSettings {
    pub enable: bool,
    pub stack: Option<String>,
}

/// Response of `GET /configs`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RuntimeConfig {
    pub port: u16,
    pub socks_port: u16,
    pub mixed_port: u16,
    pub allow_lan: bool,
    pub mode: Mode,
    pub log_level: LogLevel,
    pub ipv6: bool,
    pub tun: TunSettings,
}

/// One delay measurement in a node's history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayHistory {
    pub time: String,
    pub delay: u32,
}

/// A proxy node or group as reported by `GET /proxies`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Selected member, for groups
    #[serde(skip_serializing_if = "Option::is_none")]
    pub now: Option<String>,
    /// Members, for groups
    pub all: Vec<String>,
    pub history: Vec<DelayHistory>,
}

impl ProxyNode {
    /// Whether this entry is a group with selectable members
    pub fn is_group(&self) -> bool {
        !self.all.is_empty()
    }

    /// Most recent measured delay, if any
    pub fn last_delay(&self) -> Option<u32> {
        self.history.last().map(|h| h.delay)
    }
}

/// Response of `GET /proxies`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxiesSnapshot {
    pub proxies: BTreeMap<String, ProxyNode>,
}

impl ProxiesSnapshot {
    /// Entries that are groups, ordered by name
    pub fn groups(&self) -> impl Iterator<Item = &ProxyNode> {
        self.proxies.values().filter(|node| node.is_group())
    }

    /// Look up a node or group by name
    pub fn get(&self, name: &str) -> Option<&ProxyNode> {
        self.proxies.get(name)
    }
}

/// Response of `GET /proxies/{node}/delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayResult {
    /// Round trip in milliseconds
    pub delay: u32,
}

/// Connection metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionMetadata {
    pub network: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub host: String,
    #[serde(rename = "sourceIP")]
    pub source_ip: String,
    pub source_port: String,
    #[serde(rename = "destinationIP")]
    pub destination_ip: String,
    pub destination_port: String,
}

impl ConnectionMetadata {
    /// Host if known, otherwise the destination address
    pub fn target(&self) -> String {
        let host = if self.host.is_empty() {
            &self.destination_ip
        } else {
            &self.host
        };
        format!("{}:{}", host, self.destination_port)
    }
}

/// One tracked connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: String,
    pub metadata: ConnectionMetadata,
    pub upload: u64,
    pub download: u64,
    pub start: String,
    pub chains: Vec<String>,
    pub rule: String,
    pub rule_payload: String,
}

/// Response of `GET /connections`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionsSnapshot {
    pub download_total: u64,
    pub upload_total: u64,
    pub connections: Vec<ConnectionInfo>,
}

/// One routing rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: String,
    pub proxy: String,
}

/// Response of `GET /rules`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleList {
    pub rules: Vec<Rule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse_is_case_insensitive() {
        assert_eq!("Global".parse::<Mode>().unwrap(), Mode::Global);
        assert_eq!(" direct ".parse::<Mode>().unwrap(), Mode::Direct);
    }

    #[test]
    fn test_unknown_mode_is_validation_error() {
        let err = "turbo".parse::<Mode>().unwrap_err();
        assert!(matches!(err, CallError::Validation(ref msg) if msg.contains("turbo")));
    }

    #[test]
    fn test_unknown_log_level_is_validation_error() {
        assert!(matches!(
            "verbose".parse::<LogLevel>(),
            Err(CallError::Validation(_))
        ));
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
    }

    #[test]
    fn test_log_level_decodes_through_string() {
        let level: LogLevel = serde_json::from_str(r#""Error""#).unwrap();
        assert_eq!(level, LogLevel::Error);
        assert_eq!(LogLevel::try_from("silent".to_string()).unwrap(), LogLevel::Silent);
        assert!(serde_json::from_str::<LogLevel>(r#""loud""#).is_err());
    }

    #[test]
    fn test_runtime_config_decodes_partial_body() {
        let json = r#"{"mode":"Rule","mixed-port":7890,"allow-lan":true,"tun":{"enable":true}}"#;
        let config: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.mode, Mode::Rule);
        assert_eq!(config.mixed_port, 7890);
        assert!(config.allow_lan);
        assert!(config.tun.enable);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_proxies_snapshot_groups() {
        let json = r#"{
            "proxies": {
                "GLOBAL": {"name":"GLOBAL","type":"Selector","now":"HK-01","all":["HK-01","JP-02"]},
                "HK-01": {"name":"HK-01","type":"Shadowsocks","history":[{"time":"t","delay":42}]}
            }
        }"#;
        let snapshot: ProxiesSnapshot = serde_json::from_str(json).unwrap();

        let groups: Vec<_> = snapshot.groups().map(|g| g.name.as_str()).collect();
        assert_eq!(groups, vec!["GLOBAL"]);
        assert_eq!(snapshot.get("HK-01").and_then(ProxyNode::last_delay), Some(42));
    }

    #[test]
    fn test_connection_target_prefers_host() {
        let json = r#"{"downloadTotal":10,"uploadTotal":5,"connections":[
            {"id":"c1","metadata":{"network":"tcp","host":"example.com","destinationIP":"1.2.3.4","destinationPort":"443"}},
            {"id":"c2","metadata":{"network":"udp","host":"","destinationIP":"8.8.8.8","destinationPort":"53"}}
        ]}"#;
        let snapshot: ConnectionsSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.download_total, 10);
        assert_eq!(snapshot.connections[0].metadata.target(), "example.com:443");
        assert_eq!(snapshot.connections[1].metadata.target(), "8.8.8.8:53");
    }
}
