//! Output formatting utilities for the CLI
//!
//! Tables for proxies, connections and rules, the status summary, and
//! colored status messages.

use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use px_core::client::{
    ConnectionsSnapshot, DelayResult, ProxiesSnapshot, ProxyNode, RuleList, RuntimeConfig,
    VersionInfo,
};
use px_core::CallError;

/// Format the core version and running configuration
pub fn format_status(version: &VersionInfo, config: &RuntimeConfig) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "Core Version: {}{}\n",
        version.version,
        if version.meta { " (meta)" } else { "" }
    ));
    output.push_str(&format!("Mode: {}\n", config.mode));
    output.push_str(&format!("Log Level: {}\n", config.log_level));
    output.push_str(&format!("Mixed Port: {}\n", port_or_dash(config.mixed_port)));
    output.push_str(&format!("HTTP Port: {}\n", port_or_dash(config.port)));
    output.push_str(&format!("SOCKS Port: {}\n", port_or_dash(config.socks_port)));
    output.push_str(&format!("Allow LAN: {}\n", on_off(config.allow_lan)));
    output.push_str(&format!("IPv6: {}\n", on_off(config.ipv6)));
    output.push_str(&format!("TUN: {}\n", on_off(config.tun.enable)));

    output
}

/// Format proxy groups as a table
pub fn format_proxy_groups(snapshot: &ProxiesSnapshot) -> String {
    let groups: Vec<&ProxyNode> = snapshot.groups().collect();
    if groups.is_empty() {
        return "No proxy groups".to_string();
    }

    #[derive(Tabled)]
    struct GroupRow {
        #[tabled(rename = "GROUP")]
        name: String,
        #[tabled(rename = "TYPE")]
        kind: String,
        #[tabled(rename = "SELECTED")]
        selected: String,
        #[tabled(rename = "MEMBERS")]
        members: usize,
    }

    let rows: Vec<GroupRow> = groups
        .into_iter()
        .map(|g| GroupRow {
            name: g.name.clone(),
            kind: g.kind.clone(),
            selected: g.now.clone().unwrap_or_else(|| "-".to_string()),
            members: g.all.len(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format the members of one group, marking the selected one
pub fn format_group_members(group: &ProxyNode, snapshot: &ProxiesSnapshot) -> String {
    if group.all.is_empty() {
        return format!("Group '{}' has no members", group.name);
    }

    #[derive(Tabled)]
    struct MemberRow {
        #[tabled(rename = "")]
        marker: &'static str,
        #[tabled(rename = "NODE")]
        name: String,
        #[tabled(rename = "TYPE")]
        kind: String,
        #[tabled(rename = "DELAY")]
        delay: String,
    }

    let rows: Vec<MemberRow> = group
        .all
        .iter()
        .map(|name| {
            let node = snapshot.get(name);
            MemberRow {
                marker: if group.now.as_deref() == Some(name.as_str()) {
                    "*"
                } else {
                    ""
                },
                name: name.clone(),
                kind: node.map(|n| n.kind.clone()).unwrap_or_default(),
                delay: format_delay(node.and_then(ProxyNode::last_delay)),
            }
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format delay test results
pub fn format_delays(results: &[(String, Result<DelayResult, CallError>)]) -> String {
    if results.is_empty() {
        return "No nodes tested".to_string();
    }

    #[derive(Tabled)]
    struct DelayRow {
        #[tabled(rename = "NODE")]
        name: String,
        #[tabled(rename = "DELAY")]
        delay: String,
    }

    let rows: Vec<DelayRow> = results
        .iter()
        .map(|(name, result)| DelayRow {
            name: name.clone(),
            delay: match result {
                Ok(r) => format_delay(Some(r.delay)),
                Err(e) => e.user_message(),
            },
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .with(Width::wrap(100))
        .to_string()
}

/// Format active connections as a table with totals
pub fn format_connections(snapshot: &ConnectionsSnapshot) -> String {
    let totals = format!(
        "Total: ↑ {}  ↓ {}",
        format_bytes(snapshot.upload_total),
        format_bytes(snapshot.download_total)
    );

    if snapshot.connections.is_empty() {
        return format!("No active connections\n{}", totals);
    }

    #[derive(Tabled)]
    struct ConnectionRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "NET")]
        network: String,
        #[tabled(rename = "TARGET")]
        target: String,
        #[tabled(rename = "CHAIN")]
        chain: String,
        #[tabled(rename = "RULE")]
        rule: String,
        #[tabled(rename = "UP")]
        upload: String,
        #[tabled(rename = "DOWN")]
        download: String,
    }

    let rows: Vec<ConnectionRow> = snapshot
        .connections
        .iter()
        .map(|c| ConnectionRow {
            id: truncate(&c.id, 8),
            network: c.metadata.network.clone(),
            target: truncate(&c.metadata.target(), 40),
            chain: c.chains.join(" > "),
            rule: if c.rule_payload.is_empty() {
                c.rule.clone()
            } else {
                format!("{}({})", c.rule, c.rule_payload)
            },
            upload: format_bytes(c.upload),
            download: format_bytes(c.download),
        })
        .collect();

    format!(
        "{}\n{}",
        Table::new(rows)
            .with(Style::rounded())
            .with(Width::wrap(120)),
        totals
    )
}

/// Format routing rules, optionally keeping only those matching `filter`
pub fn format_rules(rules: &RuleList, filter: Option<&str>) -> String {
    #[derive(Tabled)]
    struct RuleRow {
        #[tabled(rename = "#")]
        index: usize,
        #[tabled(rename = "TYPE")]
        kind: String,
        #[tabled(rename = "PAYLOAD")]
        payload: String,
        #[tabled(rename = "PROXY")]
        proxy: String,
    }

    let rows: Vec<RuleRow> = rules
        .rules
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            filter.map_or(true, |f| r.payload.contains(f) || r.proxy.contains(f))
        })
        .map(|(i, r)| RuleRow {
            index: i + 1,
            kind: r.kind.clone(),
            payload: truncate(&r.payload, 48),
            proxy: r.proxy.clone(),
        })
        .collect();

    if rows.is_empty() {
        return "No matching rules".to_string();
    }

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format a byte count with a binary unit
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn format_delay(delay: Option<u32>) -> String {
    match delay {
        Some(0) => "timeout".to_string(),
        Some(ms) => format!("{} ms", ms),
        None => "-".to_string(),
    }
}

fn port_or_dash(port: u16) -> String {
    if port == 0 {
        "-".to_string()
    } else {
        port.to_string()
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use px_core::client::{ConnectionInfo, ConnectionMetadata, Mode, Rule};

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 8), "short");
        assert_eq!(truncate("节点名称很长很长", 5), "节点...");
    }

    #[test]
    fn test_status_shows_mode_and_ports() {
        let version = VersionInfo {
            version: "v1.18.0".to_string(),
            meta: true,
        };
        let config = RuntimeConfig {
            mode: Mode::Global,
            mixed_port: 7890,
            ..RuntimeConfig::default()
        };

        let out = format_status(&version, &config);
        assert!(out.contains("v1.18.0 (meta)"));
        assert!(out.contains("Mode: global"));
        assert!(out.contains("Mixed Port: 7890"));
        assert!(out.contains("HTTP Port: -"));
    }

    #[test]
    fn test_empty_connections_still_show_totals() {
        let out = format_connections(&ConnectionsSnapshot {
            upload_total: 2048,
            ..ConnectionsSnapshot::default()
        });
        assert!(out.contains("No active connections"));
        assert!(out.contains("2.0 KiB"));
    }

    #[test]
    fn test_connection_table_lists_target() {
        let snapshot = ConnectionsSnapshot {
            connections: vec![ConnectionInfo {
                id: "0f3c9a2e-1111".to_string(),
                metadata: ConnectionMetadata {
                    network: "tcp".to_string(),
                    host: "example.com".to_string(),
                    destination_port: "443".to_string(),
                    ..ConnectionMetadata::default()
                },
                chains: vec!["HK-01".to_string(), "Proxy".to_string()],
                ..ConnectionInfo::default()
            }],
            ..ConnectionsSnapshot::default()
        };

        let out = format_connections(&snapshot);
        assert!(out.contains("example.com:443"));
        assert!(out.contains("HK-01 > Proxy"));
        assert!(out.contains("0f3c9..."));
    }

    #[test]
    fn test_rule_filter() {
        let rules = RuleList {
            rules: vec![
                Rule {
                    kind: "DomainSuffix".to_string(),
                    payload: "google.com".to_string(),
                    proxy: "Proxy".to_string(),
                },
                Rule {
                    kind: "GeoIP".to_string(),
                    payload: "CN".to_string(),
                    proxy: "DIRECT".to_string(),
                },
            ],
        };

        let out = format_rules(&rules, Some("google"));
        assert!(out.contains("google.com"));
        assert!(!out.contains("DIRECT"));
        assert_eq!(format_rules(&rules, Some("nothing")), "No matching rules");
    }
}
