//! Core control commands: reload, providers, fake-ip cache and settings

use anyhow::Result;

use px_core::ControllerClient;

use super::report;
use crate::output::print_success;

/// A runtime setting of the core
#[derive(Debug, Clone)]
pub enum Setting {
    LogLevel(String),
    AllowLan(bool),
    Ipv6(bool),
    Tun(bool),
}

/// Reload the core configuration from a file
pub async fn reload_command(client: &ControllerClient, path: &str) -> Result<()> {
    client
        .reload_config(path)
        .await
        .map_err(|e| report("Failed to reload configuration", e))?;

    print_success(&format!("Configuration reloaded from {}", path));
    Ok(())
}

/// Refresh a proxy provider
pub async fn provider_update_command(client: &ControllerClient, name: &str) -> Result<()> {
    client
        .update_proxy_provider(name)
        .await
        .map_err(|e| report("Failed to update provider", e))?;

    print_success(&format!("Provider {} updated", name));
    Ok(())
}

/// Flush the fake-ip cache
pub async fn flush_fake_ip_command(client: &ControllerClient) -> Result<()> {
    client
        .flush_fake_ip()
        .await
        .map_err(|e| report("Failed to flush fake-ip cache", e))?;

    print_success("Fake-ip cache flushed");
    Ok(())
}

/// Change one runtime setting
pub async fn setting_command(client: &ControllerClient, setting: Setting) -> Result<()> {
    let message = match setting {
        Setting::LogLevel(level) => {
            let level = client
                .set_log_level(&level)
                .await
                .map_err(|e| report("Failed to set log level", e))?;
            format!("Log level set to {}", level)
        }
        Setting::AllowLan(enabled) => {
            client
                .set_allow_lan(enabled)
                .await
                .map_err(|e| report("Failed to change LAN access", e))?;
            format!("Allow LAN {}", if enabled { "enabled" } else { "disabled" })
        }
        Setting::Ipv6(enabled) => {
            client
                .set_ipv6(enabled)
                .await
                .map_err(|e| report("Failed to change IPv6", e))?;
            format!("IPv6 {}", if enabled { "enabled" } else { "disabled" })
        }
        Setting::Tun(enabled) => {
            client
                .set_tun_enabled(enabled)
                .await
                .map_err(|e| report("Failed to change TUN mode", e))?;
            format!("TUN mode {}", if enabled { "enabled" } else { "disabled" })
        }
    };

    print_success(&message);
    Ok(())
}
