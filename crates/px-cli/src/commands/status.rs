//! Status command implementation

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use px_core::ControllerClient;

use super::{print_json, report};
use crate::output::{format_status, print_info, print_warning};

/// Execute the status command
///
/// With `wait`, polls until the core answers instead of failing on the first
/// not-ready probe. Ctrl-C stops the wait.
pub async fn status_command(client: &ControllerClient, wait: bool, json: bool) -> Result<()> {
    let version = if wait {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        if !json {
            print_info("Waiting for the core to become ready...");
        }
        let result = client.wait_ready(&cancel).await;
        interrupt.abort();
        result.map_err(|e| report("Core is not ready", e))?
    } else {
        client.version().await.map_err(|e| {
            if e.is_not_ready() {
                print_warning("Is the core running? Try: proxyctl status --wait");
            }
            report("Failed to reach the core", e)
        })?
    };

    let config = client
        .running_config()
        .await
        .map_err(|e| report("Failed to read running configuration", e))?;

    if json {
        return print_json(&serde_json::json!({
            "version": version,
            "config": config,
        }));
    }

    print!("{}", format_status(&version, &config));
    Ok(())
}
