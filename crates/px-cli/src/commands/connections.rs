//! Connection and rule command implementations

use anyhow::Result;

use px_core::ControllerClient;

use super::{print_json, report};
use crate::output::{format_connections, format_rules, print_success};

/// List active connections
pub async fn connections_command(client: &ControllerClient, json: bool) -> Result<()> {
    let snapshot = client
        .connections()
        .await
        .map_err(|e| report("Failed to list connections", e))?;

    if json {
        return print_json(&snapshot);
    }
    println!("{}", format_connections(&snapshot));
    Ok(())
}

/// Close one connection
pub async fn close_connection_command(client: &ControllerClient, id: &str) -> Result<()> {
    client
        .close_connection(id)
        .await
        .map_err(|e| report("Failed to close connection", e))?;

    print_success(&format!("Closed connection {}", id));
    Ok(())
}

/// Close every connection
pub async fn close_all_connections_command(client: &ControllerClient) -> Result<()> {
    client
        .close_all_connections()
        .await
        .map_err(|e| report("Failed to close connections", e))?;

    print_success("Closed all connections");
    Ok(())
}

/// List routing rules
pub async fn rules_command(
    client: &ControllerClient,
    filter: Option<&str>,
    json: bool,
) -> Result<()> {
    let rules = client
        .rules()
        .await
        .map_err(|e| report("Failed to list rules", e))?;

    if json {
        return print_json(&rules);
    }
    println!("{}", format_rules(&rules, filter));
    Ok(())
}
