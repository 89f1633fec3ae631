//! Mode command implementations

use anyhow::Result;

use px_core::ControllerClient;

use super::report;
use crate::output::print_success;

/// Print the current routing mode
pub async fn mode_get_command(client: &ControllerClient) -> Result<()> {
    let mode = client
        .current_mode()
        .await
        .map_err(|e| report("Failed to read mode", e))?;

    println!("{}", mode);
    Ok(())
}

/// Switch the routing mode
pub async fn mode_set_command(client: &ControllerClient, mode: &str) -> Result<()> {
    let mode = client
        .set_mode(mode)
        .await
        .map_err(|e| report("Failed to set mode", e))?;

    print_success(&format!("Mode set to {}", mode));
    Ok(())
}
