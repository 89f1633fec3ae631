//! CLI command implementations

mod config;
mod connections;
mod controls;
mod mode;
mod proxies;
mod status;

pub use config::{config_get, config_init, config_path, config_set, config_show};
pub use connections::{
    close_all_connections_command, close_connection_command, connections_command, rules_command,
};
pub use controls::{
    flush_fake_ip_command, provider_update_command, reload_command, setting_command, Setting,
};
pub use mode::{mode_get_command, mode_set_command};
pub use proxies::{
    proxies_delay_command, proxies_list_command, proxies_select_command, DEFAULT_DELAY_URL,
};
pub use status::status_command;

use px_core::CallError;

use crate::output::print_error;

/// Print the user-facing text of a failed call and turn it into an error
fn report(action: &str, err: CallError) -> anyhow::Error {
    print_error(&format!("{}: {}", action, err.user_message()));
    tracing::debug!("{} failed: {}", action, err);
    anyhow::Error::new(err).context(action.to_string())
}

/// Print `value` as pretty JSON
fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
