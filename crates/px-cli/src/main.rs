//! proxyctl CLI
//!
//! Talks to a running proxy core through its controller channel:
//! - status and readiness
//! - routing mode, proxy groups and delay tests
//! - connections, rules, providers and runtime settings
//! - local client configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use proxyctl::commands::{self, Setting, DEFAULT_DELAY_URL};
use px_core::config::{self, ClientConfig};
use px_core::ControllerClient;

#[derive(Parser)]
#[command(name = "proxyctl")]
#[command(author, version, about = "Control a running proxy core over its controller channel")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Controller address (overrides config)
    #[arg(short, long, global = true, env = "PROXYCTL_ENDPOINT")]
    endpoint: Option<String>,

    /// Print machine-readable JSON where supported
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show core version and running configuration
    Status {
        /// Wait for the core to finish starting
        #[arg(short, long)]
        wait: bool,
    },

    /// Show or change the routing mode
    Mode {
        #[command(subcommand)]
        action: Option<ModeAction>,
    },

    /// Inspect and select proxies
    #[command(alias = "proxy")]
    Proxies {
        #[command(subcommand)]
        action: ProxiesAction,
    },

    /// Reload the core configuration from a file
    Reload {
        /// Path of the configuration file, as seen by the core
        path: String,
    },

    /// Inspect and close connections
    #[command(alias = "conn")]
    Connections {
        #[command(subcommand)]
        action: Option<ConnectionsAction>,
    },

    /// List routing rules
    Rules {
        /// Only show rules whose payload or target contains this text
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Manage proxy providers
    Provider {
        #[command(subcommand)]
        action: ProviderAction,
    },

    /// Flush the fake-ip cache
    FlushFakeip,

    /// Change a runtime setting of the core
    Set {
        #[command(subcommand)]
        setting: SettingAction,
    },

    /// Manage local configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ModeAction {
    /// Print the current mode
    Get,
    /// Switch to rule, global or direct
    Set { mode: String },
}

#[derive(Subcommand)]
enum ProxiesAction {
    /// List proxy groups, or the members of one group
    List {
        /// Show the members of this group
        #[arg(short, long)]
        group: Option<String>,
    },
    /// Select a node inside a group
    Select { group: String, node: String },
    /// Measure node delay
    Delay {
        /// Nodes to test
        #[arg(required = true)]
        nodes: Vec<String>,
        /// URL to request through each node
        #[arg(short, long, default_value = DEFAULT_DELAY_URL)]
        url: String,
        /// Per-test timeout in milliseconds
        #[arg(short, long, default_value_t = 5000)]
        timeout: u32,
        /// Tests to run at once
        #[arg(long, default_value_t = 8)]
        concurrency: usize,
    },
}

#[derive(Subcommand)]
enum ConnectionsAction {
    /// List active connections
    List,
    /// Close one connection
    Close { id: String },
    /// Close every connection
    CloseAll,
}

#[derive(Subcommand)]
enum ProviderAction {
    /// Refresh a proxy provider
    Update { name: String },
}

#[derive(Subcommand)]
enum SettingAction {
    /// Core log level (debug, info, warning, error, silent)
    LogLevel { level: String },
    /// Accept connections from the LAN
    AllowLan {
        #[arg(action = clap::ArgAction::Set, value_parser = clap::builder::BoolishValueParser::new())]
        enabled: bool,
    },
    /// IPv6 support
    Ipv6 {
        #[arg(action = clap::ArgAction::Set, value_parser = clap::builder::BoolishValueParser::new())]
        enabled: bool,
    },
    /// TUN mode
    Tun {
        #[arg(action = clap::ArgAction::Set, value_parser = clap::builder::BoolishValueParser::new())]
        enabled: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get specific config value
    Get { key: String },
    /// Set config value
    Set { key: String, value: String },
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Local commands never touch the controller
    let command = match cli.command {
        Commands::Config { action } => {
            return match action {
                ConfigAction::Show => commands::config_show(cli.config.as_ref()),
                ConfigAction::Get { key } => commands::config_get(cli.config.as_ref(), &key),
                ConfigAction::Set { key, value } => {
                    commands::config_set(cli.config.as_ref(), &key, &value)
                }
                ConfigAction::Init { force } => commands::config_init(cli.config.as_ref(), force),
                ConfigAction::Path => {
                    commands::config_path(cli.config.as_ref());
                    Ok(())
                }
            };
        }
        other => other,
    };

    let mut client_config = load_client_config(cli.config.as_ref())?;
    if let Some(endpoint) = cli.endpoint {
        client_config.endpoint = endpoint;
    }

    let client = ControllerClient::connect_stream(&client_config);
    let json = cli.json;

    let result = match command {
        Commands::Status { wait } => commands::status_command(&client, wait, json).await,

        Commands::Mode { action } => match action.unwrap_or(ModeAction::Get) {
            ModeAction::Get => commands::mode_get_command(&client).await,
            ModeAction::Set { mode } => commands::mode_set_command(&client, &mode).await,
        },

        Commands::Proxies { action } => match action {
            ProxiesAction::List { group } => {
                commands::proxies_list_command(&client, group.as_deref(), json).await
            }
            ProxiesAction::Select { group, node } => {
                commands::proxies_select_command(&client, &group, &node).await
            }
            ProxiesAction::Delay {
                nodes,
                url,
                timeout,
                concurrency,
            } => {
                commands::proxies_delay_command(&client, &nodes, &url, timeout, concurrency, json)
                    .await
            }
        },

        Commands::Reload { path } => commands::reload_command(&client, &path).await,

        Commands::Connections { action } => match action.unwrap_or(ConnectionsAction::List) {
            ConnectionsAction::List => commands::connections_command(&client, json).await,
            ConnectionsAction::Close { id } => {
                commands::close_connection_command(&client, &id).await
            }
            ConnectionsAction::CloseAll => commands::close_all_connections_command(&client).await,
        },

        Commands::Rules { filter } => {
            commands::rules_command(&client, filter.as_deref(), json).await
        }

        Commands::Provider { action } => match action {
            ProviderAction::Update { name } => {
                commands::provider_update_command(&client, &name).await
            }
        },

        Commands::FlushFakeip => commands::flush_fake_ip_command(&client).await,

        Commands::Set { setting } => {
            let setting = match setting {
                SettingAction::LogLevel { level } => Setting::LogLevel(level),
                SettingAction::AllowLan { enabled } => Setting::AllowLan(enabled),
                SettingAction::Ipv6 { enabled } => Setting::Ipv6(enabled),
                SettingAction::Tun { enabled } => Setting::Tun(enabled),
            };
            commands::setting_command(&client, setting).await
        }

        Commands::Config { .. } => Ok(()),
    };

    client.shutdown().await;
    result
}

/// Load the client configuration, falling back to defaults
///
/// An explicit `--config` path must exist; the default path is optional.
fn load_client_config(config_path: Option<&PathBuf>) -> Result<ClientConfig> {
    if let Some(path) = config_path {
        return config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let default_path = config::default_config_path();
    if !default_path.exists() {
        return Ok(ClientConfig::default());
    }

    Ok(config::load_config(&default_path).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
        ClientConfig::default()
    }))
}
