//! Proxy command implementations

use anyhow::Result;

use px_core::ControllerClient;

use super::{print_json, report};
use crate::output::{
    format_delays, format_group_members, format_proxy_groups, print_error, print_success,
};

/// Default URL for delay tests
pub const DEFAULT_DELAY_URL: &str = "http://cp.cloudflare.com/generate_204";

/// List proxy groups, or the members of one group
pub async fn proxies_list_command(
    client: &ControllerClient,
    group: Option<&str>,
    json: bool,
) -> Result<()> {
    let snapshot = client
        .proxies()
        .await
        .map_err(|e| report("Failed to list proxies", e))?;

    let Some(name) = group else {
        if json {
            return print_json(&snapshot);
        }
        println!("{}", format_proxy_groups(&snapshot));
        return Ok(());
    };

    let Some(node) = snapshot.get(name) else {
        print_error(&format!("No proxy group named '{}'", name));
        anyhow::bail!("unknown proxy group: {}", name);
    };

    if json {
        return print_json(node);
    }
    println!("{}", format_group_members(node, &snapshot));
    Ok(())
}

/// Select a node inside a group
pub async fn proxies_select_command(
    client: &ControllerClient,
    group: &str,
    node: &str,
) -> Result<()> {
    client
        .select_proxy(group, node)
        .await
        .map_err(|e| report("Failed to select proxy", e))?;

    print_success(&format!("{} now uses {}", group, node));
    Ok(())
}

/// Measure the delay of one or more nodes
pub async fn proxies_delay_command(
    client: &ControllerClient,
    nodes: &[String],
    url: &str,
    timeout_ms: u32,
    concurrency: usize,
    json: bool,
) -> Result<()> {
    if let [node] = nodes {
        let result = client
            .test_delay(node, url, timeout_ms)
            .await
            .map_err(|e| report("Delay test failed", e))?;

        if json {
            return print_json(&result);
        }
        println!("{}: {} ms", node, result.delay);
        return Ok(());
    }

    let results = client
        .test_delays(nodes, url, timeout_ms, concurrency)
        .await;

    let all_failed = results.iter().all(|(_, r)| r.is_err());

    if json {
        let map: serde_json::Map<String, serde_json::Value> = results
            .iter()
            .map(|(name, result)| {
                let value = match result {
                    Ok(r) => serde_json::json!(r.delay),
                    Err(e) => serde_json::json!({ "error": e.user_message() }),
                };
                (name.clone(), value)
            })
            .collect();
        print_json(&map)?;
    } else {
        println!("{}", format_delays(&results));
    }

    if all_failed {
        anyhow::bail!("every delay test failed");
    }
    Ok(())
}
