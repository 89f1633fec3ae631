//! Local client configuration commands
//!
//! None of these contact the core. Keys are dotted paths into the TOML file,
//! e.g. `retry.max_attempts` or `timeouts.quick_ms`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use px_core::config::{self, ClientConfig};

fn resolve(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(config::default_config_path)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Cannot read {:?}", path))
}

/// Interpret a command-line value as the most specific TOML scalar
fn parse_scalar(value: &str) -> toml::Value {
    if let Ok(b) = value.parse::<bool>() {
        return toml::Value::Boolean(b);
    }
    if let Ok(i) = value.parse::<i64>() {
        return toml::Value::Integer(i);
    }
    toml::Value::String(value.to_string())
}

/// Print the config file path in use
pub fn config_path(config_path: Option<&PathBuf>) {
    println!("{}", resolve(config_path).display());
}

/// Print one value by dotted key
///
/// Keys missing from the file report their default.
pub fn config_get(config_path: Option<&PathBuf>, key: &str) -> Result<()> {
    let path = resolve(config_path);

    let effective: ClientConfig = if path.exists() {
        toml::from_str(&read_file(&path)?).with_context(|| format!("Malformed {:?}", path))?
    } else {
        ClientConfig::default()
    };
    let root = toml::Value::try_from(effective)?;

    let found = key
        .split('.')
        .try_fold(&root, |node, segment| node.get(segment));
    let Some(value) = found else {
        print_error(&format!("Unknown key '{}'", key));
        anyhow::bail!("unknown config key: {}", key);
    };

    match value {
        toml::Value::String(s) => println!("{}", s),
        toml::Value::Table(_) => print!("{}", toml::to_string_pretty(value)?),
        scalar => println!("{}", scalar),
    }
    Ok(())
}

/// Write one value by dotted key
///
/// The edited document must still parse as a [`ClientConfig`], otherwise the
/// file is left untouched.
pub fn config_set(config_path: Option<&PathBuf>, key: &str, value: &str) -> Result<()> {
    let path = resolve(config_path);
    if !path.exists() {
        print_info(&format!("No config at {:?}, starting from defaults", path));
        write_default(&path)?;
    }

    let mut document: toml::Table =
        toml::from_str(&read_file(&path)?).with_context(|| format!("Malformed {:?}", path))?;

    let segments: Vec<&str> = key.split('.').collect();
    let Some((leaf, parents)) = segments.split_last() else {
        anyhow::bail!("empty config key");
    };

    let mut table = &mut document;
    for segment in parents {
        table = table
            .entry(segment.to_string())
            .or_insert(toml::Value::Table(toml::Table::new()))
            .as_table_mut()
            .ok_or_else(|| anyhow::anyhow!("'{}' in '{}' is not a table", segment, key))?;
    }
    table.insert(leaf.to_string(), parse_scalar(value));

    let rendered = toml::to_string_pretty(&document)?;
    if let Err(e) = toml::from_str::<ClientConfig>(&rendered) {
        print_error(&format!("Rejected {} = {}: {}", key, value, e));
        anyhow::bail!("invalid value for {}", key);
    }

    std::fs::write(&path, rendered).with_context(|| format!("Cannot write {:?}", path))?;
    print_success(&format!("{} = {}", key, value));
    Ok(())
}

/// Print the config file as stored
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = resolve(config_path);

    if !path.exists() {
        print_warning(&format!("No config at {:?}; defaults are in effect", path));
        print_info("Run 'proxyctl config init' to write them out");
        return Ok(());
    }

    print_info(&path.display().to_string());
    println!();
    println!("{}", read_file(&path)?);
    Ok(())
}

/// Write the default configuration
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let path = resolve(config_path);

    if path.exists() && !force {
        print_error(&format!("{:?} already exists", path));
        print_info("Pass --force to replace it");
        anyhow::bail!("config file already exists");
    }

    write_default(&path)?;
    print_success(&format!("Wrote default configuration to {:?}", path));
    Ok(())
}

fn write_default(path: &Path) -> Result<()> {
    config::save_config(path, &ClientConfig::default())
        .with_context(|| format!("Cannot write {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalar_prefers_specific_types() {
        assert_eq!(parse_scalar("true"), toml::Value::Boolean(true));
        assert_eq!(parse_scalar("250"), toml::Value::Integer(250));
        assert_eq!(
            parse_scalar("127.0.0.1:9090"),
            toml::Value::String("127.0.0.1:9090".to_string())
        );
    }

    #[test]
    fn test_set_then_reload_nested_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        config_set(Some(&path), "cache.config_ttl_ms", "2500").unwrap();

        let loaded: ClientConfig = config::load_config(&path).unwrap();
        assert_eq!(loaded.cache.config_ttl, std::time::Duration::from_millis(2500));
        assert_eq!(loaded.endpoint, ClientConfig::default().endpoint);
    }

    #[test]
    fn test_invalid_value_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        config_init(Some(&path), false).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        assert!(config_set(Some(&path), "retry.max_attempts", "lots").is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }
}
