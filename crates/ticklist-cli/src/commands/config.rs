//! Config command handlers

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use ticklist_core::Config;

use crate::output::Output;

/// Show the current configuration
pub fn show(output: &Output) -> Result<()> {
    let config = Config::load()?;

    if output.is_json() {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let toml = toml::to_string_pretty(&config).context("Failed to render config")?;
    println!("# {}", Config::config_file_path().display());
    print!("{}", toml);
    Ok(())
}

/// Set a configuration value
pub fn set(key: String, value: String, output: &Output) -> Result<()> {
    let mut config = Config::load()?;

    match key.as_str() {
        "data_dir" => config.data_dir = PathBuf::from(&value),
        "remote_url" => {
            config.remote_url = if value.is_empty() { None } else { Some(value.clone()) }
        }
        "remote_api_key" => {
            config.remote_api_key = if value.is_empty() { None } else { Some(value.clone()) }
        }
        "sync_enabled" => {
            config.sync_enabled = value.eq_ignore_ascii_case("true") || value == "1"
        }
        "push_interval_secs" => {
            config.push_interval_secs = value
                .parse()
                .with_context(|| format!("Invalid number: {}", value))?
        }
        "guard_window_ms" => {
            config.guard_window_ms = value
                .parse()
                .with_context(|| format!("Invalid number: {}", value))?
        }
        "sign_in_grace_ms" => {
            config.sign_in_grace_ms = value
                .parse()
                .with_context(|| format!("Invalid number: {}", value))?
        }
        _ => bail!(
            "Unknown config key: {}. Valid keys: data_dir, remote_url, \
             remote_api_key, sync_enabled, push_interval_secs, \
             guard_window_ms, sign_in_grace_ms",
            key
        ),
    }

    config.save()?;
    output.success(&format!("Set {} = {}", key, value));
    Ok(())
}
