//! Config command handlers

use std::path::Path;

use anyhow::{Context, Result};

use studyhub_core::Config;

use crate::load_config;
use crate::output::{print_json, Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&Path>, output: &Output) -> Result<()> {
    let config = load_config(config_path)?;

    match output.format {
        OutputFormat::Json => print_json(&config),
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let adapters: Vec<&str> = config.adapters.iter().map(|a| a.as_str()).collect();
            let effective_path = config_path
                .map(Path::to_path_buf)
                .unwrap_or_else(Config::config_file_path);

            println!("Configuration:");
            println!("  data_dir:              {}", config.data_dir.display());
            println!("  adapters:              {}", adapters.join(", "));
            println!("  extension_quota_bytes: {}", config.extension_quota_bytes);
            println!("  unlimited_storage:     {}", config.unlimited_storage);
            println!("  local_quota_bytes:     {}", config.local_quota_bytes);
            println!("  signal_ttl_ms:         {}", config.signal_ttl_ms);
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: &str, value: &str, config_path: Option<&Path>, output: &Output) -> Result<()> {
    let mut config = load_config(config_path)?;
    config.set_value(key, value)?;

    let save_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));
    Ok(())
}
