// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Values are layered in this order, later layers winning:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{BiotapConfig, ConfigError, ConfigResult};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "biotapestry_configuration.toml";

/// Levels searched above the working directory
const MAX_SEARCH_DEPTH: usize = 5;

/// Find the configuration file
///
/// Search order:
/// 1. `BIOTAP_CONFIG_PATH` environment variable
/// 2. Current working directory
/// 3. Up to five parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("BIOTAP_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by BIOTAP_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.as_path();
        for _ in 0..MAX_SEARCH_DEPTH {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent;
                }
                None => break,
            }
        }
    }

    if let Some(found) = search_paths.iter().find(|p| p.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\n\
         Set BIOTAP_CONFIG_PATH to specify a custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from a TOML file and apply overrides
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, the file is searched for.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns an error if the file is missing, unreadable or not valid TOML.
/// Value checks are left to [`crate::validate_config`].
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<BiotapConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: BiotapConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    Ok(config)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `BIOTAP_INTERACTIVE` -> `propagation.interactive`
/// - `BIOTAP_PAD_CACHE` -> `propagation.pad_cache`
/// - `BIOTAP_MAX_SUBTREE_PASSES` -> `propagation.max_subtree_passes`
/// - `BIOTAP_BACKGROUND_RELAYOUT` -> `relayout.background`
/// - `BIOTAP_LOG_LEVEL` -> `logging.level`
/// - `BIOTAP_LOG_DIR` -> `logging.log_dir`
/// - `BIOTAP_LOG_RETENTION_DAYS` -> `logging.retention_days`
///
/// Values that fail to parse are ignored.
pub fn apply_environment_overrides(config: &mut BiotapConfig) {
    if let Ok(value) = env::var("BIOTAP_INTERACTIVE") {
        config.propagation.interactive = parse_flag(&value);
    }
    if let Ok(value) = env::var("BIOTAP_PAD_CACHE") {
        config.propagation.pad_cache = parse_flag(&value);
    }
    if let Ok(value) = env::var("BIOTAP_MAX_SUBTREE_PASSES") {
        if let Ok(passes) = value.parse::<usize>() {
            config.propagation.max_subtree_passes = passes;
        }
    }

    if let Ok(value) = env::var("BIOTAP_BACKGROUND_RELAYOUT") {
        config.relayout.background = parse_flag(&value);
    }

    if let Ok(value) = env::var("BIOTAP_LOG_LEVEL") {
        config.logging.level = value;
    }
    if let Ok(value) = env::var("BIOTAP_LOG_DIR") {
        config.logging.log_dir = PathBuf::from(value);
    }
    if let Ok(value) = env::var("BIOTAP_LOG_RETENTION_DAYS") {
        if let Ok(days) = value.parse::<u32>() {
            config.logging.retention_days = days;
        }
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - Map of CLI arguments (e.g., `{"log_level": "debug", "interactive": "true"}`)
pub fn apply_cli_overrides(config: &mut BiotapConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("interactive") {
        config.propagation.interactive = parse_flag(value);
    }
    if let Some(value) = cli_args.get("max_subtree_passes") {
        if let Ok(passes) = value.parse::<usize>() {
            config.propagation.max_subtree_passes = passes;
        }
    }
    if let Some(value) = cli_args.get("offset_x") {
        if let Ok(x) = value.parse::<f64>() {
            config.propagation.placement_offset_x = x;
        }
    }
    if let Some(value) = cli_args.get("offset_y") {
        if let Ok(y) = value.parse::<f64>() {
            config.propagation.placement_offset_y = y;
        }
    }

    if let Some(value) = cli_args.get("background_relayout") {
        config.relayout.background = parse_flag(value);
    }

    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
    if let Some(value) = cli_args.get("log_dir") {
        config.logging.log_dir = PathBuf::from(value);
    }
}
