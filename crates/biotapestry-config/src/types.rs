// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Each struct maps to a section of `biotapestry_configuration.toml`.
//! Missing keys fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BiotapConfig {
    pub propagation: PropagationConfig,
    pub relayout: RelayoutConfig,
    pub logging: LoggingConfig,
}

/// Propagation command behavior
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Ask the user when a node could go into several regions
    pub interactive: bool,
    pub pad_cache: bool,
    /// Upper bound on subset passes for a single command
    pub max_subtree_passes: usize,
    pub placement_offset_x: f64,
    pub placement_offset_y: f64,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            interactive: false,
            pad_cache: true,
            max_subtree_passes: 64,
            placement_offset_x: 0.0,
            placement_offset_y: 0.0,
        }
    }
}

/// Background relayout after node insertion
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayoutConfig {
    pub background: bool,
    /// Fraction of the progress bar where relayout starts
    pub progress_start: f64,
    pub progress_end: f64,
    /// Log each instance commit at debug level
    pub log_checkpoints: bool,
}

impl Default for RelayoutConfig {
    fn default() -> Self {
        Self {
            background: true,
            progress_start: 0.0,
            progress_end: 1.0,
            log_checkpoints: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Root folder for per-run log folders; empty disables file logging
    pub log_dir: PathBuf,
    pub retention_days: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::new(),
            retention_days: 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: BiotapConfig = toml::from_str(
            r#"
            [relayout]
            background = false
            "#,
        )
        .unwrap();
        assert!(!config.relayout.background);
        assert_eq!(config.relayout.progress_end, 1.0);
        assert_eq!(config.propagation, PropagationConfig::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_json_round_trip_of_defaults() {
        let config = BiotapConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: BiotapConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
