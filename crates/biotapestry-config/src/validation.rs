// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Every violation is collected before reporting, so one run shows all of
//! them.

use crate::{BiotapConfig, ConfigError, ConfigResult};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    OutOfRange { field: String, reason: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange { field, reason } => {
                write!(f, "{} is out of range: {}", field, reason)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// Checks for:
/// - A positive subset pass limit
/// - Finite placement offsets
/// - A relayout progress slice inside `[0, 1]` with start before end
/// - A known log level
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every violation
pub fn validate_config(config: &BiotapConfig) -> ConfigResult<()> {
    let errors = collect_violations(config);
    if errors.is_empty() {
        return Ok(());
    }

    let error_messages = errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::ValidationError(format!(
        "Configuration validation failed:\n{}",
        error_messages
    )))
}

/// All violations found in `config`, in section order
pub fn collect_violations(config: &BiotapConfig) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();
    validate_propagation(config, &mut errors);
    validate_relayout(config, &mut errors);
    validate_logging(config, &mut errors);
    errors
}

fn validate_propagation(config: &BiotapConfig, errors: &mut Vec<ConfigValidationError>) {
    let propagation = &config.propagation;
    if propagation.max_subtree_passes == 0 {
        errors.push(ConfigValidationError::OutOfRange {
            field: "propagation.max_subtree_passes".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    for (field, value) in [
        ("propagation.placement_offset_x", propagation.placement_offset_x),
        ("propagation.placement_offset_y", propagation.placement_offset_y),
    ] {
        if !value.is_finite() {
            errors.push(ConfigValidationError::InvalidValue {
                field: field.to_string(),
                reason: "must be a finite number".to_string(),
            });
        }
    }
}

fn validate_relayout(config: &BiotapConfig, errors: &mut Vec<ConfigValidationError>) {
    let relayout = &config.relayout;
    for (field, value) in [
        ("relayout.progress_start", relayout.progress_start),
        ("relayout.progress_end", relayout.progress_end),
    ] {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ConfigValidationError::OutOfRange {
                field: field.to_string(),
                reason: "must be between 0.0 and 1.0".to_string(),
            });
        }
    }
    if relayout.progress_start > relayout.progress_end {
        errors.push(ConfigValidationError::InvalidValue {
            field: "relayout.progress_start".to_string(),
            reason: "must not exceed relayout.progress_end".to_string(),
        });
    }
}

fn validate_logging(config: &BiotapConfig, errors: &mut Vec<ConfigValidationError>) {
    let level = config.logging.level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: format!("must be one of {}", LOG_LEVELS.join(", ")),
        });
    }
    if !config.logging.log_dir.as_os_str().is_empty() && config.logging.retention_days == 0 {
        errors.push(ConfigValidationError::OutOfRange {
            field: "logging.retention_days".to_string(),
            reason: "must be at least 1 when file logging is enabled".to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_is_valid() {
        let config = BiotapConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zero_passes_rejected() {
        let mut config = BiotapConfig::default();
        config.propagation.max_subtree_passes = 0;

        let result = validate_config(&config);
        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("propagation.max_subtree_passes"));
        } else {
            panic!("expected a validation error");
        }
    }

    #[test]
    fn test_all_violations_collected() {
        let mut config = BiotapConfig::default();
        config.relayout.progress_start = 0.9;
        config.relayout.progress_end = 0.4;
        config.logging.level = "loud".to_string();
        config.propagation.placement_offset_y = f64::NAN;

        let errors = collect_violations(&config);
        assert_eq!(errors.len(), 3);
        let fields: Vec<String> = errors
            .iter()
            .map(|e| match e {
                ConfigValidationError::OutOfRange { field, .. }
                | ConfigValidationError::InvalidValue { field, .. } => field.clone(),
            })
            .collect();
        assert_eq!(
            fields,
            vec![
                "propagation.placement_offset_y",
                "relayout.progress_start",
                "logging.level"
            ]
        );
    }

    #[test]
    fn test_progress_slice_bounds() {
        let mut config = BiotapConfig::default();
        config.relayout.progress_end = 1.5;

        let result = validate_config(&config);
        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("relayout.progress_end"));
            assert!(msg.contains("0.0 and 1.0"));
        } else {
            panic!("expected a validation error");
        }
    }

    #[test]
    fn test_retention_required_for_file_logging() {
        let mut config = BiotapConfig::default();
        config.logging.retention_days = 0;
        assert!(validate_config(&config).is_ok());

        config.logging.log_dir = PathBuf::from("/var/log/biotap");
        assert!(validate_config(&config).is_err());
    }
}
