// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

//! # biotapestry-observability
//!
//! Logging setup shared by the BioTapestry crates, with per-crate debug
//! flag support.
//!
//! ## Features
//! - `file-logging`: per-run log folders with retention

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;
pub mod retention;

pub use cli::*;
pub use init::*;
pub use retention::cleanup_old_logs;

/// Known crate names for debug flags; these double as tracing targets
pub const KNOWN_CRATES: &[&str] = &[
    "biotapestry",
    "biotapestry-structures",
    "biotapestry-propagation",
    "biotapestry-config",
];
