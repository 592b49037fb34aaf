// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

//! # BioTapestry - hierarchical model propagation
//!
//! Moves nodes, links and regions between the levels of a BioTapestry genome
//! hierarchy: the root genome, its root instances, and their nested subsets.
//!
//! ## Feature Flags
//!
//! - **`config`** (default): settings from `biotapestry_configuration.toml`
//! - **`observability`** (default): logging setup and per-crate debug flags
//! - **`file-logging`**: per-run log folders with retention
//!
//! ## Usage
//!
//! ```rust,no_run
//! use biotapestry::prelude::*;
//!
//! let mut hierarchy = GenomeHierarchy::new(DbGenome::new("db", "Root"));
//! let vfa = hierarchy.add_root_instance("vfa", "VfA")?;
//!
//! let mut batch = PropagationBatch::new(PropagationContext::new(vfa), UndoCapture::new());
//! let request = BatchRequest {
//!     nodes: vec![NodeId::new("gene_a")],
//!     ..Default::default()
//! };
//! let report = batch.run(&mut hierarchy, &request, &mut NonInteractive, &mut NullEventSink)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: biotapestry-structures                     │
//! │  (genomes, instances, regions, layouts, overlays)       │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Algorithms: biotapestry-propagation                    │
//! │  (pads, node/link propagation, groups, walks, batches)  │
//! └─────────────────────────────────────────────────────────┘
//!                         ↑
//! ┌─────────────────────────────────────────────────────────┐
//! │  Ambient: biotapestry-config, biotapestry-observability │
//! └─────────────────────────────────────────────────────────┘
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use biotapestry_propagation as propagation;
pub use biotapestry_structures as structures;

#[cfg(feature = "config")]
pub use biotapestry_config as config;

#[cfg(feature = "observability")]
pub use biotapestry_observability as observability;

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::propagation::{
        insert_node_into_link, start_relayout, BatchReport, BatchRequest, DecisionProvider,
        InsertionRequest, ModelChangeEvent, ModelEventSink, NonInteractive, NullEventSink,
        PropagationBatch, PropagationContext, PropagationError, PropagationResult,
        PropagationSettings, TupleStatus, UndoCapture,
    };
    pub use crate::structures::{
        DbGenome, GenomeHierarchy, Group, GroupId, GroupTuple, InstanceIdx, LinkId, Linkage,
        ModelRef, Node, NodeId, NodeInstanceId, NodeKind, Point,
    };

    #[cfg(feature = "config")]
    pub use crate::config::{load_config, validate_config, BiotapConfig};

    #[cfg(feature = "config")]
    pub use crate::settings_from_config;
}

/// Propagation settings for a loaded configuration
#[cfg(feature = "config")]
pub fn settings_from_config(
    config: &biotapestry_config::BiotapConfig,
) -> biotapestry_propagation::PropagationSettings {
    let propagation = &config.propagation;
    let relayout = &config.relayout;
    biotapestry_propagation::PropagationSettings {
        interactive: propagation.interactive,
        use_pad_cache: propagation.pad_cache,
        max_subtree_passes: propagation.max_subtree_passes,
        placement_offset: biotapestry_structures::Point::new(
            propagation.placement_offset_x,
            propagation.placement_offset_y,
        ),
        background_relayout: relayout.background,
        relayout_progress_start: relayout.progress_start,
        relayout_progress_end: relayout.progress_end,
    }
}

/// Logging options for a loaded configuration; an empty log folder means
/// console only
#[cfg(all(feature = "config", feature = "observability"))]
pub fn logging_options_from_config(
    config: &biotapestry_config::BiotapConfig,
) -> biotapestry_observability::LoggingOptions {
    let logging = &config.logging;
    let log_dir = if logging.log_dir.as_os_str().is_empty() {
        None
    } else {
        Some(logging.log_dir.clone())
    };
    biotapestry_observability::LoggingOptions {
        level: logging.level.clone(),
        log_dir,
        retention_days: logging.retention_days,
        ..Default::default()
    }
}
