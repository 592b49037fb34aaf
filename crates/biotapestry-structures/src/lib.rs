// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core data model for BioTapestry genome hierarchies.
//!
//! A root ("database") genome holds the ground-truth nodes and linkages.
//! Genome instances derived from it form a strict tree: root instances sit
//! directly under the root genome and subset instances under other instances.
//! Instance-level elements are keyed `<base>:<instance>`, regions ("groups")
//! partition each instance's nodes, and network overlays group nodes into
//! modules independently of regions.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod error;
pub mod genomic;
pub mod hierarchy;
pub mod ids;
pub mod layout;

pub use error::{StructureError, StructureResult};
pub use genomic::{
    ActivityState, DbGenome, GenomeInstance, Group, LinkInstance, LinkSign, Linkage, NetModule,
    NetworkOverlay, Node, NodeInstance, NodeKind, PadConstraints,
};
pub use hierarchy::GenomeHierarchy;
pub use ids::{
    GroupId, GroupTuple, InstanceIdx, LayoutId, LinkId, LinkInstanceId, ModelRef, ModuleId,
    NodeId, NodeInstanceId, OverlayId,
};
pub use layout::{Layout, NodePlacement, Orientation, Point};
