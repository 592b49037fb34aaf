// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

/*!
Genomic model elements: nodes, linkages, groups (regions), overlays, and the
genome models that own them.
*/

pub mod genome;
pub mod group;
pub mod linkage;
pub mod node;
pub mod overlay;

pub use genome::{DbGenome, GenomeInstance};
pub use group::Group;
pub use linkage::{LinkInstance, LinkSign, Linkage};
pub use node::{ActivityState, Node, NodeInstance, NodeKind, PadConstraints};
pub use overlay::{NetModule, NetworkOverlay};
