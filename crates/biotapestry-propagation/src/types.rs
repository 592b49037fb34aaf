// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

/*!
Core types for propagation operations.
*/

use biotapestry_structures::{GroupId, LinkId, NodeId, NodeInstanceId, StructureError};

use crate::group_resolution::TupleStatus;

/// Result type for propagation operations
pub type PropagationResult<T> = Result<T, PropagationError>;

/// Errors that can occur while propagating elements through the hierarchy
#[derive(Debug, thiserror::Error)]
pub enum PropagationError {
    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error("Node {node} kind mismatch: caller expected gene={expected_gene}")]
    NodeKindMismatch { node: NodeId, expected_gene: bool },

    #[error("Source node {node} does not match target model {model}")]
    SourceModelMismatch { node: String, model: String },

    #[error("Node {node} needs {needed} pads but its kind cannot exceed {capacity}")]
    PadCapacityExhausted {
        node: NodeId,
        needed: usize,
        capacity: usize,
    },

    #[error("No eligible group for node {node} in {model}")]
    NoEligibleGroup { node: NodeId, model: String },

    #[error("Ambiguous placement for {subject}: {options} candidates and no decision available")]
    Ambiguous { subject: String, options: usize },

    #[error("Endpoint {node} of link {link} has no instance in group {group} of {model}")]
    MissingEndpointInstance {
        link: LinkId,
        node: NodeId,
        group: GroupId,
        model: String,
    },

    #[error("Link resolution failed ({status:?}) after {nodes_propagated} node(s) were placed")]
    LinkResolution {
        status: TupleStatus,
        nodes_propagated: usize,
    },

    #[error("Node instance {0} lies outside every group")]
    Ungrouped(NodeInstanceId),

    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("Exit requested during relayout")]
    ExitRequested,

    #[error("Subtree propagation did not converge after {0} passes")]
    NotConverged(usize),

    #[error("Worker error: {0}")]
    Worker(String),
}

impl PropagationError {
    /// Whether this error came from user intervention rather than a failure
    pub fn is_user_abort(&self) -> bool {
        matches!(self, PropagationError::Cancelled | PropagationError::ExitRequested)
    }
}
