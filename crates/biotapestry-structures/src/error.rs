// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::ids::{GroupId, InstanceIdx, LinkId, LinkInstanceId, NodeId, NodeInstanceId};

/// Errors raised by the data model when a structural invariant would be broken.
///
/// These are programming errors from the point of view of the propagation
/// layer: callers are expected to check preconditions, and a returned
/// `StructureError` is never retried.
///
/// # Examples
/// ```
/// use biotapestry_structures::{GroupId, StructureError};
///
/// let err = StructureError::MissingGroup {
///     group: GroupId::new("region_a"),
///     model: "vfa".into(),
/// };
/// assert!(err.to_string().contains("region_a"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructureError {
    #[error("Unknown genome instance index {0}")]
    UnknownInstance(InstanceIdx),

    #[error("Unknown root node {0}")]
    UnknownNode(NodeId),

    #[error("Unknown root link {0}")]
    UnknownLink(LinkId),

    #[error("Node instance {instance} not present in model {model}")]
    MissingNodeInstance {
        instance: NodeInstanceId,
        model: String,
    },

    #[error("Link instance {instance} not present in model {model}")]
    MissingLinkInstance {
        instance: LinkInstanceId,
        model: String,
    },

    #[error("Group {group} not present in model {model}")]
    MissingGroup { group: GroupId, model: String },

    #[error("Element {0} already exists")]
    DuplicateElement(String),

    #[error("Node instance {node} is already in main group {existing}, cannot join {requested}")]
    DuplicateGroupMembership {
        node: NodeInstanceId,
        existing: GroupId,
        requested: GroupId,
    },

    #[error("Subgroup {subgroup} requires membership in parent group {parent} first")]
    SubgroupWithoutParentMembership { subgroup: GroupId, parent: GroupId },

    #[error("Model {0} has no parent model")]
    NoParentModel(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),
}

/// Result type for data model operations
pub type StructureResult<T> = Result<T, StructureError>;
