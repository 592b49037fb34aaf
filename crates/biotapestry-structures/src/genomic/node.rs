// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use crate::ids::{NodeId, NodeInstanceId};

/// Node kinds of the root genome. Each kind fixes its connection pad geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Gene,
    Box,
    Bubble,
    Diamond,
    Intercell,
    Slash,
    Bare,
    Tablet,
}

impl NodeKind {
    pub fn is_gene(&self) -> bool {
        matches!(self, NodeKind::Gene)
    }

    /// Pad geometry for this kind of node
    pub fn pad_constraints(&self) -> PadConstraints {
        match self {
            // Genes launch from a dedicated pad, so outbound and inbound
            // pads never share a namespace.
            NodeKind::Gene => PadConstraints {
                default_pad_count: 5,
                pad_increment: 1,
                shared_namespace: false,
                fixed_launch_pad: Some(0),
            },
            NodeKind::Box | NodeKind::Bare | NodeKind::Tablet => PadConstraints {
                default_pad_count: 4,
                pad_increment: 2,
                shared_namespace: true,
                fixed_launch_pad: None,
            },
            NodeKind::Bubble | NodeKind::Diamond => PadConstraints {
                default_pad_count: 4,
                pad_increment: 0,
                shared_namespace: true,
                fixed_launch_pad: None,
            },
            NodeKind::Intercell | NodeKind::Slash => PadConstraints {
                default_pad_count: 2,
                pad_increment: 0,
                shared_namespace: true,
                fixed_launch_pad: None,
            },
        }
    }
}

/// Connection pad geometry of a node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadConstraints {
    pub default_pad_count: usize,
    /// Step by which the pad count may grow; zero means the node cannot grow
    pub pad_increment: usize,
    /// Whether launch and landing pads are drawn from the same index space
    pub shared_namespace: bool,
    fixed_launch_pad: Option<usize>,
}

impl PadConstraints {
    /// Valid launch pads for a node currently carrying `pad_count` pads
    pub fn source_pads(&self, pad_count: usize) -> RangeInclusive<usize> {
        match self.fixed_launch_pad {
            Some(pad) => pad..=pad,
            None => 0..=pad_count.max(1) - 1,
        }
    }

    /// Valid landing pads for a node currently carrying `pad_count` pads
    pub fn landing_pads(&self, pad_count: usize) -> RangeInclusive<usize> {
        0..=pad_count.max(1) - 1
    }

    pub fn can_grow(&self) -> bool {
        self.pad_increment > 0
    }
}

/// Activity state of an instance-level node or link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActivityState {
    #[default]
    Active,
    Inactive,
    Vestigial,
    Variable,
}

impl ActivityState {
    pub fn is_active(&self) -> bool {
        !matches!(self, ActivityState::Inactive)
    }
}

/// Node of the root genome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub pad_count: usize,
}

impl Node {
    /// Create a node carrying the default pad count for its kind
    pub fn new(id: NodeId, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            pad_count: kind.pad_constraints().default_pad_count,
        }
    }

    pub fn gene(id: NodeId, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeKind::Gene)
    }

    pub fn is_gene(&self) -> bool {
        self.kind.is_gene()
    }
}

/// Per-model instance of a root node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInstance {
    pub id: NodeInstanceId,
    pub activity: ActivityState,
    pub pad_count: usize,
}

impl NodeInstance {
    pub fn new(id: NodeInstanceId, pad_count: usize) -> Self {
        Self {
            id,
            activity: ActivityState::Active,
            pad_count,
        }
    }

    pub fn base(&self) -> &NodeId {
        self.id.base()
    }
}
