// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use crate::genomic::node::ActivityState;
use crate::ids::{LinkId, LinkInstanceId, NodeId, NodeInstanceId};

/// Regulatory sign of a linkage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LinkSign {
    Positive,
    Negative,
    #[default]
    Neutral,
}

/// Directed linkage of the root genome, from the launch pad of `source`
/// to a landing pad of `target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Linkage {
    pub id: LinkId,
    pub source: NodeId,
    pub target: NodeId,
    pub launch_pad: usize,
    pub landing_pad: usize,
    pub sign: LinkSign,
}

impl Linkage {
    pub fn new(
        id: LinkId,
        source: NodeId,
        target: NodeId,
        launch_pad: usize,
        landing_pad: usize,
    ) -> Self {
        Self {
            id,
            source,
            target,
            launch_pad,
            landing_pad,
            sign: LinkSign::default(),
        }
    }
}

/// Per-model instance of a root linkage.
///
/// Endpoints are stored as instance numbers of the root link's source and
/// target nodes; pads may diverge from the root link's pads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInstance {
    pub id: LinkInstanceId,
    pub source: NodeInstanceId,
    pub target: NodeInstanceId,
    pub launch_pad: usize,
    pub landing_pad: usize,
    pub activity: ActivityState,
}

impl LinkInstance {
    pub fn new(
        id: LinkInstanceId,
        source: NodeInstanceId,
        target: NodeInstanceId,
        launch_pad: usize,
        landing_pad: usize,
    ) -> Self {
        Self {
            id,
            source,
            target,
            launch_pad,
            landing_pad,
            activity: ActivityState::Active,
        }
    }

    pub fn base(&self) -> &LinkId {
        self.id.base()
    }

    /// Whether the link touches `node` on either end
    pub fn touches(&self, node: &NodeInstanceId) -> bool {
        &self.source == node || &self.target == node
    }
}
