// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::ids::{ModuleId, NodeInstanceId, OverlayId};

/// Named grouping of nodes layered over a genome instance, independent of
/// the region partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetModule {
    pub id: ModuleId,
    pub name: String,
    members: BTreeSet<NodeInstanceId>,
}

impl NetModule {
    pub fn new(id: ModuleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            members: BTreeSet::new(),
        }
    }

    pub fn contains(&self, node: &NodeInstanceId) -> bool {
        self.members.contains(node)
    }

    pub fn members(&self) -> impl Iterator<Item = &NodeInstanceId> {
        self.members.iter()
    }

    /// Returns `false` when the node was already a member
    pub fn add_member(&mut self, node: NodeInstanceId) -> bool {
        self.members.insert(node)
    }

    pub fn remove_member(&mut self, node: &NodeInstanceId) -> bool {
        self.members.remove(node)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkOverlay {
    pub id: OverlayId,
    pub name: String,
    pub modules: BTreeMap<ModuleId, NetModule>,
}

impl NetworkOverlay {
    pub fn new(id: OverlayId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            modules: BTreeMap::new(),
        }
    }

    pub fn add_module(&mut self, module: NetModule) {
        self.modules.insert(module.id.clone(), module);
    }

    /// Modules holding `node`
    pub fn modules_containing<'a>(
        &'a self,
        node: &'a NodeInstanceId,
    ) -> impl Iterator<Item = &'a NetModule> + 'a {
        self.modules.values().filter(move |module| module.contains(node))
    }
}
