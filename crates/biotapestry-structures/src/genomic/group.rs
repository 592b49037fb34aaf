// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ids::{GroupId, NodeId, NodeInstanceId};

/// A region of a genome instance.
///
/// Main groups partition the instance's nodes. Subgroups (`parent` set) hold
/// secondary memberships of nodes that already belong to the parent group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub parent: Option<GroupId>,
    members: BTreeSet<NodeInstanceId>,
}

impl Group {
    pub fn new(id: GroupId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            parent: None,
            members: BTreeSet::new(),
        }
    }

    pub fn subgroup(id: GroupId, name: impl Into<String>, parent: GroupId) -> Self {
        Self {
            id,
            name: name.into(),
            parent: Some(parent),
            members: BTreeSet::new(),
        }
    }

    /// Empty copy of this group as inherited one generation down
    pub fn inherit(&self, generation: u32) -> Self {
        Self {
            id: GroupId::inherited(&self.id, generation),
            name: self.name.clone(),
            parent: self
                .parent
                .as_ref()
                .map(|parent| GroupId::inherited(parent, generation)),
            members: BTreeSet::new(),
        }
    }

    pub fn is_main(&self) -> bool {
        self.parent.is_none()
    }

    pub fn contains(&self, node: &NodeInstanceId) -> bool {
        self.members.contains(node)
    }

    /// Instance of base node `base` living in this group, if any
    pub fn instance_of(&self, base: &NodeId) -> Option<&NodeInstanceId> {
        self.members.iter().find(|member| member.base() == base)
    }

    pub fn members(&self) -> impl Iterator<Item = &NodeInstanceId> {
        self.members.iter()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub(crate) fn insert_member(&mut self, node: NodeInstanceId) -> bool {
        self.members.insert(node)
    }

    pub(crate) fn remove_member(&mut self, node: &NodeInstanceId) -> bool {
        self.members.remove(node)
    }
}
