// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

/*!
Root genome and genome instances.

The root ("database") genome is the single ground-truth model. Every other
model is a [`GenomeInstance`] derived from it: a root instance directly under
the root genome, or a subset instance under another instance. Subset
instances hold subsets of their parent's elements under the same composite
ids.
*/

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{StructureError, StructureResult};
use crate::genomic::group::Group;
use crate::genomic::linkage::{LinkInstance, Linkage};
use crate::genomic::node::{Node, NodeInstance};
use crate::genomic::overlay::NetworkOverlay;
use crate::ids::{
    GroupId, InstanceIdx, LinkId, LinkInstanceId, NodeId, NodeInstanceId, OverlayId,
};

/// The root genome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbGenome {
    pub id: String,
    pub name: String,
    nodes: BTreeMap<NodeId, Node>,
    links: BTreeMap<LinkId, Linkage>,
}

impl DbGenome {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: BTreeMap::new(),
            links: BTreeMap::new(),
        }
    }

    pub fn add_node(&mut self, node: Node) -> StructureResult<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(StructureError::DuplicateElement(node.id.to_string()));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub fn node(&self, id: &NodeId) -> StructureResult<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| StructureError::UnknownNode(id.clone()))
    }

    pub fn node_mut(&mut self, id: &NodeId) -> StructureResult<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| StructureError::UnknownNode(id.clone()))
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Add a linkage; both endpoints must already exist
    pub fn add_link(&mut self, link: Linkage) -> StructureResult<()> {
        if self.links.contains_key(&link.id) {
            return Err(StructureError::DuplicateElement(link.id.to_string()));
        }
        self.node(&link.source)?;
        self.node(&link.target)?;
        self.links.insert(link.id.clone(), link);
        Ok(())
    }

    pub fn link(&self, id: &LinkId) -> StructureResult<&Linkage> {
        self.links
            .get(id)
            .ok_or_else(|| StructureError::UnknownLink(id.clone()))
    }

    pub fn links(&self) -> impl Iterator<Item = &Linkage> {
        self.links.values()
    }

    pub fn remove_link(&mut self, id: &LinkId) -> StructureResult<Linkage> {
        self.links
            .remove(id)
            .ok_or_else(|| StructureError::UnknownLink(id.clone()))
    }
}

/// A root instance (parent is the root genome) or subset instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomeInstance {
    pub id: String,
    pub name: String,
    parent: Option<InstanceIdx>,
    generation: u32,
    nodes: BTreeMap<NodeInstanceId, NodeInstance>,
    links: BTreeMap<LinkInstanceId, LinkInstance>,
    groups: BTreeMap<GroupId, Group>,
    pub overlays: BTreeMap<OverlayId, NetworkOverlay>,
}

impl GenomeInstance {
    pub(crate) fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        parent: Option<InstanceIdx>,
        generation: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent,
            generation,
            nodes: BTreeMap::new(),
            links: BTreeMap::new(),
            groups: BTreeMap::new(),
            overlays: BTreeMap::new(),
        }
    }

    /// Parent instance; `None` for a root instance, whose parent is the root genome
    pub fn parent(&self) -> Option<InstanceIdx> {
        self.parent
    }

    pub fn is_root_instance(&self) -> bool {
        self.parent.is_none()
    }

    /// Number of levels below the root instance (0 for the root instance itself)
    pub fn generation(&self) -> u32 {
        self.generation
    }

    //region Nodes

    pub fn node(&self, id: &NodeInstanceId) -> StructureResult<&NodeInstance> {
        self.nodes
            .get(id)
            .ok_or_else(|| StructureError::MissingNodeInstance {
                instance: id.clone(),
                model: self.id.clone(),
            })
    }

    pub fn node_mut(&mut self, id: &NodeInstanceId) -> StructureResult<&mut NodeInstance> {
        let model = self.id.clone();
        self.nodes
            .get_mut(id)
            .ok_or_else(|| StructureError::MissingNodeInstance {
                instance: id.clone(),
                model,
            })
    }

    pub fn contains_node(&self, id: &NodeInstanceId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeInstance> {
        self.nodes.values()
    }

    /// All instances of a base node in this model
    pub fn nodes_of_base<'a>(
        &'a self,
        base: &'a NodeId,
    ) -> impl Iterator<Item = &'a NodeInstance> + 'a {
        self.nodes.values().filter(move |node| node.base() == base)
    }

    pub fn add_node(&mut self, node: NodeInstance) -> StructureResult<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(StructureError::DuplicateElement(node.id.to_string()));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Next free instance number for `base`
    pub fn next_node_instance_number(&self, base: &NodeId) -> u32 {
        self.nodes_of_base(base)
            .map(|node| node.id.instance() + 1)
            .max()
            .unwrap_or(0)
    }

    //endregion

    //region Links

    pub fn link(&self, id: &LinkInstanceId) -> StructureResult<&LinkInstance> {
        self.links
            .get(id)
            .ok_or_else(|| StructureError::MissingLinkInstance {
                instance: id.clone(),
                model: self.id.clone(),
            })
    }

    pub fn link_mut(&mut self, id: &LinkInstanceId) -> StructureResult<&mut LinkInstance> {
        let model = self.id.clone();
        self.links
            .get_mut(id)
            .ok_or_else(|| StructureError::MissingLinkInstance {
                instance: id.clone(),
                model,
            })
    }

    pub fn contains_link(&self, id: &LinkInstanceId) -> bool {
        self.links.contains_key(id)
    }

    pub fn links(&self) -> impl Iterator<Item = &LinkInstance> {
        self.links.values()
    }

    pub fn links_of_base<'a>(
        &'a self,
        base: &'a LinkId,
    ) -> impl Iterator<Item = &'a LinkInstance> + 'a {
        self.links.values().filter(move |link| link.base() == base)
    }

    pub fn links_touching<'a>(
        &'a self,
        node: &'a NodeInstanceId,
    ) -> impl Iterator<Item = &'a LinkInstance> + 'a {
        self.links.values().filter(move |link| link.touches(node))
    }

    /// Add a link instance; both endpoint instances must be present
    pub fn add_link(&mut self, link: LinkInstance) -> StructureResult<()> {
        if self.links.contains_key(&link.id) {
            return Err(StructureError::DuplicateElement(link.id.to_string()));
        }
        self.node(&link.source)?;
        self.node(&link.target)?;
        self.links.insert(link.id.clone(), link);
        Ok(())
    }

    pub fn remove_link(&mut self, id: &LinkInstanceId) -> StructureResult<LinkInstance> {
        let model = self.id.clone();
        self.links
            .remove(id)
            .ok_or_else(|| StructureError::MissingLinkInstance {
                instance: id.clone(),
                model,
            })
    }

    pub fn next_link_instance_number(&self, base: &LinkId) -> u32 {
        self.links_of_base(base)
            .map(|link| link.id.instance() + 1)
            .max()
            .unwrap_or(0)
    }

    //endregion

    //region Groups

    pub fn group(&self, id: &GroupId) -> StructureResult<&Group> {
        self.groups
            .get(id)
            .ok_or_else(|| StructureError::MissingGroup {
                group: id.clone(),
                model: self.id.clone(),
            })
    }

    pub fn contains_group(&self, id: &GroupId) -> bool {
        self.groups.contains_key(id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn main_groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values().filter(|group| group.is_main())
    }

    /// Id this model uses for the group whose base id is `base`
    pub fn local_group_id(&self, base: &GroupId) -> GroupId {
        GroupId::inherited(base, self.generation)
    }

    /// Add a group; a subgroup's parent must already exist
    pub fn add_group(&mut self, group: Group) -> StructureResult<()> {
        if self.groups.contains_key(&group.id) {
            return Err(StructureError::DuplicateElement(group.id.to_string()));
        }
        if let Some(parent) = &group.parent {
            self.group(parent)?;
        }
        self.groups.insert(group.id.clone(), group);
        Ok(())
    }

    /// Main group holding `node`, if any
    pub fn main_group_of(&self, node: &NodeInstanceId) -> Option<&GroupId> {
        self.main_groups()
            .find(|group| group.contains(node))
            .map(|group| &group.id)
    }

    /// Instance of `base` living in main group `group`
    pub fn instance_in_group(&self, base: &NodeId, group: &GroupId) -> Option<&NodeInstanceId> {
        self.groups
            .get(group)
            .and_then(|group| group.instance_of(base))
    }

    /// Register `node` as a member of `group`.
    ///
    /// Returns `Ok(false)` when the membership already exists. A node may be
    /// in only one main group; subgroup membership requires parent membership.
    pub fn add_to_group(
        &mut self,
        node: &NodeInstanceId,
        group: &GroupId,
    ) -> StructureResult<bool> {
        self.node(node)?;
        let target = self.group(group)?;
        if target.contains(node) {
            return Ok(false);
        }
        match &target.parent {
            None => {
                if let Some(existing) = self.main_group_of(node) {
                    return Err(StructureError::DuplicateGroupMembership {
                        node: node.clone(),
                        existing: existing.clone(),
                        requested: group.clone(),
                    });
                }
            }
            Some(parent) => {
                if !self.group(parent)?.contains(node) {
                    return Err(StructureError::SubgroupWithoutParentMembership {
                        subgroup: group.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }
        let inserted = self
            .groups
            .get_mut(group)
            .map(|target| target.insert_member(node.clone()))
            .unwrap_or(false);
        Ok(inserted)
    }

    /// Drop `node` from `group`; returns whether it was a member
    pub fn remove_from_group(
        &mut self,
        node: &NodeInstanceId,
        group: &GroupId,
    ) -> StructureResult<bool> {
        let model = self.id.clone();
        let target = self
            .groups
            .get_mut(group)
            .ok_or_else(|| StructureError::MissingGroup {
                group: group.clone(),
                model,
            })?;
        Ok(target.remove_member(node))
    }

    //endregion
}
