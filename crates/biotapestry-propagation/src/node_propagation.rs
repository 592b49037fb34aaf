// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

/*!
Node propagation: copying a node one level down the hierarchy.

A root-instance target receives a fresh instance of the root node under the
next free instance number. A subset target receives the parent's instance
under the same composite id. Either way the new instance joins one main
group of the target.
*/

use tracing::{debug, trace};

use biotapestry_structures::{
    GenomeHierarchy, GroupId, InstanceIdx, LayoutId, ModelRef, Node, NodeId, NodeInstance,
    NodeInstanceId, NodeKind, NodePlacement, Point, StructureError,
};

use crate::cache::PropagationCaches;
use crate::types::{PropagationError, PropagationResult};
use crate::undo::{ChangeRecord, UndoCapture};

/// Where the node being propagated comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceNode {
    /// A root genome node, copied into a root instance
    Root(NodeId),
    /// A node instance of the target's parent, copied into a subset
    Instance(NodeInstanceId),
}

impl SourceNode {
    pub fn base(&self) -> &NodeId {
        match self {
            SourceNode::Root(id) => id,
            SourceNode::Instance(id) => id.base(),
        }
    }
}

/// Layout placement to copy alongside the node
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementOffset {
    /// Layout holding the source node's placement
    pub source_layout: LayoutId,
    pub offset: Point,
}

/// Arguments of a single node propagation
#[derive(Debug, Clone)]
pub struct NodeRequest<'a> {
    /// Whether the caller expects a gene; checked against the root node
    pub is_gene: bool,
    pub target: ModelRef,
    pub source: &'a SourceNode,
    /// Local id of the target's group receiving the node
    pub target_group: &'a GroupId,
    pub placement: Option<&'a PlacementOffset>,
}

/// Copy a node into `request.target` and place it into the target group.
///
/// Returns the composite id of the new instance. Fails when the target is
/// the root genome, when the group is missing, or when the source does not
/// belong to the target's parent.
pub fn propagate_node(
    hierarchy: &mut GenomeHierarchy,
    request: &NodeRequest<'_>,
    caches: &mut PropagationCaches,
    changes: &UndoCapture,
) -> PropagationResult<NodeInstanceId> {
    let target = match request.target {
        ModelRef::Root => {
            return Err(StructureError::NoParentModel(hierarchy.root().id.clone()).into());
        }
        ModelRef::Instance(idx) => idx,
    };

    let base = request.source.base();
    let root_node = hierarchy.root().node(base)?;
    if root_node.is_gene() != request.is_gene {
        return Err(PropagationError::NodeKindMismatch {
            node: base.clone(),
            expected_gene: request.is_gene,
        });
    }
    let root_pad_count = root_node.pad_count;

    let instance = hierarchy.instance(target)?;
    instance.group(request.target_group)?;

    let new_node = match (instance.parent(), request.source) {
        (None, SourceNode::Root(base)) => {
            let number = instance.next_node_instance_number(base);
            NodeInstance::new(NodeInstanceId::new(base.clone(), number), root_pad_count)
        }
        (Some(parent), SourceNode::Instance(source_id)) => {
            hierarchy.instance(parent)?.node(source_id)?.clone()
        }
        (_, source) => {
            return Err(PropagationError::SourceModelMismatch {
                node: source.base().to_string(),
                model: instance.id.clone(),
            });
        }
    };
    let new_id = new_node.id.clone();

    let instance = hierarchy.instance_mut(target)?;
    instance.add_node(new_node.clone())?;
    changes.record(ChangeRecord::NodeInstanceAdded {
        model: target,
        node: new_node,
    });
    instance.add_to_group(&new_id, request.target_group)?;
    changes.record(ChangeRecord::GroupMembershipAdded {
        model: target,
        group: request.target_group.clone(),
        node: new_id.clone(),
    });
    caches.node_groups.record(target, request.target_group, &new_id);

    copy_subgroup_memberships(hierarchy, target, &new_id, request.target_group, changes)?;

    let is_root_instance = hierarchy.instance(target)?.is_root_instance();
    if let (Some(placement), true) = (request.placement, is_root_instance) {
        let target_layout = hierarchy.layout_id_for(ModelRef::Instance(target))?;
        place_node(
            hierarchy,
            &placement.source_layout,
            base.as_str(),
            &target_layout,
            &new_id.to_string(),
            placement.offset,
            changes,
        )?;
    }

    debug!(target: "biotapestry-propagation",
        "Propagated node {} into {} group {}",
        new_id, hierarchy.model_name(request.target), request.target_group);
    Ok(new_id)
}

/// Mirror the parent's subgroup memberships of `node` when the subset already
/// holds those subgroups
fn copy_subgroup_memberships(
    hierarchy: &mut GenomeHierarchy,
    target: InstanceIdx,
    node: &NodeInstanceId,
    main_group: &GroupId,
    changes: &UndoCapture,
) -> PropagationResult<()> {
    let Some(parent) = hierarchy.instance(target)?.parent() else {
        return Ok(());
    };
    let target_instance = hierarchy.instance(target)?;
    let subgroups: Vec<GroupId> = hierarchy
        .instance(parent)?
        .groups()
        .filter(|group| !group.is_main() && group.contains(node))
        .map(|group| target_instance.local_group_id(&group.id))
        .filter(|local| {
            target_instance
                .group(local)
                .map(|group| group.parent.as_ref() == Some(main_group))
                .unwrap_or(false)
        })
        .collect();

    let instance = hierarchy.instance_mut(target)?;
    for subgroup in subgroups {
        if instance.add_to_group(node, &subgroup)? {
            changes.record(ChangeRecord::GroupMembershipAdded {
                model: target,
                group: subgroup,
                node: node.clone(),
            });
        }
    }
    Ok(())
}

/// Copy a node placement from one layout to another, shifted by `offset`.
///
/// Does nothing when the target layout already places `target_key`. A source
/// without a placement yields a default placement at `offset`.
pub fn place_node(
    hierarchy: &mut GenomeHierarchy,
    source_layout: &LayoutId,
    source_key: &str,
    target_layout: &LayoutId,
    target_key: &str,
    offset: Point,
    changes: &UndoCapture,
) -> PropagationResult<Option<NodePlacement>> {
    let source = hierarchy
        .layout(source_layout)
        .ok_or_else(|| StructureError::InvalidId(source_layout.to_string()))?
        .placement(source_key)
        .cloned();

    let layout = hierarchy
        .layout_mut(target_layout)
        .ok_or_else(|| StructureError::InvalidId(target_layout.to_string()))?;
    if layout.placement(target_key).is_some() {
        return Ok(None);
    }

    let placement = match source {
        Some(mut placement) => {
            placement.position = placement.position + offset;
            placement
        }
        None => NodePlacement::at(offset),
    };
    layout.set_placement(target_key, placement.clone());
    changes.record(ChangeRecord::PlacementSet {
        layout: target_layout.clone(),
        node_key: target_key.to_string(),
        before: None,
        after: placement.clone(),
    });
    trace!(target: "biotapestry-propagation", "Placed {} in layout {}", target_key, target_layout);
    Ok(Some(placement))
}

/// Add a brand-new node to the root genome, optionally placing it in the
/// root layout.
pub fn introduce_node(
    hierarchy: &mut GenomeHierarchy,
    node: Node,
    position: Option<Point>,
    changes: &UndoCapture,
) -> PropagationResult<()> {
    let key = node.id.to_string();
    hierarchy.root_mut().add_node(node.clone())?;
    changes.record(ChangeRecord::RootNodeAdded { node });

    if let Some(position) = position {
        let layout_id = hierarchy.layout_id_for(ModelRef::Root)?;
        let placement = NodePlacement::at(position);
        let before = hierarchy
            .layout_for_mut(ModelRef::Root)?
            .set_placement(key.clone(), placement.clone());
        changes.record(ChangeRecord::PlacementSet {
            layout: layout_id,
            node_key: key,
            before,
            after: placement,
        });
    }
    Ok(())
}

/// Pull a node that exists only in a root instance up into the root genome.
///
/// Returns `Ok(false)` when the root genome already holds the base node.
pub fn propagate_node_up(
    hierarchy: &mut GenomeHierarchy,
    model: InstanceIdx,
    node: &NodeInstanceId,
    kind: NodeKind,
    name: &str,
    changes: &UndoCapture,
) -> PropagationResult<bool> {
    let instance = hierarchy.instance(model)?;
    if !instance.is_root_instance() {
        return Err(PropagationError::SourceModelMismatch {
            node: node.to_string(),
            model: instance.id.clone(),
        });
    }
    if hierarchy.root().contains_node(node.base()) {
        return Ok(false);
    }

    let mut root_node = Node::new(node.base().clone(), name, kind);
    root_node.pad_count = instance.node(node)?.pad_count;
    let position = hierarchy
        .layout_for(ModelRef::Instance(model))?
        .placement(&node.to_string())
        .map(|placement| placement.position);

    introduce_node(hierarchy, root_node, position, changes)?;
    debug!(target: "biotapestry-propagation",
        "Pulled node {} up into the root genome", node.base());
    Ok(true)
}
