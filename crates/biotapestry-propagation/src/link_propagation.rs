// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

/*!
Link propagation: copying a linkage one level down the hierarchy.

In a root instance the link is rebuilt from the root linkage between the
endpoint instances living in the tuple's groups, with pads chosen by the
allocator. In a subset the parent's link instance is copied verbatim.
*/

use tracing::{debug, info};

use biotapestry_structures::{
    GenomeHierarchy, GroupId, GroupTuple, InstanceIdx, LinkId, LinkInstance, LinkInstanceId,
    ModelRef, NodeId, NodeInstanceId, StructureError,
};

use crate::cache::PropagationCaches;
use crate::pads::{find_landing_pad, find_source_pad, reset_pad_namespace};
use crate::types::{PropagationError, PropagationResult};
use crate::undo::{ChangeRecord, UndoCapture};

/// Existing instance of `base` connecting `source` to `target` in `model`
pub fn find_link_instance(
    hierarchy: &GenomeHierarchy,
    model: InstanceIdx,
    base: &LinkId,
    source: &NodeInstanceId,
    target: &NodeInstanceId,
) -> PropagationResult<Option<LinkInstanceId>> {
    Ok(hierarchy
        .instance(model)?
        .links_of_base(base)
        .find(|link| &link.source == source && &link.target == target)
        .map(|link| link.id.clone()))
}

fn endpoint_in_group(
    hierarchy: &GenomeHierarchy,
    model: InstanceIdx,
    link: &LinkId,
    node: &NodeId,
    group: &GroupId,
    caches: &mut PropagationCaches,
) -> PropagationResult<NodeInstanceId> {
    caches
        .node_groups
        .lookup(hierarchy, model, node, group)?
        .ok_or_else(|| PropagationError::MissingEndpointInstance {
            link: link.clone(),
            node: node.clone(),
            group: group.clone(),
            model: hierarchy.model_name(ModelRef::Instance(model)),
        })
}

/// Add an instance of root link `source_link` to `target` between the
/// endpoints living in `tuple`'s groups (local ids of `target`).
///
/// Returns the existing instance when the endpoints are already connected.
pub fn propagate_linkage(
    hierarchy: &mut GenomeHierarchy,
    target: ModelRef,
    source_link: &LinkId,
    tuple: &GroupTuple,
    caches: &mut PropagationCaches,
    changes: &UndoCapture,
) -> PropagationResult<LinkInstanceId> {
    let ModelRef::Instance(model) = target else {
        return Err(StructureError::NoParentModel(hierarchy.root().id.clone()).into());
    };

    let root_link = hierarchy.root().link(source_link)?.clone();
    let source = endpoint_in_group(
        hierarchy,
        model,
        source_link,
        &root_link.source,
        &tuple.source,
        caches,
    )?;
    let target_node = endpoint_in_group(
        hierarchy,
        model,
        source_link,
        &root_link.target,
        &tuple.target,
        caches,
    )?;

    let existing = find_link_instance(hierarchy, model, source_link, &source, &target_node)?;
    if let Some(existing) = existing {
        return Ok(existing);
    }

    let new_link = match hierarchy.instance(model)?.parent() {
        None => {
            let free =
                find_source_pad(hierarchy, model, &source, root_link.launch_pad, &mut caches.pads)?;
            let launch = match free {
                Some(pad) => pad,
                None => {
                    info!(target: "biotapestry-propagation",
                        "No launch pad left on {} in {}, reverting its pads",
                        source, hierarchy.model_name(target));
                    let pads = &mut caches.pads;
                    reset_pad_namespace(hierarchy, model, &root_link.source, pads, changes)?;
                    root_link.launch_pad
                }
            };
            caches.pads.note_launch(model, &source, launch);
            let landing = find_landing_pad(
                hierarchy,
                model,
                &target_node,
                root_link.landing_pad,
                &mut caches.pads,
            )?;
            let number = hierarchy.instance(model)?.next_link_instance_number(source_link);
            LinkInstance::new(
                LinkInstanceId::new(source_link.clone(), number),
                source.clone(),
                target_node.clone(),
                launch,
                landing,
            )
        }
        Some(parent) => {
            let parent_copy =
                find_link_instance(hierarchy, parent, source_link, &source, &target_node)?
                    .ok_or_else(|| StructureError::MissingLinkInstance {
                        instance: LinkInstanceId::new(source_link.clone(), 0),
                        model: hierarchy.model_name(ModelRef::Instance(parent)),
                    })?;
            hierarchy.instance(parent)?.link(&parent_copy)?.clone()
        }
    };

    let id = new_link.id.clone();
    hierarchy.instance_mut(model)?.add_link(new_link.clone())?;
    caches.pads.record_link(model, &new_link);
    changes.record(ChangeRecord::LinkInstanceAdded {
        model,
        link: new_link,
    });
    debug!(target: "biotapestry-propagation",
        "Propagated link {} into {} {}", id, hierarchy.model_name(target), tuple);
    Ok(id)
}

/// Copy an already identified link instance of `model`'s parent into `model`.
///
/// Both endpoints must be present in `model`.
pub fn copy_link_from_parent(
    hierarchy: &mut GenomeHierarchy,
    model: InstanceIdx,
    link: &LinkInstanceId,
    caches: &mut PropagationCaches,
    changes: &UndoCapture,
) -> PropagationResult<bool> {
    if hierarchy.instance(model)?.contains_link(link) {
        return Ok(false);
    }
    let parent = hierarchy
        .instance(model)?
        .parent()
        .ok_or_else(|| {
            StructureError::NoParentModel(hierarchy.model_name(ModelRef::Instance(model)))
        })?;
    let copy = hierarchy.instance(parent)?.link(link)?.clone();
    hierarchy.instance_mut(model)?.add_link(copy.clone())?;
    caches.pads.record_link(model, &copy);
    changes.record(ChangeRecord::LinkInstanceAdded { model, link: copy });
    Ok(true)
}
