// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

/*!
Pad allocation for link instances.

When a link is copied into an instance its endpoints may already carry other
links on the pads the root link uses. The allocator picks pads that keep
each node's launch pad apart from its landing pads when the node's kind puts
both in one index space. Kinds with separate spaces (genes) keep the root
link's pads unchanged.

Failure to find any launch pad is not an error: the caller resets the
node's pads to the root configuration instead, see [`reset_pad_namespace`].
*/

use std::collections::BTreeSet;
use tracing::{debug, warn};

use biotapestry_structures::{
    GenomeHierarchy, InstanceIdx, NodeId, NodeInstanceId, NodeKind,
};

use crate::cache::PadCache;
use crate::types::{PropagationError, PropagationResult};
use crate::undo::{ChangeRecord, UndoCapture};

fn kind_and_pad_count(
    hierarchy: &GenomeHierarchy,
    model: InstanceIdx,
    node: &NodeInstanceId,
) -> PropagationResult<(NodeKind, usize)> {
    let kind = hierarchy.root().node(node.base())?.kind;
    let pad_count = hierarchy.instance(model)?.node(node)?.pad_count;
    Ok((kind, pad_count))
}

/// Choose a launch pad on `node` for a new link instance in `model`.
///
/// Returns `None` when every launch candidate collides with a landing pad.
pub fn find_source_pad(
    hierarchy: &GenomeHierarchy,
    model: InstanceIdx,
    node: &NodeInstanceId,
    parent_launch_pad: usize,
    cache: &mut PadCache,
) -> PropagationResult<Option<usize>> {
    let (kind, pad_count) = kind_and_pad_count(hierarchy, model, node)?;
    let constraints = kind.pad_constraints();
    if !constraints.shared_namespace {
        return Ok(Some(parent_launch_pad));
    }

    let usage = cache.usage(hierarchy, model, node)?;
    if let Some(launch) = usage.launch {
        // Outbound links of a node share one launch pad
        return Ok(Some(launch));
    }

    let candidates: BTreeSet<usize> = constraints
        .source_pads(pad_count)
        .filter(|pad| !usage.landings.contains(pad))
        .collect();
    if candidates.contains(&parent_launch_pad) {
        return Ok(Some(parent_launch_pad));
    }
    Ok(candidates.first().copied())
}

/// Choose a landing pad on `node` for a new link instance in `model`.
///
/// Never fails for lack of pads: when the landing range minus the launch pad
/// is empty it falls back to pad 0, or pad 1 when 0 is the launch pad.
pub fn find_landing_pad(
    hierarchy: &GenomeHierarchy,
    model: InstanceIdx,
    node: &NodeInstanceId,
    parent_landing_pad: usize,
    cache: &mut PadCache,
) -> PropagationResult<usize> {
    let (kind, pad_count) = kind_and_pad_count(hierarchy, model, node)?;
    let constraints = kind.pad_constraints();
    if !constraints.shared_namespace {
        return Ok(parent_landing_pad);
    }

    let usage = cache.usage(hierarchy, model, node)?;
    let candidates: BTreeSet<usize> = constraints
        .landing_pads(pad_count)
        .filter(|pad| Some(*pad) != usage.launch)
        .collect();

    if candidates.contains(&parent_landing_pad) {
        return Ok(parent_landing_pad);
    }
    if let Some(unused) = candidates.iter().find(|pad| !usage.landings.contains(pad)) {
        return Ok(*unused);
    }
    if let Some(shared) = candidates.first() {
        return Ok(*shared);
    }
    Ok(if usage.launch == Some(0) { 1 } else { 0 })
}

/// Revert the pads of every link instance touching `node` in `root_instance`
/// and its subsets to the pads of the corresponding root links.
///
/// Only the pad at `node`'s end of each link is reverted. Returns how many
/// link instances changed.
pub fn reset_pad_namespace(
    hierarchy: &mut GenomeHierarchy,
    root_instance: InstanceIdx,
    node: &NodeId,
    cache: &mut PadCache,
    changes: &UndoCapture,
) -> PropagationResult<usize> {
    let mut models = vec![root_instance];
    models.extend(hierarchy.descendants_of(root_instance));

    let mut reverted = 0;
    for model in models {
        let mut updates = Vec::new();
        for link in hierarchy.instance(model)?.links() {
            let touches_source = link.source.base() == node;
            let touches_target = link.target.base() == node;
            if !touches_source && !touches_target {
                continue;
            }
            let root_link = hierarchy.root().link(link.base())?;
            let launch = if touches_source { root_link.launch_pad } else { link.launch_pad };
            let landing = if touches_target { root_link.landing_pad } else { link.landing_pad };
            if (launch, landing) != (link.launch_pad, link.landing_pad) {
                let before = (link.launch_pad, link.landing_pad);
                updates.push((link.id.clone(), before, (launch, landing)));
            }
        }

        let instance = hierarchy.instance_mut(model)?;
        for (link_id, before, after) in updates {
            let link = instance.link_mut(&link_id)?;
            link.launch_pad = after.0;
            link.landing_pad = after.1;
            changes.record(ChangeRecord::LinkPadsReplaced {
                model,
                link: link_id,
                before,
                after,
            });
            reverted += 1;
        }
    }

    cache.invalidate_base(node);
    warn!(target: "biotapestry-propagation",
        "Pad namespace for node {} reset to root configuration ({} link instances reverted)",
        node, reverted);
    Ok(reverted)
}

/// Pad count a node of `kind` must carry to offer `needed` pads.
///
/// Growth goes in whole increments above the default. `None` means the kind
/// cannot reach `needed`.
pub fn required_pad_count(kind: NodeKind, needed: usize) -> Option<usize> {
    let constraints = kind.pad_constraints();
    if needed <= constraints.default_pad_count {
        return Some(constraints.default_pad_count);
    }
    if !constraints.can_grow() {
        return None;
    }
    let extra = needed - constraints.default_pad_count;
    let steps = extra.div_ceil(constraints.pad_increment);
    Some(constraints.default_pad_count + steps * constraints.pad_increment)
}

/// Grow `node`'s pad count throughout `root_instance`'s subtree so it can
/// carry `needed` pads.
///
/// Returns `Ok(false)` when the current count already suffices.
pub fn ensure_pad_capacity(
    hierarchy: &mut GenomeHierarchy,
    root_instance: InstanceIdx,
    node: &NodeInstanceId,
    needed: usize,
    changes: &UndoCapture,
) -> PropagationResult<bool> {
    let kind = hierarchy.root().node(node.base())?.kind;
    let current = hierarchy.instance(root_instance)?.node(node)?.pad_count;
    if needed <= current {
        return Ok(false);
    }

    let required = required_pad_count(kind, needed)
        .filter(|count| *count >= needed)
        .ok_or_else(|| PropagationError::PadCapacityExhausted {
            node: node.base().clone(),
            needed,
            capacity: current.max(kind.pad_constraints().default_pad_count),
        })?;

    let mut models = vec![root_instance];
    models.extend(hierarchy.descendants_of(root_instance));
    for model in models {
        let instance = hierarchy.instance_mut(model)?;
        if !instance.contains_node(node) {
            continue;
        }
        let entry = instance.node_mut(node)?;
        let before = entry.pad_count;
        entry.pad_count = required;
        changes.record(ChangeRecord::NodePadCountReplaced {
            model,
            node: node.clone(),
            before,
            after: required,
        });
    }

    debug!(target: "biotapestry-propagation",
        "Grew pads of {} from {} to {} (needed {})", node, current, required, needed);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use biotapestry_structures::{
        DbGenome, Group, GroupId, LinkId, LinkInstance, LinkInstanceId, Linkage, Node,
        NodeInstance,
    };

    fn box_hierarchy() -> (GenomeHierarchy, InstanceIdx) {
        let mut root = DbGenome::new("db", "Root");
        root.add_node(Node::new(NodeId::new("B"), "box", NodeKind::Box)).unwrap();
        root.add_node(Node::new(NodeId::new("C"), "box", NodeKind::Box)).unwrap();
        root.add_node(Node::gene(NodeId::new("G"), "gene")).unwrap();
        root.add_link(Linkage::new(LinkId::new("L1"), NodeId::new("C"), NodeId::new("B"), 0, 2))
            .unwrap();
        let mut h = GenomeHierarchy::new(root);
        let vfa = h.add_root_instance("vfa", "VfA").unwrap();
        let inst = h.instance_mut(vfa).unwrap();
        inst.add_group(Group::new(GroupId::new("r"), "R")).unwrap();
        for base in ["B", "C", "G"] {
            let pads = if base == "G" { 5 } else { 4 };
            let id = NodeInstanceId::new(NodeId::new(base), 0);
            inst.add_node(NodeInstance::new(id.clone(), pads)).unwrap();
        }
        (h, vfa)
    }

    fn add_link(
        h: &mut GenomeHierarchy,
        vfa: InstanceIdx,
        n: u32,
        src: &str,
        trg: &str,
        launch: usize,
        landing: usize,
    ) {
        let link = LinkInstance::new(
            LinkInstanceId::new(LinkId::new("L1"), n),
            NodeInstanceId::new(NodeId::new(src), 0),
            NodeInstanceId::new(NodeId::new(trg), 0),
            launch,
            landing,
        );
        h.instance_mut(vfa).unwrap().add_link(link).unwrap();
    }

    fn b0() -> NodeInstanceId {
        NodeInstanceId::new(NodeId::new("B"), 0)
    }

    #[test]
    fn test_gene_pads_pass_through() {
        let (h, vfa) = box_hierarchy();
        let gene = NodeInstanceId::new(NodeId::new("G"), 0);
        let mut cache = PadCache::new();
        assert_eq!(find_source_pad(&h, vfa, &gene, 0, &mut cache).unwrap(), Some(0));
        assert_eq!(find_landing_pad(&h, vfa, &gene, 3, &mut cache).unwrap(), 3);
    }

    #[test]
    fn test_source_pad_avoids_landing_pads() {
        let (mut h, vfa) = box_hierarchy();
        // C:0 -> B:0 lands on pad 0 of B
        add_link(&mut h, vfa, 0, "C", "B", 1, 0);
        let mut cache = PadCache::new();
        assert_eq!(find_source_pad(&h, vfa, &b0(), 0, &mut cache).unwrap(), Some(1));
        assert_eq!(find_source_pad(&h, vfa, &b0(), 3, &mut cache).unwrap(), Some(3));
    }

    #[test]
    fn test_source_pad_reuses_existing_launch() {
        let (mut h, vfa) = box_hierarchy();
        add_link(&mut h, vfa, 0, "B", "C", 2, 1);
        let mut cache = PadCache::new();
        assert_eq!(find_source_pad(&h, vfa, &b0(), 0, &mut cache).unwrap(), Some(2));
    }

    #[test]
    fn test_source_pad_exhausted() {
        let (mut h, vfa) = box_hierarchy();
        for pad in 0..4 {
            add_link(&mut h, vfa, pad as u32, "C", "B", 0, pad);
        }
        let mut cache = PadCache::new();
        assert_eq!(find_source_pad(&h, vfa, &b0(), 0, &mut cache).unwrap(), None);
    }

    #[test]
    fn test_landing_pad_avoids_launch_pad() {
        let (mut h, vfa) = box_hierarchy();
        add_link(&mut h, vfa, 0, "B", "C", 2, 1);
        let mut cache = PadCache::new();
        assert_eq!(find_landing_pad(&h, vfa, &b0(), 2, &mut cache).unwrap(), 0);
        assert_eq!(find_landing_pad(&h, vfa, &b0(), 3, &mut cache).unwrap(), 3);
    }

    #[test]
    fn test_reset_reverts_only_node_end() {
        let (mut h, vfa) = box_hierarchy();
        add_link(&mut h, vfa, 0, "C", "B", 3, 1);
        let changes = UndoCapture::new();
        let mut cache = PadCache::new();
        let reverted =
            reset_pad_namespace(&mut h, vfa, &NodeId::new("B"), &mut cache, &changes).unwrap();
        assert_eq!(reverted, 1);
        let link = h
            .instance(vfa)
            .unwrap()
            .link(&LinkInstanceId::new(LinkId::new("L1"), 0))
            .unwrap();
        assert_eq!((link.launch_pad, link.landing_pad), (3, 2));
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_required_pad_count_rounds_up() {
        assert_eq!(required_pad_count(NodeKind::Box, 3), Some(4));
        assert_eq!(required_pad_count(NodeKind::Box, 5), Some(6));
        assert_eq!(required_pad_count(NodeKind::Box, 7), Some(8));
        assert_eq!(required_pad_count(NodeKind::Gene, 7), Some(7));
        assert_eq!(required_pad_count(NodeKind::Intercell, 3), None);
    }

    #[test]
    fn test_ensure_capacity_grows_or_fails() {
        let (mut h, vfa) = box_hierarchy();
        let changes = UndoCapture::new();
        assert!(!ensure_pad_capacity(&mut h, vfa, &b0(), 4, &changes).unwrap());
        assert!(ensure_pad_capacity(&mut h, vfa, &b0(), 5, &changes).unwrap());
        assert_eq!(h.instance(vfa).unwrap().node(&b0()).unwrap().pad_count, 6);

        h.root_mut()
            .add_node(Node::new(NodeId::new("S"), "slash", NodeKind::Slash))
            .unwrap();
        let slash = NodeInstanceId::new(NodeId::new("S"), 0);
        h.instance_mut(vfa)
            .unwrap()
            .add_node(NodeInstance::new(slash.clone(), 2))
            .unwrap();
        assert!(matches!(
            ensure_pad_capacity(&mut h, vfa, &slash, 3, &changes),
            Err(PropagationError::PadCapacityExhausted { needed: 3, .. })
        ));
    }
}
