// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

/*!
Hierarchy walker: carries a node, link or region through several levels of
the instance tree.

Two walks are offered:

- [`propagate_across_ancestry`] pushes an element from the root instance down
  to one deepest instance, filling every intermediate level.
- [`propagate_down_entire_subtree`] places an element in a root instance and
  then in every descendant that holds the element's region.

Every level first checks whether the element is already present, so running
a walk twice leaves the model unchanged the second time.
*/

use std::collections::BTreeSet;
use tracing::{debug, trace};

use biotapestry_structures::{
    GenomeHierarchy, GroupId, GroupTuple, InstanceIdx, LinkId, ModelRef, NodeId, NodeInstanceId,
    StructureError,
};

use crate::cache::PropagationCaches;
use crate::link_propagation::{copy_link_from_parent, find_link_instance, propagate_linkage};
use crate::node_propagation::{propagate_node, NodeRequest, PlacementOffset, SourceNode};
use crate::types::{PropagationError, PropagationResult};
use crate::undo::{ChangeRecord, UndoCapture};

/// Instances from a root instance down to one deepest instance, root first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestryChain {
    levels: Vec<InstanceIdx>,
}

impl AncestryChain {
    pub fn build(hierarchy: &GenomeHierarchy, deepest: InstanceIdx) -> PropagationResult<Self> {
        let mut levels = vec![deepest];
        let mut current = deepest;
        while let Some(parent) = hierarchy.parent_of(current)? {
            levels.push(parent);
            current = parent;
        }
        levels.reverse();
        Ok(Self { levels })
    }

    pub fn levels(&self) -> &[InstanceIdx] {
        &self.levels
    }

    pub fn root_instance(&self) -> InstanceIdx {
        self.levels[0]
    }

    pub fn deepest(&self) -> InstanceIdx {
        self.levels[self.levels.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Always false: a chain holds at least its deepest instance
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Something the walker can carry down the hierarchy. Groups are named by
/// their base ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagationElement {
    Group(GroupId),
    Node {
        base: NodeId,
        is_gene: bool,
        group: GroupId,
    },
    Link {
        base: LinkId,
        tuple: GroupTuple,
    },
}

impl PropagationElement {
    pub(crate) fn describe(&self) -> String {
        match self {
            PropagationElement::Group(group) => format!("group {}", group),
            PropagationElement::Node { base, .. } => format!("node {}", base),
            PropagationElement::Link { base, tuple } => format!("link {} {}", base, tuple),
        }
    }
}

/// How a level treats missing prerequisites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkMode {
    /// Create missing groups and link endpoints from the parent
    Ancestry,
    /// Leave a level alone when its groups or endpoints are missing
    Subtree,
}

/// What happened to an element at one level
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelOutcome {
    /// Element added, with its local id
    Created(String),
    /// Element was already there
    Present(String),
    /// Level does not qualify for the element
    Skipped,
}

impl LevelOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, LevelOutcome::Created(_))
    }
}

/// Per-level outcomes of one walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkReport {
    pub outcomes: Vec<(InstanceIdx, LevelOutcome)>,
    /// Passes over the subtree; zero for ancestry walks
    pub passes: usize,
}

impl WalkReport {
    pub fn created_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_created())
            .count()
    }

    pub fn outcome_at(&self, level: InstanceIdx) -> Option<&LevelOutcome> {
        self.outcomes
            .iter()
            .find(|(idx, _)| *idx == level)
            .map(|(_, outcome)| outcome)
    }
}

/// Make the group with base id `base` exist in `level`, inheriting it from
/// the parent chain as needed.
///
/// Root-instance groups are drawn by the user and are never created here;
/// asking for a missing one is an error.
pub fn propagate_group(
    hierarchy: &mut GenomeHierarchy,
    level: InstanceIdx,
    base: &GroupId,
    changes: &UndoCapture,
) -> PropagationResult<GroupId> {
    let instance = hierarchy.instance(level)?;
    let local = instance.local_group_id(base);
    if instance.contains_group(&local) {
        return Ok(local);
    }
    let Some(parent) = instance.parent() else {
        return Err(StructureError::MissingGroup {
            group: local,
            model: instance.id.clone(),
        }
        .into());
    };
    let generation = instance.generation();

    let parent_local = hierarchy.instance(parent)?.local_group_id(base);
    if !hierarchy.instance(parent)?.contains_group(&parent_local) {
        propagate_group(hierarchy, parent, base, changes)?;
    }
    let parent_group = hierarchy.instance(parent)?.group(&parent_local)?.clone();
    if let Some(super_group) = &parent_group.parent {
        propagate_group(hierarchy, level, &super_group.base(), changes)?;
    }

    let inherited = parent_group.inherit(generation);
    hierarchy.instance_mut(level)?.add_group(inherited)?;
    changes.record(ChangeRecord::GroupAdded {
        model: level,
        group: local.clone(),
    });
    debug!(target: "biotapestry-propagation",
        "Propagated group {} into {}", local, hierarchy.model_name(ModelRef::Instance(level)));
    Ok(local)
}

fn ensure_group(
    hierarchy: &mut GenomeHierarchy,
    level: InstanceIdx,
    base: &GroupId,
    mode: WalkMode,
    changes: &UndoCapture,
) -> PropagationResult<Option<GroupId>> {
    let instance = hierarchy.instance(level)?;
    let local = instance.local_group_id(base);
    if instance.contains_group(&local) {
        return Ok(Some(local));
    }
    match mode {
        WalkMode::Ancestry => propagate_group(hierarchy, level, base, changes).map(Some),
        WalkMode::Subtree => Ok(None),
    }
}

/// Instance of `base` in the parent of `level`, found through the parent's
/// copy of `group`
fn parent_instance_in_group(
    hierarchy: &GenomeHierarchy,
    level: InstanceIdx,
    base: &NodeId,
    group: &GroupId,
) -> PropagationResult<Option<NodeInstanceId>> {
    let Some(parent) = hierarchy.parent_of(level)? else {
        return Ok(None);
    };
    let parent_instance = hierarchy.instance(parent)?;
    let parent_local = parent_instance.local_group_id(group);
    Ok(parent_instance.instance_in_group(base, &parent_local).cloned())
}

#[allow(clippy::too_many_arguments)]
fn apply_node(
    hierarchy: &mut GenomeHierarchy,
    level: InstanceIdx,
    base: &NodeId,
    is_gene: bool,
    group: &GroupId,
    mode: WalkMode,
    placement: Option<&PlacementOffset>,
    caches: &mut PropagationCaches,
    changes: &UndoCapture,
) -> PropagationResult<LevelOutcome> {
    let Some(local) = ensure_group(hierarchy, level, group, mode, changes)? else {
        return Ok(LevelOutcome::Skipped);
    };

    let instance = hierarchy.instance(level)?;
    let source = if instance.is_root_instance() {
        if let Some(existing) = instance.instance_in_group(base, &local) {
            return Ok(LevelOutcome::Present(existing.to_string()));
        }
        SourceNode::Root(base.clone())
    } else {
        let Some(parent_id) = parent_instance_in_group(hierarchy, level, base, group)? else {
            return Ok(LevelOutcome::Skipped);
        };
        if instance.contains_node(&parent_id) {
            return Ok(LevelOutcome::Present(parent_id.to_string()));
        }
        SourceNode::Instance(parent_id)
    };

    let request = NodeRequest {
        is_gene,
        target: ModelRef::Instance(level),
        source: &source,
        target_group: &local,
        placement,
    };
    let id = propagate_node(hierarchy, &request, caches, changes)?;
    Ok(LevelOutcome::Created(id.to_string()))
}

fn apply_link(
    hierarchy: &mut GenomeHierarchy,
    level: InstanceIdx,
    base: &LinkId,
    tuple: &GroupTuple,
    mode: WalkMode,
    caches: &mut PropagationCaches,
    changes: &UndoCapture,
) -> PropagationResult<LevelOutcome> {
    let Some(source_group) = ensure_group(hierarchy, level, &tuple.source, mode, changes)? else {
        return Ok(LevelOutcome::Skipped);
    };
    let Some(target_group) = ensure_group(hierarchy, level, &tuple.target, mode, changes)? else {
        return Ok(LevelOutcome::Skipped);
    };
    let local_tuple = GroupTuple::new(source_group, target_group);
    let root_link = hierarchy.root().link(base)?.clone();

    if hierarchy.instance(level)?.is_root_instance() {
        let instance = hierarchy.instance(level)?;
        if let (Some(src), Some(trg)) = (
            instance.instance_in_group(&root_link.source, &local_tuple.source),
            instance.instance_in_group(&root_link.target, &local_tuple.target),
        ) {
            if let Some(existing) = find_link_instance(hierarchy, level, base, src, trg)? {
                return Ok(LevelOutcome::Present(existing.to_string()));
            }
        }
        let id = propagate_linkage(
            hierarchy,
            ModelRef::Instance(level),
            base,
            &local_tuple,
            caches,
            changes,
        )?;
        return Ok(LevelOutcome::Created(id.to_string()));
    }

    let parent = hierarchy.parent_of(level)?.ok_or_else(|| {
        StructureError::NoParentModel(hierarchy.model_name(ModelRef::Instance(level)))
    })?;
    let (Some(src), Some(trg)) = (
        parent_instance_in_group(hierarchy, level, &root_link.source, &tuple.source)?,
        parent_instance_in_group(hierarchy, level, &root_link.target, &tuple.target)?,
    ) else {
        return Ok(LevelOutcome::Skipped);
    };
    let Some(link_id) = find_link_instance(hierarchy, parent, base, &src, &trg)? else {
        return Ok(LevelOutcome::Skipped);
    };
    if hierarchy.instance(level)?.contains_link(&link_id) {
        return Ok(LevelOutcome::Present(link_id.to_string()));
    }

    let endpoints = [
        (&root_link.source, &tuple.source, src),
        (&root_link.target, &tuple.target, trg),
    ];
    for (node_base, group, node_id) in endpoints {
        if hierarchy.instance(level)?.contains_node(&node_id) {
            continue;
        }
        if mode == WalkMode::Subtree {
            return Ok(LevelOutcome::Skipped);
        }
        let is_gene = hierarchy.root().node(node_base)?.is_gene();
        apply_node(hierarchy, level, node_base, is_gene, group, mode, None, caches, changes)?;
    }

    copy_link_from_parent(hierarchy, level, &link_id, caches, changes)?;
    Ok(LevelOutcome::Created(link_id.to_string()))
}

/// Apply `element` at a single level of the hierarchy
pub fn apply_at_level(
    hierarchy: &mut GenomeHierarchy,
    level: InstanceIdx,
    element: &PropagationElement,
    mode: WalkMode,
    placement: Option<&PlacementOffset>,
    caches: &mut PropagationCaches,
    changes: &UndoCapture,
) -> PropagationResult<LevelOutcome> {
    let outcome = match element {
        PropagationElement::Group(base) => {
            let instance = hierarchy.instance(level)?;
            let local = instance.local_group_id(base);
            if instance.contains_group(&local) {
                LevelOutcome::Present(local.to_string())
            } else if mode == WalkMode::Subtree && !instance.is_root_instance() {
                let parent_has_it = match instance.parent() {
                    Some(parent) => {
                        let parent_instance = hierarchy.instance(parent)?;
                        parent_instance.contains_group(&parent_instance.local_group_id(base))
                    }
                    None => false,
                };
                if parent_has_it {
                    let id = propagate_group(hierarchy, level, base, changes)?;
                    LevelOutcome::Created(id.to_string())
                } else {
                    LevelOutcome::Skipped
                }
            } else {
                LevelOutcome::Created(propagate_group(hierarchy, level, base, changes)?.to_string())
            }
        }
        PropagationElement::Node { base, is_gene, group } => apply_node(
            hierarchy, level, base, *is_gene, group, mode, placement, caches, changes,
        )?,
        PropagationElement::Link { base, tuple } => {
            apply_link(hierarchy, level, base, tuple, mode, caches, changes)?
        }
    };
    trace!(target: "biotapestry-propagation",
        "{} at {}: {:?}",
        element.describe(), hierarchy.model_name(ModelRef::Instance(level)), outcome);
    Ok(outcome)
}

/// Carry `element` from the root instance down to the chain's deepest level.
///
/// Levels already holding the element are left untouched.
pub fn propagate_across_ancestry(
    hierarchy: &mut GenomeHierarchy,
    element: &PropagationElement,
    chain: &AncestryChain,
    placement: Option<&PlacementOffset>,
    caches: &mut PropagationCaches,
    changes: &UndoCapture,
) -> PropagationResult<WalkReport> {
    let mut report = WalkReport::default();
    for level in chain.levels() {
        let outcome = apply_at_level(
            hierarchy,
            *level,
            element,
            WalkMode::Ancestry,
            placement,
            caches,
            changes,
        )?;
        report.outcomes.push((*level, outcome));
    }
    debug!(target: "biotapestry-propagation",
        "Ancestry walk of {} over {} level(s): {} created",
        element.describe(), chain.len(), report.created_count());
    Ok(report)
}

/// Place `element` in `root_instance`, then in every descendant holding the
/// inherited copy of `start_group`.
///
/// Descendants are visited in repeated passes until each has been processed
/// after its parent. `max_passes` bounds the passes.
#[allow(clippy::too_many_arguments)]
pub fn propagate_down_entire_subtree(
    hierarchy: &mut GenomeHierarchy,
    element: &PropagationElement,
    start_group: &GroupId,
    root_instance: InstanceIdx,
    placement: Option<&PlacementOffset>,
    max_passes: usize,
    caches: &mut PropagationCaches,
    changes: &UndoCapture,
) -> PropagationResult<WalkReport> {
    let mut report = WalkReport::default();
    let outcome = apply_at_level(
        hierarchy,
        root_instance,
        element,
        WalkMode::Ancestry,
        placement,
        caches,
        changes,
    )?;
    report.outcomes.push((root_instance, outcome));

    let descendants = hierarchy.descendants_of(root_instance);
    let total = descendants.len() + 1;
    let mut processed: BTreeSet<InstanceIdx> = BTreeSet::from([root_instance]);

    while processed.len() < total {
        if report.passes >= max_passes {
            return Err(PropagationError::NotConverged(report.passes));
        }
        report.passes += 1;

        for level in &descendants {
            if processed.contains(level) {
                continue;
            }
            let Some(parent) = hierarchy.parent_of(*level)? else {
                continue;
            };
            if !processed.contains(&parent) {
                continue;
            }

            let instance = hierarchy.instance(*level)?;
            let gate = instance.local_group_id(start_group);
            let outcome = if instance.contains_group(&gate) {
                let mode = WalkMode::Subtree;
                apply_at_level(hierarchy, *level, element, mode, None, caches, changes)?
            } else {
                LevelOutcome::Skipped
            };
            report.outcomes.push((*level, outcome));
            processed.insert(*level);
        }
    }

    debug!(target: "biotapestry-propagation",
        "Subtree walk of {} under {}: {} level(s), {} created, {} pass(es)",
        element.describe(), hierarchy.model_name(ModelRef::Instance(root_instance)),
        total, report.created_count(), report.passes);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use biotapestry_structures::{DbGenome, Group, Linkage, Node, NodeKind};

    /// vfa -> vf1 -> vf2, vfa -> vfx; region r drawn in vfa, inherited by vf1 only
    fn hierarchy() -> (GenomeHierarchy, [InstanceIdx; 4]) {
        let mut root = DbGenome::new("db", "Root");
        root.add_node(Node::gene(NodeId::new("A"), "a")).unwrap();
        root.add_node(Node::new(NodeId::new("B"), "b", NodeKind::Box)).unwrap();
        root.add_link(Linkage::new(LinkId::new("AB"), NodeId::new("A"), NodeId::new("B"), 0, 1))
            .unwrap();
        let mut h = GenomeHierarchy::new(root);
        let vfa = h.add_root_instance("vfa", "VfA").unwrap();
        let vf1 = h.add_subset_instance(vfa, "vf1", "Vf1").unwrap();
        let vf2 = h.add_subset_instance(vf1, "vf2", "Vf2").unwrap();
        let vfx = h.add_subset_instance(vfa, "vfx", "Vfx").unwrap();
        h.instance_mut(vfa)
            .unwrap()
            .add_group(Group::new(GroupId::new("r"), "R"))
            .unwrap();
        h.instance_mut(vf1)
            .unwrap()
            .add_group(Group::new(GroupId::new("r:1"), "R"))
            .unwrap();
        (h, [vfa, vf1, vf2, vfx])
    }

    fn node(base: &str, is_gene: bool) -> PropagationElement {
        PropagationElement::Node {
            base: NodeId::new(base),
            is_gene,
            group: GroupId::new("r"),
        }
    }

    #[test]
    fn test_chain_is_root_first() {
        let (h, [vfa, vf1, vf2, _]) = hierarchy();
        let chain = AncestryChain::build(&h, vf2).unwrap();
        assert_eq!(chain.levels(), &[vfa, vf1, vf2]);
        assert_eq!(chain.root_instance(), vfa);
        assert_eq!(chain.deepest(), vf2);
    }

    #[test]
    fn test_ancestry_walk_fills_levels_and_groups() {
        let (mut h, [vfa, vf1, vf2, vfx]) = hierarchy();
        let chain = AncestryChain::build(&h, vf2).unwrap();
        let mut caches = PropagationCaches::default();
        let changes = UndoCapture::new();

        let a = node("A", true);
        let report =
            propagate_across_ancestry(&mut h, &a, &chain, None, &mut caches, &changes).unwrap();
        assert_eq!(report.created_count(), 3);
        assert!(h.instance(vf2).unwrap().contains_group(&GroupId::new("r:2")));
        let id = NodeInstanceId::new(NodeId::new("A"), 0);
        for level in [vfa, vf1, vf2] {
            assert!(h.instance(level).unwrap().contains_node(&id));
        }
        assert!(!h.instance(vfx).unwrap().contains_node(&id));
    }

    #[test]
    fn test_ancestry_walk_is_idempotent() {
        let (mut h, [_, _, vf2, _]) = hierarchy();
        let chain = AncestryChain::build(&h, vf2).unwrap();
        let mut caches = PropagationCaches::default();
        let changes = UndoCapture::new();

        let a = node("A", true);
        propagate_across_ancestry(&mut h, &a, &chain, None, &mut caches, &changes).unwrap();
        let mark = changes.len();
        let again =
            propagate_across_ancestry(&mut h, &a, &chain, None, &mut caches, &changes).unwrap();
        assert_eq!(again.created_count(), 0);
        assert_eq!(changes.len(), mark);
    }

    #[test]
    fn test_link_walk_pulls_endpoints_into_subsets() {
        let (mut h, [vfa, _, vf2, _]) = hierarchy();
        let mut caches = PropagationCaches::default();
        let changes = UndoCapture::new();
        let root_chain = AncestryChain::build(&h, vfa).unwrap();
        for endpoint in [node("A", true), node("B", false)] {
            propagate_across_ancestry(&mut h, &endpoint, &root_chain, None, &mut caches, &changes)
                .unwrap();
        }

        let link = PropagationElement::Link {
            base: LinkId::new("AB"),
            tuple: GroupTuple::within(GroupId::new("r")),
        };
        let chain = AncestryChain::build(&h, vf2).unwrap();
        let report =
            propagate_across_ancestry(&mut h, &link, &chain, None, &mut caches, &changes).unwrap();
        assert_eq!(report.created_count(), 3);
        let vf2_instance = h.instance(vf2).unwrap();
        assert_eq!(vf2_instance.links().count(), 1);
        assert_eq!(vf2_instance.nodes().count(), 2);
    }

    #[test]
    fn test_subtree_walk_respects_group_gate() {
        let (mut h, [vfa, vf1, vf2, vfx]) = hierarchy();
        let mut caches = PropagationCaches::default();
        let changes = UndoCapture::new();

        let report = propagate_down_entire_subtree(
            &mut h,
            &node("A", true),
            &GroupId::new("r"),
            vfa,
            None,
            8,
            &mut caches,
            &changes,
        )
        .unwrap();

        let id = NodeInstanceId::new(NodeId::new("A"), 0);
        assert!(h.instance(vf1).unwrap().contains_node(&id));
        // vf2 and vfx never received region r
        assert!(!h.instance(vf2).unwrap().contains_node(&id));
        assert!(!h.instance(vfx).unwrap().contains_node(&id));
        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(report.outcome_at(vfx), Some(&LevelOutcome::Skipped));
        assert!(report.passes >= 1);
    }

    #[test]
    fn test_group_propagation_requires_root_definition() {
        let (mut h, [_, _, vf2, _]) = hierarchy();
        let changes = UndoCapture::new();
        assert_eq!(
            propagate_group(&mut h, vf2, &GroupId::new("r"), &changes).unwrap(),
            GroupId::new("r:2")
        );
        assert!(propagate_group(&mut h, vf2, &GroupId::new("nowhere"), &changes).is_err());
    }
}
