// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

/*!
Group and region resolution.

Decides which groups of a target instance can receive a node, and which
(source group, target group) pairs a set of links could be instantiated
with. Results are ordered sets, so the outcome does not depend on the order
links or groups were supplied in.
*/

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use biotapestry_structures::{
    GenomeHierarchy, GroupId, GroupTuple, InstanceIdx, LinkId, ModelRef, NodeId,
};

use crate::types::PropagationResult;

/// Main groups of `target` that can take a new instance of `base`.
///
/// A group is eligible only when the root instance has no instance of `base`
/// in that group yet. A node unknown to the root genome, or of the wrong
/// kind, has no eligible groups.
pub fn resolve_target_groups(
    hierarchy: &GenomeHierarchy,
    base: &NodeId,
    target: InstanceIdx,
    is_gene: bool,
) -> PropagationResult<BTreeSet<GroupId>> {
    let Ok(root_node) = hierarchy.root().node(base) else {
        return Ok(BTreeSet::new());
    };
    if root_node.is_gene() != is_gene {
        return Ok(BTreeSet::new());
    }

    let root_instance = hierarchy.instance(hierarchy.root_instance_of(target)?)?;
    let eligible = hierarchy
        .instance(target)?
        .main_groups()
        .filter(|group| {
            let at_root_level = root_instance.local_group_id(&group.id);
            root_instance.instance_in_group(base, &at_root_level).is_none()
        })
        .map(|group| group.id.clone())
        .collect();
    Ok(eligible)
}

/// Main groups of subset `target` whose parent copy holds an instance of
/// `base` that `target` lacks. Always empty for a root instance.
pub fn resolve_inheritable_groups(
    hierarchy: &GenomeHierarchy,
    base: &NodeId,
    target: InstanceIdx,
) -> PropagationResult<BTreeSet<GroupId>> {
    let instance = hierarchy.instance(target)?;
    let Some(parent) = instance.parent() else {
        return Ok(BTreeSet::new());
    };
    let parent_instance = hierarchy.instance(parent)?;
    let inheritable = instance
        .main_groups()
        .filter(|group| {
            let parent_local = parent_instance.local_group_id(&group.id);
            parent_instance
                .instance_in_group(base, &parent_local)
                .is_some_and(|node| !instance.contains_node(node))
        })
        .map(|group| group.id.clone())
        .collect();
    Ok(inheritable)
}

/// Outcome class of a link tuple resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TupleStatus {
    /// Exactly one tuple applies to every link, or the hint picked one
    Ok,
    /// Some link has no usable tuple at all
    MissingEndpoint,
    /// The links share no tuple and at least one has several options
    NoCommonGroupings,
    /// The hint group's tuple is not among the shared options
    TargetGroupNotPresent,
    /// The links share no tuple but each has exactly one of its own
    SingleTuplePerLink,
    /// Several shared tuples and no hint to choose between them
    Ambiguous,
}

impl TupleStatus {
    /// Whether links can be propagated without asking anyone
    pub fn is_resolved(&self) -> bool {
        matches!(self, TupleStatus::Ok | TupleStatus::SingleTuplePerLink)
    }
}

/// Input of [`resolve_link_group_tuples`]
#[derive(Debug, Clone, Default)]
pub struct LinkTupleQuery {
    pub links: Vec<LinkId>,
    /// Local id of the group the caller is placing elements into, if known
    pub hint_group: Option<GroupId>,
    /// Nodes about to be placed, by base id, with the local groups they will
    /// land in
    pub pending: BTreeMap<NodeId, BTreeSet<GroupId>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleResolution {
    pub status: TupleStatus,
    /// Candidate tuples of each link
    pub per_link: BTreeMap<LinkId, BTreeSet<GroupTuple>>,
    /// Tuples every link could use
    pub common: BTreeSet<GroupTuple>,
    /// Tuple to use per link; filled for resolved statuses only
    pub chosen: BTreeMap<LinkId, GroupTuple>,
}

impl TupleResolution {
    /// Resolve an ambiguity by applying `tuple` to every link
    pub fn choose(&mut self, tuple: &GroupTuple) -> bool {
        if !self.common.contains(tuple) {
            return false;
        }
        self.chosen = self
            .per_link
            .keys()
            .map(|link| (link.clone(), tuple.clone()))
            .collect();
        self.status = TupleStatus::Ok;
        true
    }
}

/// Local groups of `target` that hold, or are about to hold, an instance of
/// `base`
fn endpoint_groups(
    hierarchy: &GenomeHierarchy,
    target: InstanceIdx,
    base: &NodeId,
    pending: &BTreeMap<NodeId, BTreeSet<GroupId>>,
) -> PropagationResult<BTreeSet<GroupId>> {
    let mut groups: BTreeSet<GroupId> = hierarchy
        .instance(target)?
        .main_groups()
        .filter(|group| group.instance_of(base).is_some())
        .map(|group| group.id.clone())
        .collect();
    if let Some(extra) = pending.get(base) {
        groups.extend(extra.iter().cloned());
    }
    Ok(groups)
}

/// Tuples through which `link` could gain a new instance in `target`
pub fn new_connection_tuples(
    hierarchy: &GenomeHierarchy,
    target: InstanceIdx,
    link: &LinkId,
    pending: &BTreeMap<NodeId, BTreeSet<GroupId>>,
) -> PropagationResult<BTreeSet<GroupTuple>> {
    let root_link = hierarchy.root().link(link)?;
    let sources = endpoint_groups(hierarchy, target, &root_link.source, pending)?;
    let targets = endpoint_groups(hierarchy, target, &root_link.target, pending)?;

    let mut tuples = BTreeSet::new();
    for source_group in &sources {
        for target_group in &targets {
            let tuple = GroupTuple::new(source_group.clone(), target_group.clone());
            if !tuple_connected(hierarchy, target, link, &tuple)? {
                tuples.insert(tuple);
            }
        }
    }
    Ok(tuples)
}

/// Whether `target` already holds an instance of `link` running between
/// the instances of its endpoints in `tuple`'s groups (local ids)
pub fn tuple_connected(
    hierarchy: &GenomeHierarchy,
    target: InstanceIdx,
    link: &LinkId,
    tuple: &GroupTuple,
) -> PropagationResult<bool> {
    let root_link = hierarchy.root().link(link)?;
    let instance = hierarchy.instance(target)?;
    let connected = match (
        instance.instance_in_group(&root_link.source, &tuple.source),
        instance.instance_in_group(&root_link.target, &tuple.target),
    ) {
        (Some(src), Some(trg)) => instance
            .links_of_base(link)
            .any(|inst| &inst.source == src && &inst.target == trg),
        _ => false,
    };
    Ok(connected)
}

/// Whether every source/target group pair `link` could use in `target` is
/// already connected. False while either endpoint has no grouped instance.
pub fn fully_connected(
    hierarchy: &GenomeHierarchy,
    target: InstanceIdx,
    link: &LinkId,
) -> PropagationResult<bool> {
    let root_link = hierarchy.root().link(link)?;
    let none = BTreeMap::new();
    let sources = endpoint_groups(hierarchy, target, &root_link.source, &none)?;
    let targets = endpoint_groups(hierarchy, target, &root_link.target, &none)?;
    if sources.is_empty() || targets.is_empty() {
        return Ok(false);
    }
    Ok(new_connection_tuples(hierarchy, target, link, &none)?.is_empty())
}

/// Classify how `query.links` can be instantiated in `target`.
///
/// Never mutates the model.
pub fn resolve_link_group_tuples(
    hierarchy: &GenomeHierarchy,
    target: InstanceIdx,
    query: &LinkTupleQuery,
) -> PropagationResult<TupleResolution> {
    let mut per_link = BTreeMap::new();
    for link in &query.links {
        per_link.insert(
            link.clone(),
            new_connection_tuples(hierarchy, target, link, &query.pending)?,
        );
    }

    let mut resolution = TupleResolution {
        status: TupleStatus::Ok,
        per_link,
        common: BTreeSet::new(),
        chosen: BTreeMap::new(),
    };
    if resolution.per_link.is_empty() {
        return Ok(resolution);
    }

    if resolution.per_link.values().any(BTreeSet::is_empty) {
        resolution.status = TupleStatus::MissingEndpoint;
        return Ok(resolution);
    }

    let mut sets = resolution.per_link.values();
    let mut common = sets.next().cloned().unwrap_or_default();
    for set in sets {
        common = common.intersection(set).cloned().collect();
    }
    resolution.common = common;

    resolution.status = match resolution.common.len() {
        0 => {
            if resolution.per_link.values().all(|set| set.len() == 1) {
                resolution.chosen = resolution
                    .per_link
                    .iter()
                    .filter_map(|(link, set)| {
                        set.first().map(|tuple| (link.clone(), tuple.clone()))
                    })
                    .collect();
                TupleStatus::SingleTuplePerLink
            } else {
                TupleStatus::NoCommonGroupings
            }
        }
        1 => {
            if let Some(only) = resolution.common.first().cloned() {
                resolution.choose(&only);
            }
            TupleStatus::Ok
        }
        _ => match &query.hint_group {
            Some(hint) => {
                let hinted = GroupTuple::within(hint.clone());
                if resolution.choose(&hinted) {
                    TupleStatus::Ok
                } else {
                    TupleStatus::TargetGroupNotPresent
                }
            }
            None => TupleStatus::Ambiguous,
        },
    };

    debug!(target: "biotapestry-propagation",
        "Resolved {} link(s) in {}: {:?} ({} shared tuples)",
        query.links.len(), hierarchy.model_name(ModelRef::Instance(target)),
        resolution.status, resolution.common.len());
    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use biotapestry_structures::{
        DbGenome, Group, LinkInstance, LinkInstanceId, Linkage, Node, NodeInstance,
        NodeInstanceId, NodeKind,
    };

    /// VfA with regions a and b; A lives in both, B in a only.
    fn hierarchy() -> (GenomeHierarchy, InstanceIdx) {
        let mut root = DbGenome::new("db", "Root");
        for base in ["A", "B", "C"] {
            root.add_node(Node::new(NodeId::new(base), base, NodeKind::Box)).unwrap();
        }
        root.add_link(Linkage::new(LinkId::new("AB"), NodeId::new("A"), NodeId::new("B"), 0, 1))
            .unwrap();
        root.add_link(Linkage::new(LinkId::new("AC"), NodeId::new("A"), NodeId::new("C"), 0, 1))
            .unwrap();
        let mut h = GenomeHierarchy::new(root);
        let vfa = h.add_root_instance("vfa", "VfA").unwrap();
        let inst = h.instance_mut(vfa).unwrap();
        inst.add_group(Group::new(GroupId::new("a"), "a")).unwrap();
        inst.add_group(Group::new(GroupId::new("b"), "b")).unwrap();
        for (base, n, group) in [("A", 0, "a"), ("A", 1, "b"), ("B", 0, "a")] {
            let id = NodeInstanceId::new(NodeId::new(base), n);
            inst.add_node(NodeInstance::new(id.clone(), 4)).unwrap();
            inst.add_to_group(&id, &GroupId::new(group)).unwrap();
        }
        (h, vfa)
    }

    fn query(links: &[&str]) -> LinkTupleQuery {
        LinkTupleQuery {
            links: links.iter().map(|l| LinkId::new(*l)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_target_groups_skip_occupied() {
        let (h, vfa) = hierarchy();
        let a_groups = resolve_target_groups(&h, &NodeId::new("A"), vfa, false).unwrap();
        assert!(a_groups.is_empty());
        let b_groups = resolve_target_groups(&h, &NodeId::new("B"), vfa, false).unwrap();
        assert_eq!(b_groups, BTreeSet::from([GroupId::new("b")]));
        assert!(resolve_target_groups(&h, &NodeId::new("B"), vfa, true).unwrap().is_empty());
        assert!(resolve_target_groups(&h, &NodeId::new("Z"), vfa, false).unwrap().is_empty());
    }

    #[test]
    fn test_single_option_resolves() {
        let (h, vfa) = hierarchy();
        let res = resolve_link_group_tuples(&h, vfa, &query(&["AB"])).unwrap();
        // A lives in a and b, B only in a
        assert_eq!(res.status, TupleStatus::Ambiguous);
        assert_eq!(res.common.len(), 2);

        let mut hinted = query(&["AB"]);
        hinted.hint_group = Some(GroupId::new("a"));
        let res = resolve_link_group_tuples(&h, vfa, &hinted).unwrap();
        assert_eq!(res.status, TupleStatus::Ok);
        assert_eq!(res.chosen[&LinkId::new("AB")], GroupTuple::within(GroupId::new("a")));
    }

    #[test]
    fn test_hint_not_present() {
        let (h, vfa) = hierarchy();
        let mut hinted = query(&["AB"]);
        hinted.hint_group = Some(GroupId::new("b"));
        let res = resolve_link_group_tuples(&h, vfa, &hinted).unwrap();
        assert_eq!(res.status, TupleStatus::TargetGroupNotPresent);
        assert!(res.chosen.is_empty());
    }

    #[test]
    fn test_missing_endpoint() {
        let (h, vfa) = hierarchy();
        let res = resolve_link_group_tuples(&h, vfa, &query(&["AC", "AB"])).unwrap();
        assert_eq!(res.status, TupleStatus::MissingEndpoint);
    }

    #[test]
    fn test_pending_nodes_count_as_present() {
        let (h, vfa) = hierarchy();
        let mut q = query(&["AC"]);
        q.pending
            .insert(NodeId::new("C"), BTreeSet::from([GroupId::new("b")]));
        let res = resolve_link_group_tuples(&h, vfa, &q).unwrap();
        assert_eq!(res.status, TupleStatus::Ambiguous);
        assert!(res.common.contains(&GroupTuple::within(GroupId::new("b"))));
    }

    #[test]
    fn test_existing_connection_excluded() {
        let (mut h, vfa) = hierarchy();
        let link = LinkInstance::new(
            LinkInstanceId::new(LinkId::new("AB"), 0),
            NodeInstanceId::new(NodeId::new("A"), 0),
            NodeInstanceId::new(NodeId::new("B"), 0),
            0,
            1,
        );
        h.instance_mut(vfa).unwrap().add_link(link).unwrap();
        let res = resolve_link_group_tuples(&h, vfa, &query(&["AB"])).unwrap();
        assert_eq!(res.status, TupleStatus::Ok);
        assert_eq!(
            res.chosen[&LinkId::new("AB")],
            GroupTuple::new(GroupId::new("b"), GroupId::new("a"))
        );
    }

    #[test]
    fn test_connected_tuples_are_tracked_per_pair() {
        let (mut h, vfa) = hierarchy();
        let ab = LinkId::new("AB");
        assert!(!fully_connected(&h, vfa, &ab).unwrap());

        let link = LinkInstance::new(
            LinkInstanceId::new(ab.clone(), 0),
            NodeInstanceId::new(NodeId::new("A"), 0),
            NodeInstanceId::new(NodeId::new("B"), 0),
            0,
            1,
        );
        h.instance_mut(vfa).unwrap().add_link(link).unwrap();
        let within_a = GroupTuple::within(GroupId::new("a"));
        assert!(tuple_connected(&h, vfa, &ab, &within_a).unwrap());
        // A:1 in b can still reach B:0
        assert!(!fully_connected(&h, vfa, &ab).unwrap());

        let link = LinkInstance::new(
            LinkInstanceId::new(ab.clone(), 1),
            NodeInstanceId::new(NodeId::new("A"), 1),
            NodeInstanceId::new(NodeId::new("B"), 0),
            0,
            2,
        );
        h.instance_mut(vfa).unwrap().add_link(link).unwrap();
        assert!(fully_connected(&h, vfa, &ab).unwrap());

        // C has no instance, which is a missing endpoint rather than a full set
        assert!(!fully_connected(&h, vfa, &LinkId::new("AC")).unwrap());
    }

    #[test]
    fn test_single_tuple_per_link() {
        let (mut h, vfa) = hierarchy();
        {
            let inst = h.instance_mut(vfa).unwrap();
            let c = NodeInstanceId::new(NodeId::new("C"), 0);
            inst.add_node(NodeInstance::new(c.clone(), 4)).unwrap();
            inst.add_to_group(&c, &GroupId::new("b")).unwrap();
            // Drop A:0 from a so A only lives in b
            inst.remove_from_group(&NodeInstanceId::new(NodeId::new("A"), 0), &GroupId::new("a"))
                .unwrap();
        }
        // AB: (b, a); AC: (b, b)
        let res = resolve_link_group_tuples(&h, vfa, &query(&["AB", "AC"])).unwrap();
        assert_eq!(res.status, TupleStatus::SingleTuplePerLink);
        assert_eq!(res.chosen.len(), 2);
        assert_eq!(
            res.chosen[&LinkId::new("AC")],
            GroupTuple::within(GroupId::new("b"))
        );
    }
}
