// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

/*!
Node insertion: splitting a root link A→B into A→M and M→B.

The split is applied to the root genome and mirrored into every instance
that holds the link. In a root instance the new node M goes into the main
group of B's instance; all link instances landing on the same B instance
collapse onto one M, whose pads grow to take the fan-in. Subsets copy their
parent's result.

Module memberships are captured before anything changes. Once the
structure is final, M joins every module that held both ends of a split
link instance.

Placement of the new M instances is left to a relayout job, which can run
on a worker thread through [`spawn_relayout`].
*/

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use biotapestry_structures::{
    GenomeHierarchy, GroupId, InstanceIdx, LinkId, LinkInstance, LinkInstanceId, Linkage, ModelRef,
    ModuleId, Node, NodeInstance, NodeInstanceId, NodePlacement, OverlayId, Point, StructureError,
};

use crate::cache::PadCache;
use crate::context::PropagationSettings;
use crate::events::{ProgressMonitor, ProgressRange};
use crate::node_propagation::introduce_node;
use crate::pads::{ensure_pad_capacity, find_landing_pad, find_source_pad};
use crate::types::{PropagationError, PropagationResult};
use crate::undo::{ChangeRecord, UndoCapture};

/// Split a root link by a new node
#[derive(Debug, Clone)]
pub struct InsertionRequest {
    pub link: LinkId,
    pub new_node: Node,
    /// Ids of the upstream (A→M) and downstream (M→B) root links
    pub new_links: (LinkId, LinkId),
    /// Root layout position of M; midpoint of A and B when absent
    pub root_position: Option<Point>,
    /// Overlay whose modules take M in; every overlay when absent
    pub overlay: Option<OverlayId>,
}

/// A module that held both ends of a link instance before the split
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModulePadNeed {
    pub model: InstanceIdx,
    pub overlay: OverlayId,
    pub module: ModuleId,
    pub link: LinkInstanceId,
}

/// One M instance waiting for a position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayoutTarget {
    pub node: NodeInstanceId,
    pub upstream: NodeInstanceId,
    pub downstream: NodeInstanceId,
}

/// Placement work left after a structural insertion, per root instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayoutJob {
    pub instances: BTreeMap<InstanceIdx, Vec<RelayoutTarget>>,
}

impl RelayoutJob {
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InsertionReport {
    /// M instances created, per model
    pub new_instances: BTreeMap<InstanceIdx, Vec<NodeInstanceId>>,
    /// Link instances replaced by the split
    pub split_links: usize,
    pub module_needs: Vec<ModulePadNeed>,
    pub module_memberships_added: usize,
    pub relayout: RelayoutJob,
}

/// Structural part of a split in one root instance
struct Split {
    node: NodeInstanceId,
    group: GroupId,
    /// Old link instance and the upstream instance that replaced it
    replaced: Vec<(LinkInstanceId, LinkInstanceId)>,
    downstream: LinkInstanceId,
}

/// Insert `request.new_node` into root link `request.link` and every
/// instance of it.
pub fn insert_node_into_link(
    hierarchy: &mut GenomeHierarchy,
    request: &InsertionRequest,
    changes: &UndoCapture,
) -> PropagationResult<InsertionReport> {
    let old_link = hierarchy.root().link(&request.link)?.clone();
    let new_id = request.new_node.id.clone();
    if hierarchy.root().contains_node(&new_id) {
        return Err(StructureError::DuplicateElement(new_id.to_string()).into());
    }
    info!(target: "biotapestry-propagation",
        "Inserting node {} into link {} ({} -> {})",
        new_id, old_link.id, old_link.source, old_link.target);

    let mut report = InsertionReport {
        module_needs: capture_module_needs(hierarchy, &request.link, request.overlay.as_ref())?,
        ..Default::default()
    };

    let (upstream_root, downstream_root) = split_root_link(hierarchy, request, &old_link, changes)?;

    let mut pads = PadCache::new();
    let mut replaced = BTreeMap::new();
    let root_instances: Vec<InstanceIdx> = hierarchy.root_instances().collect();
    for root_instance in root_instances {
        let splits = split_root_instance(
            hierarchy,
            root_instance,
            &old_link,
            &upstream_root,
            &downstream_root,
            &mut pads,
            changes,
        )?;
        if splits.is_empty() {
            continue;
        }
        report.split_links += splits.iter().map(|split| split.replaced.len()).sum::<usize>();

        let mut targets = Vec::new();
        for split in &splits {
            let instance = hierarchy.instance(root_instance)?;
            let downstream = instance.link(&split.downstream)?.target.clone();
            for (old, upstream) in &split.replaced {
                replaced.insert((root_instance, old.clone()), split.node.clone());
                targets.push(RelayoutTarget {
                    node: split.node.clone(),
                    upstream: instance.link(upstream)?.source.clone(),
                    downstream: downstream.clone(),
                });
            }
        }
        report
            .new_instances
            .entry(root_instance)
            .or_default()
            .extend(splits.iter().map(|split| split.node.clone()));
        report.relayout.instances.insert(root_instance, targets);

        for subset in hierarchy.descendants_of(root_instance) {
            let mirrored = mirror_into_subset(
                hierarchy,
                subset,
                &old_link.id,
                &splits,
                &mut replaced,
                changes,
            )?;
            if !mirrored.is_empty() {
                report.new_instances.entry(subset).or_default().extend(mirrored);
            }
        }
    }

    report.module_memberships_added =
        repair_modules(hierarchy, &report.module_needs, &replaced, changes)?;
    info!(target: "biotapestry-propagation",
        "Inserted {}: {} link instance(s) split, {} module membership(s) added",
        new_id, report.split_links, report.module_memberships_added);
    Ok(report)
}

/// Modules holding both ends of an instance of `link`, in every model.
/// Limited to `only` when given.
fn capture_module_needs(
    hierarchy: &GenomeHierarchy,
    link: &LinkId,
    only: Option<&OverlayId>,
) -> PropagationResult<Vec<ModulePadNeed>> {
    let mut needs = Vec::new();
    for model in hierarchy.instance_indices() {
        let instance = hierarchy.instance(model)?;
        let overlays = instance
            .overlays
            .values()
            .filter(|overlay| only.map_or(true, |id| *id == overlay.id));
        for overlay in overlays {
            for link_instance in instance.links_of_base(link) {
                for module in overlay.modules_containing(&link_instance.source) {
                    if module.contains(&link_instance.target) {
                        needs.push(ModulePadNeed {
                            model,
                            overlay: overlay.id.clone(),
                            module: module.id.clone(),
                            link: link_instance.id.clone(),
                        });
                    }
                }
            }
        }
    }
    needs.sort();
    Ok(needs)
}

fn split_root_link(
    hierarchy: &mut GenomeHierarchy,
    request: &InsertionRequest,
    old_link: &Linkage,
    changes: &UndoCapture,
) -> PropagationResult<(Linkage, Linkage)> {
    let node = &request.new_node;
    let constraints = node.kind.pad_constraints();
    let launch = *constraints.source_pads(node.pad_count).start();
    let landing = constraints
        .landing_pads(node.pad_count)
        .find(|pad| *pad != launch)
        .unwrap_or(launch);

    let position = match request.root_position {
        Some(position) => Some(position),
        None => {
            let layout = hierarchy.layout_for(ModelRef::Root)?;
            match (
                layout.placement(old_link.source.as_str()),
                layout.placement(old_link.target.as_str()),
            ) {
                (Some(a), Some(b)) => Some(a.position.midpoint(&b.position)),
                _ => None,
            }
        }
    };
    introduce_node(hierarchy, node.clone(), position, changes)?;

    let removed = hierarchy.root_mut().remove_link(&old_link.id)?;
    changes.record(ChangeRecord::RootLinkRemoved { link: removed });

    let mut upstream = Linkage::new(
        request.new_links.0.clone(),
        old_link.source.clone(),
        node.id.clone(),
        old_link.launch_pad,
        landing,
    );
    upstream.sign = old_link.sign;
    let downstream = Linkage::new(
        request.new_links.1.clone(),
        node.id.clone(),
        old_link.target.clone(),
        launch,
        old_link.landing_pad,
    );
    for link in [&upstream, &downstream] {
        hierarchy.root_mut().add_link(link.clone())?;
        changes.record(ChangeRecord::RootLinkAdded { link: link.clone() });
    }
    Ok((upstream, downstream))
}

/// Split every instance of `old_link` in `root_instance`, one M per group of
/// the downstream endpoint
fn split_root_instance(
    hierarchy: &mut GenomeHierarchy,
    root_instance: InstanceIdx,
    old_link: &Linkage,
    upstream_root: &Linkage,
    downstream_root: &Linkage,
    pads: &mut PadCache,
    changes: &UndoCapture,
) -> PropagationResult<Vec<Split>> {
    let instance = hierarchy.instance(root_instance)?;
    let mut buckets: BTreeMap<GroupId, Vec<LinkInstance>> = BTreeMap::new();
    for link in instance.links_of_base(&old_link.id) {
        let group = instance
            .main_group_of(&link.target)
            .ok_or_else(|| PropagationError::Ungrouped(link.target.clone()))?;
        buckets.entry(group.clone()).or_default().push(link.clone());
    }

    let node_id = &upstream_root.target;
    let node = hierarchy.root().node(node_id)?.clone();
    let shared = node.kind.pad_constraints().shared_namespace;

    let mut splits = Vec::new();
    for (group, links) in buckets {
        let Some(first) = links.first() else {
            continue;
        };
        let downstream_target = first.target.clone();
        let downstream_landing = first.landing_pad;

        let instance = hierarchy.instance_mut(root_instance)?;
        let number = instance.next_node_instance_number(node_id);
        let m_id = NodeInstanceId::new(node_id.clone(), number);
        let m = NodeInstance::new(m_id.clone(), node.pad_count);
        instance.add_node(m.clone())?;
        changes.record(ChangeRecord::NodeInstanceAdded {
            model: root_instance,
            node: m,
        });
        instance.add_to_group(&m_id, &group)?;
        changes.record(ChangeRecord::GroupMembershipAdded {
            model: root_instance,
            group: group.clone(),
            node: m_id.clone(),
        });

        let needed = if shared { links.len() + 1 } else { links.len() };
        if ensure_pad_capacity(hierarchy, root_instance, &m_id, needed, changes)? {
            pads.invalidate_base(node_id);
        }

        let m_launch =
            find_source_pad(hierarchy, root_instance, &m_id, downstream_root.launch_pad, pads)?
                .unwrap_or(downstream_root.launch_pad);
        pads.note_launch(root_instance, &m_id, m_launch);

        let mut replaced = Vec::new();
        for old in links {
            let removed = hierarchy.instance_mut(root_instance)?.remove_link(&old.id)?;
            pads.forget_link(root_instance, &removed);
            changes.record(ChangeRecord::LinkInstanceRemoved {
                model: root_instance,
                link: removed,
            });

            let landing = find_landing_pad(
                hierarchy,
                root_instance,
                &m_id,
                upstream_root.landing_pad,
                pads,
            )?;
            let instance = hierarchy.instance_mut(root_instance)?;
            let number = instance.next_link_instance_number(&upstream_root.id);
            let upstream = LinkInstance::new(
                LinkInstanceId::new(upstream_root.id.clone(), number),
                old.source.clone(),
                m_id.clone(),
                old.launch_pad,
                landing,
            );
            replaced.push((old.id, upstream.id.clone()));
            add_link(hierarchy, root_instance, upstream, pads, changes)?;
        }

        let number = hierarchy
            .instance(root_instance)?
            .next_link_instance_number(&downstream_root.id);
        let downstream = LinkInstance::new(
            LinkInstanceId::new(downstream_root.id.clone(), number),
            m_id.clone(),
            downstream_target,
            m_launch,
            downstream_landing,
        );
        let downstream_id = downstream.id.clone();
        add_link(hierarchy, root_instance, downstream, pads, changes)?;

        debug!(target: "biotapestry-propagation",
            "Split {} link instance(s) onto {} in {} group {}",
            replaced.len(), m_id, hierarchy.model_name(ModelRef::Instance(root_instance)), group);
        splits.push(Split {
            node: m_id,
            group,
            replaced,
            downstream: downstream_id,
        });
    }
    Ok(splits)
}

fn add_link(
    hierarchy: &mut GenomeHierarchy,
    model: InstanceIdx,
    link: LinkInstance,
    pads: &mut PadCache,
    changes: &UndoCapture,
) -> PropagationResult<()> {
    hierarchy.instance_mut(model)?.add_link(link.clone())?;
    pads.record_link(model, &link);
    changes.record(ChangeRecord::LinkInstanceAdded { model, link });
    Ok(())
}

/// Replay the root instance's splits in `subset` wherever it held one of the
/// replaced link instances
fn mirror_into_subset(
    hierarchy: &mut GenomeHierarchy,
    subset: InstanceIdx,
    old_link: &LinkId,
    splits: &[Split],
    replaced: &mut BTreeMap<(InstanceIdx, LinkInstanceId), NodeInstanceId>,
    changes: &UndoCapture,
) -> PropagationResult<Vec<NodeInstanceId>> {
    let parent = hierarchy
        .parent_of(subset)?
        .ok_or_else(|| {
            StructureError::NoParentModel(hierarchy.model_name(ModelRef::Instance(subset)))
        })?;
    let held: Vec<LinkInstanceId> = hierarchy
        .instance(subset)?
        .links_of_base(old_link)
        .map(|link| link.id.clone())
        .collect();

    let mut created = Vec::new();
    let mut pads = PadCache::disabled();
    for old in held {
        let Some((split, upstream)) = splits.iter().find_map(|split| {
            split
                .replaced
                .iter()
                .find(|(replaced, _)| *replaced == old)
                .map(|(_, upstream)| (split, upstream))
        }) else {
            warn!(target: "biotapestry-propagation",
                "Link instance {} in {} has no counterpart in its root instance",
                old, hierarchy.model_name(ModelRef::Instance(subset)));
            continue;
        };

        let removed = hierarchy.instance_mut(subset)?.remove_link(&old)?;
        changes.record(ChangeRecord::LinkInstanceRemoved {
            model: subset,
            link: removed,
        });
        replaced.insert((subset, old), split.node.clone());

        if !hierarchy.instance(subset)?.contains_node(&split.node) {
            let node = hierarchy.instance(parent)?.node(&split.node)?.clone();
            let local_group = hierarchy.instance(subset)?.local_group_id(&split.group.base());
            let instance = hierarchy.instance_mut(subset)?;
            instance.add_node(node.clone())?;
            changes.record(ChangeRecord::NodeInstanceAdded { model: subset, node });
            if instance.add_to_group(&split.node, &local_group)? {
                changes.record(ChangeRecord::GroupMembershipAdded {
                    model: subset,
                    group: local_group,
                    node: split.node.clone(),
                });
            }
            created.push(split.node.clone());
        }

        for id in [upstream, &split.downstream] {
            if hierarchy.instance(subset)?.contains_link(id) {
                continue;
            }
            let copy = hierarchy.instance(parent)?.link(id)?.clone();
            add_link(hierarchy, subset, copy, &mut pads, changes)?;
        }
    }
    Ok(created)
}

/// Add the M instance that replaced each captured link instance to the
/// module that held both of its ends. Returns how many memberships were
/// added.
fn repair_modules(
    hierarchy: &mut GenomeHierarchy,
    needs: &[ModulePadNeed],
    replaced: &BTreeMap<(InstanceIdx, LinkInstanceId), NodeInstanceId>,
    changes: &UndoCapture,
) -> PropagationResult<usize> {
    let mut added = 0;
    for need in needs {
        let Some(node) = replaced.get(&(need.model, need.link.clone())) else {
            continue;
        };
        let Some(module) = hierarchy
            .instance_mut(need.model)?
            .overlays
            .get_mut(&need.overlay)
            .and_then(|overlay| overlay.modules.get_mut(&need.module))
        else {
            continue;
        };
        if module.add_member(node.clone()) {
            changes.record(ChangeRecord::ModuleMembershipAdded {
                model: need.model,
                overlay: need.overlay.clone(),
                module: need.module.clone(),
                node: node.clone(),
            });
            added += 1;
        }
    }
    Ok(added)
}

/// Outcome of a relayout run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayoutSummary {
    /// Root instances whose placements were committed
    pub instances_done: usize,
    pub placements: usize,
}

/// Placements computed for one root instance, not yet committed
fn route_instance(
    hierarchy: &GenomeHierarchy,
    root_instance: InstanceIdx,
    targets: &[RelayoutTarget],
) -> PropagationResult<Vec<(String, NodePlacement)>> {
    let layout = hierarchy.layout_for(ModelRef::Instance(root_instance))?;
    let mut routed = Vec::new();
    for target in targets {
        let key = target.node.to_string();
        if layout.placement(&key).is_some() {
            continue;
        }
        match (
            layout.placement(&target.upstream.to_string()),
            layout.placement(&target.downstream.to_string()),
        ) {
            (Some(a), Some(b)) => {
                let mut placement = NodePlacement::at(a.position.midpoint(&b.position));
                placement.orientation = a.orientation;
                routed.push((key, placement));
            }
            _ => debug!(target: "biotapestry-propagation",
                "No endpoint placements for {} in {}, leaving it unplaced",
                key, hierarchy.model_name(ModelRef::Instance(root_instance))),
        }
    }
    Ok(routed)
}

/// Place every M instance of `job` between its neighbours.
///
/// Progress is reported into `range`. The monitor and `exit` are consulted
/// once per root instance after its placements are computed; a stop request
/// discards that instance's result and returns `ExitRequested`, keeping the
/// instances already committed.
pub fn run_relayout(
    hierarchy: &RwLock<GenomeHierarchy>,
    job: &RelayoutJob,
    range: ProgressRange,
    monitor: &mut dyn ProgressMonitor,
    exit: &AtomicBool,
    changes: &UndoCapture,
) -> PropagationResult<RelayoutSummary> {
    let mut summary = RelayoutSummary::default();
    let total = job.len().max(1) as f64;
    monitor.update_progress(range.percent(0.0));

    for (done, (root_instance, targets)) in job.instances.iter().enumerate() {
        let routed = route_instance(&hierarchy.read(), *root_instance, targets)?;

        let keep_going = monitor.update_progress(range.percent((done as f64 + 0.5) / total));
        if !keep_going || exit.load(Ordering::Relaxed) {
            warn!(target: "biotapestry-propagation",
                "Relayout stopped before committing root instance {} ({} of {} done)",
                root_instance, summary.instances_done, job.len());
            return Err(PropagationError::ExitRequested);
        }

        let mut guard = hierarchy.write();
        let layout_id = guard.layout_id_for(ModelRef::Instance(*root_instance))?;
        let layout = guard.layout_for_mut(ModelRef::Instance(*root_instance))?;
        for (key, placement) in routed {
            let before = layout.set_placement(key.clone(), placement.clone());
            changes.record(ChangeRecord::PlacementSet {
                layout: layout_id.clone(),
                node_key: key,
                before,
                after: placement,
            });
            summary.placements += 1;
        }
        summary.instances_done += 1;
    }

    monitor.update_progress(range.percent(1.0));
    debug!(target: "biotapestry-propagation",
        "Relayout finished: {} placement(s) in {} root instance(s)",
        summary.placements, summary.instances_done);
    Ok(summary)
}

/// Handle to a relayout running on its own thread
pub struct RelayoutWorker {
    handle: Option<JoinHandle<PropagationResult<RelayoutSummary>>>,
    exit: Arc<AtomicBool>,
}

impl RelayoutWorker {
    /// Ask the worker to stop at its next checkpoint
    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |handle| handle.is_finished())
    }

    /// Wait for the worker and return its result
    pub fn join(mut self) -> PropagationResult<RelayoutSummary> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| PropagationError::Worker("relayout worker already joined".to_string()))?;
        handle
            .join()
            .map_err(|_| PropagationError::Worker("relayout worker panicked".to_string()))?
    }
}

impl Drop for RelayoutWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.exit.store(true, Ordering::Relaxed);
            if handle.join().is_err() {
                warn!(target: "biotapestry-propagation",
                    "Relayout worker panicked during shutdown");
            }
        }
    }
}

/// Run [`run_relayout`] on a named worker thread
pub fn spawn_relayout(
    hierarchy: Arc<RwLock<GenomeHierarchy>>,
    job: RelayoutJob,
    range: ProgressRange,
    mut monitor: Box<dyn ProgressMonitor>,
    changes: UndoCapture,
) -> PropagationResult<RelayoutWorker> {
    let exit = Arc::new(AtomicBool::new(false));
    let exit_clone = Arc::clone(&exit);
    let handle = thread::Builder::new()
        .name("biotap-relayout".to_string())
        .spawn(move || {
            run_relayout(&hierarchy, &job, range, monitor.as_mut(), &exit_clone, &changes)
        })
        .map_err(|e| PropagationError::Worker(format!("Failed to spawn relayout worker: {}", e)))?;
    info!(target: "biotapestry-propagation", "Relayout worker started");
    Ok(RelayoutWorker {
        handle: Some(handle),
        exit,
    })
}

/// A relayout either running in the background or already finished
pub enum RelayoutHandle {
    Background(RelayoutWorker),
    Finished(RelayoutSummary),
}

impl RelayoutHandle {
    /// Wait for the relayout if it is still running
    pub fn wait(self) -> PropagationResult<RelayoutSummary> {
        match self {
            RelayoutHandle::Background(worker) => worker.join(),
            RelayoutHandle::Finished(summary) => Ok(summary),
        }
    }
}

/// Relayout `job` the way `settings` ask: on a worker thread or inline,
/// reporting into the configured slice of the progress bar
pub fn start_relayout(
    hierarchy: Arc<RwLock<GenomeHierarchy>>,
    job: RelayoutJob,
    settings: &PropagationSettings,
    mut monitor: Box<dyn ProgressMonitor>,
    changes: UndoCapture,
) -> PropagationResult<RelayoutHandle> {
    let range = ProgressRange::new(
        settings.relayout_progress_start,
        settings.relayout_progress_end,
    );
    if job.is_empty() {
        return Ok(RelayoutHandle::Finished(RelayoutSummary::default()));
    }
    if settings.background_relayout {
        return spawn_relayout(hierarchy, job, range, monitor, changes)
            .map(RelayoutHandle::Background);
    }
    let exit = AtomicBool::new(false);
    let summary = run_relayout(&hierarchy, &job, range, monitor.as_mut(), &exit, &changes)?;
    Ok(RelayoutHandle::Finished(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use biotapestry_structures::{DbGenome, Group, NetModule, NetworkOverlay, NodeId, NodeKind};

    /// A -> B with one instance in vfa (region g) and a copy in vf1
    fn hierarchy() -> (GenomeHierarchy, InstanceIdx, InstanceIdx) {
        let mut root = DbGenome::new("db", "Root");
        root.add_node(Node::gene(NodeId::new("A"), "a")).unwrap();
        root.add_node(Node::gene(NodeId::new("B"), "b")).unwrap();
        root.add_link(Linkage::new(LinkId::new("AB"), NodeId::new("A"), NodeId::new("B"), 0, 2))
            .unwrap();
        let mut h = GenomeHierarchy::new(root);
        let vfa = h.add_root_instance("vfa", "VfA").unwrap();
        let vf1 = h.add_subset_instance(vfa, "vf1", "Vf1").unwrap();
        let a = NodeInstanceId::new(NodeId::new("A"), 0);
        let b = NodeInstanceId::new(NodeId::new("B"), 0);
        let link_id = LinkInstanceId::new(LinkId::new("AB"), 0);
        let link = LinkInstance::new(link_id, a.clone(), b.clone(), 0, 2);
        for (model, group) in [(vfa, "g"), (vf1, "g:1")] {
            let inst = h.instance_mut(model).unwrap();
            inst.add_group(Group::new(GroupId::new(group), "g")).unwrap();
            for id in [&a, &b] {
                inst.add_node(NodeInstance::new(id.clone(), 5)).unwrap();
                inst.add_to_group(id, &GroupId::new(group)).unwrap();
            }
            inst.add_link(link.clone()).unwrap();
        }
        let layout = h.layout_for_mut(ModelRef::Instance(vfa)).unwrap();
        layout.set_placement("A:0", NodePlacement::at(Point::new(0.0, 0.0)));
        layout.set_placement("B:0", NodePlacement::at(Point::new(100.0, 40.0)));
        (h, vfa, vf1)
    }

    fn request() -> InsertionRequest {
        InsertionRequest {
            link: LinkId::new("AB"),
            new_node: Node::new(NodeId::new("M"), "m", NodeKind::Box),
            new_links: (LinkId::new("AM"), LinkId::new("MB")),
            root_position: Some(Point::new(50.0, 20.0)),
            overlay: None,
        }
    }

    #[test]
    fn test_split_mirrors_into_subsets() {
        let (mut h, vfa, vf1) = hierarchy();
        let changes = UndoCapture::new();
        let report = insert_node_into_link(&mut h, &request(), &changes).unwrap();

        assert!(h.root().link(&LinkId::new("AB")).is_err());
        assert!(h.root().link(&LinkId::new("AM")).is_ok());
        assert_eq!(report.split_links, 1);

        let m = NodeInstanceId::new(NodeId::new("M"), 0);
        for model in [vfa, vf1] {
            let inst = h.instance(model).unwrap();
            assert!(inst.contains_node(&m));
            assert_eq!(inst.links_of_base(&LinkId::new("AB")).count(), 0);
            assert_eq!(inst.links_of_base(&LinkId::new("AM")).count(), 1);
            assert_eq!(inst.links_of_base(&LinkId::new("MB")).count(), 1);
        }
        assert_eq!(h.instance(vf1).unwrap().main_group_of(&m), Some(&GroupId::new("g:1")));

        let mb = LinkId::new("MB");
        let downstream = h.instance(vfa).unwrap().links_of_base(&mb).next().unwrap();
        assert_eq!(downstream.landing_pad, 2);
        assert_eq!(report.relayout.instances[&vfa].len(), 1);
    }

    #[test]
    fn test_fan_in_collapses_onto_one_node_and_grows_pads() {
        let (mut h, vfa, _) = hierarchy();
        {
            let inst = h.instance_mut(vfa).unwrap();
            for n in 1..=4 {
                let a = NodeInstanceId::new(NodeId::new("A"), n);
                let group = GroupId::new(format!("a{}", n));
                inst.add_group(Group::new(group.clone(), "a")).unwrap();
                inst.add_node(NodeInstance::new(a.clone(), 5)).unwrap();
                inst.add_to_group(&a, &group).unwrap();
                let link = LinkInstance::new(
                    LinkInstanceId::new(LinkId::new("AB"), n),
                    a,
                    NodeInstanceId::new(NodeId::new("B"), 0),
                    0,
                    2,
                );
                inst.add_link(link).unwrap();
            }
        }
        let changes = UndoCapture::new();
        let report = insert_node_into_link(&mut h, &request(), &changes).unwrap();

        assert_eq!(report.new_instances[&vfa].len(), 1);
        let inst = h.instance(vfa).unwrap();
        assert_eq!(inst.links_of_base(&LinkId::new("AM")).count(), 5);
        assert_eq!(inst.links_of_base(&LinkId::new("MB")).count(), 1);
        // Box grows from 4 in steps of 2 to take five landings plus a launch
        let m = inst.node(&NodeInstanceId::new(NodeId::new("M"), 0)).unwrap();
        assert_eq!(m.pad_count, 6);
    }

    #[test]
    fn test_module_fixup_adds_new_node() {
        let (mut h, vfa, _) = hierarchy();
        let mut overlay = NetworkOverlay::new(OverlayId::new("ov"), "Overlay");
        let mut module = NetModule::new(ModuleId::new("mod"), "Module");
        module.add_member(NodeInstanceId::new(NodeId::new("A"), 0));
        module.add_member(NodeInstanceId::new(NodeId::new("B"), 0));
        overlay.add_module(module);
        h.instance_mut(vfa).unwrap().overlays.insert(overlay.id.clone(), overlay);

        let report = insert_node_into_link(&mut h, &request(), &UndoCapture::new()).unwrap();
        assert_eq!(report.module_needs.len(), 1);
        assert_eq!(report.module_memberships_added, 1);
        let module = &h.instance(vfa).unwrap().overlays[&OverlayId::new("ov")].modules
            [&ModuleId::new("mod")];
        assert!(module.contains(&NodeInstanceId::new(NodeId::new("M"), 0)));
    }

    #[test]
    fn test_module_fixup_limited_to_chosen_overlay() {
        let (mut h, vfa, _) = hierarchy();
        for overlay_id in ["ov", "other"] {
            let mut overlay = NetworkOverlay::new(OverlayId::new(overlay_id), overlay_id);
            let mut module = NetModule::new(ModuleId::new("mod"), "Module");
            module.add_member(NodeInstanceId::new(NodeId::new("A"), 0));
            module.add_member(NodeInstanceId::new(NodeId::new("B"), 0));
            overlay.add_module(module);
            h.instance_mut(vfa)
                .unwrap()
                .overlays
                .insert(overlay.id.clone(), overlay);
        }

        let request = InsertionRequest {
            overlay: Some(OverlayId::new("ov")),
            ..request()
        };
        let report = insert_node_into_link(&mut h, &request, &UndoCapture::new()).unwrap();
        assert_eq!(report.module_memberships_added, 1);

        let m = NodeInstanceId::new(NodeId::new("M"), 0);
        let overlays = &h.instance(vfa).unwrap().overlays;
        assert!(overlays[&OverlayId::new("ov")].modules[&ModuleId::new("mod")].contains(&m));
        assert!(!overlays[&OverlayId::new("other")].modules[&ModuleId::new("mod")].contains(&m));
    }

    #[test]
    fn test_relayout_worker_places_midpoint() {
        let (mut h, vfa, _) = hierarchy();
        let changes = UndoCapture::new();
        let report = insert_node_into_link(&mut h, &request(), &changes).unwrap();
        let shared = Arc::new(RwLock::new(h));

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let monitor = move |percent: u8| {
            seen_clone.lock().push(percent);
            true
        };
        let worker = spawn_relayout(
            Arc::clone(&shared),
            report.relayout,
            ProgressRange::new(0.5, 1.0),
            Box::new(monitor),
            changes.clone(),
        )
        .unwrap();
        let summary = worker.join().unwrap();

        assert_eq!(summary.placements, 1);
        let guard = shared.read();
        let placed = guard
            .layout_for(ModelRef::Instance(vfa))
            .unwrap()
            .placement("M:0")
            .unwrap();
        assert_eq!(placed.position, Point::new(50.0, 20.0));
        let seen = seen.lock();
        assert_eq!(seen.first(), Some(&50));
        assert_eq!(seen.last(), Some(&100));
    }

    #[test]
    fn test_relayout_exit_discards_uncommitted_instance() {
        let (mut h, vfa, _) = hierarchy();
        let changes = UndoCapture::new();
        let report = insert_node_into_link(&mut h, &request(), &changes).unwrap();
        let shared = RwLock::new(h);
        let mark = changes.len();

        let mut calls = 0;
        let mut monitor = |_percent: u8| {
            calls += 1;
            calls < 2
        };
        let result = run_relayout(
            &shared,
            &report.relayout,
            ProgressRange::full(),
            &mut monitor,
            &AtomicBool::new(false),
            &changes,
        );
        assert!(matches!(result, Err(PropagationError::ExitRequested)));
        assert!(shared
            .read()
            .layout_for(ModelRef::Instance(vfa))
            .unwrap()
            .placement("M:0")
            .is_none());
        assert_eq!(changes.len(), mark);
    }

    #[test]
    fn test_inline_relayout_follows_settings() {
        let (mut h, vfa, _) = hierarchy();
        let changes = UndoCapture::new();
        let report = insert_node_into_link(&mut h, &request(), &changes).unwrap();
        let shared = Arc::new(RwLock::new(h));

        let settings = PropagationSettings {
            background_relayout: false,
            relayout_progress_start: 0.2,
            relayout_progress_end: 0.4,
            ..Default::default()
        };
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let monitor = move |percent: u8| {
            seen_clone.lock().push(percent);
            true
        };
        let handle = start_relayout(
            Arc::clone(&shared),
            report.relayout,
            &settings,
            Box::new(monitor),
            changes,
        )
        .unwrap();
        assert!(matches!(handle, RelayoutHandle::Finished(_)));
        assert_eq!(handle.wait().unwrap().placements, 1);
        assert!(shared
            .read()
            .layout_for(ModelRef::Instance(vfa))
            .unwrap()
            .placement("M:0")
            .is_some());
        let seen = seen.lock();
        assert_eq!(seen.first(), Some(&20));
        assert_eq!(seen.last(), Some(&40));
    }
}
