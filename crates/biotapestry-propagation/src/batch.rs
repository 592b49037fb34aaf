// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

/*!
Batch propagation - the top-level entry point for propagating a selection of
root nodes and links into one target instance.

A batch runs in phases:

1. **Start**: build the ancestry chain and resolve each node's group
2. **ProcessRootInstance**: place nodes, then links, in the root instance
3. **ProcessSubsets**: carry them down every level to the target
4. **Done**

Module memberships are never touched here: a node placed below the level
that defines a module does not join it. Module fixup belongs to node
insertion (see [`crate::insertion`]).

Nodes are propagated before link tuples are resolved. A tuple resolution
failure therefore leaves the propagated nodes in place: changes are never
rolled back, and the error reports how many nodes were already propagated.
Applied changes are still announced to the event sink.
*/

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use biotapestry_structures::{
    GenomeHierarchy, GroupId, GroupTuple, LinkId, ModelRef, NodeId, NodeInstanceId,
};

use crate::cache::PropagationCaches;
use crate::context::PropagationContext;
use crate::events::{dispatch_batch_events, ModelEventSink};
use crate::group_resolution::{
    fully_connected, resolve_inheritable_groups, resolve_link_group_tuples, resolve_target_groups,
    tuple_connected, LinkTupleQuery, TupleResolution, TupleStatus,
};
use crate::hierarchy_walker::{
    apply_at_level, propagate_down_entire_subtree, AncestryChain, LevelOutcome, PropagationElement,
    WalkMode, WalkReport,
};
use crate::node_propagation::PlacementOffset;
use crate::types::{PropagationError, PropagationResult};
use crate::undo::{ChangeRecord, UndoCapture};

/// Source of user decisions when placement is ambiguous
pub trait DecisionProvider {
    /// Pick one group for `node`, or `None` to cancel
    fn choose_group(&mut self, node: &NodeId, options: &[GroupId]) -> Option<GroupId>;

    /// Pick one tuple for all of `links`, or `None` to cancel
    fn choose_tuple(&mut self, links: &[LinkId], options: &[GroupTuple]) -> Option<GroupTuple>;
}

/// Decision provider that never decides
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractive;

impl DecisionProvider for NonInteractive {
    fn choose_group(&mut self, _node: &NodeId, _options: &[GroupId]) -> Option<GroupId> {
        None
    }

    fn choose_tuple(&mut self, _links: &[LinkId], _options: &[GroupTuple]) -> Option<GroupTuple> {
        None
    }
}

/// Batch phase tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchPhase {
    /// Resolving groups, nothing applied yet
    Start,
    ProcessRootInstance,
    ProcessSubsets,
    /// Batch completed successfully
    Done,
    /// Batch failed; earlier changes were kept
    Failed,
}

/// Batch progress information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgress {
    pub phase: BatchPhase,
    /// Levels of the ancestry chain processed in the current pass
    pub levels_done: usize,
    pub levels_total: usize,
    /// Node instances created, all levels
    pub nodes_propagated: usize,
    /// Link instances created, all levels
    pub links_propagated: usize,
    pub duration_ms: u64,
}

impl Default for BatchProgress {
    fn default() -> Self {
        Self {
            phase: BatchPhase::Start,
            levels_done: 0,
            levels_total: 0,
            nodes_propagated: 0,
            links_propagated: 0,
            duration_ms: 0,
        }
    }
}

/// What to propagate
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub nodes: Vec<NodeId>,
    pub links: Vec<LinkId>,
    /// Local id of the target group; resolved per node when absent
    pub target_group: Option<GroupId>,
}

/// Result of a successful batch
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Node instances created in the target itself
    pub target_nodes: Vec<NodeInstanceId>,
    /// Link instance ids created in the target itself
    pub target_links: Vec<String>,
    /// Group chosen per node, as local ids of the target
    pub node_groups: BTreeMap<NodeId, GroupId>,
    pub tuple_status: Option<TupleStatus>,
    /// Links left alone because the target already connects them through
    /// the requested groups, or through every group pair available
    pub skipped_links: Vec<LinkId>,
    pub changes: Vec<ChangeRecord>,
    pub events_sent: usize,
}

/// Batch propagation orchestrator
pub struct PropagationBatch {
    context: PropagationContext,
    undo: UndoCapture,
    progress: Arc<RwLock<BatchProgress>>,
    start_time: Instant,
}

impl PropagationBatch {
    pub fn new(context: PropagationContext, undo: UndoCapture) -> Self {
        Self {
            context,
            undo,
            progress: Arc::new(RwLock::new(BatchProgress::default())),
            start_time: Instant::now(),
        }
    }

    /// Get current batch progress
    pub fn progress(&self) -> BatchProgress {
        self.progress.read().clone()
    }

    /// Shared handle for polling progress from another thread
    pub fn progress_handle(&self) -> Arc<RwLock<BatchProgress>> {
        Arc::clone(&self.progress)
    }

    pub fn context(&self) -> &PropagationContext {
        &self.context
    }

    /// Run the batch.
    ///
    /// The event sink is notified once, with every model and layout the batch
    /// touched, whether or not the batch succeeds.
    pub fn run(
        &mut self,
        hierarchy: &mut GenomeHierarchy,
        request: &BatchRequest,
        decisions: &mut dyn DecisionProvider,
        events: &mut dyn ModelEventSink,
    ) -> PropagationResult<BatchReport> {
        self.start_time = Instant::now();
        *self.progress.write() = BatchProgress::default();
        let mark = self.undo.len();
        info!(target: "biotapestry-propagation",
            "Starting propagation batch into {}: {} node(s), {} link(s)",
            hierarchy.model_name(ModelRef::Instance(self.context.target)),
            request.nodes.len(), request.links.len());

        match self.execute(hierarchy, request, decisions) {
            Ok(mut report) => {
                self.update_phase(BatchPhase::Done);
                report.changes = self.undo.since(mark);
                report.events_sent = dispatch_batch_events(events, &report.changes);
                let progress = self.progress();
                info!(target: "biotapestry-propagation",
                    "Batch complete: {} node(s), {} link(s), {} change(s) in {}ms",
                    progress.nodes_propagated, progress.links_propagated,
                    report.changes.len(), progress.duration_ms);
                Ok(report)
            }
            Err(err) => {
                self.update_phase(BatchPhase::Failed);
                let applied = self.undo.since(mark);
                if !applied.is_empty() {
                    warn!(target: "biotapestry-propagation",
                        "Batch failed after {} change(s) were applied; they are kept: {}",
                        applied.len(), err);
                    dispatch_batch_events(events, &applied);
                }
                Err(err)
            }
        }
    }

    /// Place `element` in the context's target and every descendant that
    /// holds the inherited copy of `start_group`.
    ///
    /// The target must be a root instance. Passes over the subtree are
    /// bounded by the context's `max_subtree_passes`. Applied changes are
    /// announced whether or not the walk converges.
    pub fn run_subtree(
        &mut self,
        hierarchy: &mut GenomeHierarchy,
        element: &PropagationElement,
        start_group: &GroupId,
        events: &mut dyn ModelEventSink,
    ) -> PropagationResult<WalkReport> {
        self.start_time = Instant::now();
        *self.progress.write() = BatchProgress::default();
        let mark = self.undo.len();
        let root_instance = self.context.target;
        let mut caches = PropagationCaches::new(self.context.settings.use_pad_cache);
        let placement = PlacementOffset {
            source_layout: hierarchy.layout_id_for(ModelRef::Root)?,
            offset: self.context.settings.placement_offset,
        };
        let levels_total = hierarchy.descendants_of(root_instance).len() + 1;
        self.update_progress(|p| p.levels_total = levels_total);
        self.update_phase(BatchPhase::ProcessRootInstance);

        let result = propagate_down_entire_subtree(
            hierarchy,
            element,
            start_group,
            root_instance,
            Some(&placement),
            self.context.settings.max_subtree_passes,
            &mut caches,
            &self.undo,
        );
        dispatch_batch_events(events, &self.undo.since(mark));

        match &result {
            Ok(report) => {
                let created = report.created_count();
                self.update_progress(|p| {
                    p.levels_done = report.outcomes.len();
                    match element {
                        PropagationElement::Node { .. } => p.nodes_propagated = created,
                        PropagationElement::Link { .. } => p.links_propagated = created,
                        PropagationElement::Group(_) => {}
                    }
                });
                self.update_phase(BatchPhase::Done);
                info!(target: "biotapestry-propagation",
                    "Subtree walk of {} complete: {} created over {} pass(es)",
                    element.describe(), created, report.passes);
            }
            Err(err) => {
                self.update_phase(BatchPhase::Failed);
                warn!(target: "biotapestry-propagation",
                    "Subtree walk of {} failed: {}", element.describe(), err);
            }
        }
        result
    }

    fn execute(
        &mut self,
        hierarchy: &mut GenomeHierarchy,
        request: &BatchRequest,
        decisions: &mut dyn DecisionProvider,
    ) -> PropagationResult<BatchReport> {
        let target = self.context.target;
        let chain = AncestryChain::build(hierarchy, target)?;
        let mut caches = PropagationCaches::new(self.context.settings.use_pad_cache);
        let placement = PlacementOffset {
            source_layout: hierarchy.layout_id_for(ModelRef::Root)?,
            offset: self.context.settings.placement_offset,
        };
        self.update_progress(|p| p.levels_total = chain.len());

        let mut report = BatchReport::default();
        if let Some(group) = &request.target_group {
            hierarchy.instance(target)?.group(group)?;
        }

        let requested: BTreeSet<NodeId> = request.nodes.iter().cloned().collect();
        for node in &requested {
            let group =
                self.resolve_node_group(hierarchy, node, request.target_group.as_ref(), decisions)?;
            report.node_groups.insert(node.clone(), group);
        }
        self.include_link_endpoints(hierarchy, request, decisions, &mut report)?;

        let node_elements: Vec<PropagationElement> = report
            .node_groups
            .iter()
            .map(|(base, group)| {
                Ok(PropagationElement::Node {
                    base: base.clone(),
                    is_gene: hierarchy.root().node(base)?.is_gene(),
                    group: group.base(),
                })
            })
            .collect::<PropagationResult<_>>()?;
        let created = self.walk(hierarchy, &chain, &node_elements, Some(&placement), &mut caches)?;
        for id in created {
            if let Ok(id) = id.parse::<NodeInstanceId>() {
                report.target_nodes.push(id);
            }
        }

        let link_elements = self.resolve_links(hierarchy, request, &mut report, decisions)?;
        report.target_links = self.walk(hierarchy, &chain, &link_elements, None, &mut caches)?;
        Ok(report)
    }

    /// Apply `elements` level by level, returning ids created in the target
    fn walk(
        &mut self,
        hierarchy: &mut GenomeHierarchy,
        chain: &AncestryChain,
        elements: &[PropagationElement],
        placement: Option<&PlacementOffset>,
        caches: &mut PropagationCaches,
    ) -> PropagationResult<Vec<String>> {
        let mut created_in_target = Vec::new();
        for (done, level) in chain.levels().iter().enumerate() {
            let phase = if *level == chain.root_instance() {
                BatchPhase::ProcessRootInstance
            } else {
                BatchPhase::ProcessSubsets
            };
            self.update_phase(phase);

            for element in elements {
                let outcome = apply_at_level(
                    hierarchy,
                    *level,
                    element,
                    WalkMode::Ancestry,
                    placement,
                    caches,
                    &self.undo,
                )?;
                if let LevelOutcome::Created(id) = outcome {
                    self.update_progress(|p| match element {
                        PropagationElement::Node { .. } => p.nodes_propagated += 1,
                        PropagationElement::Link { .. } => p.links_propagated += 1,
                        PropagationElement::Group(_) => {}
                    });
                    if *level == chain.deepest() {
                        created_in_target.push(id);
                    }
                }
            }
            self.update_progress(|p| p.levels_done = done + 1);
        }
        Ok(created_in_target)
    }

    /// Group (local id of the target) that `node` should be placed into
    fn resolve_node_group(
        &self,
        hierarchy: &GenomeHierarchy,
        node: &NodeId,
        hint: Option<&GroupId>,
        decisions: &mut dyn DecisionProvider,
    ) -> PropagationResult<GroupId> {
        let target = self.context.target;
        let is_gene = hierarchy.root().node(node)?.is_gene();
        if let Some(hint) = hint {
            return Ok(hint.clone());
        }

        let mut options = resolve_target_groups(hierarchy, node, target, is_gene)?;
        options.extend(resolve_inheritable_groups(hierarchy, node, target)?);
        let options: Vec<GroupId> = options.into_iter().collect();
        match options.as_slice() {
            [] => Err(PropagationError::NoEligibleGroup {
                node: node.clone(),
                model: hierarchy.model_name(ModelRef::Instance(target)),
            }),
            [only] => Ok(only.clone()),
            _ => {
                if !self.context.settings.interactive {
                    return Err(PropagationError::Ambiguous {
                        subject: format!("node {}", node),
                        options: options.len(),
                    });
                }
                decisions
                    .choose_group(node, &options)
                    .filter(|choice| options.contains(choice))
                    .ok_or(PropagationError::Cancelled)
            }
        }
    }

    /// Add link endpoints the target does not hold yet to the nodes to place
    fn include_link_endpoints(
        &self,
        hierarchy: &GenomeHierarchy,
        request: &BatchRequest,
        decisions: &mut dyn DecisionProvider,
        report: &mut BatchReport,
    ) -> PropagationResult<()> {
        let target = hierarchy.instance(self.context.target)?;
        for link in &request.links {
            let root_link = hierarchy.root().link(link)?;
            for endpoint in [&root_link.source, &root_link.target] {
                if report.node_groups.contains_key(endpoint)
                    || target.nodes_of_base(endpoint).next().is_some()
                {
                    continue;
                }
                let group = self.resolve_node_group(
                    hierarchy,
                    endpoint,
                    request.target_group.as_ref(),
                    decisions,
                )?;
                debug!(target: "biotapestry-propagation",
                    "Including endpoint {} of link {} in group {}", endpoint, link, group);
                report.node_groups.insert(endpoint.clone(), group);
            }
        }
        Ok(())
    }

    /// Resolve group tuples for the requested links and turn them into walker
    /// elements
    fn resolve_links(
        &self,
        hierarchy: &GenomeHierarchy,
        request: &BatchRequest,
        report: &mut BatchReport,
        decisions: &mut dyn DecisionProvider,
    ) -> PropagationResult<Vec<PropagationElement>> {
        let target = self.context.target;
        let placed_groups: BTreeSet<&GroupId> = report.node_groups.values().collect();
        let hint_group = request.target_group.clone().or_else(|| match placed_groups.len() {
            1 => placed_groups.first().map(|group| (*group).clone()),
            _ => None,
        });

        let mut links = Vec::new();
        for link in request.links.iter().collect::<BTreeSet<_>>() {
            let hinted_connected = match &hint_group {
                Some(group) => {
                    tuple_connected(hierarchy, target, link, &GroupTuple::within(group.clone()))?
                }
                None => false,
            };
            if hinted_connected || fully_connected(hierarchy, target, link)? {
                debug!(target: "biotapestry-propagation",
                    "Link {} already connected in {}, skipping", link,
                    hierarchy.model_name(ModelRef::Instance(target)));
                report.skipped_links.push(link.clone());
            } else {
                links.push(link.clone());
            }
        }
        if links.is_empty() {
            return Ok(Vec::new());
        }

        let query = LinkTupleQuery {
            links: links.clone(),
            hint_group,
            pending: BTreeMap::new(),
        };
        let mut resolution = resolve_link_group_tuples(hierarchy, target, &query)?;
        report.tuple_status = Some(resolution.status);

        let nodes_propagated = self.progress.read().nodes_propagated;
        match resolution.status {
            TupleStatus::Ok | TupleStatus::SingleTuplePerLink => {}
            TupleStatus::Ambiguous => {
                self.decide_tuple(&links, &mut resolution, decisions, nodes_propagated)?;
            }
            status => {
                return Err(PropagationError::LinkResolution {
                    status,
                    nodes_propagated,
                });
            }
        }

        Ok(resolution
            .chosen
            .into_iter()
            .map(|(base, tuple)| PropagationElement::Link {
                base,
                tuple: GroupTuple::new(tuple.source.base(), tuple.target.base()),
            })
            .collect())
    }

    fn decide_tuple(
        &self,
        links: &[LinkId],
        resolution: &mut TupleResolution,
        decisions: &mut dyn DecisionProvider,
        nodes_propagated: usize,
    ) -> PropagationResult<()> {
        if !self.context.settings.interactive {
            return Err(PropagationError::LinkResolution {
                status: TupleStatus::Ambiguous,
                nodes_propagated,
            });
        }
        let options: Vec<GroupTuple> = resolution.common.iter().cloned().collect();
        match decisions.choose_tuple(links, &options) {
            Some(choice) if resolution.choose(&choice) => Ok(()),
            _ => Err(PropagationError::Cancelled),
        }
    }

    fn update_phase(&self, phase: BatchPhase) {
        let mut p = self.progress.write();
        p.phase = phase;
        p.duration_ms = self.start_time.elapsed().as_millis() as u64;
    }

    /// Update progress with a closure
    fn update_progress<F>(&self, f: F)
    where
        F: FnOnce(&mut BatchProgress),
    {
        let mut p = self.progress.write();
        f(&mut p);
        p.duration_ms = self.start_time.elapsed().as_millis() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ModelChangeEvent;
    use biotapestry_structures::{DbGenome, Group, InstanceIdx, Linkage, Node, NodeKind};

    fn hierarchy() -> (GenomeHierarchy, InstanceIdx, InstanceIdx) {
        let mut root = DbGenome::new("db", "Root");
        root.add_node(Node::gene(NodeId::new("A"), "a")).unwrap();
        root.add_node(Node::new(NodeId::new("B"), "b", NodeKind::Box)).unwrap();
        root.add_link(Linkage::new(LinkId::new("AB"), NodeId::new("A"), NodeId::new("B"), 0, 1))
            .unwrap();
        let mut h = GenomeHierarchy::new(root);
        let vfa = h.add_root_instance("vfa", "VfA").unwrap();
        h.instance_mut(vfa)
            .unwrap()
            .add_group(Group::new(GroupId::new("g1"), "G1"))
            .unwrap();
        let vf1 = h.add_subset_instance(vfa, "vf1", "Vf1").unwrap();
        h.instance_mut(vf1)
            .unwrap()
            .add_group(Group::new(GroupId::new("g1:1"), "G1"))
            .unwrap();
        (h, vfa, vf1)
    }

    struct Pick(usize);

    impl DecisionProvider for Pick {
        fn choose_group(&mut self, _node: &NodeId, options: &[GroupId]) -> Option<GroupId> {
            options.get(self.0).cloned()
        }

        fn choose_tuple(
            &mut self,
            _links: &[LinkId],
            options: &[GroupTuple],
        ) -> Option<GroupTuple> {
            options.get(self.0).cloned()
        }
    }

    #[test]
    fn test_batch_into_subset_walks_ancestry() {
        let (mut h, vfa, vf1) = hierarchy();
        let mut batch = PropagationBatch::new(PropagationContext::new(vf1), UndoCapture::new());
        let request = BatchRequest {
            nodes: vec![NodeId::new("A")],
            links: vec![LinkId::new("AB")],
            target_group: None,
        };
        let mut events: Vec<ModelChangeEvent> = Vec::new();
        let report = batch.run(&mut h, &request, &mut NonInteractive, &mut events).unwrap();

        assert_eq!(report.target_nodes.len(), 2);
        assert_eq!(report.target_links.len(), 1);
        assert_eq!(report.tuple_status, Some(TupleStatus::Ok));
        assert_eq!(h.instance(vfa).unwrap().links().count(), 1);
        assert_eq!(h.instance(vf1).unwrap().links().count(), 1);
        assert_eq!(batch.progress().phase, BatchPhase::Done);
        assert!(events.contains(&ModelChangeEvent::ModelChanged(ModelRef::Instance(vfa))));
        assert!(events.contains(&ModelChangeEvent::ModelChanged(ModelRef::Instance(vf1))));
    }

    #[test]
    fn test_ambiguous_group_needs_decision() {
        let (mut h, vfa, _) = hierarchy();
        h.instance_mut(vfa)
            .unwrap()
            .add_group(Group::new(GroupId::new("g2"), "G2"))
            .unwrap();
        let request = BatchRequest {
            nodes: vec![NodeId::new("A")],
            ..Default::default()
        };

        let mut strict = PropagationBatch::new(PropagationContext::new(vfa), UndoCapture::new());
        let result = strict.run(&mut h, &request, &mut NonInteractive, &mut Vec::new());
        assert!(matches!(result, Err(PropagationError::Ambiguous { options: 2, .. })));
        assert_eq!(strict.progress().phase, BatchPhase::Failed);

        let mut context = PropagationContext::new(vfa);
        context.settings.interactive = true;
        let mut cancelled = PropagationBatch::new(context.clone(), UndoCapture::new());
        let result = cancelled.run(&mut h, &request, &mut NonInteractive, &mut Vec::new());
        assert!(matches!(result, Err(PropagationError::Cancelled)));

        let mut chosen = PropagationBatch::new(context, UndoCapture::new());
        let report = chosen.run(&mut h, &request, &mut Pick(1), &mut Vec::new()).unwrap();
        assert_eq!(report.node_groups[&NodeId::new("A")], GroupId::new("g2"));
    }

    #[test]
    fn test_existing_links_are_skipped() {
        let (mut h, vfa, _) = hierarchy();
        let request = BatchRequest {
            nodes: vec![NodeId::new("A"), NodeId::new("B")],
            links: vec![LinkId::new("AB")],
            target_group: Some(GroupId::new("g1")),
        };
        let mut first = PropagationBatch::new(PropagationContext::new(vfa), UndoCapture::new());
        first.run(&mut h, &request, &mut NonInteractive, &mut Vec::new()).unwrap();

        let undo = UndoCapture::new();
        let mut second = PropagationBatch::new(PropagationContext::new(vfa), undo.clone());
        let report = second.run(&mut h, &request, &mut NonInteractive, &mut Vec::new()).unwrap();
        assert_eq!(report.skipped_links, vec![LinkId::new("AB")]);
        assert!(undo.is_empty());
    }

    #[test]
    fn test_second_region_gets_its_own_link() {
        let (mut h, vfa, _) = hierarchy();
        h.instance_mut(vfa)
            .unwrap()
            .add_group(Group::new(GroupId::new("g2"), "G2"))
            .unwrap();
        let request = |group: &str| BatchRequest {
            nodes: vec![NodeId::new("A"), NodeId::new("B")],
            links: vec![LinkId::new("AB")],
            target_group: Some(GroupId::new(group)),
        };

        let mut first = PropagationBatch::new(PropagationContext::new(vfa), UndoCapture::new());
        first.run(&mut h, &request("g1"), &mut NonInteractive, &mut Vec::new()).unwrap();

        let mut second = PropagationBatch::new(PropagationContext::new(vfa), UndoCapture::new());
        let report = second
            .run(&mut h, &request("g2"), &mut NonInteractive, &mut Vec::new())
            .unwrap();
        assert!(report.skipped_links.is_empty());
        assert_eq!(report.target_links.len(), 1);

        let inst = h.instance(vfa).unwrap();
        assert_eq!(inst.nodes().count(), 4);
        assert_eq!(inst.links().count(), 2);
        let a1 = NodeInstanceId::new(NodeId::new("A"), 1);
        let b1 = NodeInstanceId::new(NodeId::new("B"), 1);
        assert!(inst.links().any(|link| link.source == a1 && link.target == b1));

        // Both regions are connected now, so a repeat changes nothing
        let undo = UndoCapture::new();
        let mut third = PropagationBatch::new(PropagationContext::new(vfa), undo.clone());
        let report = third
            .run(&mut h, &request("g2"), &mut NonInteractive, &mut Vec::new())
            .unwrap();
        assert_eq!(report.skipped_links, vec![LinkId::new("AB")]);
        assert!(undo.is_empty());
    }

    #[test]
    fn test_progress_serializes_for_pollers() {
        let (mut h, vfa, _) = hierarchy();
        let mut batch = PropagationBatch::new(PropagationContext::new(vfa), UndoCapture::new());
        let request = BatchRequest {
            nodes: vec![NodeId::new("A")],
            ..Default::default()
        };
        batch.run(&mut h, &request, &mut NonInteractive, &mut Vec::new()).unwrap();

        let json = serde_json::to_value(batch.progress()).unwrap();
        assert_eq!(json["phase"], "Done");
        assert_eq!(json["nodes_propagated"], 1);
        assert_eq!(json["levels_total"], 1);

        let parsed: BatchProgress = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.phase, BatchPhase::Done);
    }

    #[test]
    fn test_subtree_walk_respects_pass_limit() {
        let (mut h, vfa, vf1) = hierarchy();
        let element = PropagationElement::Node {
            base: NodeId::new("A"),
            is_gene: true,
            group: GroupId::new("g1"),
        };
        let id = NodeInstanceId::new(NodeId::new("A"), 0);

        let mut context = PropagationContext::new(vfa);
        context.settings.max_subtree_passes = 0;
        let mut starved = PropagationBatch::new(context, UndoCapture::new());
        let mut events: Vec<ModelChangeEvent> = Vec::new();
        let result = starved.run_subtree(&mut h, &element, &GroupId::new("g1"), &mut events);
        assert!(matches!(result, Err(PropagationError::NotConverged(0))));
        // The root instance copy stays and was announced
        assert!(h.instance(vfa).unwrap().contains_node(&id));
        assert!(!h.instance(vf1).unwrap().contains_node(&id));
        assert!(events.contains(&ModelChangeEvent::ModelChanged(ModelRef::Instance(vfa))));

        let mut batch = PropagationBatch::new(PropagationContext::new(vfa), UndoCapture::new());
        let report = batch
            .run_subtree(&mut h, &element, &GroupId::new("g1"), &mut Vec::new())
            .unwrap();
        assert!(h.instance(vf1).unwrap().contains_node(&id));
        assert_eq!(report.created_count(), 1);
        assert_eq!(batch.progress().levels_total, 2);
        assert_eq!(batch.progress().nodes_propagated, 1);
    }
}
