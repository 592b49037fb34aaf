// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

/*!
Lookup caches scoped to a single propagation command.

Both caches are created fresh per command and dropped with it. They are
kept coherent incrementally as the command adds nodes and links, so later
lookups in the same command see earlier mutations.
*/

use ahash::AHashMap;
use std::collections::BTreeSet;

use biotapestry_structures::{
    GenomeHierarchy, GroupId, InstanceIdx, LinkInstance, NodeId, NodeInstanceId,
};

use crate::types::PropagationResult;

/// Pads a node instance already uses in one model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PadUsage {
    /// Launch pad of the node's outbound links (all share one)
    pub launch: Option<usize>,
    pub landings: BTreeSet<usize>,
}

impl PadUsage {
    fn scan(
        hierarchy: &GenomeHierarchy,
        model: InstanceIdx,
        node: &NodeInstanceId,
    ) -> PropagationResult<Self> {
        let instance = hierarchy.instance(model)?;
        let mut usage = PadUsage::default();
        for link in instance.links_touching(node) {
            usage.absorb(link, node);
        }
        Ok(usage)
    }

    fn absorb(&mut self, link: &LinkInstance, node: &NodeInstanceId) {
        if &link.source == node {
            self.launch = Some(link.launch_pad);
        }
        if &link.target == node {
            self.landings.insert(link.landing_pad);
        }
    }
}

/// Per-command cache of pad usage per (model, node instance)
#[derive(Debug, Clone)]
pub struct PadCache {
    enabled: bool,
    usage: AHashMap<(InstanceIdx, NodeInstanceId), PadUsage>,
    reserved_launch: AHashMap<(InstanceIdx, NodeInstanceId), usize>,
}

impl Default for PadCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PadCache {
    pub fn new() -> Self {
        Self {
            enabled: true,
            usage: AHashMap::new(),
            reserved_launch: AHashMap::new(),
        }
    }

    /// A cache that rescans the model on every lookup
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            usage: AHashMap::new(),
            reserved_launch: AHashMap::new(),
        }
    }

    pub fn usage(
        &mut self,
        hierarchy: &GenomeHierarchy,
        model: InstanceIdx,
        node: &NodeInstanceId,
    ) -> PropagationResult<PadUsage> {
        let key = (model, node.clone());
        let cached = if self.enabled {
            self.usage.get(&key).cloned()
        } else {
            None
        };
        let mut usage = match cached {
            Some(usage) => usage,
            None => {
                let usage = PadUsage::scan(hierarchy, model, node)?;
                if self.enabled {
                    self.usage.insert(key.clone(), usage.clone());
                }
                usage
            }
        };
        if usage.launch.is_none() {
            usage.launch = self.reserved_launch.get(&key).copied();
        }
        Ok(usage)
    }

    /// Reserve a launch pad chosen for a link that is about to be added
    pub fn note_launch(&mut self, model: InstanceIdx, node: &NodeInstanceId, pad: usize) {
        self.reserved_launch.insert((model, node.clone()), pad);
    }

    /// Fold a newly added link into both endpoints' cached usage
    pub fn record_link(&mut self, model: InstanceIdx, link: &LinkInstance) {
        self.reserved_launch.remove(&(model, link.source.clone()));
        for node in [&link.source, &link.target] {
            if let Some(usage) = self.usage.get_mut(&(model, node.clone())) {
                usage.absorb(link, node);
            }
        }
    }

    /// Forget a link that was removed from `model`
    pub fn forget_link(&mut self, model: InstanceIdx, link: &LinkInstance) {
        self.usage.remove(&(model, link.source.clone()));
        self.usage.remove(&(model, link.target.clone()));
    }

    /// Drop everything cached about instances of `base`
    pub fn invalidate_base(&mut self, base: &NodeId) {
        self.usage.retain(|(_, node), _| node.base() != base);
        self.reserved_launch.retain(|(_, node), _| node.base() != base);
    }

    pub fn len(&self) -> usize {
        self.usage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usage.is_empty()
    }
}

/// Per-command cache of "which instance of base node N lives in group G"
#[derive(Debug, Clone, Default)]
pub struct NodeGroupCache {
    hits: AHashMap<(InstanceIdx, NodeId, GroupId), NodeInstanceId>,
}

impl NodeGroupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(
        &mut self,
        hierarchy: &GenomeHierarchy,
        model: InstanceIdx,
        base: &NodeId,
        group: &GroupId,
    ) -> PropagationResult<Option<NodeInstanceId>> {
        let key = (model, base.clone(), group.clone());
        if let Some(hit) = self.hits.get(&key) {
            return Ok(Some(hit.clone()));
        }
        let found = hierarchy
            .instance(model)?
            .instance_in_group(base, group)
            .cloned();
        if let Some(found) = &found {
            self.hits.insert(key, found.clone());
        }
        Ok(found)
    }

    /// Record a membership created during this command
    pub fn record(&mut self, model: InstanceIdx, group: &GroupId, node: &NodeInstanceId) {
        self.hits
            .insert((model, node.base().clone(), group.clone()), node.clone());
    }
}

/// Caches threaded through one command
#[derive(Debug, Clone, Default)]
pub struct PropagationCaches {
    pub pads: PadCache,
    pub node_groups: NodeGroupCache,
}

impl PropagationCaches {
    pub fn new(use_pad_cache: bool) -> Self {
        Self {
            pads: if use_pad_cache {
                PadCache::new()
            } else {
                PadCache::disabled()
            },
            node_groups: NodeGroupCache::new(),
        }
    }
}
