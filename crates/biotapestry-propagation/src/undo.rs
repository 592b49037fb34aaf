// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Change capture shared between the foreground command and its relayout
//! worker. Both append to the same log, which the caller turns into one undo
//! step.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

use biotapestry_structures::{
    GroupId, InstanceIdx, LayoutId, LinkInstance, LinkInstanceId, Linkage, ModelRef, ModuleId,
    Node, NodeInstance, NodeInstanceId, NodePlacement, OverlayId,
};

/// One reversible mutation
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeRecord {
    RootNodeAdded {
        node: Node,
    },
    RootLinkAdded {
        link: Linkage,
    },
    RootLinkRemoved {
        link: Linkage,
    },
    NodeInstanceAdded {
        model: InstanceIdx,
        node: NodeInstance,
    },
    LinkInstanceAdded {
        model: InstanceIdx,
        link: LinkInstance,
    },
    LinkInstanceRemoved {
        model: InstanceIdx,
        link: LinkInstance,
    },
    GroupAdded {
        model: InstanceIdx,
        group: GroupId,
    },
    GroupMembershipAdded {
        model: InstanceIdx,
        group: GroupId,
        node: NodeInstanceId,
    },
    LinkPadsReplaced {
        model: InstanceIdx,
        link: LinkInstanceId,
        before: (usize, usize),
        after: (usize, usize),
    },
    NodePadCountReplaced {
        model: InstanceIdx,
        node: NodeInstanceId,
        before: usize,
        after: usize,
    },
    ModuleMembershipAdded {
        model: InstanceIdx,
        overlay: OverlayId,
        module: ModuleId,
        node: NodeInstanceId,
    },
    PlacementSet {
        layout: LayoutId,
        node_key: String,
        before: Option<NodePlacement>,
        after: NodePlacement,
    },
}

impl ChangeRecord {
    /// Model whose contents this change touched; layout-only changes have none
    pub fn affected_model(&self) -> Option<ModelRef> {
        match self {
            ChangeRecord::RootNodeAdded { .. }
            | ChangeRecord::RootLinkAdded { .. }
            | ChangeRecord::RootLinkRemoved { .. } => Some(ModelRef::Root),
            ChangeRecord::NodeInstanceAdded { model, .. }
            | ChangeRecord::LinkInstanceAdded { model, .. }
            | ChangeRecord::LinkInstanceRemoved { model, .. }
            | ChangeRecord::GroupAdded { model, .. }
            | ChangeRecord::GroupMembershipAdded { model, .. }
            | ChangeRecord::LinkPadsReplaced { model, .. }
            | ChangeRecord::NodePadCountReplaced { model, .. }
            | ChangeRecord::ModuleMembershipAdded { model, .. } => Some(ModelRef::Instance(*model)),
            ChangeRecord::PlacementSet { .. } => None,
        }
    }

    pub fn affected_layout(&self) -> Option<&LayoutId> {
        match self {
            ChangeRecord::PlacementSet { layout, .. } => Some(layout),
            _ => None,
        }
    }
}

/// Thread-safe change log.
///
/// Cloning yields another handle to the same log.
#[derive(Debug, Clone, Default)]
pub struct UndoCapture {
    records: Arc<Mutex<Vec<ChangeRecord>>>,
}

impl UndoCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, change: ChangeRecord) {
        self.records.lock().push(change);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Copy of every change recorded from `start` on
    pub fn since(&self, start: usize) -> Vec<ChangeRecord> {
        let records = self.records.lock();
        records.get(start..).map(<[_]>::to_vec).unwrap_or_default()
    }

    pub fn snapshot(&self) -> Vec<ChangeRecord> {
        self.records.lock().clone()
    }

    /// Drain the log, leaving it empty
    pub fn take(&self) -> Vec<ChangeRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    /// Distinct models touched by the changes recorded from `start` on
    pub fn models_touched_since(&self, start: usize) -> BTreeSet<ModelRef> {
        self.since(start)
            .iter()
            .filter_map(ChangeRecord::affected_model)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biotapestry_structures::NodeId;
    use std::thread;

    #[test]
    fn test_capture_shared_between_threads() {
        let capture = UndoCapture::new();
        let worker_capture = capture.clone();

        let handle = thread::spawn(move || {
            worker_capture.record(ChangeRecord::GroupAdded {
                model: InstanceIdx(1),
                group: GroupId::new("r1:1"),
            });
        });
        capture.record(ChangeRecord::RootNodeAdded {
            node: Node::gene(NodeId::new("G1"), "g"),
        });
        handle.join().unwrap();

        assert_eq!(capture.len(), 2);
        let touched = capture.models_touched_since(0);
        assert!(touched.contains(&ModelRef::Root));
        assert!(touched.contains(&ModelRef::Instance(InstanceIdx(1))));
    }

    #[test]
    fn test_since_and_take() {
        let capture = UndoCapture::new();
        capture.record(ChangeRecord::GroupAdded {
            model: InstanceIdx(0),
            group: GroupId::new("a"),
        });
        let mark = capture.len();
        capture.record(ChangeRecord::GroupAdded {
            model: InstanceIdx(2),
            group: GroupId::new("a:1"),
        });

        assert_eq!(capture.since(mark).len(), 1);
        assert!(capture.since(10).is_empty());
        assert_eq!(capture.take().len(), 2);
        assert!(capture.is_empty());
    }
}
