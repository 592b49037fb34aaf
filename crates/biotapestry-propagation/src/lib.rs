// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

/*!
# BioTapestry Propagation

Moves genomic elements through a BioTapestry genome hierarchy:

- Pad allocation for new link instances (`pads`)
- Node and link propagation one level down (`node_propagation`, `link_propagation`)
- Group and tuple resolution (`group_resolution`)
- Multi-level walks (`hierarchy_walker`) and the batch entry point (`batch`)
- Node insertion into a link, with relayout on a worker thread (`insertion`)
- The add-link flow as a pure state machine (`flow`)

All model mutation happens on the caller's thread against a
`&mut GenomeHierarchy`. Every mutation is recorded into an [`UndoCapture`]
and announced once per command through a [`ModelEventSink`].

## Usage

```rust,no_run
use biotapestry_propagation::{
    BatchRequest, NonInteractive, PropagationBatch, PropagationContext, UndoCapture,
};
use biotapestry_structures::{DbGenome, GenomeHierarchy, NodeId};

let mut hierarchy = GenomeHierarchy::new(DbGenome::new("db", "Root"));
let vfa = hierarchy.add_root_instance("vfa", "VfA").unwrap();

let mut batch = PropagationBatch::new(PropagationContext::new(vfa), UndoCapture::new());
let request = BatchRequest {
    nodes: vec![NodeId::new("gene_a")],
    ..Default::default()
};
let mut events = Vec::new();
let report = batch.run(&mut hierarchy, &request, &mut NonInteractive, &mut events);
```
*/

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod batch;
pub mod cache;
pub mod context;
pub mod events;
pub mod flow;
pub mod group_resolution;
pub mod hierarchy_walker;
pub mod insertion;
pub mod link_propagation;
pub mod node_propagation;
pub mod pads;
pub mod types;
pub mod undo;

pub use batch::{
    BatchPhase, BatchProgress, BatchReport, BatchRequest, DecisionProvider, NonInteractive,
    PropagationBatch,
};
pub use cache::{NodeGroupCache, PadCache, PadUsage, PropagationCaches};
pub use context::{PropagationContext, PropagationSettings};
pub use events::{
    dispatch_batch_events, ModelChangeEvent, ModelEventSink, NullEventSink, ProgressMonitor,
    ProgressRange, SilentMonitor,
};
pub use flow::{transition, FlowEffect, FlowEvent, FlowState};
pub use group_resolution::{
    fully_connected, new_connection_tuples, resolve_inheritable_groups, resolve_link_group_tuples,
    resolve_target_groups, tuple_connected, LinkTupleQuery, TupleResolution, TupleStatus,
};
pub use hierarchy_walker::{
    apply_at_level, propagate_across_ancestry, propagate_down_entire_subtree, propagate_group,
    AncestryChain, LevelOutcome, PropagationElement, WalkMode, WalkReport,
};
pub use insertion::{
    insert_node_into_link, run_relayout, spawn_relayout, start_relayout, InsertionReport,
    InsertionRequest, ModulePadNeed, RelayoutHandle, RelayoutJob, RelayoutSummary, RelayoutTarget,
    RelayoutWorker,
};
pub use link_propagation::{copy_link_from_parent, find_link_instance, propagate_linkage};
pub use node_propagation::{
    introduce_node, place_node, propagate_node, propagate_node_up, NodeRequest, PlacementOffset,
    SourceNode,
};
pub use pads::{
    ensure_pad_capacity, find_landing_pad, find_source_pad, required_pad_count, reset_pad_namespace,
};
pub use types::{PropagationError, PropagationResult};
pub use undo::{ChangeRecord, UndoCapture};
