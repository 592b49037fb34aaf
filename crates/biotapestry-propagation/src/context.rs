// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use biotapestry_structures::{InstanceIdx, Point};

/// Tunables for propagation commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationSettings {
    /// Ask a [`crate::DecisionProvider`] when placement is ambiguous;
    /// otherwise ambiguity is an error
    pub interactive: bool,
    /// Cache pad usage per node during a command
    pub use_pad_cache: bool,
    /// Upper bound on passes over a subtree before giving up
    pub max_subtree_passes: usize,
    /// Offset applied to copied node placements
    pub placement_offset: Point,
    /// Run relayout after node insertion on a worker thread
    pub background_relayout: bool,
    /// Progress slice assigned to relayout
    pub relayout_progress_start: f64,
    pub relayout_progress_end: f64,
}

impl Default for PropagationSettings {
    fn default() -> Self {
        Self {
            interactive: false,
            use_pad_cache: true,
            max_subtree_passes: 64,
            placement_offset: Point::default(),
            background_relayout: true,
            relayout_progress_start: 0.0,
            relayout_progress_end: 1.0,
        }
    }
}

/// Immutable per-command context.
///
/// Replaces ambient application state: everything a command needs to know
/// about where it runs is carried here.
#[derive(Debug, Clone, PartialEq)]
pub struct PropagationContext {
    /// Model the command was issued against
    pub target: InstanceIdx,
    pub settings: PropagationSettings,
}

impl PropagationContext {
    pub fn new(target: InstanceIdx) -> Self {
        Self {
            target,
            settings: PropagationSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: PropagationSettings) -> Self {
        self.settings = settings;
        self
    }
}
