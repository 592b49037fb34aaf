// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

/*!
Outbound notification seams: model-change events and progress reporting.

Propagation code never talks to a UI. It reports through [`ModelEventSink`]
once per completed batch and through [`ProgressMonitor`] while background
work runs.
*/

use std::collections::BTreeSet;

use biotapestry_structures::{LayoutId, ModelRef};

use crate::undo::ChangeRecord;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModelChangeEvent {
    ModelChanged(ModelRef),
    LayoutChanged(LayoutId),
}

/// Receiver of model-change notifications
pub trait ModelEventSink {
    fn notify(&mut self, event: ModelChangeEvent);
}

impl ModelEventSink for Vec<ModelChangeEvent> {
    fn notify(&mut self, event: ModelChangeEvent) {
        self.push(event);
    }
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl ModelEventSink for NullEventSink {
    fn notify(&mut self, _event: ModelChangeEvent) {}
}

/// Send one event per distinct model and layout touched by `changes`.
///
/// Returns the number of events sent.
pub fn dispatch_batch_events(sink: &mut dyn ModelEventSink, changes: &[ChangeRecord]) -> usize {
    let mut events: BTreeSet<ModelChangeEvent> = BTreeSet::new();
    for change in changes {
        if let Some(model) = change.affected_model() {
            events.insert(ModelChangeEvent::ModelChanged(model));
        }
        if let Some(layout) = change.affected_layout() {
            events.insert(ModelChangeEvent::LayoutChanged(layout.clone()));
        }
    }
    let count = events.len();
    for event in events {
        sink.notify(event);
    }
    count
}

/// Progress receiver for long-running work.
///
/// `update_progress` gets a percentage in 0..=100 and returns `false` to
/// ask the work to stop at its next checkpoint.
pub trait ProgressMonitor: Send {
    fn update_progress(&mut self, percent: u8) -> bool;
}

impl<F> ProgressMonitor for F
where
    F: FnMut(u8) -> bool + Send,
{
    fn update_progress(&mut self, percent: u8) -> bool {
        self(percent)
    }
}

/// Monitor that never asks to stop
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentMonitor;

impl ProgressMonitor for SilentMonitor {
    fn update_progress(&mut self, _percent: u8) -> bool {
        true
    }
}

/// Slice `[start, end]` of an overall progress bar, as fractions of 1.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressRange {
    start: f64,
    end: f64,
}

impl ProgressRange {
    /// Build a range, clamping both ends into `[0, 1]` and ordering them
    pub fn new(start: f64, end: f64) -> Self {
        let start = start.clamp(0.0, 1.0);
        let end = end.clamp(0.0, 1.0);
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    pub fn full() -> Self {
        Self::new(0.0, 1.0)
    }

    /// Overall percentage once `done` of this slice's work is finished
    pub fn percent(&self, done: f64) -> u8 {
        let fraction = self.start + (self.end - self.start) * done.clamp(0.0, 1.0);
        (fraction * 100.0).round() as u8
    }
}

impl Default for ProgressRange {
    fn default() -> Self {
        Self::full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biotapestry_structures::{GroupId, InstanceIdx, NodePlacement, Point};

    #[test]
    fn test_progress_range_maps_into_slice() {
        let range = ProgressRange::new(0.5, 0.9);
        assert_eq!(range.percent(0.0), 50);
        assert_eq!(range.percent(0.5), 70);
        assert_eq!(range.percent(1.0), 90);
        assert_eq!(range.percent(3.0), 90);

        let swapped = ProgressRange::new(0.9, 0.5);
        assert_eq!(swapped, range);
    }

    #[test]
    fn test_closure_is_a_monitor() {
        let mut seen = Vec::new();
        let mut monitor = |percent: u8| {
            seen.push(percent);
            percent < 50
        };
        assert!(monitor.update_progress(10));
        assert!(!monitor.update_progress(60));
        assert_eq!(seen, vec![10, 60]);
    }

    #[test]
    fn test_batch_events_are_deduplicated() {
        let changes = vec![
            ChangeRecord::GroupAdded {
                model: InstanceIdx(0),
                group: GroupId::new("a"),
            },
            ChangeRecord::GroupAdded {
                model: InstanceIdx(0),
                group: GroupId::new("b"),
            },
            ChangeRecord::PlacementSet {
                layout: LayoutId::new("vfa__layout"),
                node_key: "G1".to_string(),
                before: None,
                after: NodePlacement::at(Point::new(1.0, 2.0)),
            },
        ];
        let mut sink: Vec<ModelChangeEvent> = Vec::new();
        assert_eq!(dispatch_batch_events(&mut sink, &changes), 2);
        assert!(sink.contains(&ModelChangeEvent::ModelChanged(ModelRef::Instance(InstanceIdx(0)))));
        assert!(sink.contains(&ModelChangeEvent::LayoutChanged(LayoutId::new("vfa__layout"))));
    }
}
