// Copyright 2025 BioTapestry Contributors
// SPDX-License-Identifier: Apache-2.0

/*!
Add-link flow as a pure state machine.

The flow asks for a source click, then a target click, resolves the group
tuples for the new link and, when more than one applies, waits for the user
to pick one. [`transition`] maps a state and an event to the next state and
one effect for the host to carry out; it never touches a model.
*/

use serde::{Deserialize, Serialize};

use biotapestry_structures::{GroupTuple, NodeId};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlowState {
    #[default]
    Idle,
    AwaitSourceClick,
    AwaitTargetClick {
        source: NodeId,
    },
    Resolving {
        source: NodeId,
        target: NodeId,
    },
    AwaitTupleChoice {
        source: NodeId,
        target: NodeId,
        options: Vec<GroupTuple>,
    },
    Done,
    Cancelled,
}

impl FlowState {
    /// Whether the flow has finished, one way or the other
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Done | FlowState::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    Start,
    /// Click on the canvas; `None` when nothing usable was hit
    Clicked(Option<NodeId>),
    /// Tuples the new link could use, from the group resolver
    Resolved(Vec<GroupTuple>),
    TupleChosen(GroupTuple),
    Cancel,
}

/// Work the host performs after a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEffect {
    None,
    InstallClickMode,
    UninstallClickMode,
    /// Click missed; signal it and keep waiting
    Beep,
    ResolveTuples {
        source: NodeId,
        target: NodeId,
    },
    PromptForTuple(Vec<GroupTuple>),
    Propagate {
        source: NodeId,
        target: NodeId,
        tuple: GroupTuple,
    },
    Abort(String),
}

/// Advance the flow by one event.
///
/// Events that make no sense in the current state leave it unchanged and
/// produce [`FlowEffect::None`].
pub fn transition(state: FlowState, event: FlowEvent) -> (FlowState, FlowEffect) {
    match (state, event) {
        (state, FlowEvent::Cancel) if !state.is_terminal() && state != FlowState::Idle => {
            (FlowState::Cancelled, FlowEffect::UninstallClickMode)
        }
        (FlowState::Idle, FlowEvent::Start) => {
            (FlowState::AwaitSourceClick, FlowEffect::InstallClickMode)
        }

        (FlowState::AwaitSourceClick, FlowEvent::Clicked(Some(source))) => {
            (FlowState::AwaitTargetClick { source }, FlowEffect::None)
        }
        (FlowState::AwaitSourceClick, FlowEvent::Clicked(None)) => {
            (FlowState::AwaitSourceClick, FlowEffect::Beep)
        }

        (FlowState::AwaitTargetClick { source }, FlowEvent::Clicked(Some(target))) => (
            FlowState::Resolving {
                source: source.clone(),
                target: target.clone(),
            },
            FlowEffect::ResolveTuples { source, target },
        ),
        (state @ FlowState::AwaitTargetClick { .. }, FlowEvent::Clicked(None)) => {
            (state, FlowEffect::Beep)
        }

        (FlowState::Resolving { source, target }, FlowEvent::Resolved(mut options)) => {
            match options.len() {
                0 => (
                    FlowState::Cancelled,
                    FlowEffect::Abort(format!(
                        "No region pair can hold a link from {} to {}",
                        source, target
                    )),
                ),
                1 => {
                    let tuple = options.remove(0);
                    (FlowState::Done, FlowEffect::Propagate { source, target, tuple })
                }
                _ => (
                    FlowState::AwaitTupleChoice {
                        source,
                        target,
                        options: options.clone(),
                    },
                    FlowEffect::PromptForTuple(options),
                ),
            }
        }

        (
            FlowState::AwaitTupleChoice {
                source,
                target,
                options,
            },
            FlowEvent::TupleChosen(tuple),
        ) => {
            if options.contains(&tuple) {
                (FlowState::Done, FlowEffect::Propagate { source, target, tuple })
            } else {
                let state = FlowState::AwaitTupleChoice {
                    source,
                    target,
                    options,
                };
                (state, FlowEffect::Beep)
            }
        }

        (state, _) => (state, FlowEffect::None),
    }
}
