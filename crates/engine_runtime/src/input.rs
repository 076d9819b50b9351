//! Action input.
//!
//! The windowing backend reports press and release events through an
//! [`InputSource`]. The runtime folds them into [`InputState`], which tracks
//! held actions and turns the frame's events into edges that are routed to
//! the nodes that registered Input hooks for them.

use std::collections::{BTreeMap, BTreeSet};

use engine_graph::NodeId;

/// An abstract input action, such as "jump" or "fire".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(pub u32);

/// Which edge of an action an Input hook listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputEdge {
    /// The frame the action went down.
    Pressed,
    /// Every frame the action is down, including the press frame.
    Held,
    /// The frame the action went up.
    Released,
}

/// An action together with the edge that triggers a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputBinding {
    /// The action.
    pub action: ActionId,
    /// The edge.
    pub edge: InputEdge,
}

impl InputBinding {
    /// Pair an action with an edge.
    #[must_use]
    pub const fn new(action: ActionId, edge: InputEdge) -> Self {
        Self { action, edge }
    }
}

/// A raw event from the input backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// The action went down.
    Pressed(ActionId),
    /// The action went up.
    Released(ActionId),
}

/// The input backend as seen by the runtime.
pub trait InputSource {
    /// Append every event received since the last call to `sink`, oldest
    /// first.
    fn drain_events(&mut self, sink: &mut Vec<InputEvent>);
}

/// Pending events and the set of held actions.
#[derive(Debug, Default)]
pub struct InputState {
    pending: Vec<InputEvent>,
    held: BTreeSet<ActionId>,
}

impl InputState {
    /// Create a state with nothing held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a press for the next frame.
    pub fn press(&mut self, action: ActionId) {
        self.pending.push(InputEvent::Pressed(action));
    }

    /// Queue a release for the next frame.
    pub fn release(&mut self, action: ActionId) {
        self.pending.push(InputEvent::Released(action));
    }

    /// Pull everything the backend has buffered.
    pub fn pump(&mut self, source: &mut dyn InputSource) {
        source.drain_events(&mut self.pending);
    }

    /// Whether the action is down as of the last processed frame.
    #[must_use]
    pub fn is_held(&self, action: ActionId) -> bool {
        self.held.contains(&action)
    }

    /// Apply pending events and return this frame's edges in dispatch order:
    /// press/release edges in event order, then one Held edge per held action.
    ///
    /// Repeated presses of an already held action produce no edge.
    pub(crate) fn take_edges(&mut self) -> Vec<InputBinding> {
        let mut edges = Vec::new();
        for event in self.pending.drain(..) {
            match event {
                InputEvent::Pressed(action) => {
                    if self.held.insert(action) {
                        edges.push(InputBinding::new(action, InputEdge::Pressed));
                    }
                }
                InputEvent::Released(action) => {
                    if self.held.remove(&action) {
                        edges.push(InputBinding::new(action, InputEdge::Released));
                    }
                }
            }
        }
        edges.extend(
            self.held
                .iter()
                .map(|&action| InputBinding::new(action, InputEdge::Held)),
        );
        edges
    }
}

/// Which nodes listen to which binding, in subscription order.
#[derive(Debug, Default)]
pub(crate) struct InputRouter {
    routes: BTreeMap<InputBinding, Vec<NodeId>>,
}

impl InputRouter {
    pub(crate) fn subscribe(&mut self, binding: InputBinding, node: NodeId) {
        let targets = self.routes.entry(binding).or_default();
        if !targets.contains(&node) {
            targets.push(node);
        }
    }

    pub(crate) fn unsubscribe(&mut self, node: NodeId) {
        self.routes.retain(|_, targets| {
            targets.retain(|&t| t != node);
            !targets.is_empty()
        });
    }

    pub(crate) fn targets(&self, binding: InputBinding) -> Vec<NodeId> {
        self.routes.get(&binding).cloned().unwrap_or_default()
    }
}
