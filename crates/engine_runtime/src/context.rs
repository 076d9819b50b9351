//! The view a running hook has of the runtime.

use std::ops::{Deref, DerefMut};

use engine_graph::NodeId;

use crate::error::RuntimeError;
use crate::input::ActionId;
use crate::node::{Handle, Node};
use crate::runtime::Runtime;

/// The runtime, as seen from inside one node's hook.
///
/// Derefs to [`Runtime`], so every runtime operation is available; the
/// methods here are shorthands that act on the current node. The node's own
/// payload is checked out while the hook runs, so looking it up through the
/// runtime yields [`RuntimeError::Busy`].
pub struct NodeContext<'a> {
    runtime: &'a mut Runtime,
    node: NodeId,
}

impl<'a> NodeContext<'a> {
    pub(crate) fn new(runtime: &'a mut Runtime, node: NodeId) -> Self {
        Self { runtime, node }
    }

    /// The node whose hook is running.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.node
    }

    /// Construct, adopt and initialize a child of the current node.
    pub fn create_child<T: Node>(&mut self, value: T) -> Result<Handle<T>, RuntimeError> {
        self.runtime.create_child(self.node, value)
    }

    /// Construct an actor under the nearest enclosing scope owner, so it
    /// belongs to the scene rather than to the node that spawned it.
    pub fn create_actor<T: Node>(&mut self, value: T) -> Result<Handle<T>, RuntimeError> {
        let owner = self.runtime.resolve_scope(self.node).unwrap_or(self.node);
        self.runtime.create_child(owner, value)
    }

    /// Attach a component bound to the current node's lifetime.
    pub fn add_component<T: Node>(&mut self, value: T) -> Result<Handle<T>, RuntimeError> {
        self.runtime.attach_component(self.node, value)
    }

    /// The scoped singleton of type `S` visible from the current node.
    pub fn service<S: Node + Default>(&mut self) -> Result<Handle<S>, RuntimeError> {
        self.runtime.service::<S>(self.node)
    }

    /// Condemn the current node; it is freed at the start of the next frame.
    pub fn queue_free_self(&mut self) -> bool {
        self.runtime.queue_free(self.node)
    }

    /// The owner of the current node.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.runtime.parent_of(self.node)
    }

    /// The nearest ancestor of type `T`.
    #[must_use]
    pub fn find_ancestor<T: Node>(&self) -> Option<Handle<T>> {
        self.runtime.find_ancestor::<T>(self.node)
    }

    /// Whether an action is currently held.
    #[must_use]
    pub fn is_action_held(&self, action: ActionId) -> bool {
        self.runtime.input().is_held(action)
    }
}

impl Deref for NodeContext<'_> {
    type Target = Runtime;

    fn deref(&self) -> &Runtime {
        self.runtime
    }
}

impl DerefMut for NodeContext<'_> {
    fn deref_mut(&mut self) -> &mut Runtime {
        self.runtime
    }
}
