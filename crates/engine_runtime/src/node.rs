//! The node trait and typed handles.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use engine_graph::NodeId;

use crate::hooks::Hooks;

/// A type that can live in the runtime's tree.
///
/// Implementors declare their hooks once per type in [`Node::hooks`]; the
/// resulting table is cached and shared by every instance.
///
/// ```ignore
/// struct Spinner { speed: f32 }
///
/// impl Node for Spinner {
///     fn hooks(hooks: &mut Hooks<Self>) {
///         hooks.on_update(Self::spin);
///     }
/// }
/// ```
pub trait Node: Any + Sized {
    /// Register this type's hooks.
    fn hooks(_hooks: &mut Hooks<Self>) {}

    /// Name used in logs and errors.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Where a node is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Constructed but Init has not run yet.
    Created,
    /// Init has run; the node receives per-frame hooks while attached.
    Initialized,
    /// Destroy has run or the handle is stale.
    Destroyed,
}

/// The structural role of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// An ordinary child.
    Plain,
    /// A child bound to its owner's lifetime.
    Component,
    /// A root that carries a service scope.
    Backstage,
    /// The hidden holder of a scope's services.
    Registry,
    /// A scoped singleton.
    Service,
}

impl NodeKind {
    /// Components and registries cannot be released or freed apart from
    /// their owner.
    #[must_use]
    pub fn is_owner_bound(self) -> bool {
        matches!(self, NodeKind::Component | NodeKind::Registry)
    }
}

/// A [`NodeId`] that remembers the node's type.
///
/// Like the id it wraps, a handle never keeps its node alive.
pub struct Handle<T> {
    id: NodeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Wrap an id. The type is checked when the handle is used.
    #[must_use]
    pub const fn new(id: NodeId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// The untyped id.
    #[must_use]
    pub fn id(self) -> NodeId {
        self.id
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle<{}>({})", std::any::type_name::<T>(), self.id)
    }
}

impl<T> From<Handle<T>> for NodeId {
    fn from(handle: Handle<T>) -> Self {
        handle.id
    }
}
