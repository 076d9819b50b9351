//! Scoped singleton services.
//!
//! A scope is opened on a node (every backstage gets one) and is backed by a
//! hidden [`ServiceRegistry`] child. Services are ordinary nodes owned by that
//! registry: constructed on first lookup, initialized like any other child,
//! and destroyed with the scope. Lookups resolve the nearest scope at or
//! above the consumer, so nested scopes shadow outer ones.

use std::any::TypeId;
use std::collections::HashMap;

use engine_graph::NodeId;
use tracing::{debug, info};

use crate::error::RuntimeError;
use crate::node::{Handle, LifecycleState, Node, NodeKind};
use crate::runtime::Runtime;

/// The node that owns a scope's services.
#[derive(Debug, Default)]
pub struct ServiceRegistry;

impl Node for ServiceRegistry {
    fn type_name() -> &'static str {
        "ServiceRegistry"
    }
}

#[derive(Debug)]
pub(crate) struct ServiceScope {
    pub(crate) registry: NodeId,
    pub(crate) services: HashMap<TypeId, NodeId>,
}

impl Runtime {
    /// Open a service scope on `owner` and return its registry node. Opening
    /// an existing scope returns the registry it already has.
    pub fn open_scope(&mut self, owner: impl Into<NodeId>) -> Result<NodeId, RuntimeError> {
        let owner = owner.into();
        if let Some(scope) = self.scopes.get(&owner) {
            return Ok(scope.registry);
        }
        let entry = self.tree.get(owner).ok_or(RuntimeError::Stale(owner))?;
        if entry.destroying {
            return Err(RuntimeError::Destroying(owner));
        }

        let registry = self.spawn_kind(ServiceRegistry, NodeKind::Registry).id();
        self.tree.adopt(owner, registry)?;
        if let Some(entry) = self.tree.get_mut(registry) {
            entry.state = LifecycleState::Initialized;
        }
        self.scopes.insert(
            owner,
            ServiceScope {
                registry,
                services: HashMap::new(),
            },
        );
        debug!(scope = %owner, registry = %registry, "opened service scope");
        Ok(registry)
    }

    /// The owner of the nearest scope at or above `from`.
    #[must_use]
    pub fn resolve_scope(&self, from: impl Into<NodeId>) -> Option<NodeId> {
        let from = from.into();
        if !self.tree.contains(from) {
            return None;
        }
        std::iter::once(from)
            .chain(self.tree.ancestors(from))
            .find(|owner| self.scopes.contains_key(owner))
    }

    /// The registry node of the scope opened on `owner`.
    #[must_use]
    pub fn scope_registry(&self, owner: impl Into<NodeId>) -> Option<NodeId> {
        self.scopes.get(&owner.into()).map(|scope| scope.registry)
    }

    /// The service of type `S` visible from `from`, constructed, adopted and
    /// initialized on first use.
    ///
    /// The instance is recorded before its Init runs, so lookups made during
    /// that Init see the same instance.
    pub fn service<S: Node + Default>(
        &mut self,
        from: impl Into<NodeId>,
    ) -> Result<Handle<S>, RuntimeError> {
        let from = from.into();
        let owner = self
            .resolve_scope(from)
            .ok_or(RuntimeError::NoServiceScope(from))?;
        if let Some(existing) = self.cached_service::<S>(owner) {
            return Ok(existing);
        }
        self.install_service(owner, S::default())
    }

    /// Construct `S` now rather than on first lookup.
    pub fn preload_service<S: Node + Default>(
        &mut self,
        from: impl Into<NodeId>,
    ) -> Result<Handle<S>, RuntimeError> {
        self.service::<S>(from)
    }

    /// Install a pre-built service in the scope visible from `from`.
    pub fn register_service<S: Node>(
        &mut self,
        from: impl Into<NodeId>,
        value: S,
    ) -> Result<Handle<S>, RuntimeError> {
        let from = from.into();
        let owner = self
            .resolve_scope(from)
            .ok_or(RuntimeError::NoServiceScope(from))?;
        if self.cached_service::<S>(owner).is_some() {
            return Err(RuntimeError::ServiceExists {
                scope: owner,
                type_name: S::type_name(),
            });
        }
        self.install_service(owner, value)
    }

    /// Whether an `S` has been constructed in the scope visible from `from`.
    #[must_use]
    pub fn has_service<S: Node>(&self, from: impl Into<NodeId>) -> bool {
        self.resolve_scope(from)
            .and_then(|owner| self.cached_service::<S>(owner))
            .is_some()
    }

    fn cached_service<S: Node>(&self, owner: NodeId) -> Option<Handle<S>> {
        let id = *self.scopes.get(&owner)?.services.get(&TypeId::of::<S>())?;
        self.tree.contains(id).then(|| Handle::new(id))
    }

    fn install_service<S: Node>(&mut self, owner: NodeId, value: S) -> Result<Handle<S>, RuntimeError> {
        let scope = self
            .scopes
            .get(&owner)
            .ok_or(RuntimeError::NoServiceScope(owner))?;
        let registry = scope.registry;

        let handle = self.spawn_kind(value, NodeKind::Service);
        if let Some(scope) = self.scopes.get_mut(&owner) {
            scope.services.insert(TypeId::of::<S>(), handle.id());
        }
        info!(service = S::type_name(), scope = %owner, node = %handle.id(), "starting service");
        self.adopt_or_discard(registry, handle)
    }

    /// Drop scope bookkeeping that refers to a node leaving the tree.
    pub(crate) fn forget_scope(&mut self, id: NodeId, kind: NodeKind) {
        match kind {
            NodeKind::Service => {
                for scope in self.scopes.values_mut() {
                    scope.services.retain(|_, service| *service != id);
                }
            }
            NodeKind::Registry => self.scopes.retain(|_, scope| scope.registry != id),
            _ => {
                self.scopes.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use crate::context::NodeContext;
    use crate::hooks::{HookResult, Hooks};

    use super::*;

    thread_local! {
        static STARTS: Cell<u32> = const { Cell::new(0) };
    }

    #[derive(Default)]
    struct Stage;
    impl Node for Stage {}

    #[derive(Default)]
    struct Clock {
        ticks: u64,
    }

    impl Node for Clock {
        fn hooks(hooks: &mut Hooks<Self>) {
            hooks
                .on_init(|_, _| {
                    STARTS.with(|s| s.set(s.get() + 1));
                    Ok(())
                })
                .on_update(|clock, _, _| {
                    clock.ticks += 1;
                    Ok(())
                });
        }
    }

    /// Looks up its own service type during Init.
    #[derive(Default)]
    struct SelfAware {
        same: bool,
    }

    impl SelfAware {
        fn init(&mut self, ctx: &mut NodeContext<'_>) -> HookResult {
            let me = ctx.id();
            let found = ctx.service::<SelfAware>()?;
            self.same = found.id() == me;
            Ok(())
        }
    }

    impl Node for SelfAware {
        fn hooks(hooks: &mut Hooks<Self>) {
            hooks.on_init(Self::init);
        }
    }

    #[test]
    fn test_service_identity_within_scope() {
        STARTS.with(|s| s.set(0));
        let mut rt = Runtime::new();
        let stage = rt.create_backstage(Stage).unwrap();
        let a = rt.create_child(stage, Stage).unwrap();
        let b = rt.create_child(a, Stage).unwrap();

        assert!(!rt.has_service::<Clock>(b));
        let from_a = rt.service::<Clock>(a).unwrap();
        let from_b = rt.service::<Clock>(b).unwrap();
        assert_eq!(from_a, from_b);
        assert_eq!(STARTS.with(Cell::get), 1);
        assert_eq!(rt.parent_of(from_a), rt.scope_registry(stage));
        assert_eq!(rt.lifecycle(from_a), LifecycleState::Initialized);

        rt.process_logic_frame(0.016).unwrap();
        assert_eq!(rt.node(from_a).unwrap().ticks, 1);
    }

    #[test]
    fn test_scopes_do_not_share_instances() {
        let mut rt = Runtime::new();
        let first = rt.create_backstage(Stage).unwrap();
        let second = rt.create_backstage(Stage).unwrap();
        let nested = rt.create_child(first, Stage).unwrap();
        rt.open_scope(nested).unwrap();

        let one = rt.service::<Clock>(first).unwrap();
        let two = rt.service::<Clock>(second).unwrap();
        let three = rt.service::<Clock>(nested).unwrap();
        assert_ne!(one, two);
        assert_ne!(one, three);
        assert_eq!(rt.resolve_scope(nested), Some(nested.id()));
    }

    #[test]
    fn test_service_sees_itself_during_init() {
        let mut rt = Runtime::new();
        let stage = rt.create_backstage(Stage).unwrap();
        let service = rt.preload_service::<SelfAware>(stage).unwrap();
        assert!(rt.node(service).unwrap().same);
    }

    #[test]
    fn test_register_and_teardown() {
        let mut rt = Runtime::new();
        let stage = rt.create_backstage(Stage).unwrap();
        let clock = rt.register_service(stage, Clock { ticks: 40 }).unwrap();
        assert!(matches!(
            rt.register_service(stage, Clock::default()),
            Err(RuntimeError::ServiceExists { .. })
        ));
        assert_eq!(rt.service::<Clock>(stage).unwrap(), clock);

        rt.free_immediately(stage).unwrap();
        assert!(!rt.is_valid(clock));
        assert!(rt.scopes.is_empty());
        assert_eq!(rt.node_count(), 0);
    }

    #[test]
    fn test_lookup_without_scope_fails() {
        let mut rt = Runtime::new();
        let loose = rt.spawn(Stage);
        assert!(matches!(
            rt.service::<Clock>(loose),
            Err(RuntimeError::NoServiceScope(_))
        ));
    }
}
