//! The runtime: node construction, ownership edits, teardown and the logic
//! frame.
//!
//! Frame order:
//!
//! 1. Free nodes condemned by `queue_free` and frees deferred last frame.
//! 2. Dispatch this frame's input edges.
//! 3. Walk every root top-down: Update hooks, then timers, then children.
//! 4. Deliver queued signals.
//! 5. Apply frees that were requested during steps 2–4.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use engine_graph::{NodeId, Tree};
use tracing::{debug, info, trace, warn};

use crate::context::NodeContext;
use crate::error::RuntimeError;
use crate::hooks::{HookRegistry, HookTable};
use crate::input::{InputRouter, InputState};
use crate::node::{Handle, LifecycleState, Node, NodeKind};
use crate::services::ServiceScope;
use crate::signal::{Signal, SignalBus, SignalSender};
use crate::spatial::TransformCache;
use crate::timer::TimerState;

pub(crate) struct NodeEntry {
    pub(crate) value: Option<Box<dyn Any>>,
    pub(crate) table: Rc<HookTable>,
    pub(crate) state: LifecycleState,
    pub(crate) kind: NodeKind,
    pub(crate) destroying: bool,
    pub(crate) timers: Vec<TimerState>,
    pub(crate) transform: Option<TransformCache>,
    pub(crate) time_scale: f64,
    pub(crate) invalidations: u64,
}

/// What one logic frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame counter after this frame.
    pub frame: u64,
    /// Hooks that returned an error during the frame.
    pub hook_failures: u64,
    /// Nodes whose Update phase ran.
    pub updated: usize,
    /// Nodes freed at the frame boundaries.
    pub freed: usize,
}

/// Owner of the node tree and everything that dispatches over it.
pub struct Runtime {
    pub(crate) tree: Tree<NodeEntry>,
    pub(crate) hooks: HookRegistry,
    pub(crate) scopes: HashMap<NodeId, ServiceScope>,
    pub(crate) input: InputState,
    pub(crate) router: InputRouter,
    pub(crate) signals: SignalBus,
    /// Nodes whose payload is checked out by a running hook, innermost last.
    pub(crate) active: Vec<NodeId>,
    pub(crate) walking: bool,
    deferred: Vec<NodeId>,
    condemned: Vec<NodeId>,
    in_frame: bool,
    frame: u64,
    pub(crate) hook_failures: u64,
    freed: usize,
}

impl Runtime {
    /// Create an empty runtime.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: Tree::new(),
            hooks: HookRegistry::new(),
            scopes: HashMap::new(),
            input: InputState::new(),
            router: InputRouter::default(),
            signals: SignalBus::new(),
            active: Vec::new(),
            walking: false,
            deferred: Vec::new(),
            condemned: Vec::new(),
            in_frame: false,
            frame: 0,
            hook_failures: 0,
            freed: 0,
        }
    }

    /// Number of completed logic frames.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Number of live nodes, including registries and unadopted nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.tree.len()
    }

    /// Total hook failures since the runtime was created.
    #[must_use]
    pub fn hook_failures(&self) -> u64 {
        self.hook_failures
    }

    /// Current backstages, oldest first.
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        self.tree.roots()
    }

    /// The cached hook tables.
    #[must_use]
    pub fn hook_tables(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Drop every cached hook table. Live nodes keep theirs; newly spawned
    /// nodes get freshly built ones.
    pub fn purge_hook_tables(&mut self) -> usize {
        let purged = self.hooks.purge();
        debug!(purged, "purged hook tables");
        purged
    }

    /// Input state, for feeding events from the backend.
    #[must_use]
    pub fn input(&self) -> &InputState {
        &self.input
    }

    /// Mutable input state.
    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    /// A handle other threads can use to send signals into this runtime.
    #[must_use]
    pub fn signal_sender(&self) -> SignalSender {
        self.signals.sender()
    }

    /// Queue a signal for delivery at the next signal phase.
    pub fn emit(&mut self, signal: Signal) {
        self.signals.push(signal);
    }

    // ── construction ────────────────────────────────────────────────────

    /// Construct an unowned node. It stays inert until adopted.
    pub fn spawn<T: Node>(&mut self, value: T) -> Handle<T> {
        self.spawn_kind(value, NodeKind::Plain)
    }

    pub(crate) fn spawn_kind<T: Node>(&mut self, value: T, kind: NodeKind) -> Handle<T> {
        let table = self.hooks.table_for::<T>();
        let id = self.tree.insert(NodeEntry {
            value: Some(Box::new(value)),
            table: Rc::clone(&table),
            state: LifecycleState::Created,
            kind,
            destroying: false,
            timers: table
                .timers
                .iter()
                .map(|timer| TimerState::new(timer.interval))
                .collect(),
            transform: table.transform.map(TransformCache::new),
            time_scale: 1.0,
            invalidations: 0,
        });

        for input in &table.inputs {
            self.router.subscribe(input.binding, id);
        }
        for entry in &table.signals {
            self.signals.subscribe(entry.signal, id);
        }

        trace!(node = %id, node_type = table.type_name(), ?kind, "spawned node");
        Handle::new(id)
    }

    /// Make `child` the last child of `parent`.
    ///
    /// If the parent is initialized, the child's subtree is initialized
    /// top-down before this returns. If the child's own Init fails, the
    /// child is torn down and the error returned.
    pub fn adopt_child<T: Node>(
        &mut self,
        parent: impl Into<NodeId>,
        child: Handle<T>,
    ) -> Result<Handle<T>, RuntimeError> {
        let parent = parent.into();
        let entry = self.tree.get(parent).ok_or(RuntimeError::Stale(parent))?;
        if entry.destroying || entry.state == LifecycleState::Destroyed {
            return Err(RuntimeError::Destroying(parent));
        }
        let parent_state = entry.state;

        self.tree.adopt(parent, child.id())?;
        self.invalidate_world(child.id(), true);
        trace!(parent = %parent, child = %child.id(), "adopted node");

        if parent_state == LifecycleState::Initialized {
            self.initialize_subtree(child.id())?;
        }
        Ok(child)
    }

    /// Detach a child from its owner without destroying it. The child keeps
    /// its state and can be adopted elsewhere; while unowned it is not valid
    /// and receives no hooks.
    pub fn release_child(&mut self, child: impl Into<NodeId>) -> Result<NodeId, RuntimeError> {
        let child = child.into();
        let entry = self.tree.get(child).ok_or(RuntimeError::Stale(child))?;
        if entry.kind.is_owner_bound() {
            return Err(RuntimeError::ComponentOwnership(child));
        }
        let owner = self.tree.release(child)?;
        self.invalidate_world(child, true);
        trace!(owner = %owner, child = %child, "released node");
        Ok(owner)
    }

    /// Construct, adopt and initialize a child in one step.
    pub fn create_child<T: Node>(
        &mut self,
        parent: impl Into<NodeId>,
        value: T,
    ) -> Result<Handle<T>, RuntimeError> {
        let parent = parent.into();
        if !self.tree.contains(parent) {
            return Err(RuntimeError::Stale(parent));
        }
        let child = self.spawn(value);
        self.adopt_or_discard(parent, child)
    }

    /// Attach a component to `owner`. Components cannot be released and are
    /// only freed together with their owner.
    pub fn attach_component<T: Node>(
        &mut self,
        owner: impl Into<NodeId>,
        value: T,
    ) -> Result<Handle<T>, RuntimeError> {
        let owner = owner.into();
        if !self.tree.contains(owner) {
            return Err(RuntimeError::Stale(owner));
        }
        let component = self.spawn_kind(value, NodeKind::Component);
        self.adopt_or_discard(owner, component)
    }

    pub(crate) fn adopt_or_discard<T: Node>(
        &mut self,
        parent: NodeId,
        child: Handle<T>,
    ) -> Result<Handle<T>, RuntimeError> {
        match self.adopt_child(parent, child) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                if self.tree.contains(child.id()) && !self.tree.is_attached(child.id()) {
                    self.destroy_subtree(child.id());
                }
                Err(err)
            }
        }
    }

    /// Create a new root with its own service scope and initialize it.
    ///
    /// If the root's Init fails the whole backstage is torn down and
    /// [`RuntimeError::Initialization`] is returned.
    pub fn create_backstage<T: Node>(&mut self, root: T) -> Result<Handle<T>, RuntimeError> {
        let handle = self.spawn_kind(root, NodeKind::Backstage);
        self.tree.set_root(handle.id())?;
        self.open_scope(handle.id())?;
        info!(
            backstage = %handle.id(),
            node_type = T::type_name(),
            "created backstage"
        );
        self.initialize_subtree(handle.id())?;
        Ok(handle)
    }

    /// Build a backstage from a factory. See [`Runtime::create_backstage`].
    pub fn initialize<T: Node, F: FnOnce() -> T>(
        &mut self,
        factory: F,
    ) -> Result<Handle<T>, RuntimeError> {
        self.create_backstage(factory())
    }

    /// Run Init top-down over every not-yet-initialized node of a subtree.
    ///
    /// Children created by a parent's Init are picked up right after it. A
    /// failure of `root` itself tears the subtree down and is returned; a
    /// failure further down is only logged.
    pub(crate) fn initialize_subtree(&mut self, root: NodeId) -> Result<(), RuntimeError> {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(entry) = self.tree.get(id) else {
                continue;
            };
            if entry.destroying {
                continue;
            }
            if entry.state == LifecycleState::Created {
                let type_name = entry.table.type_name();
                let result = self.run_init(id);
                if let Err(error) = result
                    && id == root
                {
                    warn!(node = %id, node_type = type_name, "initialization failed, tearing down");
                    self.destroy_subtree(id);
                    return Err(RuntimeError::Initialization {
                        node: id,
                        type_name,
                        error,
                    });
                }
                if let Some(entry) = self.tree.get_mut(id) {
                    entry.state = LifecycleState::Initialized;
                }
            }
            stack.extend(self.tree.children(id).iter().rev().copied());
        }
        Ok(())
    }

    // ── queries ─────────────────────────────────────────────────────────

    /// Whether `node` is alive, attached to a tree, and not yet destroyed.
    #[must_use]
    pub fn is_valid(&self, node: impl Into<NodeId>) -> bool {
        let node = node.into();
        self.tree.is_attached(node)
            && self
                .tree
                .get(node)
                .is_some_and(|entry| entry.state != LifecycleState::Destroyed)
    }

    /// Lifecycle state. Stale handles report [`LifecycleState::Destroyed`].
    #[must_use]
    pub fn lifecycle(&self, node: impl Into<NodeId>) -> LifecycleState {
        self.tree
            .get(node.into())
            .map_or(LifecycleState::Destroyed, |entry| entry.state)
    }

    /// Structural role of a live node.
    #[must_use]
    pub fn kind(&self, node: impl Into<NodeId>) -> Option<NodeKind> {
        self.tree.get(node.into()).map(|entry| entry.kind)
    }

    /// Owner of a node.
    #[must_use]
    pub fn parent_of(&self, node: impl Into<NodeId>) -> Option<NodeId> {
        self.tree.parent(node.into())
    }

    /// Children of a node in creation order.
    #[must_use]
    pub fn children_of(&self, node: impl Into<NodeId>) -> &[NodeId] {
        self.tree.children(node.into())
    }

    fn is_type<T: Node>(&self, node: NodeId) -> bool {
        self.tree
            .get(node)
            .is_some_and(|entry| entry.table.type_id() == std::any::TypeId::of::<T>())
    }

    /// The nearest strict ancestor of type `T`.
    #[must_use]
    pub fn find_ancestor<T: Node>(&self, from: impl Into<NodeId>) -> Option<Handle<T>> {
        self.tree
            .ancestors(from.into())
            .find(|&id| self.is_type::<T>(id))
            .map(Handle::new)
    }

    /// The first direct child of type `T`.
    #[must_use]
    pub fn find_child<T: Node>(&self, parent: impl Into<NodeId>) -> Option<Handle<T>> {
        self.tree
            .children(parent.into())
            .iter()
            .copied()
            .find(|&id| self.is_type::<T>(id))
            .map(Handle::new)
    }

    /// Borrow a node's value.
    pub fn node<T: Node>(&self, handle: Handle<T>) -> Result<&T, RuntimeError> {
        let id = handle.id();
        let entry = self.tree.get(id).ok_or(RuntimeError::Stale(id))?;
        let value = entry.value.as_deref().ok_or(RuntimeError::Busy(id))?;
        value.downcast_ref::<T>().ok_or(RuntimeError::TypeMismatch {
            node: id,
            expected: T::type_name(),
        })
    }

    /// Mutably borrow a node's value.
    pub fn node_mut<T: Node>(&mut self, handle: Handle<T>) -> Result<&mut T, RuntimeError> {
        let id = handle.id();
        let entry = self.tree.get_mut(id).ok_or(RuntimeError::Stale(id))?;
        let value = entry.value.as_deref_mut().ok_or(RuntimeError::Busy(id))?;
        value.downcast_mut::<T>().ok_or(RuntimeError::TypeMismatch {
            node: id,
            expected: T::type_name(),
        })
    }

    /// Run `f` with the node's value and a context for that node, as if it
    /// were one of the node's hooks.
    pub fn with_node<T: Node, R>(
        &mut self,
        handle: Handle<T>,
        f: impl FnOnce(&mut T, &mut NodeContext<'_>) -> R,
    ) -> Result<R, RuntimeError> {
        let id = handle.id();
        self.call_hook(id, |value, ctx| value.downcast_mut::<T>().map(|node| f(node, ctx)))?
            .ok_or(RuntimeError::TypeMismatch {
                node: id,
                expected: T::type_name(),
            })
    }

    /// Scale the delta this node and its subtree receive.
    pub fn set_time_scale(&mut self, node: impl Into<NodeId>, scale: f64) -> Result<(), RuntimeError> {
        let node = node.into();
        let entry = self.tree.get_mut(node).ok_or(RuntimeError::Stale(node))?;
        entry.time_scale = if scale.is_finite() { scale.max(0.0) } else { 1.0 };
        Ok(())
    }

    /// The product of the time scales from the root down to `node`.
    #[must_use]
    pub fn effective_time_scale(&self, node: impl Into<NodeId>) -> f64 {
        let node = node.into();
        std::iter::once(node)
            .chain(self.tree.ancestors(node))
            .filter_map(|id| self.tree.get(id))
            .map(|entry| entry.time_scale)
            .product()
    }

    // ── teardown ────────────────────────────────────────────────────────

    /// Destroy a subtree leaf-first.
    ///
    /// Every node's Destroy hooks run before it leaves the tree, and a parent
    /// leaves only after all of its children. While a frame is dispatching, or
    /// when the subtree contains a node whose hook is running, the free is
    /// deferred to the end of the frame.
    pub fn free_immediately(&mut self, node: impl Into<NodeId>) -> Result<(), RuntimeError> {
        let node = node.into();
        let entry = self.tree.get(node).ok_or(RuntimeError::Stale(node))?;
        if entry.destroying {
            return Ok(());
        }
        if entry.kind.is_owner_bound() {
            let owner_destroying = self
                .tree
                .parent(node)
                .and_then(|owner| self.tree.get(owner))
                .is_some_and(|owner| owner.destroying);
            if !owner_destroying {
                return Err(RuntimeError::ComponentOwnership(node));
            }
        }

        let holds_active = self
            .active
            .iter()
            .any(|&active| self.tree.is_ancestor_or_self(node, active));
        if self.walking || holds_active {
            if !self.deferred.contains(&node) {
                debug!(node = %node, "deferring free until end of frame");
                self.deferred.push(node);
            }
            return Ok(());
        }

        self.destroy_subtree(node);
        Ok(())
    }

    /// Condemn a node; it is freed at the start of the next frame.
    ///
    /// Returns `false` if the node is not valid or is a component.
    pub fn queue_free(&mut self, node: impl Into<NodeId>) -> bool {
        let node = node.into();
        if !self.is_valid(node) || self.kind(node).is_some_and(NodeKind::is_owner_bound) {
            return false;
        }
        if !self.condemned.contains(&node) {
            self.condemned.push(node);
        }
        true
    }

    pub(crate) fn destroy_subtree(&mut self, root: NodeId) {
        let order = self.tree.post_order(root);
        for &id in &order {
            if let Some(entry) = self.tree.get_mut(id) {
                entry.destroying = true;
            }
        }

        for id in order {
            let Some(entry) = self.tree.get(id) else {
                continue;
            };
            let initialized = entry.state == LifecycleState::Initialized;
            let kind = entry.kind;

            if initialized {
                self.run_destroy(id);
            }
            if let Some(entry) = self.tree.get_mut(id) {
                entry.state = LifecycleState::Destroyed;
            }

            self.router.unsubscribe(id);
            self.signals.unsubscribe(id);
            self.forget_scope(id, kind);

            // Destroy hooks may have released or reparented children.
            let stragglers = self.tree.children(id).to_vec();
            for child in stragglers {
                self.destroy_subtree(child);
            }
            if self.tree.remove(id).is_ok() {
                self.freed += 1;
            }
        }

        debug!(node = %root, "destroyed subtree");
    }

    fn free_all(&mut self, batch: Vec<NodeId>) {
        for id in batch {
            if !self.tree.contains(id) {
                continue;
            }
            if let Err(err) = self.free_immediately(id) {
                warn!(node = %id, error = %err, "could not free node");
            }
        }
    }

    fn reap_condemned(&mut self) {
        let condemned = std::mem::take(&mut self.condemned);
        self.free_all(condemned);
    }

    fn flush_deferred(&mut self) {
        while !self.deferred.is_empty() {
            let deferred = std::mem::take(&mut self.deferred);
            self.free_all(deferred);
        }
    }

    // ── frame ───────────────────────────────────────────────────────────

    /// Run one logic frame with `dt` seconds of elapsed time.
    pub fn process_logic_frame(&mut self, dt: f64) -> Result<FrameReport, RuntimeError> {
        if self.in_frame {
            return Err(RuntimeError::ReentrantFrame);
        }
        self.in_frame = true;
        let failures_before = self.hook_failures;
        self.freed = 0;

        self.reap_condemned();
        self.flush_deferred();

        self.walking = true;
        self.dispatch_input(dt);
        let mut updated = 0;
        for root in self.tree.roots().to_vec() {
            updated += self.update_walk(root, dt);
        }
        self.deliver_signals();
        self.walking = false;

        self.flush_deferred();

        self.frame += 1;
        self.in_frame = false;

        let report = FrameReport {
            frame: self.frame,
            hook_failures: self.hook_failures - failures_before,
            updated,
            freed: self.freed,
        };
        trace!(
            frame = report.frame,
            updated = report.updated,
            freed = report.freed,
            hook_failures = report.hook_failures,
            "logic frame"
        );
        Ok(report)
    }

    fn update_walk(&mut self, root: NodeId, dt: f64) -> usize {
        let mut updated = 0;
        let mut stack = vec![(root, dt)];
        while let Some((id, inherited)) = stack.pop() {
            let Some(entry) = self.tree.get(id) else {
                continue;
            };
            if entry.destroying
                || entry.state != LifecycleState::Initialized
                || !self.tree.is_attached(id)
            {
                continue;
            }
            let dt = inherited * entry.time_scale;

            self.run_update(id, dt);
            self.run_timers(id, dt);
            updated += 1;

            let children = self.tree.children(id).to_vec();
            stack.extend(children.into_iter().rev().map(|child| (child, dt)));
        }
        updated
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("frame", &self.frame)
            .field("nodes", &self.tree.len())
            .field("roots", &self.tree.roots())
            .field("hook_tables", &self.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use engine_graph::GraphError;

    use crate::hooks::{HookResult, Hooks};

    use super::*;

    thread_local! {
        static DESTROYED: Cell<u32> = const { Cell::new(0) };
    }

    #[derive(Default)]
    struct Stage;
    impl Node for Stage {}

    #[derive(Default)]
    struct Actor;

    impl Node for Actor {
        fn hooks(hooks: &mut Hooks<Self>) {
            hooks.on_destroy(|_, _| {
                DESTROYED.with(|d| d.set(d.get() + 1));
                Ok(())
            });
        }
    }

    #[derive(Default)]
    struct Collider;
    impl Node for Collider {}

    /// Frees its parent from inside Update.
    #[derive(Default)]
    struct Saboteur;

    impl Saboteur {
        fn update(&mut self, ctx: &mut NodeContext<'_>, _dt: f64) -> HookResult {
            let parent = ctx.parent().ok_or_else(|| anyhow::anyhow!("orphaned"))?;
            ctx.free_immediately(parent)?;
            Ok(())
        }
    }

    impl Node for Saboteur {
        fn hooks(hooks: &mut Hooks<Self>) {
            hooks.on_update(Self::update);
        }
    }

    /// Spawns an actor from Init.
    #[derive(Default)]
    struct Spawner {
        spawned: Option<NodeId>,
    }

    impl Spawner {
        fn init(&mut self, ctx: &mut NodeContext<'_>) -> HookResult {
            self.spawned = Some(ctx.create_actor(Actor)?.id());
            Ok(())
        }
    }

    impl Node for Spawner {
        fn hooks(hooks: &mut Hooks<Self>) {
            hooks.on_init(Self::init);
        }
    }

    /// Tries to run a frame from inside a frame.
    #[derive(Default)]
    struct Recursor {
        rejected: bool,
    }

    impl Node for Recursor {
        fn hooks(hooks: &mut Hooks<Self>) {
            hooks.on_update(|node, ctx, dt| {
                node.rejected = matches!(
                    ctx.process_logic_frame(dt),
                    Err(RuntimeError::ReentrantFrame)
                );
                Ok(())
            });
        }
    }

    #[test]
    fn test_validity_follows_lifecycle() {
        let mut rt = Runtime::new();
        let stage = rt.create_backstage(Stage).unwrap();
        let actor = rt.spawn(Actor);
        assert!(!rt.is_valid(actor));
        assert_eq!(rt.lifecycle(actor), LifecycleState::Created);

        rt.adopt_child(stage, actor).unwrap();
        assert!(rt.is_valid(actor));
        assert_eq!(rt.lifecycle(actor), LifecycleState::Initialized);

        rt.free_immediately(actor).unwrap();
        assert!(!rt.is_valid(actor));
        assert_eq!(rt.lifecycle(actor), LifecycleState::Destroyed);
        assert!(matches!(rt.node(actor), Err(RuntimeError::Stale(_))));
        assert!(matches!(
            rt.free_immediately(actor),
            Err(RuntimeError::Stale(_))
        ));
    }

    #[test]
    fn test_destroy_runs_once_per_node() {
        DESTROYED.with(|d| d.set(0));
        let mut rt = Runtime::new();
        let stage = rt.create_backstage(Stage).unwrap();
        let parent = rt.create_child(stage, Actor).unwrap();
        rt.create_child(parent, Actor).unwrap();
        rt.create_child(parent, Actor).unwrap();

        rt.free_immediately(parent).unwrap();
        rt.free_immediately(stage).unwrap();
        assert_eq!(DESTROYED.with(Cell::get), 3);
        assert_eq!(rt.node_count(), 0);
    }

    #[test]
    fn test_adopting_owned_node_changes_nothing() {
        let mut rt = Runtime::new();
        let stage = rt.create_backstage(Stage).unwrap();
        let first = rt.create_child(stage, Stage).unwrap();
        let second = rt.create_child(stage, Stage).unwrap();
        let child = rt.create_child(first, Actor).unwrap();

        let err = rt.adopt_child(second, child).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Graph(GraphError::OwnershipConflict { .. })
        ));
        assert_eq!(rt.children_of(first), &[child.id()]);
        assert!(rt.children_of(second).is_empty());
        assert_eq!(rt.parent_of(child), Some(first.id()));
    }

    #[test]
    fn test_release_and_readopt_keeps_state() {
        DESTROYED.with(|d| d.set(0));
        let mut rt = Runtime::new();
        let stage = rt.create_backstage(Stage).unwrap();
        let first = rt.create_child(stage, Stage).unwrap();
        let second = rt.create_child(stage, Stage).unwrap();
        let child = rt.create_child(first, Actor).unwrap();

        assert_eq!(rt.release_child(child).unwrap(), first.id());
        assert!(!rt.is_valid(child));
        rt.adopt_child(second, child).unwrap();
        assert!(rt.is_valid(child));
        assert_eq!(rt.lifecycle(child), LifecycleState::Initialized);

        rt.free_immediately(first).unwrap();
        assert_eq!(DESTROYED.with(Cell::get), 0);
        assert!(rt.is_valid(child));
    }

    #[test]
    fn test_components_follow_their_owner() {
        let mut rt = Runtime::new();
        let stage = rt.create_backstage(Stage).unwrap();
        let actor = rt.create_child(stage, Actor).unwrap();
        let collider = rt.attach_component(actor, Collider).unwrap();

        assert_eq!(rt.kind(collider), Some(NodeKind::Component));
        assert_eq!(rt.find_child::<Collider>(actor), Some(collider));
        assert!(matches!(
            rt.release_child(collider),
            Err(RuntimeError::ComponentOwnership(_))
        ));
        assert!(matches!(
            rt.free_immediately(collider),
            Err(RuntimeError::ComponentOwnership(_))
        ));
        assert!(!rt.queue_free(collider));

        rt.free_immediately(actor).unwrap();
        assert!(!rt.is_valid(collider));
    }

    #[test]
    fn test_queue_free_reaps_next_frame() {
        let mut rt = Runtime::new();
        let stage = rt.create_backstage(Stage).unwrap();
        let actor = rt.create_child(stage, Actor).unwrap();
        assert!(rt.queue_free(actor));
        assert!(rt.is_valid(actor));

        let report = rt.process_logic_frame(0.016).unwrap();
        assert_eq!(report.freed, 1);
        assert!(!rt.is_valid(actor));
        assert!(!rt.queue_free(actor));
    }

    #[test]
    fn test_free_during_walk_is_deferred() {
        let mut rt = Runtime::new();
        let stage = rt.create_backstage(Stage).unwrap();
        let victim = rt.create_child(stage, Actor).unwrap();
        let saboteur = rt.create_child(victim, Saboteur).unwrap();

        let report = rt.process_logic_frame(0.016).unwrap();
        assert_eq!(report.hook_failures, 0);
        assert!(!rt.is_valid(victim));
        assert!(!rt.is_valid(saboteur));
        assert!(rt.is_valid(stage));
    }

    #[test]
    fn test_create_actor_lands_in_scope_owner() {
        let mut rt = Runtime::new();
        let stage = rt.create_backstage(Stage).unwrap();
        let holder = rt.create_child(stage, Stage).unwrap();
        let spawner = rt.create_child(holder, Spawner::default()).unwrap();

        let actor = rt.node(spawner).unwrap().spawned.unwrap();
        assert_eq!(rt.parent_of(actor), Some(stage.id()));
        assert_eq!(rt.find_ancestor::<Stage>(spawner), Some(holder));
    }

    #[test]
    fn test_reentrant_frame_is_rejected() {
        let mut rt = Runtime::new();
        let stage = rt.create_backstage(Stage).unwrap();
        let recursor = rt.create_child(stage, Recursor::default()).unwrap();
        rt.process_logic_frame(0.016).unwrap();
        assert!(rt.node(recursor).unwrap().rejected);
        assert_eq!(rt.frame(), 1);
    }

    #[test]
    fn test_adopting_under_destroyed_parent_fails() {
        let mut rt = Runtime::new();
        let stage = rt.create_backstage(Stage).unwrap();
        let gone = rt.create_child(stage, Stage).unwrap();
        rt.free_immediately(gone).unwrap();
        assert!(matches!(
            rt.create_child(gone, Actor),
            Err(RuntimeError::Stale(_))
        ));
    }
}
