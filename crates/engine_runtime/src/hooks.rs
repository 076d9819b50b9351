//! Per-type hook tables.
//!
//! A type registers its hooks through [`Hooks`] the first time an instance is
//! spawned. The typed functions are erased into a [`HookTable`] that the
//! dispatcher walks without knowing the concrete type, and the table is cached
//! in the [`HookRegistry`] under the type's [`TypeId`].

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use engine_math::Transform3D;
use tracing::debug;

use crate::context::NodeContext;
use crate::input::{ActionId, InputBinding, InputEdge};
use crate::node::Node;
use crate::signal::{Signal, SignalId};
use crate::timer::TimerInterval;

/// What a hook returns. Errors are logged and counted; they never unwind
/// into the dispatcher.
pub type HookResult = anyhow::Result<()>;

pub(crate) type PlainHook = Box<dyn Fn(&mut dyn Any, &mut NodeContext<'_>) -> HookResult>;
pub(crate) type DeltaHook = Box<dyn Fn(&mut dyn Any, &mut NodeContext<'_>, f64) -> HookResult>;
pub(crate) type SignalHook = Box<dyn Fn(&mut dyn Any, &mut NodeContext<'_>, &Signal) -> HookResult>;

/// The dispatch phases a hook can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Once, after adoption into an initialized tree.
    Init,
    /// Every frame while initialized and attached.
    Update,
    /// Once, before the node leaves the tree.
    Destroy,
    /// On a frame or wall-clock interval.
    Timer,
    /// On an action edge.
    Input,
    /// On a subscribed signal.
    Signal,
    /// When a claimed or dependent transform changes.
    Invalidate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::Update => "update",
            Phase::Destroy => "destroy",
            Phase::Timer => "timer",
            Phase::Input => "input",
            Phase::Signal => "signal",
            Phase::Invalidate => "invalidate",
        };
        f.write_str(name)
    }
}

pub(crate) struct TimerHook {
    pub(crate) interval: TimerInterval,
    pub(crate) hook: DeltaHook,
}

pub(crate) struct InputHook {
    pub(crate) binding: InputBinding,
    pub(crate) hook: DeltaHook,
}

pub(crate) struct SignalEntry {
    pub(crate) signal: SignalId,
    pub(crate) hook: SignalHook,
}

/// The erased hooks of one node type.
pub struct HookTable {
    type_id: TypeId,
    type_name: &'static str,
    pub(crate) init: Vec<PlainHook>,
    pub(crate) update: Vec<DeltaHook>,
    pub(crate) destroy: Vec<PlainHook>,
    pub(crate) timers: Vec<TimerHook>,
    pub(crate) inputs: Vec<InputHook>,
    pub(crate) signals: Vec<SignalEntry>,
    pub(crate) invalidate: Vec<PlainHook>,
    pub(crate) transform: Option<Transform3D>,
}

impl HookTable {
    fn empty<T: Node>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: T::type_name(),
            init: Vec::new(),
            update: Vec::new(),
            destroy: Vec::new(),
            timers: Vec::new(),
            inputs: Vec::new(),
            signals: Vec::new(),
            invalidate: Vec::new(),
            transform: None,
        }
    }

    /// The node type this table belongs to.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The node type's display name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Number of hooks registered for a phase.
    #[must_use]
    pub fn hook_count(&self, phase: Phase) -> usize {
        match phase {
            Phase::Init => self.init.len(),
            Phase::Update => self.update.len(),
            Phase::Destroy => self.destroy.len(),
            Phase::Timer => self.timers.len(),
            Phase::Input => self.inputs.len(),
            Phase::Signal => self.signals.len(),
            Phase::Invalidate => self.invalidate.len(),
        }
    }

    /// Whether instances start with a transform.
    #[must_use]
    pub fn is_spatial(&self) -> bool {
        self.transform.is_some()
    }

    pub(crate) fn plain(&self, phase: Phase) -> &[PlainHook] {
        match phase {
            Phase::Init => &self.init,
            Phase::Destroy => &self.destroy,
            Phase::Invalidate => &self.invalidate,
            _ => &[],
        }
    }
}

impl fmt::Debug for HookTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookTable")
            .field("type_name", &self.type_name)
            .field("init", &self.init.len())
            .field("update", &self.update.len())
            .field("destroy", &self.destroy.len())
            .field("timers", &self.timers.len())
            .field("inputs", &self.inputs.len())
            .field("signals", &self.signals.len())
            .field("invalidate", &self.invalidate.len())
            .field("spatial", &self.transform.is_some())
            .finish()
    }
}

fn plain<F>(hook: F) -> PlainHook
where
    F: Fn(&mut dyn Any, &mut NodeContext<'_>) -> HookResult + 'static,
{
    Box::new(hook)
}

fn delta<F>(hook: F) -> DeltaHook
where
    F: Fn(&mut dyn Any, &mut NodeContext<'_>, f64) -> HookResult + 'static,
{
    Box::new(hook)
}

fn signal<F>(hook: F) -> SignalHook
where
    F: Fn(&mut dyn Any, &mut NodeContext<'_>, &Signal) -> HookResult + 'static,
{
    Box::new(hook)
}

fn wrong_payload<T: Node>() -> anyhow::Error {
    anyhow::anyhow!("hook payload is not a {}", T::type_name())
}

/// Typed builder handed to [`Node::hooks`].
pub struct Hooks<T: Node> {
    table: HookTable,
    _marker: PhantomData<fn(T)>,
}

impl<T: Node> Hooks<T> {
    fn new() -> Self {
        Self {
            table: HookTable::empty::<T>(),
            _marker: PhantomData,
        }
    }

    /// Run once when the node joins an initialized tree, before its children.
    pub fn on_init(&mut self, hook: fn(&mut T, &mut NodeContext<'_>) -> HookResult) -> &mut Self {
        self.table.init.push(plain(move |value, ctx| match value.downcast_mut::<T>() {
            Some(node) => hook(node, ctx),
            None => Err(wrong_payload::<T>()),
        }));
        self
    }

    /// Run every frame with the node's scaled delta, before its children.
    pub fn on_update(&mut self, hook: fn(&mut T, &mut NodeContext<'_>, f64) -> HookResult) -> &mut Self {
        self.table.update.push(delta(move |value, ctx, dt| match value.downcast_mut::<T>() {
            Some(node) => hook(node, ctx, dt),
            None => Err(wrong_payload::<T>()),
        }));
        self
    }

    /// Run once during teardown, after all of the node's children.
    pub fn on_destroy(&mut self, hook: fn(&mut T, &mut NodeContext<'_>) -> HookResult) -> &mut Self {
        self.table.destroy.push(plain(move |value, ctx| match value.downcast_mut::<T>() {
            Some(node) => hook(node, ctx),
            None => Err(wrong_payload::<T>()),
        }));
        self
    }

    /// Run every `frames` frames.
    pub fn every_frames(
        &mut self,
        frames: u32,
        hook: fn(&mut T, &mut NodeContext<'_>, f64) -> HookResult,
    ) -> &mut Self {
        self.timer(TimerInterval::Frames(frames.max(1)), hook)
    }

    /// Run every `seconds` of scaled frame time.
    pub fn every_seconds(
        &mut self,
        seconds: f64,
        hook: fn(&mut T, &mut NodeContext<'_>, f64) -> HookResult,
    ) -> &mut Self {
        self.timer(TimerInterval::seconds(seconds), hook)
    }

    fn timer(
        &mut self,
        interval: TimerInterval,
        hook: fn(&mut T, &mut NodeContext<'_>, f64) -> HookResult,
    ) -> &mut Self {
        self.table.timers.push(TimerHook {
            interval,
            hook: delta(move |value, ctx, dt| match value.downcast_mut::<T>() {
                Some(node) => hook(node, ctx, dt),
                None => Err(wrong_payload::<T>()),
            }),
        });
        self
    }

    /// Run on an action edge. Held hooks receive the scaled delta; press and
    /// release hooks receive zero.
    pub fn on_input(
        &mut self,
        action: ActionId,
        edge: InputEdge,
        hook: fn(&mut T, &mut NodeContext<'_>, f64) -> HookResult,
    ) -> &mut Self {
        self.table.inputs.push(InputHook {
            binding: InputBinding::new(action, edge),
            hook: delta(move |value, ctx, dt| match value.downcast_mut::<T>() {
                Some(node) => hook(node, ctx, dt),
                None => Err(wrong_payload::<T>()),
            }),
        });
        self
    }

    /// Run when a signal with this id is delivered to the node.
    pub fn on_signal(
        &mut self,
        id: SignalId,
        hook: fn(&mut T, &mut NodeContext<'_>, &Signal) -> HookResult,
    ) -> &mut Self {
        self.table.signals.push(SignalEntry {
            signal: id,
            hook: signal(move |value, ctx, received| match value.downcast_mut::<T>() {
                Some(node) => hook(node, ctx, received),
                None => Err(wrong_payload::<T>()),
            }),
        });
        self
    }

    /// Run when a transform this node depends on, or has claimed, changes.
    pub fn on_invalidate(&mut self, hook: fn(&mut T, &mut NodeContext<'_>) -> HookResult) -> &mut Self {
        self.table.invalidate.push(plain(move |value, ctx| match value.downcast_mut::<T>() {
            Some(node) => hook(node, ctx),
            None => Err(wrong_payload::<T>()),
        }));
        self
    }

    /// Give every instance a transform, starting at `initial`.
    pub fn with_transform(&mut self, initial: Transform3D) -> &mut Self {
        self.table.transform = Some(initial);
        self
    }
}

/// Cache of hook tables, one per node type.
#[derive(Debug, Default)]
pub struct HookRegistry {
    tables: HashMap<TypeId, Rc<HookTable>>,
    builds: u64,
}

impl HookRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The table for `T`, built on first use.
    pub fn table_for<T: Node>(&mut self) -> Rc<HookTable> {
        if let Some(table) = self.tables.get(&TypeId::of::<T>()) {
            return Rc::clone(table);
        }

        let mut hooks = Hooks::<T>::new();
        T::hooks(&mut hooks);
        let table = Rc::new(hooks.table);
        self.builds += 1;
        debug!(
            node_type = table.type_name,
            init = table.init.len(),
            update = table.update.len(),
            destroy = table.destroy.len(),
            timers = table.timers.len(),
            "built hook table"
        );
        self.tables.insert(TypeId::of::<T>(), Rc::clone(&table));
        table
    }

    /// Whether a table for `T` is cached.
    #[must_use]
    pub fn contains<T: Node>(&self) -> bool {
        self.tables.contains_key(&TypeId::of::<T>())
    }

    /// Number of cached tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// How many tables have been built over the registry's lifetime.
    #[must_use]
    pub fn builds(&self) -> u64 {
        self.builds
    }

    /// Drop every cached table and return how many were dropped. Live nodes
    /// keep the table they were spawned with.
    pub fn purge(&mut self) -> usize {
        let purged = self.tables.len();
        self.tables.clear();
        purged
    }
}
