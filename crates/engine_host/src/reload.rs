//! Guest slots and the reload state machine.
//!
//! Each slot moves through
//! `Unloaded → Running → AwaitingReload → Reloading → Running | Failed`.
//! Compiles never touch the runtime; they deposit their outcome in the
//! slot's tracker, and the swap happens in [`ReloadHost::process_frame`]
//! before the logic frame runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use engine_runtime::{FrameReport, NodeId, Runtime};
use tokio::runtime::Handle as TokioHandle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::diagnostics::Diagnostics;
use crate::error::HostError;
use crate::guest::{CompileError, Compiler, GuestSettings, GuestUnit};

/// Index of a slot in its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub usize);

/// Where a slot is in the reload cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    /// Nothing has been instantiated yet.
    Unloaded,
    /// A generation is live and no compile is pending.
    Running,
    /// A compile was requested; the current generation keeps running.
    AwaitingReload,
    /// The swap to a freshly compiled unit is in progress.
    Reloading,
    /// The last instantiation failed; no generation is live.
    Failed,
}

type CompileOutcome = Result<Box<dyn GuestUnit>, CompileError>;

/// Tickets and the newest finished compile of one slot.
#[derive(Default)]
struct CompileTracker {
    requested: AtomicU64,
    completed: Mutex<Option<(u64, CompileOutcome)>>,
}

impl CompileTracker {
    fn next_ticket(&self) -> u64 {
        self.requested.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn latest(&self) -> u64 {
        self.requested.load(Ordering::SeqCst)
    }

    /// Keep `outcome` only if `ticket` is still the newest request.
    fn deposit(&self, ticket: u64, outcome: CompileOutcome) -> bool {
        if ticket != self.latest() {
            return false;
        }
        match self.completed.lock() {
            Ok(mut slot) => {
                *slot = Some((ticket, outcome));
                true
            }
            Err(_) => false,
        }
    }

    fn take(&self) -> Option<(u64, CompileOutcome)> {
        self.completed.lock().ok().and_then(|mut slot| slot.take())
    }
}

struct GuestSlot {
    name: String,
    compiler: Arc<dyn Compiler>,
    state: GenerationState,
    generation: u64,
    label: String,
    unit: Option<Box<dyn GuestUnit>>,
    backstage: Option<NodeId>,
    settings: Option<GuestSettings>,
    tracker: Arc<CompileTracker>,
    dirty: Arc<AtomicBool>,
    in_flight: Vec<JoinHandle<()>>,
}

impl GuestSlot {
    fn diagnostic_key(&self, kind: &str) -> String {
        format!("{kind}:{}", self.name)
    }
}

/// Owns the runtime and the guest slots that feed it.
pub struct ReloadHost {
    runtime: Runtime,
    slots: Vec<GuestSlot>,
    diagnostics: Diagnostics,
    tokio: TokioHandle,
}

impl ReloadHost {
    /// Create a host that compiles on `tokio`'s blocking pool.
    #[must_use]
    pub fn new(tokio: TokioHandle) -> Self {
        Self {
            runtime: Runtime::new(),
            slots: Vec::new(),
            diagnostics: Diagnostics::new(),
            tokio,
        }
    }

    /// Report through an existing diagnostics channel.
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// The runtime.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Mutable access to the runtime.
    pub fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.runtime
    }

    /// The diagnostics channel.
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn slot(&self, id: SlotId) -> Result<&GuestSlot, HostError> {
        self.slots.get(id.0).ok_or(HostError::UnknownSlot(id.0))
    }

    fn slot_mut(&mut self, id: SlotId) -> Result<&mut GuestSlot, HostError> {
        self.slots.get_mut(id.0).ok_or(HostError::UnknownSlot(id.0))
    }

    /// Register a reloadable guest. Nothing is compiled yet.
    pub fn add_slot(
        &mut self,
        name: impl Into<String>,
        compiler: Arc<dyn Compiler>,
    ) -> Result<SlotId, HostError> {
        let name = name.into();
        if self.slots.iter().any(|slot| slot.name == name) {
            return Err(HostError::DuplicateSlot(name));
        }
        info!(slot = %name, "added guest slot");
        self.slots.push(GuestSlot {
            name,
            compiler,
            state: GenerationState::Unloaded,
            generation: 0,
            label: String::new(),
            unit: None,
            backstage: None,
            settings: None,
            tracker: Arc::default(),
            dirty: Arc::new(AtomicBool::new(false)),
            in_flight: Vec::new(),
        });
        Ok(SlotId(self.slots.len() - 1))
    }

    /// Look a slot up by name.
    #[must_use]
    pub fn slot_id(&self, name: &str) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|slot| slot.name == name)
            .map(SlotId)
    }

    /// Compile on the calling thread and bring up the first generation.
    pub fn initialize(&mut self, id: SlotId) -> Result<NodeId, HostError> {
        let slot = self.slot(id)?;
        let name = slot.name.clone();
        let outcome = slot.compiler.compile();
        let Self {
            runtime,
            slots,
            diagnostics,
            ..
        } = self;
        let slot = &mut slots[id.0];
        match outcome {
            Ok(unit) => swap(slot, runtime, diagnostics, unit).map_err(|source| {
                HostError::Instantiate {
                    slot: name,
                    source,
                }
            }),
            Err(source) => {
                diagnostics.show(slot.diagnostic_key("compile"), source.to_string());
                if slot.backstage.is_none() {
                    slot.state = GenerationState::Failed;
                }
                Err(HostError::Compile { slot: name, source })
            }
        }
    }

    /// Start a background compile and return its ticket. Any compile still
    /// running for the slot is superseded.
    pub fn request_reload(&mut self, id: SlotId) -> Result<u64, HostError> {
        let tokio = self.tokio.clone();
        let slot = self.slot_mut(id)?;
        let ticket = slot.tracker.next_ticket();
        slot.state = GenerationState::AwaitingReload;

        let compiler = Arc::clone(&slot.compiler);
        let tracker = Arc::clone(&slot.tracker);
        let name = slot.name.clone();
        debug!(slot = %name, ticket, "compile requested");
        slot.in_flight.push(tokio.spawn_blocking(move || {
            let outcome = compiler.compile();
            if !tracker.deposit(ticket, outcome) {
                debug!(slot = %name, ticket, "compile superseded, result dropped");
            }
        }));
        Ok(ticket)
    }

    /// Ask for a reload at the next frame.
    pub fn mark_dirty(&self, id: SlotId) -> Result<(), HostError> {
        self.slot(id)?.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// The flag a watcher sets to request a reload of the slot.
    pub fn dirty_flag(&self, id: SlotId) -> Result<Arc<AtomicBool>, HostError> {
        Ok(Arc::clone(&self.slot(id)?.dirty))
    }

    /// Whether a compile for the slot is still running.
    #[must_use]
    pub fn is_compiling(&self, id: SlotId) -> bool {
        self.slot(id)
            .is_ok_and(|slot| slot.in_flight.iter().any(|task| !task.is_finished()))
    }

    /// Whether the slot is waiting on a compile result.
    #[must_use]
    pub fn is_awaiting_reload(&self, id: SlotId) -> bool {
        self.state(id) == Some(GenerationState::AwaitingReload)
    }

    /// The slot's state.
    #[must_use]
    pub fn state(&self, id: SlotId) -> Option<GenerationState> {
        self.slot(id).ok().map(|slot| slot.state)
    }

    /// How many generations have been swapped in.
    #[must_use]
    pub fn generation(&self, id: SlotId) -> Option<u64> {
        self.slot(id).ok().map(|slot| slot.generation)
    }

    /// Root of the live generation.
    #[must_use]
    pub fn backstage(&self, id: SlotId) -> Option<NodeId> {
        self.slot(id).ok().and_then(|slot| slot.backstage)
    }

    /// Settings of the live generation.
    #[must_use]
    pub fn settings(&self, id: SlotId) -> Option<&GuestSettings> {
        self.slot(id).ok().and_then(|slot| slot.settings.as_ref())
    }

    /// Description of the live unit.
    #[must_use]
    pub fn describe(&self, id: SlotId) -> Option<String> {
        self.slot(id)
            .ok()
            .and_then(|slot| slot.unit.as_ref())
            .map(|unit| unit.describe())
    }

    /// Wait for every running compile to finish.
    pub async fn settle(&mut self) {
        for slot in &mut self.slots {
            for task in slot.in_flight.drain(..) {
                if let Err(err) = task.await {
                    warn!(slot = %slot.name, error = %err, "compile task did not complete");
                }
            }
        }
    }

    /// Apply pending reloads, then run one logic frame.
    pub fn process_frame(&mut self, dt: f64) -> Result<FrameReport, HostError> {
        for index in 0..self.slots.len() {
            let id = SlotId(index);
            if self.slots[index].dirty.swap(false, Ordering::SeqCst) {
                self.request_reload(id)?;
            }
            self.poll_slot(id);
        }
        Ok(self.runtime.process_logic_frame(dt)?)
    }

    fn poll_slot(&mut self, id: SlotId) {
        let Self {
            runtime,
            slots,
            diagnostics,
            ..
        } = self;
        let Some(slot) = slots.get_mut(id.0) else {
            return;
        };
        slot.in_flight.retain(|task| !task.is_finished());

        let Some((ticket, outcome)) = slot.tracker.take() else {
            return;
        };
        if ticket != slot.tracker.latest() {
            debug!(slot = %slot.name, ticket, "discarding stale compile result");
            return;
        }

        match outcome {
            Ok(unit) => {
                if let Err(err) = swap(slot, runtime, diagnostics, unit) {
                    error!(slot = %slot.name, error = %err, "new generation failed to start");
                }
            }
            Err(err) => {
                diagnostics.show(slot.diagnostic_key("compile"), err.to_string());
                slot.state = if slot.backstage.is_some() {
                    GenerationState::Running
                } else {
                    GenerationState::Failed
                };
                warn!(slot = %slot.name, ticket, "compile failed, keeping current generation");
            }
        }
    }
}

/// Tear down the slot's generation and bring up `unit`.
fn swap(
    slot: &mut GuestSlot,
    runtime: &mut Runtime,
    diagnostics: &Diagnostics,
    unit: Box<dyn GuestUnit>,
) -> Result<NodeId, engine_runtime::RuntimeError> {
    slot.state = GenerationState::Reloading;

    if let Some(old) = slot.backstage.take()
        && let Err(err) = runtime.free_immediately(old)
    {
        warn!(slot = %slot.name, backstage = %old, error = %err, "old backstage was already gone");
    }
    drop(slot.unit.take());
    runtime.purge_hook_tables();
    slot.settings = None;

    slot.generation += 1;
    slot.label = format!("guest-{}", Uuid::new_v4());
    let settings = unit.settings();

    match unit.instantiate(runtime) {
        Ok(root) => {
            if let Err(err) = runtime.set_time_scale(root, settings.time_scale) {
                warn!(slot = %slot.name, error = %err, "could not apply guest time scale");
            }
            info!(
                slot = %slot.name,
                label = %slot.label,
                generation = slot.generation,
                unit = %unit.describe(),
                backstage = %root,
                "generation started"
            );
            slot.backstage = Some(root);
            slot.unit = Some(unit);
            slot.settings = Some(settings);
            slot.state = GenerationState::Running;
            diagnostics.clear(&slot.diagnostic_key("compile"));
            diagnostics.clear(&slot.diagnostic_key("init"));
            Ok(root)
        }
        Err(err) => {
            diagnostics.show(slot.diagnostic_key("init"), err.to_string());
            slot.state = GenerationState::Failed;
            Err(err)
        }
    }
}
