//! Signals between nodes and from other threads.
//!
//! Nodes emit signals during a frame; background work sends them through a
//! [`SignalSender`]. Both land in the same queue, which the runtime drains
//! once per frame after the Update walk. Signals emitted while that batch is
//! being delivered wait for the next frame.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use engine_graph::NodeId;
use tokio::sync::mpsc;

/// Identifies a kind of signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub u64);

impl SignalId {
    /// Derive a stable id from a name using FNV-1a.
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(0x0100_0000_01b3);
            i += 1;
        }
        Self(hash)
    }
}

/// A signal, optionally addressed to one node and carrying a payload.
#[derive(Clone)]
pub struct Signal {
    /// The kind of signal.
    pub id: SignalId,
    /// Only this node receives it, if it subscribes. `None` broadcasts.
    pub target: Option<NodeId>,
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl Signal {
    /// A broadcast signal without payload.
    #[must_use]
    pub fn new(id: SignalId) -> Self {
        Self {
            id,
            target: None,
            payload: None,
        }
    }

    /// Address the signal to one node.
    #[must_use]
    pub fn to(mut self, target: impl Into<NodeId>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload<P: Any + Send + Sync>(mut self, payload: P) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    /// The payload, if present and of type `P`.
    #[must_use]
    pub fn payload<P: Any>(&self) -> Option<&P> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<P>())
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// A cloneable, thread-safe way to hand signals to a runtime.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<Signal>,
}

impl SignalSender {
    /// Queue a signal. Returns `false` if the runtime has been dropped.
    pub fn send(&self, signal: Signal) -> bool {
        self.tx.send(signal).is_ok()
    }
}

#[derive(Debug)]
pub(crate) struct SignalBus {
    queue: Vec<Signal>,
    tx: mpsc::UnboundedSender<Signal>,
    rx: mpsc::UnboundedReceiver<Signal>,
    subscribers: BTreeMap<SignalId, Vec<NodeId>>,
}

impl SignalBus {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            queue: Vec::new(),
            tx,
            rx,
            subscribers: BTreeMap::new(),
        }
    }

    pub(crate) fn sender(&self) -> SignalSender {
        SignalSender {
            tx: self.tx.clone(),
        }
    }

    pub(crate) fn push(&mut self, signal: Signal) {
        self.queue.push(signal);
    }

    pub(crate) fn subscribe(&mut self, id: SignalId, node: NodeId) {
        let nodes = self.subscribers.entry(id).or_default();
        if !nodes.contains(&node) {
            nodes.push(node);
        }
    }

    pub(crate) fn unsubscribe(&mut self, node: NodeId) {
        self.subscribers.retain(|_, nodes| {
            nodes.retain(|&n| n != node);
            !nodes.is_empty()
        });
    }

    /// Everything queued so far, local emits first, then cross-thread sends.
    pub(crate) fn take_batch(&mut self) -> Vec<Signal> {
        while let Ok(signal) = self.rx.try_recv() {
            self.queue.push(signal);
        }
        std::mem::take(&mut self.queue)
    }

    pub(crate) fn recipients(&self, signal: &Signal) -> Vec<NodeId> {
        let Some(nodes) = self.subscribers.get(&signal.id) else {
            return Vec::new();
        };
        match signal.target {
            Some(target) => nodes.iter().copied().filter(|&n| n == target).collect(),
            None => nodes.clone(),
        }
    }
}
