//! # engine_runtime
//!
//! The entity lifecycle runtime. A [`Runtime`] owns a tree of live nodes,
//! drives their per-phase hooks once per logic frame, hands out scoped
//! singleton services, and caches world transforms for spatial nodes.
//!
//! This crate provides:
//!
//! - [`Node`] and [`Hooks`]: how a type declares its lifecycle hooks.
//! - [`Runtime`]: construction, adoption, teardown and frame dispatch.
//! - [`NodeContext`]: what a running hook sees of the runtime.
//! - [`ClaimedTransform`]: a transform whose writes notify another node.
//! - [`InputState`], [`Signal`] and [`AssetSource`]: the inbound channels.
//!
//! Nothing here is global. All state lives in the `Runtime` value, which is
//! single-threaded; other threads talk to it through [`SignalSender`].

pub mod assets;
pub mod context;
mod dispatch;
pub mod error;
pub mod hooks;
pub mod input;
pub mod node;
pub mod runtime;
pub mod services;
pub mod signal;
pub mod spatial;
pub mod timer;

pub use assets::{ASSET_LOADED, AssetLoaded, AssetSource, FsAssets};
pub use context::NodeContext;
pub use engine_graph::NodeId;
pub use error::RuntimeError;
pub use hooks::{HookRegistry, HookResult, HookTable, Hooks, Phase};
pub use input::{ActionId, InputBinding, InputEdge, InputEvent, InputSource, InputState};
pub use node::{Handle, LifecycleState, Node, NodeKind};
pub use runtime::{FrameReport, Runtime};
pub use services::ServiceRegistry;
pub use signal::{Signal, SignalId, SignalSender};
pub use spatial::ClaimedTransform;
pub use timer::{TimerInterval, TimerState};
