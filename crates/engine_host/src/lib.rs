//! # engine_host: hot-reload host
//!
//! Runs guest worlds inside an [`engine_runtime::Runtime`] and replaces them
//! wholesale when their source changes.
//!
//! ## Reload sequence
//!
//! 1. A [`SourceWatcher`] or an explicit request marks a slot for reload.
//! 2. The slot's [`Compiler`] runs on tokio's blocking pool. Each request gets
//!    a ticket; only the newest ticket's result is ever used.
//! 3. At the next tick boundary a successful result replaces the running
//!    backstage: the old one is freed leaf-first, cached hook tables and
//!    settings are dropped, then the new unit is instantiated.
//! 4. A failed compile only raises a diagnostic. The running world stays.

pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod guest;
pub mod kill_switch;
pub mod manifest;
pub mod reload;
pub mod tick;
pub mod watcher;

pub use clock::{FixedClock, FrameClock, WallClock};
pub use config::{ConfigError, HostConfig, SlotConfig};
pub use diagnostics::Diagnostics;
pub use error::HostError;
pub use guest::{CompileError, Compiler, GuestSettings, GuestUnit};
pub use manifest::{ManifestCompiler, WorldManifest};
pub use reload::{GenerationState, ReloadHost, SlotId};
pub use tick::{TickConfig, TickLoop};
pub use watcher::SourceWatcher;
