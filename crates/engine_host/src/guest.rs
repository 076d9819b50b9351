//! The contract between the host and a compiled guest.

use engine_runtime::{NodeId, Runtime, RuntimeError};
use serde::{Deserialize, Serialize};

/// Settings a guest exposes to the host. Dropped on every reload and read
/// again from the new unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestSettings {
    /// Display name.
    pub name: String,
    /// Time scale applied to the guest's backstage.
    pub time_scale: f64,
}

impl Default for GuestSettings {
    fn default() -> Self {
        Self {
            name: "guest".to_string(),
            time_scale: 1.0,
        }
    }
}

/// One compiled generation of a guest.
///
/// A unit is created on a worker thread and then moved to the logic thread,
/// where it builds its backstage. The host keeps it alive until the next
/// generation replaces it.
pub trait GuestUnit: Send {
    /// Short human-readable description for logs.
    fn describe(&self) -> String;

    /// Settings for this generation.
    fn settings(&self) -> GuestSettings {
        GuestSettings::default()
    }

    /// Build and initialize this generation's backstage and return its root.
    fn instantiate(&self, runtime: &mut Runtime) -> Result<NodeId, RuntimeError>;
}

/// Produces guest units. Called on tokio's blocking pool.
pub trait Compiler: Send + Sync + 'static {
    /// Build the current source into a unit.
    fn compile(&self) -> Result<Box<dyn GuestUnit>, CompileError>;
}

/// Why a compile produced no unit.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The build step reported an error.
    #[error("build failed: {0}")]
    Build(String),

    /// Source or build output could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The build output is not a valid world manifest.
    #[error("invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// The compile task panicked or was cancelled.
    #[error("compile task aborted: {0}")]
    Aborted(String),
}
