//! Host error types.

use engine_runtime::RuntimeError;

use crate::guest::CompileError;

/// Errors returned by [`ReloadHost`](crate::ReloadHost) and the tick loop.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// No slot with this id.
    #[error("unknown guest slot {0}")]
    UnknownSlot(usize),

    /// A slot with this name already exists.
    #[error("guest slot '{0}' already exists")]
    DuplicateSlot(String),

    /// A compile failed.
    #[error("compiling '{slot}' failed: {source}")]
    Compile {
        /// The slot name.
        slot: String,
        /// The compiler's error.
        source: CompileError,
    },

    /// The new generation's backstage could not be built.
    #[error("instantiating '{slot}' failed: {source}")]
    Instantiate {
        /// The slot name.
        slot: String,
        /// The runtime's error.
        source: RuntimeError,
    },

    /// The logic frame could not run.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
