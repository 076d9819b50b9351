//! Runtime error types.

use engine_graph::{GraphError, NodeId};

/// Errors returned by [`Runtime`](crate::Runtime) operations.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A structural edit was rejected by the ownership graph.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The handle no longer refers to a live node.
    #[error("{0} is no longer alive")]
    Stale(NodeId),

    /// The node's payload is checked out by one of its own running hooks.
    #[error("{0} is running a hook and cannot be borrowed")]
    Busy(NodeId),

    /// The node exists but holds a different type.
    #[error("{node} is not a {expected}")]
    TypeMismatch {
        /// The node that was looked up.
        node: NodeId,
        /// The type the caller asked for.
        expected: &'static str,
    },

    /// The Init hooks of a newly constructed subtree root failed. The subtree
    /// has been torn down.
    #[error("{type_name} ({node}) failed to initialize: {error:#}")]
    Initialization {
        /// The node whose construction was aborted.
        node: NodeId,
        /// Its type.
        type_name: &'static str,
        /// The first hook error.
        error: anyhow::Error,
    },

    /// Components and service registries live and die with their owner.
    #[error("{0} is bound to its owner and cannot be released or freed on its own")]
    ComponentOwnership(NodeId),

    /// The node is being torn down and cannot take new children.
    #[error("{0} is being destroyed")]
    Destroying(NodeId),

    /// No service scope encloses the node.
    #[error("no service scope encloses {0}")]
    NoServiceScope(NodeId),

    /// A service of this type already exists in the scope.
    #[error("{type_name} is already registered in the scope of {scope}")]
    ServiceExists {
        /// Owner of the scope.
        scope: NodeId,
        /// The service type.
        type_name: &'static str,
    },

    /// The node carries no transform.
    #[error("{0} has no transform")]
    NotSpatial(NodeId),

    /// A logic frame was started from inside a running frame.
    #[error("a logic frame is already running")]
    ReentrantFrame,
}
