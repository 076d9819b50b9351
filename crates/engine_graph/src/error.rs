//! Graph error types.

use crate::NodeId;

/// Reasons a structural edit on a [`Tree`](crate::Tree) is rejected.
///
/// Every error is returned before any mutation happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// The handle's generation no longer matches its slot.
    #[error("{0} is stale or was never inserted")]
    Stale(NodeId),

    /// The node already has an owner.
    #[error("{child} is already owned by {owner}")]
    OwnershipConflict {
        /// The node that was offered for adoption.
        child: NodeId,
        /// Its current owner.
        owner: NodeId,
    },

    /// The node is a root and cannot be owned or re-rooted.
    #[error("{0} is a root")]
    AlreadyRoot(NodeId),

    /// A node cannot adopt itself.
    #[error("{0} cannot adopt itself")]
    SelfAdoption(NodeId),

    /// The adoption would make a node its own ancestor.
    #[error("adopting {child} under {parent} would create a cycle")]
    Cycle {
        /// The would-be owner.
        parent: NodeId,
        /// The would-be child, which is an ancestor of `parent`.
        child: NodeId,
    },

    /// The node has no owner to be released from.
    #[error("{0} has no owner")]
    NotOwned(NodeId),

    /// Only leaves can be removed from the arena.
    #[error("{0} still has children")]
    HasChildren(NodeId),
}
