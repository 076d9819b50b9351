//! Generational node handles.
//!
//! A [`NodeId`] names a slot in a [`Tree`](crate::Tree) together with the
//! generation the slot had when the node was inserted. Removing a node bumps
//! the slot's generation, so every id that pointed at it stops resolving.

/// A non-owning, generation-checked reference to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// The null handle. Never resolves in any tree.
    pub const INVALID: NodeId = NodeId {
        index: u32::MAX,
        generation: 0,
    };

    /// Build a handle from its raw parts.
    #[must_use]
    pub const fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index inside the arena.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot at the time this handle was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Returns `false` for [`NodeId::INVALID`]. Says nothing about liveness.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.generation == 0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "Node(null)")
        } else {
            write!(f, "Node({}v{})", self.index, self.generation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_is_null() {
        assert!(NodeId::INVALID.is_null());
        assert!(NodeId::default().is_null());
        assert!(!NodeId::from_parts(0, 1).is_null());
    }

    #[test]
    fn test_display() {
        assert_eq!(NodeId::from_parts(3, 2).to_string(), "Node(3v2)");
        assert_eq!(NodeId::INVALID.to_string(), "Node(null)");
    }
}
