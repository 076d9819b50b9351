//! Strict-tree node arena.
//!
//! [`Tree`] stores values in generational slots. Each value has at most one
//! owner and an ordered child list; children keep the order in which they were
//! adopted. A node is *attached* when it is a root or has an owner. Unattached
//! nodes are allowed to exist briefly between insertion and adoption.

use crate::{GraphError, NodeId};

#[derive(Debug)]
struct Entry<T> {
    value: T,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    rooted: bool,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    entry: Option<Entry<T>>,
}

/// Generational arena organised as a forest of strict trees.
#[derive(Debug)]
pub struct Tree<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    roots: Vec<NodeId>,
    len: usize,
}

impl<T> Tree<T> {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            roots: Vec::new(),
            len: 0,
        }
    }

    /// Number of live nodes, attached or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no node is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert an unowned node and return its handle.
    pub fn insert(&mut self, value: T) -> NodeId {
        let entry = Entry {
            value,
            parent: None,
            children: Vec::new(),
            rooted: false,
        };
        self.len += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return NodeId::from_parts(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            entry: Some(entry),
        });
        NodeId::from_parts(index, 1)
    }

    fn entry(&self, id: NodeId) -> Option<&Entry<T>> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, id: NodeId) -> Option<&mut Entry<T>> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.entry.as_mut()
    }

    /// Returns `true` if `id` refers to a live node.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.entry(id).is_some()
    }

    /// Returns `true` if `id` is live and either a root or owned.
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.entry(id)
            .is_some_and(|entry| entry.rooted || entry.parent.is_some())
    }

    /// Returns `true` if `id` is live and was made a root.
    #[must_use]
    pub fn is_root(&self, id: NodeId) -> bool {
        self.entry(id).is_some_and(|entry| entry.rooted)
    }

    /// Mark an unowned node as a root.
    pub fn set_root(&mut self, id: NodeId) -> Result<(), GraphError> {
        let entry = self.entry_mut(id).ok_or(GraphError::Stale(id))?;
        if let Some(owner) = entry.parent {
            return Err(GraphError::OwnershipConflict { child: id, owner });
        }
        if entry.rooted {
            return Err(GraphError::AlreadyRoot(id));
        }
        entry.rooted = true;
        self.roots.push(id);
        Ok(())
    }

    /// Make `child` the last child of `parent`.
    ///
    /// The child must be live, unowned and not a root, and must not be an
    /// ancestor of `parent`. On error neither node is modified.
    pub fn adopt(&mut self, parent: NodeId, child: NodeId) -> Result<(), GraphError> {
        if !self.contains(parent) {
            return Err(GraphError::Stale(parent));
        }
        let child_entry = self.entry(child).ok_or(GraphError::Stale(child))?;
        if parent == child {
            return Err(GraphError::SelfAdoption(child));
        }
        if let Some(owner) = child_entry.parent {
            return Err(GraphError::OwnershipConflict { child, owner });
        }
        if child_entry.rooted {
            return Err(GraphError::AlreadyRoot(child));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(GraphError::Cycle { parent, child });
        }

        if let Some(entry) = self.entry_mut(child) {
            entry.parent = Some(parent);
        }
        if let Some(entry) = self.entry_mut(parent) {
            entry.children.push(child);
        }
        Ok(())
    }

    /// Detach `child` from its owner and return the former owner.
    pub fn release(&mut self, child: NodeId) -> Result<NodeId, GraphError> {
        let entry = self.entry_mut(child).ok_or(GraphError::Stale(child))?;
        let owner = entry.parent.take().ok_or(GraphError::NotOwned(child))?;
        if let Some(owner_entry) = self.entry_mut(owner) {
            owner_entry.children.retain(|&c| c != child);
        }
        Ok(owner)
    }

    /// Remove a leaf from the arena and return its value.
    ///
    /// The node is detached from its owner (or the root list) first. The slot's
    /// generation is bumped so every outstanding handle goes stale.
    pub fn remove(&mut self, id: NodeId) -> Result<T, GraphError> {
        let entry = self.entry(id).ok_or(GraphError::Stale(id))?;
        if !entry.children.is_empty() {
            return Err(GraphError::HasChildren(id));
        }
        let parent = entry.parent;
        let rooted = entry.rooted;

        if let Some(owner) = parent
            && let Some(owner_entry) = self.entry_mut(owner)
        {
            owner_entry.children.retain(|&c| c != id);
        }
        if rooted {
            self.roots.retain(|&r| r != id);
        }

        let slot = &mut self.slots[id.index() as usize];
        let entry = slot.entry.take().ok_or(GraphError::Stale(id))?;
        slot.generation = slot.generation.wrapping_add(1).max(1);
        self.free.push(id.index());
        self.len -= 1;
        Ok(entry.value)
    }

    /// Borrow a node's value.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.entry(id).map(|entry| &entry.value)
    }

    /// Mutably borrow a node's value.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.entry_mut(id).map(|entry| &mut entry.value)
    }

    /// Owner of `id`, if any.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.entry(id).and_then(|entry| entry.parent)
    }

    /// Children of `id` in adoption order. Empty for stale handles.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.entry(id).map_or(&[], |entry| entry.children.as_slice())
    }

    /// Roots in the order they were registered.
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Iterate over the owners of `id`, nearest first. Does not yield `id`.
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_, T> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    /// Returns `true` if `ancestor` is `node` or one of its owners.
    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        if !self.contains(node) {
            return false;
        }
        ancestor == node || self.ancestors(node).any(|a| a == ancestor)
    }

    /// The subtree rooted at `id`, parents before children, siblings in order.
    #[must_use]
    pub fn pre_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// The subtree rooted at `id`, children before parents, siblings in order.
    #[must_use]
    pub fn post_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![(id, false)];
        while let Some((next, expanded)) = stack.pop() {
            if expanded {
                out.push(next);
                continue;
            }
            stack.push((next, true));
            stack.extend(self.children(next).iter().rev().map(|&c| (c, false)));
        }
        out
    }
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a node's owners, produced by [`Tree::ancestors`].
#[derive(Debug)]
pub struct Ancestors<'a, T> {
    tree: &'a Tree<T>,
    next: Option<NodeId>,
}

impl<T> Iterator for Ancestors<'_, T> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Tree<&'static str>, NodeId, NodeId, NodeId, NodeId) {
        let mut tree = Tree::new();
        let root = tree.insert("root");
        let a = tree.insert("a");
        let b = tree.insert("b");
        let a1 = tree.insert("a1");
        tree.set_root(root).unwrap();
        tree.adopt(root, a).unwrap();
        tree.adopt(root, b).unwrap();
        tree.adopt(a, a1).unwrap();
        (tree, root, a, b, a1)
    }

    #[test]
    fn test_insert_is_unattached_until_adopted() {
        let mut tree = Tree::new();
        let root = tree.insert(1);
        let child = tree.insert(2);
        assert!(tree.contains(child));
        assert!(!tree.is_attached(child));
        tree.set_root(root).unwrap();
        tree.adopt(root, child).unwrap();
        assert!(tree.is_attached(child));
        assert_eq!(tree.parent(child), Some(root));
    }

    #[test]
    fn test_traversal_orders() {
        let (tree, root, a, b, a1) = sample();
        assert_eq!(tree.pre_order(root), vec![root, a, a1, b]);
        assert_eq!(tree.post_order(root), vec![a1, a, b, root]);
        assert_eq!(tree.ancestors(a1).collect::<Vec<_>>(), vec![a, root]);
    }

    #[test]
    fn test_adopt_owned_node_is_rejected_without_mutation() {
        let (mut tree, root, a, b, a1) = sample();
        let err = tree.adopt(b, a1).unwrap_err();
        assert_eq!(err, GraphError::OwnershipConflict { child: a1, owner: a });
        assert_eq!(tree.children(a), &[a1]);
        assert!(tree.children(b).is_empty());
        assert_eq!(tree.children(root), &[a, b]);
    }

    #[test]
    fn test_adopt_rejects_cycles_and_roots() {
        let (mut tree, root, a, _b, a1) = sample();
        tree.release(a).unwrap();
        assert_eq!(
            tree.adopt(a1, a),
            Err(GraphError::Cycle { parent: a1, child: a })
        );
        assert_eq!(tree.adopt(a, a), Err(GraphError::SelfAdoption(a)));
        assert_eq!(tree.adopt(a, root), Err(GraphError::AlreadyRoot(root)));
    }

    #[test]
    fn test_release_then_readopt() {
        let (mut tree, root, a, b, a1) = sample();
        assert_eq!(tree.release(a1), Ok(a));
        assert!(!tree.is_attached(a1));
        assert_eq!(tree.release(a1), Err(GraphError::NotOwned(a1)));
        tree.adopt(b, a1).unwrap();
        assert_eq!(tree.pre_order(root), vec![root, a, b, a1]);
    }

    #[test]
    fn test_remove_bumps_generation() {
        let (mut tree, _root, a, _b, a1) = sample();
        assert_eq!(tree.remove(a), Err(GraphError::HasChildren(a)));
        assert_eq!(tree.remove(a1), Ok("a1"));
        assert!(!tree.contains(a1));
        assert!(tree.children(a).is_empty());

        let reused = tree.insert("reused");
        assert_eq!(reused.index(), a1.index());
        assert_ne!(reused.generation(), a1.generation());
        assert!(tree.get(a1).is_none());
        assert_eq!(tree.get(reused), Some(&"reused"));
    }

    #[test]
    fn test_remove_root_clears_root_list() {
        let mut tree = Tree::new();
        let root = tree.insert(());
        tree.set_root(root).unwrap();
        assert_eq!(tree.set_root(root), Err(GraphError::AlreadyRoot(root)));
        tree.remove(root).unwrap();
        assert!(tree.roots().is_empty());
        assert!(tree.is_empty());
    }
}
