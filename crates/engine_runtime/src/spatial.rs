//! Cached world transforms.
//!
//! Spatial nodes carry a local [`Transform3D`] and a cached world matrix.
//! Writes push a dirty flag down through spatial descendants and notify
//! registered dependents right away; reads pull, recomputing only the dirty
//! part of the ancestor chain. A spatial node whose parent is not spatial
//! resolves against the identity.

use engine_graph::NodeId;
use engine_math::{Mat4, Quat, Transform3D, Vec3};

use crate::error::RuntimeError;
use crate::runtime::Runtime;

#[derive(Debug, Clone)]
pub(crate) struct TransformCache {
    pub(crate) local: Transform3D,
    pub(crate) world: Mat4,
    pub(crate) dirty: bool,
    pub(crate) dependents: Vec<NodeId>,
}

impl TransformCache {
    pub(crate) fn new(local: Transform3D) -> Self {
        Self {
            local,
            world: Mat4::IDENTITY,
            dirty: true,
            dependents: Vec::new(),
        }
    }
}

impl Runtime {
    fn cache(&self, node: NodeId) -> Result<&TransformCache, RuntimeError> {
        let entry = self.tree.get(node).ok_or(RuntimeError::Stale(node))?;
        entry.transform.as_ref().ok_or(RuntimeError::NotSpatial(node))
    }

    fn cache_mut(&mut self, node: NodeId) -> Result<&mut TransformCache, RuntimeError> {
        let entry = self.tree.get_mut(node).ok_or(RuntimeError::Stale(node))?;
        entry.transform.as_mut().ok_or(RuntimeError::NotSpatial(node))
    }

    /// Whether the node carries a transform.
    #[must_use]
    pub fn is_spatial(&self, node: impl Into<NodeId>) -> bool {
        self.cache(node.into()).is_ok()
    }

    /// Give a node a transform if it does not have one yet.
    pub fn enable_transform(
        &mut self,
        node: impl Into<NodeId>,
        local: Transform3D,
    ) -> Result<(), RuntimeError> {
        let node = node.into();
        let entry = self.tree.get_mut(node).ok_or(RuntimeError::Stale(node))?;
        if entry.transform.is_none() {
            entry.transform = Some(TransformCache::new(local));
            self.invalidate_world(node, true);
        }
        Ok(())
    }

    /// The node's local transform.
    pub fn local_transform(&self, node: impl Into<NodeId>) -> Result<Transform3D, RuntimeError> {
        self.cache(node.into()).map(|cache| cache.local)
    }

    /// Replace the local transform.
    pub fn set_local_transform(
        &mut self,
        node: impl Into<NodeId>,
        local: Transform3D,
    ) -> Result<(), RuntimeError> {
        self.write_local(node.into(), |t| *t = local)
    }

    /// Replace the local position.
    pub fn set_position(&mut self, node: impl Into<NodeId>, position: Vec3) -> Result<(), RuntimeError> {
        self.write_local(node.into(), |t| t.position = position)
    }

    /// Replace the local rotation. The quaternion is normalised.
    pub fn set_rotation(&mut self, node: impl Into<NodeId>, rotation: Quat) -> Result<(), RuntimeError> {
        self.write_local(node.into(), |t| t.rotation = rotation.normalize())
    }

    /// Replace the local scale.
    pub fn set_scale(&mut self, node: impl Into<NodeId>, scale: Vec3) -> Result<(), RuntimeError> {
        self.write_local(node.into(), |t| t.scale = scale)
    }

    fn write_local(
        &mut self,
        node: NodeId,
        write: impl FnOnce(&mut Transform3D),
    ) -> Result<(), RuntimeError> {
        write(&mut self.cache_mut(node)?.local);
        self.invalidate_world(node, true);
        Ok(())
    }

    /// Mark `node` and its spatial descendants dirty.
    ///
    /// The written node is always marked; a descendant that is already dirty
    /// is skipped together with its subtree, since its descendants are dirty
    /// too. With `notify`, dependents of every newly dirtied node are told
    /// through [`Runtime::invalidate_transform`].
    pub(crate) fn invalidate_world(&mut self, node: NodeId, notify: bool) {
        let mut stack = vec![node];
        let mut dependents = Vec::new();
        while let Some(id) = stack.pop() {
            let Some(cache) = self
                .tree
                .get_mut(id)
                .and_then(|entry| entry.transform.as_mut())
            else {
                continue;
            };
            if cache.dirty && id != node {
                continue;
            }
            cache.dirty = true;
            if notify {
                dependents.extend(cache.dependents.iter().copied());
            }
            stack.extend(self.tree.children(id).iter().copied());
        }
        for dependent in dependents {
            self.invalidate_transform(dependent);
        }
    }

    /// World matrix of a spatial node, recomputed if dirty.
    pub fn world_matrix(&mut self, node: impl Into<NodeId>) -> Result<Mat4, RuntimeError> {
        let node = node.into();
        let cache = self.cache(node)?;
        if !cache.dirty {
            return Ok(cache.world);
        }

        let mut chain = vec![node];
        let mut base = Mat4::IDENTITY;
        let mut current = node;
        while let Some(parent) = self.tree.parent(current) {
            let Ok(parent_cache) = self.cache(parent) else {
                break;
            };
            if !parent_cache.dirty {
                base = parent_cache.world;
                break;
            }
            chain.push(parent);
            current = parent;
        }

        for id in chain.into_iter().rev() {
            let cache = self.cache_mut(id)?;
            base = cache.local.world_matrix(base);
            cache.world = base;
            cache.dirty = false;
        }
        Ok(base)
    }

    /// World transform of a spatial node, decomposed from its world matrix.
    pub fn world_transform(&mut self, node: impl Into<NodeId>) -> Result<Transform3D, RuntimeError> {
        self.world_matrix(node).map(Transform3D::from_matrix)
    }

    /// Whether the cached world matrix is stale.
    pub fn is_world_dirty(&self, node: impl Into<NodeId>) -> Result<bool, RuntimeError> {
        self.cache(node.into()).map(|cache| cache.dirty)
    }

    /// Have `dependent` notified whenever `source`'s world changes.
    pub fn add_transform_dependent(
        &mut self,
        source: impl Into<NodeId>,
        dependent: impl Into<NodeId>,
    ) -> Result<(), RuntimeError> {
        let dependent = dependent.into();
        let cache = self.cache_mut(source.into())?;
        if !cache.dependents.contains(&dependent) {
            cache.dependents.push(dependent);
        }
        Ok(())
    }

    /// Stop notifying `dependent`.
    pub fn remove_transform_dependent(
        &mut self,
        source: impl Into<NodeId>,
        dependent: impl Into<NodeId>,
    ) -> Result<(), RuntimeError> {
        let dependent = dependent.into();
        self.cache_mut(source.into())?
            .dependents
            .retain(|&d| d != dependent);
        Ok(())
    }

    /// The invalidation channel of `owner`.
    ///
    /// Counts the invalidation, marks the owner's own world dirty if it is
    /// spatial, and runs its Invalidate hooks unless one of its hooks is
    /// already running. Returns `false` without doing anything if the owner
    /// is not valid.
    pub fn invalidate_transform(&mut self, owner: impl Into<NodeId>) -> bool {
        let owner = owner.into();
        if !self.is_valid(owner) {
            return false;
        }
        let Some(entry) = self.tree.get_mut(owner) else {
            return false;
        };
        entry.invalidations += 1;
        let busy = entry.value.is_none();
        let has_hooks = !entry.table.invalidate.is_empty();

        self.invalidate_world(owner, false);
        if has_hooks && !busy {
            self.run_invalidate(owner);
        }
        true
    }

    /// How many times `owner`'s invalidation channel has fired.
    #[must_use]
    pub fn invalidation_count(&self, owner: impl Into<NodeId>) -> Option<u64> {
        self.tree.get(owner.into()).map(|entry| entry.invalidations)
    }
}

/// A transform backed by its own storage whose writes are reported to a
/// separate owner node, such as a physics body driving a visual.
///
/// The owner reference is non-owning: once the owner is gone, writes still
/// update the backing store but notify nobody.
#[derive(Debug, Clone, Copy)]
pub struct ClaimedTransform {
    local: Transform3D,
    owner: NodeId,
}

impl ClaimedTransform {
    /// Claim a transform on behalf of `owner`.
    #[must_use]
    pub fn new(owner: impl Into<NodeId>, local: Transform3D) -> Self {
        Self {
            local,
            owner: owner.into(),
        }
    }

    /// The node notified on writes.
    #[must_use]
    pub fn owner(&self) -> NodeId {
        self.owner
    }

    /// The backing transform.
    #[must_use]
    pub fn local(&self) -> Transform3D {
        self.local
    }

    /// Replace the whole transform. Returns whether the owner was notified.
    pub fn set(&mut self, runtime: &mut Runtime, local: Transform3D) -> bool {
        self.local = local;
        runtime.invalidate_transform(self.owner)
    }

    /// Replace the position. Returns whether the owner was notified.
    pub fn set_position(&mut self, runtime: &mut Runtime, position: Vec3) -> bool {
        self.local.position = position;
        runtime.invalidate_transform(self.owner)
    }

    /// Replace the rotation. Returns whether the owner was notified.
    pub fn set_rotation(&mut self, runtime: &mut Runtime, rotation: Quat) -> bool {
        self.local.rotation = rotation.normalize();
        runtime.invalidate_transform(self.owner)
    }

    /// Replace the scale. Returns whether the owner was notified.
    pub fn set_scale(&mut self, runtime: &mut Runtime, scale: Vec3) -> bool {
        self.local.scale = scale;
        runtime.invalidate_transform(self.owner)
    }
}
