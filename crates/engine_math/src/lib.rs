//! # engine_math
//!
//! Math types for the entity runtime. Re-exports [`glam`] for linear algebra
//! and defines [`Transform3D`], the local translation/rotation/scale that
//! spatial nodes carry and that world matrices are composed from.

pub mod transform;

// Re-export glam types for convenience.
pub use glam::{EulerRot, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

pub use transform::Transform3D;
