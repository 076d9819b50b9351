//! # engine_graph
//!
//! The ownership graph underneath the entity runtime. Every live object is a
//! slot in a [`Tree`] arena and is addressed by a generational [`NodeId`].
//!
//! This crate provides:
//!
//! - [`NodeId`]: index plus generation; a stale id never resolves.
//! - [`Tree`]: strict-tree storage with adoption, release and traversal.
//! - [`GraphError`]: the ways a structural edit can be rejected.
//!
//! The tree knows nothing about lifecycles. It only guarantees that each node
//! has at most one owner, that no edit creates a cycle, and that a failed edit
//! leaves the graph untouched.

pub mod error;
pub mod handle;
pub mod tree;

pub use error::GraphError;
pub use handle::NodeId;
pub use tree::{Ancestors, Tree};
