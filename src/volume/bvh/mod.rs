//! Bounding volume hierarchy shared by the unstructured and particle families

pub mod node;
pub mod builder;
pub mod overlap;
pub mod iterator;

pub use builder::{BinnedBuilder, BuildCallbacks, NodeSummary};
pub use iterator::BvhIntervalIterator;
pub use node::{Bvh, BvhNode, NodeKind};
pub use overlap::propagate_overlap;
