//! The cartesian vertex-cut partitioner and its supporting pieces.

pub mod bitset;
pub mod cartesian;
pub mod grid;
pub mod locator;
pub mod masters;
pub mod sidecar;
pub mod sync;

pub use bitset::AtomicBitSet;
pub use cartesian::CartesianCut;
pub use grid::GridGeometry;
pub use locator::GidLocator;
pub use masters::{compute_masters, GidRange};
pub use sync::{BitVectorStatus, ReadLocation, SyncKind, WriteLocation};

/// Global vertex id.
pub type Gid = u64;
/// Dense local vertex id.
pub type Lid = u32;

/// Outbound edge buffers are handed to the net once they exceed this size.
pub const EDGE_PARTITION_SEND_BUF_SIZE: usize = 8 << 20;
