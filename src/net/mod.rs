//! Point-to-point messaging: raw byte fabrics, the buffered tagged message
//! service layered on top, and the little-endian payload codecs.

pub mod buffered;
pub mod phase;
pub mod transport;
pub mod wire;

#[cfg(feature = "mpi-support")]
pub mod mpi;

pub use buffered::BufferedNet;
pub use phase::PhaseCounter;
pub use transport::{Fabric, LocalFabric};
pub use wire::{PayloadReader, PayloadWriter};

#[cfg(feature = "mpi-support")]
pub use mpi::MpiFabric;
