//! # grid-cut
//!
//! grid-cut partitions very large directed graphs across a fixed set of peer
//! processes using 2D cartesian vertex cuts. Each rank ends up with a compact
//! local CSR graph holding its master vertices plus the mirror copies needed
//! to represent every incident edge, together with the master/mirror tables
//! and communication predicates that later bulk-synchronous computation
//! consumes.
//!
//! ## Features
//! - Strict cartesian and checkerboard vertex cuts over an `R x C` virtual
//!   process grid, with optional row/column swap and block decomposition
//! - Two-pass streaming ingest of an on-disk CSR graph (inspection, then
//!   edge distribution) with rayon data-parallel loops inside each rank
//! - Pluggable byte fabrics (in-process, MPI) under a buffered tagged
//!   message service with phase-counter collectives
//! - Generic edge payloads: `()` for edgeless graphs, any `bytemuck::Pod`
//!   type otherwise, over a single algorithmic path
//! - Local-graph sidecar files to skip ingest on repeat runs
//!
//! ## Usage
//! Every rank builds the partition collectively:
//!
//! ```no_run
//! use grid_cut::prelude::*;
//!
//! # fn run(fabric: grid_cut::net::LocalFabric) -> Result<(), grid_cut::error::GridCutError> {
//! let net = BufferedNet::new(fabric);
//! let cfg = PartitionerConfig {
//!     filename: "web-graph.gr".into(),
//!     ..Default::default()
//! };
//! let cut = CartesianCut::<()>::build(&cfg, &net)?;
//! assert!(cut.is_local(cut.l2g(0)));
//! # Ok(())
//! # }
//! ```
//!
//! Enable the `mpi-support` feature for the MPI-backed fabric.

pub mod config;
pub mod error;
pub mod graph;
pub mod net;
pub mod partition;

/// A convenient prelude to import the most-used types:
pub mod prelude {
    pub use crate::config::PartitionerConfig;
    pub use crate::error::GridCutError;
    pub use crate::graph::{LocalCsr, OfflineGraph};
    #[cfg(feature = "mpi-support")]
    pub use crate::net::MpiFabric;
    pub use crate::net::{BufferedNet, Fabric, LocalFabric};
    pub use crate::partition::{
        BitVectorStatus, CartesianCut, GridGeometry, ReadLocation, SyncKind, WriteLocation,
    };
}
