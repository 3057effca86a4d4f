//! GridCutError: unified error type for grid-cut public APIs.
//!
//! Every fallible operation in the crate reports through this enum. The
//! partitioner treats all of these as fatal: a failed collective or a
//! malformed input aborts construction, nothing is surfaced as a recoverable
//! condition (partial partitioning progress cannot be resumed).

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for grid-cut operations.
#[derive(Debug, Error)]
pub enum GridCutError {
    /// `decompose_factor` must be at least 1.
    #[error("decompose factor must be at least 1")]
    InvalidDecomposeFactor,
    /// The host count / configuration cannot be reconciled into a grid.
    #[error("invalid grid configuration: {0}")]
    InvalidGrid(String),
    /// A per-host scale factor was given with the wrong number of entries.
    #[error("scale factor has {got} entries, expected {want}")]
    ScaleFactorLength { got: usize, want: usize },
    /// I/O failure opening or reading a graph or sidecar file.
    #[error("I/O error on {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The graph file header or layout is not what the reader expects.
    #[error("malformed graph file {}: {}", .path.display(), .reason)]
    BadGraphFile { path: PathBuf, reason: String },
    /// A global vertex id fell outside `[0, num_global_nodes)`.
    #[error("global id {gid} outside [0, {total})")]
    GidOutOfRange { gid: u64, total: u64 },
    /// A global id was expected to be materialized on this rank but is not.
    #[error("global id {0} is not local to this rank")]
    NotLocal(u64),
    /// A vertex was witnessed as an edge destination but is unaccounted for
    /// in strict cartesian mode; indicates a broken master assignment.
    #[error("vertex {0} witnessed as a destination but unaccounted for")]
    PartitionInconsistency(u64),
    /// Unexpected sender, truncated payload, or leftover traffic in a
    /// collective exchange.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// Uncorrectable transport failure; no retries are attempted.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The local-graph sidecar file is malformed or inconsistent.
    #[error("local graph sidecar {}: {}", .path.display(), .reason)]
    Sidecar { path: PathBuf, reason: String },
    /// The local vertex count does not fit the 32-bit local id space.
    #[error("local id space overflow: {0} vertices")]
    LocalIdOverflow(u64),
    /// The per-instance rayon pool could not be constructed.
    #[error("thread pool construction failed: {0}")]
    ThreadPool(String),
}

impl GridCutError {
    /// Attach a path to an `std::io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GridCutError::Io {
            path: path.into(),
            source,
        }
    }
}
