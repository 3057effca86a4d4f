//! Partitioner configuration.

use std::path::PathBuf;

/// Configuration for building a [`CartesianCut`](crate::partition::CartesianCut).
///
/// `column_blocked` switches from the strict cartesian cut (column blocks
/// assigned round-robin) to the checkerboard cut (contiguous column stripes).
/// `more_column_hosts` swaps the row/column factorization. `decompose_factor`
/// splits every host's master range into that many virtual blocks.
#[derive(Debug, Clone)]
pub struct PartitionerConfig {
    /// Path of the on-disk graph to partition.
    pub filename: PathBuf,
    /// Per-host node weights; empty means an even split. When non-empty it
    /// must have one entry per real host.
    pub scale_factor: Vec<u32>,
    /// Transpose the local graph in place after construction.
    pub transpose: bool,
    /// Skip ingest and load a previously saved local graph instead.
    pub read_from_file: bool,
    /// Sidecar path used when `read_from_file` is set.
    pub local_graph_file: PathBuf,
    /// Checkerboard partitioning (contiguous column blocks).
    pub column_blocked: bool,
    /// Swap the number of rows and columns of the grid.
    pub more_column_hosts: bool,
    /// How many virtual blocks each host's range decomposes into.
    pub decompose_factor: u32,
    /// Worker threads for the per-instance pool; `None` lets rayon choose.
    pub num_threads: Option<usize>,
}

impl Default for PartitionerConfig {
    fn default() -> Self {
        Self {
            filename: PathBuf::from("graph.gr"),
            scale_factor: Vec::new(),
            transpose: false,
            read_from_file: false,
            local_graph_file: PathBuf::from("local_graph"),
            column_blocked: false,
            more_column_hosts: false,
            decompose_factor: 1,
            num_threads: None,
        }
    }
}
