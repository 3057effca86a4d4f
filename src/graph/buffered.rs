//! Buffered partial loader: pre-faults one host's assigned region of the
//! graph file into memory and serves per-edge lookups out of it.
//!
//! The partitioner streams its assigned source ranges twice (inspection and
//! distribution); both passes go through this loader. Byte counters feed the
//! throughput log lines and are reset between passes.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::Pod;

use crate::error::GridCutError;
use crate::graph::offline::GraphHeader;

/// In-memory copy of the node range `[node_begin, node_end)` and edge range
/// `[edge_offset, edge_offset + dsts.len())` of a graph file.
pub struct BufferedGraph<E> {
    node_begin: u64,
    node_end: u64,
    edge_offset: u64,
    out_index: Vec<u64>,
    dsts: Vec<u32>,
    data: Vec<E>,
    bytes_read: AtomicU64,
}

impl<E: Pod + Send + Sync> BufferedGraph<E> {
    /// Load the closed region for one host. `edge_begin`/`edge_end` must be
    /// the absolute edge indices corresponding to the node range, as obtained
    /// from [`OfflineGraph`](crate::graph::OfflineGraph).
    #[allow(clippy::too_many_arguments)]
    pub fn load_partial(
        path: impl AsRef<Path>,
        node_begin: u64,
        node_end: u64,
        edge_begin: u64,
        edge_end: u64,
        num_global_nodes: u64,
        num_global_edges: u64,
    ) -> Result<Self, GridCutError> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| GridCutError::io(path, e))?;
        let header = GraphHeader::read(&mut file, path)?;
        if header.num_nodes != num_global_nodes || header.num_edges != num_global_edges {
            return Err(GridCutError::BadGraphFile {
                path: path.to_path_buf(),
                reason: format!(
                    "expected {num_global_nodes} nodes / {num_global_edges} edges, file has {} / {}",
                    header.num_nodes, header.num_edges
                ),
            });
        }
        let payload = std::mem::size_of::<E>() as u64;
        if payload != 0 && payload != header.edge_data_size {
            return Err(GridCutError::BadGraphFile {
                path: path.to_path_buf(),
                reason: format!(
                    "edge payload is {} bytes, file carries {}",
                    payload, header.edge_data_size
                ),
            });
        }

        let num_local_nodes = (node_end - node_begin) as usize;
        let num_local_edges = (edge_end - edge_begin) as usize;
        let io = |e| GridCutError::io(path, e);

        let mut out_index = vec![0u64; num_local_nodes];
        file.seek(SeekFrom::Start(
            super::offline::GRAPH_HEADER_BYTES + node_begin * 8,
        ))
        .map_err(io)?;
        read_pod_slice(&mut file, &mut out_index).map_err(io)?;
        for v in &mut out_index {
            *v = u64::from_le(*v);
        }

        let mut dsts = vec![0u32; num_local_edges];
        file.seek(SeekFrom::Start(header.dst_offset() + edge_begin * 4))
            .map_err(io)?;
        read_pod_slice(&mut file, &mut dsts).map_err(io)?;
        for v in &mut dsts {
            *v = u32::from_le(*v);
        }

        let mut data = vec![E::zeroed(); num_local_edges];
        if payload > 0 {
            file.seek(SeekFrom::Start(header.data_offset() + edge_begin * payload))
                .map_err(io)?;
            read_pod_slice(&mut file, &mut data).map_err(io)?;
        }

        Ok(Self {
            node_begin,
            node_end,
            edge_offset: edge_begin,
            out_index,
            dsts,
            data,
            bytes_read: AtomicU64::new(0),
        })
    }

    /// Absolute index of `gid`'s first out-edge.
    #[inline]
    pub fn edge_begin(&self, gid: u64) -> u64 {
        debug_assert!(gid >= self.node_begin && gid < self.node_end);
        self.bytes_read.fetch_add(8, Ordering::Relaxed);
        if gid == self.node_begin {
            self.edge_offset
        } else {
            self.out_index[(gid - 1 - self.node_begin) as usize]
        }
    }

    /// Absolute index one past `gid`'s last out-edge.
    #[inline]
    pub fn edge_end(&self, gid: u64) -> u64 {
        debug_assert!(gid >= self.node_begin && gid < self.node_end);
        self.out_index[(gid - self.node_begin) as usize]
    }

    /// Destination global id of absolute edge `eid`.
    #[inline]
    pub fn edge_destination(&self, eid: u64) -> u64 {
        self.bytes_read.fetch_add(4, Ordering::Relaxed);
        u64::from(self.dsts[(eid - self.edge_offset) as usize])
    }

    /// Payload of absolute edge `eid`.
    #[inline]
    pub fn edge_data(&self, eid: u64) -> E {
        if std::mem::size_of::<E>() == 0 {
            return E::zeroed();
        }
        self.bytes_read
            .fetch_add(std::mem::size_of::<E>() as u64, Ordering::Relaxed);
        self.data[(eid - self.edge_offset) as usize]
    }

    pub fn reset_read_counters(&self) {
        self.bytes_read.store(0, Ordering::Relaxed);
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Release the loaded region.
    pub fn reset_and_free(&mut self) {
        self.out_index = Vec::new();
        self.dsts = Vec::new();
        self.data = Vec::new();
    }
}

fn read_pod_slice<T: Pod>(file: &mut File, out: &mut [T]) -> std::io::Result<()> {
    if out.is_empty() {
        return Ok(());
    }
    file.read_exact(bytemuck::cast_slice_mut(out))
}
