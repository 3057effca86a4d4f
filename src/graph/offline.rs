//! Random-access reader over the on-disk graph.
//!
//! File layout (all integers little-endian):
//!
//! ```text
//! u64 version (= 1)
//! u64 edge_data_size        bytes per edge payload, 0 when edgeless
//! u64 num_nodes
//! u64 num_edges
//! u64 out_index[num_nodes]  cumulative out-edge end offsets
//! u32 dst[num_edges]        destination global ids
//! (4 bytes padding when num_edges is odd)
//! u8  edge_data[num_edges * edge_data_size]
//! ```
//!
//! The offline reader serves only the header and per-node edge cursors via
//! seeks; it is used to size the partition and compute per-host edge ranges,
//! then abandoned in favour of the buffered loader.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::GridCutError;

pub const GRAPH_FILE_VERSION: u64 = 1;
pub(crate) const GRAPH_HEADER_BYTES: u64 = 32;

/// Parsed graph file header.
#[derive(Copy, Clone, Debug)]
pub(crate) struct GraphHeader {
    pub version: u64,
    pub edge_data_size: u64,
    pub num_nodes: u64,
    pub num_edges: u64,
}

impl GraphHeader {
    pub(crate) fn read(file: &mut File, path: &Path) -> Result<Self, GridCutError> {
        let mut raw = [0u8; GRAPH_HEADER_BYTES as usize];
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_exact(&mut raw))
            .map_err(|e| GridCutError::io(path, e))?;
        let word = |i: usize| u64::from_le_bytes(raw[i * 8..i * 8 + 8].try_into().unwrap());
        let header = Self {
            version: word(0),
            edge_data_size: word(1),
            num_nodes: word(2),
            num_edges: word(3),
        };
        if header.version != GRAPH_FILE_VERSION {
            return Err(GridCutError::BadGraphFile {
                path: path.to_path_buf(),
                reason: format!("unsupported version {}", header.version),
            });
        }
        Ok(header)
    }

    /// Byte offset of the destination array.
    pub(crate) fn dst_offset(&self) -> u64 {
        GRAPH_HEADER_BYTES + self.num_nodes * 8
    }

    /// Byte offset of the edge payload array (8-byte aligned).
    pub(crate) fn data_offset(&self) -> u64 {
        let end = self.dst_offset() + self.num_edges * 4;
        (end + 7) & !7
    }
}

/// Random-access view of a graph file: header fields plus per-node edge
/// cursors, served by seeking. Cheap to open, no bulk loading.
pub struct OfflineGraph {
    path: PathBuf,
    file: Mutex<File>,
    header: GraphHeader,
}

impl OfflineGraph {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GridCutError> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| GridCutError::io(path, e))?;
        let header = GraphHeader::read(&mut file, path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            header,
        })
    }

    /// Total global vertex count.
    pub fn size(&self) -> u64 {
        self.header.num_nodes
    }

    /// Total global edge count.
    pub fn size_edges(&self) -> u64 {
        self.header.num_edges
    }

    pub fn edge_data_size(&self) -> u64 {
        self.header.edge_data_size
    }

    /// Absolute index of `node`'s first out-edge. `node == num_nodes` is
    /// allowed and yields the total edge count, so half-open node ranges map
    /// directly to half-open edge ranges.
    pub fn edge_begin(&self, node: u64) -> Result<u64, GridCutError> {
        if node == 0 {
            return Ok(0);
        }
        self.edge_end(node - 1)
    }

    /// Absolute index one past `node`'s last out-edge.
    pub fn edge_end(&self, node: u64) -> Result<u64, GridCutError> {
        if node >= self.header.num_nodes {
            return Err(GridCutError::GidOutOfRange {
                gid: node,
                total: self.header.num_nodes,
            });
        }
        let mut raw = [0u8; 8];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(GRAPH_HEADER_BYTES + node * 8))
            .and_then(|_| file.read_exact(&mut raw))
            .map_err(|e| GridCutError::io(&self.path, e))?;
        Ok(u64::from_le_bytes(raw))
    }
}
