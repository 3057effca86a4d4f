//! Graph file serializer for the format described in
//! [`offline`](crate::graph::offline).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use bytemuck::Pod;

use crate::error::GridCutError;
use crate::graph::offline::GRAPH_FILE_VERSION;

/// Write `edges` (one out-edge list per node, destinations paired with their
/// payloads) as an on-disk graph. `E = ()` writes an edgeless file.
pub fn write_graph_file<E: Pod>(
    path: impl AsRef<Path>,
    edges: &[Vec<(u32, E)>],
) -> Result<(), GridCutError> {
    let path = path.as_ref();
    let num_nodes = edges.len() as u64;
    let num_edges: u64 = edges.iter().map(|e| e.len() as u64).sum();
    let edge_data_size = std::mem::size_of::<E>() as u64;

    let file = File::create(path).map_err(|e| GridCutError::io(path, e))?;
    let mut w = BufWriter::new(file);
    let io = |e| GridCutError::io(path, e);

    for word in [GRAPH_FILE_VERSION, edge_data_size, num_nodes, num_edges] {
        w.write_all(&word.to_le_bytes()).map_err(io)?;
    }
    let mut end = 0u64;
    for list in edges {
        end += list.len() as u64;
        w.write_all(&end.to_le_bytes()).map_err(io)?;
    }
    for list in edges {
        for &(dst, _) in list {
            w.write_all(&dst.to_le_bytes()).map_err(io)?;
        }
    }
    if num_edges % 2 == 1 {
        w.write_all(&[0u8; 4]).map_err(io)?;
    }
    if edge_data_size > 0 {
        for list in edges {
            for (_, payload) in list {
                w.write_all(bytemuck::bytes_of(payload)).map_err(io)?;
            }
        }
    }
    w.flush().map_err(io)
}
