//! Local-graph sidecar: save a constructed partition to disk and restore it
//! without re-ingesting the graph file.
//!
//! Same little-endian conventions as the exchange payloads. The gid->lid map
//! is not persisted; it is rebuilt from the dense lid->gid table on read, so
//! a round trip reproduces both tables exactly.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use bytemuck::Pod;
use hashbrown::HashMap;
use log::info;

use crate::config::PartitionerConfig;
use crate::error::GridCutError;
use crate::graph::LocalCsr;
use crate::net::wire::{PayloadReader, PayloadWriter};
use crate::partition::cartesian::CartesianCut;
use crate::partition::grid::GridGeometry;
use crate::partition::masters::GidRange;
use crate::partition::{Gid, Lid};

const SIDECAR_MAGIC: u32 = 0x4743_4C47; // "GCLG"
const SIDECAR_VERSION: u16 = 1;

impl<E: Pod> CartesianCut<E> {
    /// Persist this rank's local graph for a later `read_from_file` run.
    pub fn save_local_graph(&self, path: impl AsRef<Path>) -> Result<(), GridCutError> {
        let path = path.as_ref();
        let mut w = PayloadWriter::new();
        w.push_u32(SIDECAR_MAGIC);
        w.push_u16(SIDECAR_VERSION);
        w.push_u16(u16::from(self.transposed));
        w.push_u32(self.num_nodes);
        w.push_u32(self.grid.num_row_hosts() as u32);
        w.push_u32(self.grid.num_column_hosts() as u32);
        w.push_u64(self.num_global_nodes);
        w.push_u64(self.num_global_edges);
        w.push_u32(self.num_owned);
        w.push_u32(self.begin_master);
        w.push_u32(self.num_nodes_with_edges);
        w.push_u32(self.dummy_outgoing_nodes);

        w.push_u64(self.gid2host.len() as u64);
        for range in &self.gid2host {
            w.push_u64(range.begin);
            w.push_u64(range.end);
        }

        w.push_u64_slice(&self.local_to_global);
        let (prefix, dsts, data) = self.graph.raw_parts();
        w.push_u64_slice(prefix);
        w.push_u32_slice(dsts);
        w.push_pod_slice(data);

        for lists in [&self.mirror_nodes, &self.master_nodes] {
            w.push_u64(lists.len() as u64);
            for list in lists.iter() {
                w.push_u64_slice(list);
            }
        }

        let mut file = File::create(path).map_err(|e| GridCutError::io(path, e))?;
        file.write_all(&w.into_vec())
            .map_err(|e| GridCutError::io(path, e))
    }

    /// Restore a rank's local graph saved by
    /// [`save_local_graph`](Self::save_local_graph). The grid is re-derived
    /// from the configuration and must match the saved dimensions.
    pub(crate) fn read_local_graph_from_file(
        cfg: &PartitionerConfig,
        id: usize,
        num_hosts: usize,
    ) -> Result<Self, GridCutError> {
        let path = cfg.local_graph_file.as_path();
        let bad = |reason: String| GridCutError::Sidecar {
            path: path.to_path_buf(),
            reason,
        };

        let mut bytes = Vec::new();
        File::open(path)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .map_err(|e| GridCutError::io(path, e))?;
        let mut r = PayloadReader::new(&bytes);

        if r.u32()? != SIDECAR_MAGIC {
            return Err(bad("bad magic".into()));
        }
        let version = r.u16()?;
        if version != SIDECAR_VERSION {
            return Err(bad(format!("unsupported version {version}")));
        }
        let transposed = r.u16()? != 0;
        let num_nodes = r.u32()?;
        let num_row_hosts = r.u32()? as usize;
        let num_column_hosts = r.u32()? as usize;
        let num_global_nodes = r.u64()?;
        let num_global_edges = r.u64()?;
        let num_owned = r.u32()?;
        let begin_master: Lid = r.u32()?;
        let num_nodes_with_edges = r.u32()?;
        let dummy_outgoing_nodes = r.u32()?;

        let grid = GridGeometry::factorize(
            num_hosts,
            cfg.column_blocked,
            cfg.more_column_hosts,
            cfg.decompose_factor,
        )?;
        if grid.num_row_hosts() != num_row_hosts || grid.num_column_hosts() != num_column_hosts {
            return Err(bad(format!(
                "saved grid {num_row_hosts}x{num_column_hosts} does not match configured {}x{}",
                grid.num_row_hosts(),
                grid.num_column_hosts()
            )));
        }

        let num_blocks = r.u64()? as usize;
        if num_blocks != grid.num_virtual_hosts() {
            return Err(bad(format!(
                "saved {num_blocks} gid ranges for {} virtual hosts",
                grid.num_virtual_hosts()
            )));
        }
        let mut gid2host = Vec::with_capacity(num_blocks);
        for _ in 0..num_blocks {
            let begin = r.u64()?;
            let end = r.u64()?;
            gid2host.push(GidRange::new(begin, end));
        }

        let local_to_global = r.u64_vec()?;
        let prefix = r.u64_vec()?;
        let dsts = r.u32_vec()?;
        let data: Vec<E> = r.pod_vec()?;

        if local_to_global.len() != num_nodes as usize || prefix.len() != num_nodes as usize + 1 {
            return Err(bad("local id tables disagree with the node count".into()));
        }
        let num_edges = *prefix.last().unwrap_or(&0);
        if dsts.len() as u64 != num_edges {
            return Err(bad("edge array disagrees with the prefix sum".into()));
        }

        let mut global_to_local: HashMap<Gid, Lid> =
            HashMap::with_capacity(local_to_global.len());
        for (lid, &gid) in local_to_global.iter().enumerate() {
            if global_to_local.insert(gid, lid as Lid).is_some() {
                return Err(bad(format!("gid {gid} appears twice")));
            }
        }

        let read_lists = |r: &mut PayloadReader<'_>| -> Result<Vec<Vec<Gid>>, GridCutError> {
            let n = r.u64()? as usize;
            if n != num_hosts {
                return Err(bad(format!("{n} peer lists saved for {num_hosts} hosts")));
            }
            (0..n).map(|_| r.u64_vec()).collect()
        };
        let mirror_nodes = read_lists(&mut r)?;
        let master_nodes = read_lists(&mut r)?;
        if !r.is_empty() {
            return Err(bad("trailing bytes".into()));
        }

        info!("[{id}] restored local graph: {num_nodes} nodes, {num_edges} edges");

        Ok(CartesianCut {
            id,
            grid,
            num_global_nodes,
            num_global_edges,
            gid2host,
            num_owned,
            num_nodes,
            num_edges,
            begin_master,
            num_nodes_with_edges,
            dummy_outgoing_nodes,
            transposed,
            local_to_global,
            global_to_local,
            graph: LocalCsr::from_raw_parts(prefix, dsts, data),
            mirror_nodes,
            master_nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::masters::compute_masters;

    fn sample() -> CartesianCut<u32> {
        let grid = GridGeometry::factorize(4, false, false, 1).unwrap();
        let gid2host = compute_masters(8, 4, 4, &[]).unwrap();
        let local_to_global = vec![0u64, 1, 4, 5];
        let mut global_to_local = HashMap::new();
        for (lid, &gid) in local_to_global.iter().enumerate() {
            global_to_local.insert(gid, lid as Lid);
        }
        let mut graph = LocalCsr::<u32>::from_prefix_sums(vec![0, 2, 3, 3, 3]);
        {
            let ins = graph.installer();
            ins.install(0, 1, 7);
            ins.install(1, 2, 8);
            ins.install(2, 3, 9);
        }
        let mut mirror_nodes = vec![Vec::new(); 4];
        mirror_nodes[2] = vec![4, 5];
        let mut master_nodes = vec![Vec::new(); 4];
        master_nodes[2] = vec![0, 1];
        CartesianCut {
            id: 0,
            grid,
            num_global_nodes: 8,
            num_global_edges: 9,
            gid2host,
            num_owned: 2,
            num_nodes: 4,
            num_edges: 3,
            begin_master: 0,
            num_nodes_with_edges: 2,
            dummy_outgoing_nodes: 0,
            transposed: false,
            local_to_global,
            global_to_local,
            graph,
            mirror_nodes,
            master_nodes,
        }
    }

    #[test]
    fn round_trip_preserves_tables() {
        let path = std::env::temp_dir().join(format!("gridcut-sidecar-{}.lg", std::process::id()));
        let cut = sample();
        cut.save_local_graph(&path).unwrap();

        let cfg = PartitionerConfig {
            read_from_file: true,
            local_graph_file: path.clone(),
            ..Default::default()
        };
        let back = CartesianCut::<u32>::read_local_graph_from_file(&cfg, 0, 4).unwrap();

        assert_eq!(back.num_nodes, cut.num_nodes);
        assert_eq!(back.grid.num_row_hosts(), cut.grid.num_row_hosts());
        assert_eq!(back.grid.num_column_hosts(), cut.grid.num_column_hosts());
        assert_eq!(back.local_to_global, cut.local_to_global);
        assert_eq!(back.global_to_local, cut.global_to_local);
        assert_eq!(back.num_edges, 3);
        assert_eq!(back.graph.edges(0), cut.graph.edges(0));
        assert_eq!(back.graph.edge_data(0), cut.graph.edge_data(0));
        assert_eq!(back.mirror_nodes, cut.mirror_nodes);
        assert_eq!(back.master_nodes, cut.master_nodes);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn corrupt_sidecar_is_rejected() {
        let path = std::env::temp_dir().join(format!(
            "gridcut-sidecar-bad-{}.lg",
            std::process::id()
        ));
        std::fs::write(&path, b"not a sidecar").unwrap();
        let cfg = PartitionerConfig {
            read_from_file: true,
            local_graph_file: path.clone(),
            ..Default::default()
        };
        assert!(CartesianCut::<u32>::read_local_graph_from_file(&cfg, 0, 4).is_err());
        std::fs::remove_file(&path).ok();
    }
}
