//! The cartesian (and checkerboard) vertex-cut partitioner.
//!
//! All ranks run [`CartesianCut::build`] collectively. Construction walks a
//! fixed sequence, each step a full barrier against the previous one:
//! inspection over the assigned file region, the row exchange of inspection
//! summaries, local-id assembly, CSR allocation, the edge-distribution pass,
//! an optional in-place transpose, mirror-set construction, and the mirror
//! exchange that seeds the communication predicates.
//!
//! Edge placement rule: an edge `(src, dst)` is materialized on the host at
//! the grid intersection of `src`'s virtual row and `dst`'s column. Masters
//! therefore come first in the local id space, then mirrors created for
//! outgoing edges, then mirrors created for incoming edges.

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use bytemuck::Pod;
use hashbrown::HashMap;
use log::{info, warn};
use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::PartitionerConfig;
use crate::error::GridCutError;
use crate::graph::{BufferedGraph, EdgeInstaller, LocalCsr, OfflineGraph};
use crate::net::transport::Fabric;
use crate::net::wire::{PayloadReader, PayloadWriter};
use crate::net::BufferedNet;
use crate::partition::bitset::AtomicBitSet;
use crate::partition::grid::GridGeometry;
use crate::partition::locator::GidLocator;
use crate::partition::masters::{compute_masters, GidRange};
use crate::partition::sync::{BitVectorStatus, ReadLocation, SyncKind, WriteLocation};
use crate::partition::{Gid, Lid, EDGE_PARTITION_SEND_BUF_SIZE};

/// One rank's share of a cartesian-cut partitioned graph.
pub struct CartesianCut<E: Pod = ()> {
    pub(crate) id: usize,
    pub(crate) grid: GridGeometry,
    pub(crate) num_global_nodes: u64,
    pub(crate) num_global_edges: u64,
    pub(crate) gid2host: Vec<GidRange>,
    pub(crate) num_owned: u32,
    pub(crate) num_nodes: u32,
    pub(crate) num_edges: u64,
    pub(crate) begin_master: Lid,
    pub(crate) num_nodes_with_edges: u32,
    pub(crate) dummy_outgoing_nodes: u32,
    pub(crate) transposed: bool,
    pub(crate) local_to_global: Vec<Gid>,
    pub(crate) global_to_local: HashMap<Gid, Lid>,
    pub(crate) graph: LocalCsr<E>,
    pub(crate) mirror_nodes: Vec<Vec<Gid>>,
    pub(crate) master_nodes: Vec<Vec<Gid>>,
}

/// Per-column inspection summaries, indexed `[d][column][src offset]`.
struct Inspection {
    num_outgoing: Vec<Vec<Vec<u64>>>,
    has_incoming: Vec<AtomicBitSet>,
}

/// Everything local-id assembly produces.
struct LocalIdTables {
    local_to_global: Vec<Gid>,
    global_to_local: HashMap<Gid, Lid>,
    /// Edge prefix sum, length `num_nodes + 1`.
    prefix: Vec<u64>,
    num_nodes: u32,
    num_edges: u64,
    num_owned: u32,
    dummy_outgoing_nodes: u32,
    /// Local node count after the outgoing-mirror band; the edge
    /// distribution pass terminates against this.
    nodes_with_edges: u32,
}

impl<E: Pod + Send + Sync> CartesianCut<E> {
    /// Collectively ingest and partition the configured graph. Every rank of
    /// the fabric must call this with an identical configuration.
    pub fn build<F: Fabric>(
        cfg: &PartitionerConfig,
        net: &BufferedNet<F>,
    ) -> Result<Self, GridCutError> {
        let id = net.rank();
        let num_hosts = net.size();
        let construct_timer = Instant::now();

        if cfg.read_from_file {
            info!(
                "[{id}] reading local graph from file: {}",
                cfg.local_graph_file.display()
            );
            return Self::read_local_graph_from_file(cfg, id, num_hosts);
        }

        // only used to size the partition; abandoned once the buffered
        // loaders hold the assigned regions
        let offline = OfflineGraph::open(&cfg.filename)?;
        let num_global_nodes = offline.size();
        let num_global_edges = offline.size_edges();

        let grid = GridGeometry::factorize(
            num_hosts,
            cfg.column_blocked,
            cfg.more_column_hosts,
            cfg.decompose_factor,
        )?;
        if id == 0 {
            info!(
                "cartesian grid: {} x {}",
                grid.num_row_hosts(),
                grid.num_column_hosts()
            );
            info!("decomposition factor: {}", grid.decompose_factor());
        }

        let gid2host = compute_masters(
            num_global_nodes,
            num_hosts,
            grid.num_virtual_hosts(),
            &cfg.scale_factor,
        )?;
        let d_factor = grid.decompose_factor() as usize;

        let mut buf_graphs = Vec::with_capacity(d_factor);
        for d in 0..d_factor {
            let range = gid2host[id + d * num_hosts];
            let edge_begin = offline.edge_begin(range.begin)?;
            let edge_end = offline.edge_begin(range.end)?;
            buf_graphs.push(BufferedGraph::<E>::load_partial(
                &cfg.filename,
                range.begin,
                range.end,
                edge_begin,
                edge_end,
                num_global_nodes,
                num_global_edges,
            )?);
        }
        drop(offline);

        let mut pool_builder = ThreadPoolBuilder::new();
        if let Some(n) = cfg.num_threads {
            pool_builder = pool_builder.num_threads(n);
        }
        let pool = pool_builder
            .build()
            .map_err(|e| GridCutError::ThreadPool(e.to_string()))?;

        let locator = GidLocator::new(&grid, &gid2host, num_global_nodes);

        // first pass over the file
        let inspection_timer = Instant::now();
        let mut inspection = inspect_edges(id, &grid, locator, &gid2host, &buf_graphs, &pool)?;
        log_pass(id, "edge inspection", inspection_timer, &buf_graphs);

        exchange_inspection(net, id, &grid, &mut inspection)?;
        let (folded, rest) = inspection
            .has_incoming
            .split_first()
            .expect("at least one grid column");
        for other in rest {
            folded.union_with(other)?;
        }

        let tables = assemble_local_ids(
            id,
            &grid,
            locator,
            &gid2host,
            &inspection,
            cfg.column_blocked,
        )?;

        let mut graph = LocalCsr::<E>::from_prefix_sums(tables.prefix.clone());
        let begin_master = if tables.num_owned != 0 {
            tables.global_to_local[&tables.local_to_global[0]]
        } else {
            0
        };
        info!(
            "[{id}] owned: {} total local nodes: {} local edges: {}",
            tables.num_owned, tables.num_nodes, tables.num_edges
        );

        // second pass over the file
        if id == 0 {
            if size_of::<E>() == 0 {
                info!("loading edgeless graph while creating edges");
            } else {
                info!("loading edge payloads while creating edges");
            }
        }
        let loading_timer = Instant::now();
        for buf in &buf_graphs {
            buf.reset_read_counters();
        }
        distribute_edges(
            net, id, &grid, locator, &gid2host, &buf_graphs, &pool, &tables, &mut graph,
        )?;
        log_pass(id, "edge loading", loading_timer, &buf_graphs);

        let mut num_nodes_with_edges = tables.nodes_with_edges;
        if cfg.column_blocked {
            // unconstrained layout: nothing tells us which locals lack edges
            num_nodes_with_edges = tables.num_nodes;
        }

        for buf in &mut buf_graphs {
            buf.reset_and_free();
        }

        let mut transposed = false;
        if cfg.transpose {
            num_nodes_with_edges = tables.num_nodes;
            graph.transpose();
            transposed = true;
        }

        let mirror_nodes = fill_mirror_nodes(
            id,
            num_hosts,
            &grid,
            &gid2host,
            &tables.global_to_local,
            cfg.column_blocked,
            d_factor,
        );
        let master_nodes = exchange_mirror_sets(net, id, num_hosts, &mirror_nodes)?;

        info!(
            "[{id}] graph partitioning took {:.3}s",
            construct_timer.elapsed().as_secs_f64()
        );

        Ok(Self {
            id,
            grid,
            num_global_nodes,
            num_global_edges,
            gid2host,
            num_owned: tables.num_owned,
            num_nodes: tables.num_nodes,
            num_edges: tables.num_edges,
            begin_master,
            num_nodes_with_edges,
            dummy_outgoing_nodes: tables.dummy_outgoing_nodes,
            transposed,
            local_to_global: tables.local_to_global,
            global_to_local: tables.global_to_local,
            graph,
            mirror_nodes,
            master_nodes,
        })
    }
}

impl<E: Pod> CartesianCut<E> {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn grid(&self) -> &GridGeometry {
        &self.grid
    }

    pub fn graph(&self) -> &LocalCsr<E> {
        &self.graph
    }

    pub fn num_global_nodes(&self) -> u64 {
        self.num_global_nodes
    }

    pub fn num_global_edges(&self) -> u64 {
        self.num_global_edges
    }

    pub fn num_owned(&self) -> u32 {
        self.num_owned
    }

    pub fn num_nodes(&self) -> u32 {
        self.num_nodes
    }

    pub fn num_edges(&self) -> u64 {
        self.num_edges
    }

    pub fn num_nodes_with_edges(&self) -> u32 {
        self.num_nodes_with_edges
    }

    pub fn dummy_outgoing_nodes(&self) -> u32 {
        self.dummy_outgoing_nodes
    }

    pub fn begin_master(&self) -> Lid {
        self.begin_master
    }

    pub fn is_transposed(&self) -> bool {
        self.transposed
    }

    pub fn is_vertex_cut(&self) -> bool {
        self.grid.is_vertex_cut()
    }

    /// Per-peer lists of gids this rank mirrors, ascending in gid.
    pub fn mirror_nodes(&self) -> &[Vec<Gid>] {
        &self.mirror_nodes
    }

    /// Per-peer lists of gids this rank masters that the peer mirrors.
    pub fn master_nodes(&self) -> &[Vec<Gid>] {
        &self.master_nodes
    }

    fn locator(&self) -> GidLocator<'_> {
        GidLocator::new(&self.grid, &self.gid2host, self.num_global_nodes)
    }

    /// Virtual host owning `gid`.
    pub fn host_of(&self, gid: Gid) -> Result<usize, GridCutError> {
        self.locator().host_of(gid)
    }

    /// Real rank mastering `gid`.
    pub fn owner_of(&self, gid: Gid) -> Result<usize, GridCutError> {
        self.locator().owner_of(gid)
    }

    pub fn is_owned(&self, gid: Gid) -> bool {
        (0..self.grid.decompose_factor() as usize)
            .any(|d| self.gid2host[self.id + d * self.grid.num_hosts()].contains(gid))
    }

    pub fn is_local(&self, gid: Gid) -> bool {
        self.is_owned(gid) || self.global_to_local.contains_key(&gid)
    }

    pub fn g2l(&self, gid: Gid) -> Result<Lid, GridCutError> {
        self.global_to_local
            .get(&gid)
            .copied()
            .ok_or(GridCutError::NotLocal(gid))
    }

    pub fn l2g(&self, lid: Lid) -> Gid {
        self.local_to_global[lid as usize]
    }

    /// Masters occupy this half-open local id range.
    pub fn master_range(&self) -> (Lid, Lid) {
        (self.begin_master, self.begin_master + self.num_owned)
    }

    /// Half-open local id ranges holding mirrors.
    pub fn mirror_ranges(&self) -> Vec<(Lid, Lid)> {
        let mut ranges = Vec::new();
        if self.begin_master > 0 {
            ranges.push((0, self.begin_master));
        }
        let end_master = self.begin_master + self.num_owned;
        if end_master < self.num_nodes {
            ranges.push((end_master, self.num_nodes));
        }
        ranges
    }

    /// Reset the sync bitvector over masters (broadcast) or mirrors
    /// (reduce). `reset_range` receives inclusive bounds.
    pub fn reset_bitset(&self, sync: SyncKind, reset_range: &mut dyn FnMut(Lid, Lid)) {
        if self.num_owned == 0 {
            return;
        }
        let end_master = self.begin_master + self.num_owned;
        match sync {
            SyncKind::Broadcast => reset_range(self.begin_master, end_master - 1),
            SyncKind::Reduce => {
                if self.begin_master > 0 {
                    reset_range(0, self.begin_master - 1);
                }
                if end_master < self.num_nodes {
                    reset_range(end_master, self.num_nodes - 1);
                }
            }
        }
    }

    fn is_not_communication_partner(
        &self,
        host: usize,
        sync: SyncKind,
        write_location: WriteLocation,
        read_location: ReadLocation,
        flag: &mut Option<&mut BitVectorStatus>,
    ) -> bool {
        let same_row = self.grid.grid_row(self.id) == self.grid.grid_row(host);
        let same_col = self.grid.grid_col(self.id) == self.grid.grid_col(host);
        if self.transposed {
            match sync {
                SyncKind::Reduce => match write_location {
                    WriteLocation::Source => !same_col,
                    WriteLocation::Destination => !same_row,
                    WriteLocation::Any => {
                        debug_assert!(same_row || same_col);
                        !same_row && !same_col
                    }
                },
                SyncKind::Broadcast => match read_location {
                    ReadLocation::Source => {
                        if let Some(f) = flag.as_mut() {
                            f.make_src_invalid();
                        }
                        !same_col
                    }
                    ReadLocation::Destination => {
                        if let Some(f) = flag.as_mut() {
                            f.make_dst_invalid();
                        }
                        !same_row
                    }
                    ReadLocation::Any => {
                        debug_assert!(same_row || same_col);
                        !same_row && !same_col
                    }
                },
            }
        } else {
            match sync {
                SyncKind::Reduce => match write_location {
                    WriteLocation::Source => !same_row,
                    WriteLocation::Destination => !same_col,
                    WriteLocation::Any => {
                        debug_assert!(same_row || same_col);
                        !same_row && !same_col
                    }
                },
                SyncKind::Broadcast => match read_location {
                    ReadLocation::Source => {
                        if let Some(f) = flag.as_mut() {
                            f.make_dst_invalid();
                        }
                        !same_row
                    }
                    ReadLocation::Destination => {
                        if let Some(f) = flag.as_mut() {
                            f.make_src_invalid();
                        }
                        !same_col
                    }
                    ReadLocation::Any => {
                        debug_assert!(same_row || same_col);
                        !same_row && !same_col
                    }
                },
            }
        }
    }

    /// Requirement: for all ranks X and Y and any sync tuple,
    /// `X.nothing_to_send(Y, ..)` iff `Y.nothing_to_recv(X, ..)`.
    pub fn nothing_to_send(
        &self,
        host: usize,
        sync: SyncKind,
        write_location: WriteLocation,
        read_location: ReadLocation,
        mut flag: Option<&mut BitVectorStatus>,
    ) -> bool {
        let shared = match sync {
            SyncKind::Reduce => &self.mirror_nodes[host],
            SyncKind::Broadcast => &self.master_nodes[host],
        };
        if shared.is_empty() {
            return true;
        }
        if self.grid.column_blocked() {
            // checkerboard layouts do not match the processor grid
            return false;
        }
        self.is_not_communication_partner(host, sync, write_location, read_location, &mut flag)
    }

    pub fn nothing_to_recv(
        &self,
        host: usize,
        sync: SyncKind,
        write_location: WriteLocation,
        read_location: ReadLocation,
        mut flag: Option<&mut BitVectorStatus>,
    ) -> bool {
        let shared = match sync {
            SyncKind::Reduce => &self.master_nodes[host],
            SyncKind::Broadcast => &self.mirror_nodes[host],
        };
        if shared.is_empty() {
            return true;
        }
        if self.grid.column_blocked() {
            return false;
        }
        self.is_not_communication_partner(host, sync, write_location, read_location, &mut flag)
    }
}

fn log_pass<E: Pod + Send + Sync>(
    id: usize,
    what: &str,
    timer: Instant,
    buf_graphs: &[BufferedGraph<E>],
) {
    let secs = timer.elapsed().as_secs_f64();
    let bytes: u64 = buf_graphs.iter().map(|b| b.bytes_read()).sum();
    info!(
        "[{id}] {what} took {secs:.3}s to read {bytes} bytes ({:.1} MB/s)",
        bytes as f64 / 1e6 / secs.max(1e-9)
    );
}

/// First pass: count outgoing edges per column peer and mark incoming-edge
/// witnesses. Workers race only on disjoint per-source counters and on the
/// atomic bitmaps.
fn inspect_edges<E: Pod + Send + Sync>(
    id: usize,
    grid: &GridGeometry,
    locator: GidLocator<'_>,
    gid2host: &[GidRange],
    buf_graphs: &[BufferedGraph<E>],
    pool: &ThreadPool,
) -> Result<Inspection, GridCutError> {
    let num_hosts = grid.num_hosts();
    let num_columns = grid.num_column_hosts();

    let has_incoming: Vec<AtomicBitSet> = (0..num_columns)
        .map(|col| AtomicBitSet::new(locator.column_span(col)))
        .collect();

    let mut num_outgoing = Vec::with_capacity(buf_graphs.len());
    for (d, buf) in buf_graphs.iter().enumerate() {
        let range = gid2host[id + d * num_hosts];
        let counters: Vec<Vec<AtomicU64>> = (0..num_columns)
            .map(|_| (0..range.len()).map(|_| AtomicU64::new(0)).collect())
            .collect();

        pool.install(|| {
            range
                .iter()
                .into_par_iter()
                .try_for_each(|src| -> Result<(), GridCutError> {
                    let begin = buf.edge_begin(src);
                    let end = buf.edge_end(src);
                    for eid in begin..end {
                        let dst = buf.edge_destination(eid);
                        let col = locator.column_host_of(dst)?;
                        has_incoming[col].set(locator.column_index_of(dst)?);
                        counters[col][(src - range.begin) as usize]
                            .fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(())
                })
        })?;

        num_outgoing.push(
            counters
                .into_iter()
                .map(|col| col.into_iter().map(AtomicU64::into_inner).collect())
                .collect(),
        );
    }

    Ok(Inspection {
        num_outgoing,
        has_incoming,
    })
}

/// Row exchange: within this rank's grid row, swap inspection summaries with
/// every column peer, then demultiplex received bundles by sender column.
fn exchange_inspection<F: Fabric>(
    net: &BufferedNet<F>,
    id: usize,
    grid: &GridGeometry,
    inspection: &mut Inspection,
) -> Result<(), GridCutError> {
    let num_columns = grid.num_column_hosts();
    let tag = net.phase();
    let row_start = grid.grid_row(id) * num_columns;

    for i in 0..num_columns {
        let peer = row_start + i;
        if peer == id {
            continue;
        }
        let mut w = PayloadWriter::new();
        for per_column in &inspection.num_outgoing {
            w.push_u64_slice(&per_column[i]);
        }
        inspection.has_incoming[i].encode(&mut w);
        net.send_tagged(peer, tag, w.into_vec());
    }
    net.flush();

    let mut seen = vec![false; num_columns];
    for _ in 1..num_columns {
        let (sender, payload) = loop {
            if let Some(msg) = net.try_recv_tagged(tag) {
                break msg;
            }
            std::thread::yield_now();
        };
        if grid.grid_row(sender) != grid.grid_row(id) {
            return Err(GridCutError::Protocol(format!(
                "row-exchange bundle from rank {sender}, outside row {}",
                grid.grid_row(id)
            )));
        }
        let slot = sender % num_columns;
        if std::mem::replace(&mut seen[slot], true) {
            return Err(GridCutError::Protocol(format!(
                "duplicate row-exchange bundle from rank {sender}"
            )));
        }
        let mut r = PayloadReader::new(&payload);
        for per_column in &mut inspection.num_outgoing {
            per_column[slot] = r.u64_vec()?;
        }
        inspection.has_incoming[slot] = AtomicBitSet::decode(&mut r)?;
        if !r.is_empty() {
            return Err(GridCutError::Protocol(
                "trailing bytes in row-exchange bundle".into(),
            ));
        }
    }
    net.advance_phase();
    Ok(())
}

/// Allocate local ids in three bands: owned masters, outgoing-edge mirrors,
/// incoming-edge mirrors. Masters are contiguous and come first.
fn assemble_local_ids(
    id: usize,
    grid: &GridGeometry,
    locator: GidLocator<'_>,
    gid2host: &[GidRange],
    inspection: &Inspection,
    column_blocked: bool,
) -> Result<LocalIdTables, GridCutError> {
    let num_hosts = grid.num_hosts();
    let num_columns = grid.num_column_hosts();
    let d_factor = inspection.num_outgoing.len();
    let my_col = grid.grid_col(id);
    let witnessed = &inspection.has_incoming[0];

    let mut max_nodes = witnessed.len();
    for per_column in &inspection.num_outgoing {
        for counts in per_column {
            max_nodes += counts.len() as u64;
        }
    }
    let mut local_to_global: Vec<Gid> = Vec::with_capacity(max_nodes as usize);
    let mut global_to_local: HashMap<Gid, Lid> = HashMap::with_capacity(max_nodes as usize);
    let mut prefix: Vec<u64> = Vec::with_capacity(max_nodes as usize + 1);
    prefix.push(0);

    let mut num_nodes: u64 = 0;
    let mut num_edges: u64 = 0;
    let mut num_owned: u64 = 0;
    let mut dummy_outgoing_nodes: u32 = 0;

    let push_local = |local_to_global: &mut Vec<Gid>,
                          global_to_local: &mut HashMap<Gid, Lid>,
                          prefix: &mut Vec<u64>,
                          num_nodes: &mut u64,
                          gid: Gid,
                          num_edges: u64|
     -> Result<(), GridCutError> {
        if *num_nodes > Lid::MAX as u64 {
            return Err(GridCutError::LocalIdOverflow(*num_nodes));
        }
        local_to_global.push(gid);
        let previous = global_to_local.insert(gid, *num_nodes as Lid);
        debug_assert!(previous.is_none(), "gid {gid} assigned twice");
        *num_nodes += 1;
        prefix.push(num_edges);
        Ok(())
    };

    // band 1: owned masters
    for d in 0..d_factor {
        let range = gid2host[id + d * num_hosts];
        let counts = &inspection.num_outgoing[d][my_col];
        if counts.len() as u64 != range.len() {
            return Err(GridCutError::Protocol(format!(
                "inspection counts for block {} cover {} sources, range has {}",
                id + d * num_hosts,
                counts.len(),
                range.len()
            )));
        }
        num_owned += range.len();
        for (j, src) in range.iter().enumerate() {
            num_edges += counts[j];
            push_local(
                &mut local_to_global,
                &mut global_to_local,
                &mut prefix,
                &mut num_nodes,
                src,
                num_edges,
            )?;
        }
    }

    // band 2: outgoing-edge mirrors from this rank's virtual rows
    for d in 0..d_factor {
        let leader = grid.grid_row(id + d * num_hosts) * num_columns;
        for i in 0..num_columns {
            let vblock = leader + i;
            if grid.virtual_to_real(vblock) == id {
                continue;
            }
            let range = gid2host[vblock];
            let counts = &inspection.num_outgoing[d][i];
            if counts.len() as u64 != range.len() {
                return Err(GridCutError::Protocol(format!(
                    "row-exchange counts for block {vblock} cover {} sources, range has {}",
                    counts.len(),
                    range.len()
                )));
            }
            let block_col = grid.column_of_block(vblock);
            for (j, src) in range.iter().enumerate() {
                let mut create = false;
                if counts[j] > 0 {
                    create = true;
                    num_edges += counts[j];
                } else if block_col == my_col && witnessed.test(locator.column_index_of(src)?) {
                    if column_blocked {
                        dummy_outgoing_nodes += 1;
                        create = true;
                    } else {
                        warn!("[{id}] partitioning of vertices resulted in an inconsistency");
                        return Err(GridCutError::PartitionInconsistency(src));
                    }
                }
                if create {
                    push_local(
                        &mut local_to_global,
                        &mut global_to_local,
                        &mut prefix,
                        &mut num_nodes,
                        src,
                        num_edges,
                    )?;
                }
            }
        }
    }
    let nodes_with_edges = num_nodes;

    // band 3: incoming-edge mirrors from this rank's column
    for i in 0..grid.num_row_hosts() {
        let vblock = if column_blocked {
            my_col * grid.num_row_hosts() + i
        } else {
            i * num_columns + my_col
        };
        if grid.virtual_to_real(vblock) == id {
            continue;
        }
        if column_blocked && in_own_virtual_row(grid, id, num_hosts, d_factor, vblock) {
            // already covered by the outgoing band
            continue;
        }
        for dst in gid2host[vblock].iter() {
            if witnessed.test(locator.column_index_of(dst)?) {
                push_local(
                    &mut local_to_global,
                    &mut global_to_local,
                    &mut prefix,
                    &mut num_nodes,
                    dst,
                    num_edges,
                )?;
            }
        }
    }

    Ok(LocalIdTables {
        local_to_global,
        global_to_local,
        prefix,
        num_nodes: num_nodes as u32,
        num_edges,
        num_owned: num_owned
            .try_into()
            .map_err(|_| GridCutError::LocalIdOverflow(num_owned))?,
        dummy_outgoing_nodes,
        nodes_with_edges: nodes_with_edges as u32,
    })
}

fn in_own_virtual_row(
    grid: &GridGeometry,
    id: usize,
    num_hosts: usize,
    d_factor: usize,
    vblock: usize,
) -> bool {
    (0..d_factor).any(|d| {
        let leader = grid.grid_row(id + d * num_hosts) * grid.num_column_hosts();
        vblock >= leader && vblock < leader + grid.num_column_hosts()
    })
}

/// Second pass: install locally owned edges straight into the CSR, ship the
/// rest to the column peer that materializes them, and receive until every
/// remote source accounted for in assembly has arrived.
///
/// Outbound records accumulate in one lock-guarded buffer per destination
/// column; a record is appended under that column's lock, so it is never
/// split across transmissions.
#[allow(clippy::too_many_arguments)]
fn distribute_edges<E: Pod + Send + Sync, F: Fabric>(
    net: &BufferedNet<F>,
    id: usize,
    grid: &GridGeometry,
    locator: GidLocator<'_>,
    gid2host: &[GidRange],
    buf_graphs: &[BufferedGraph<E>],
    pool: &ThreadPool,
    tables: &LocalIdTables,
    graph: &mut LocalCsr<E>,
) -> Result<(), GridCutError> {
    let num_hosts = grid.num_hosts();
    let num_columns = grid.num_column_hosts();
    let tag = net.phase();
    let prefix = &tables.prefix;
    let installer = graph.installer();
    let installed_sources = AtomicU32::new(tables.num_owned + tables.dummy_outgoing_nodes);
    let target = tables.nodes_with_edges;

    for (d, buf) in buf_graphs.iter().enumerate() {
        // the receiving host sits at the intersection of this block's
        // virtual row and the destination's column
        let row_start = grid.grid_row(id + d * num_hosts) * num_columns;
        let range = gid2host[id + d * num_hosts];
        let column_buffers: Vec<Mutex<PayloadWriter>> = (0..num_columns)
            .map(|_| Mutex::new(PayloadWriter::new()))
            .collect();

        pool.install(|| {
            range
                .iter()
                .into_par_iter()
                .try_for_each(|src| -> Result<(), GridCutError> {
                    let lsrc = tables.global_to_local.get(&src).copied();
                    let mut cur = lsrc.map(|l| prefix[l as usize]).unwrap_or(0);

                    let mut gdst_vec: Vec<Vec<Gid>> = vec![Vec::new(); num_columns];
                    let mut gdata_vec: Vec<Vec<E>> = vec![Vec::new(); num_columns];

                    let begin = buf.edge_begin(src);
                    let end = buf.edge_end(src);
                    for eid in begin..end {
                        let gdst = buf.edge_destination(eid);
                        let i = locator.column_host_of(gdst)?;
                        if grid.virtual_to_real(row_start + i) == id {
                            let ldst = tables
                                .global_to_local
                                .get(&gdst)
                                .copied()
                                .ok_or(GridCutError::NotLocal(gdst))?;
                            lsrc.ok_or(GridCutError::NotLocal(src))?;
                            installer.install(cur, ldst, buf.edge_data(eid));
                            cur += 1;
                        } else {
                            gdst_vec[i].push(gdst);
                            if size_of::<E>() > 0 {
                                gdata_vec[i].push(buf.edge_data(eid));
                            }
                        }
                    }
                    for i in 0..num_columns {
                        if gdst_vec[i].is_empty() {
                            continue;
                        }
                        let mut w = column_buffers[i].lock();
                        w.push_u64(src);
                        w.push_u64_slice(&gdst_vec[i]);
                        if size_of::<E>() > 0 {
                            w.push_pod_slice(&gdata_vec[i]);
                        }
                        if w.len() > EDGE_PARTITION_SEND_BUF_SIZE {
                            let payload = w.take();
                            drop(w);
                            net.send_tagged(grid.virtual_to_real(row_start + i), tag, payload);
                        }
                    }
                    if let Some(l) = lsrc {
                        debug_assert_eq!(cur, prefix[l as usize + 1]);
                    }

                    // opportunistically drain one inbound buffer to bound
                    // receive-side memory
                    if let Some((_, payload)) = net.try_recv_tagged(tag) {
                        process_edge_records::<E>(&payload, tables, &installer, &installed_sources)?;
                    }
                    Ok(())
                })
        })?;

        // final drain of the per-column accumulators
        for (i, cell) in column_buffers.iter().enumerate() {
            let mut w = cell.lock();
            if !w.is_empty() {
                net.send_tagged(grid.virtual_to_real(row_start + i), tag, w.take());
            }
        }
    }
    net.flush();

    // receive edges for all remote sources
    let first_error: Mutex<Option<GridCutError>> = Mutex::new(None);
    pool.broadcast(|_| {
        while installed_sources.load(Ordering::Relaxed) < target {
            if first_error.lock().is_some() {
                break;
            }
            match net.try_recv_tagged(tag) {
                Some((_, payload)) => {
                    if let Err(e) =
                        process_edge_records::<E>(&payload, tables, &installer, &installed_sources)
                    {
                        *first_error.lock() = Some(e);
                        break;
                    }
                }
                None => std::thread::yield_now(),
            }
        }
    });
    if let Some(e) = first_error.into_inner() {
        return Err(e);
    }
    net.advance_phase();
    Ok(())
}

/// Install the `(src, dst-list [, data-list])` records of one inbound
/// buffer. Each record carries every edge of one remote source, in the order
/// the sender read them from disk.
fn process_edge_records<E: Pod>(
    payload: &[u8],
    tables: &LocalIdTables,
    installer: &EdgeInstaller<'_, E>,
    installed_sources: &AtomicU32,
) -> Result<(), GridCutError> {
    let mut r = PayloadReader::new(payload);
    while !r.is_empty() {
        let src = r.u64()?;
        let gdsts = r.u64_vec()?;
        let gdata: Vec<E> = if size_of::<E>() > 0 {
            r.pod_vec()?
        } else {
            Vec::new()
        };
        if size_of::<E>() > 0 && gdata.len() != gdsts.len() {
            return Err(GridCutError::Protocol(format!(
                "edge record for source {src} has {} payloads for {} edges",
                gdata.len(),
                gdsts.len()
            )));
        }
        let lsrc = tables
            .global_to_local
            .get(&src)
            .copied()
            .ok_or(GridCutError::NotLocal(src))?;
        let cur = tables.prefix[lsrc as usize];
        let cur_end = tables.prefix[lsrc as usize + 1];
        if cur_end - cur != gdsts.len() as u64 {
            return Err(GridCutError::Protocol(format!(
                "source {src} expected {} edges, record carries {}",
                cur_end - cur,
                gdsts.len()
            )));
        }
        for (k, &gdst) in gdsts.iter().enumerate() {
            let ldst = tables
                .global_to_local
                .get(&gdst)
                .copied()
                .ok_or(GridCutError::NotLocal(gdst))?;
            let data = if size_of::<E>() > 0 {
                gdata[k]
            } else {
                E::zeroed()
            };
            installer.install(cur + k as u64, ldst, data);
        }
        installed_sources.fetch_add(1, Ordering::Relaxed);
    }
    Ok(())
}

/// Enumerate, per peer, the gids this rank mirrors: sources of this rank's
/// virtual rows (outgoing mirrors) and destinations of this rank's column
/// (incoming mirrors). Iteration order keeps every list ascending in gid.
fn fill_mirror_nodes(
    id: usize,
    num_hosts: usize,
    grid: &GridGeometry,
    gid2host: &[GidRange],
    global_to_local: &HashMap<Gid, Lid>,
    column_blocked: bool,
    d_factor: usize,
) -> Vec<Vec<Gid>> {
    let num_columns = grid.num_column_hosts();
    let mut mirror_nodes: Vec<Vec<Gid>> = vec![Vec::new(); num_hosts];

    // mirrors for outgoing edges
    for d in 0..d_factor {
        let leader = grid.grid_row(id + d * num_hosts) * num_columns;
        for i in 0..num_columns {
            let vblock = leader + i;
            let peer = grid.virtual_to_real(vblock);
            if peer == id {
                continue;
            }
            let range = gid2host[vblock];
            mirror_nodes[peer].reserve(range.len() as usize);
            for src in range.iter() {
                if global_to_local.contains_key(&src) {
                    mirror_nodes[peer].push(src);
                }
            }
        }
    }

    // mirrors for incoming edges
    for i in 0..grid.num_row_hosts() {
        let vblock = if column_blocked {
            grid.grid_col(id) * grid.num_row_hosts() + i
        } else {
            i * num_columns + grid.grid_col(id)
        };
        let peer = grid.virtual_to_real(vblock);
        if peer == id {
            continue;
        }
        if column_blocked && in_own_virtual_row(grid, id, num_hosts, d_factor, vblock) {
            continue;
        }
        let range = gid2host[vblock];
        mirror_nodes[peer].reserve(range.len() as usize);
        for dst in range.iter() {
            if global_to_local.contains_key(&dst) {
                mirror_nodes[peer].push(dst);
            }
        }
    }

    mirror_nodes
}

/// Communication setup: every rank ships each peer the mirror list it holds
/// for that peer; the transposed view arrives back as `master_nodes`.
fn exchange_mirror_sets<F: Fabric>(
    net: &BufferedNet<F>,
    id: usize,
    num_hosts: usize,
    mirror_nodes: &[Vec<Gid>],
) -> Result<Vec<Vec<Gid>>, GridCutError> {
    let tag = net.phase();
    for h in 0..num_hosts {
        if h == id {
            continue;
        }
        let mut w = PayloadWriter::new();
        w.push_u64_slice(&mirror_nodes[h]);
        net.send_tagged(h, tag, w.into_vec());
    }
    net.flush();

    let mut master_nodes: Vec<Vec<Gid>> = vec![Vec::new(); num_hosts];
    let mut seen = vec![false; num_hosts];
    for _ in 1..num_hosts {
        let (sender, payload) = loop {
            if let Some(msg) = net.try_recv_tagged(tag) {
                break msg;
            }
            std::thread::yield_now();
        };
        if std::mem::replace(&mut seen[sender], true) {
            return Err(GridCutError::Protocol(format!(
                "duplicate mirror list from rank {sender}"
            )));
        }
        let mut r = PayloadReader::new(&payload);
        master_nodes[sender] = r.u64_vec()?;
        if !r.is_empty() {
            return Err(GridCutError::Protocol(
                "trailing bytes in mirror list".into(),
            ));
        }
    }
    net.advance_phase();
    Ok(master_nodes)
}
