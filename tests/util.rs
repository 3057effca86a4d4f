#![allow(dead_code)]
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::Pod;
use grid_cut::config::PartitionerConfig;
use grid_cut::net::{BufferedNet, LocalFabric};
use grid_cut::partition::{CartesianCut, ReadLocation, SyncKind, WriteLocation};

static FILE_SERIAL: AtomicU64 = AtomicU64::new(0);

/// Unique scratch path for one test's graph or sidecar file.
pub fn temp_path(label: &str, ext: &str) -> PathBuf {
    let n = FILE_SERIAL.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "gridcut-{label}-{}-{n}.{ext}",
        std::process::id()
    ))
}

/// Adjacency lists over `n` nodes from an edge list, unit payloads.
pub fn adjacency(n: usize, edges: &[(u32, u32)]) -> Vec<Vec<(u32, ())>> {
    let mut adj = vec![Vec::new(); n];
    for &(src, dst) in edges {
        adj[src as usize].push((dst, ()));
    }
    adj
}

pub fn write_temp_graph<E: Pod>(label: &str, adj: &[Vec<(u32, E)>]) -> PathBuf {
    let path = temp_path(label, "gr");
    grid_cut::graph::write_graph_file(&path, adj).expect("write graph file");
    path
}

/// Run the partitioner collectively on `num_hosts` in-process ranks, one
/// thread per rank, with a per-rank configuration.
pub fn run_partition_with<E, C>(num_hosts: usize, make_cfg: C) -> Vec<CartesianCut<E>>
where
    E: Pod + Send + Sync + 'static,
    C: Fn(usize) -> PartitionerConfig,
{
    let handles: Vec<_> = LocalFabric::cluster(num_hosts)
        .into_iter()
        .enumerate()
        .map(|(rank, fabric)| {
            let cfg = make_cfg(rank);
            std::thread::spawn(move || {
                let net = BufferedNet::new(fabric);
                CartesianCut::<E>::build(&cfg, &net).expect("partitioning failed")
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("rank panicked"))
        .collect()
}

pub fn run_partition<E>(num_hosts: usize, cfg: &PartitionerConfig) -> Vec<CartesianCut<E>>
where
    E: Pod + Send + Sync + 'static,
{
    run_partition_with(num_hosts, |_| cfg.clone())
}

/// The global edge multiset materialized across all ranks, as sorted
/// `(src gid, dst gid)` pairs.
pub fn collect_global_edges<E: Pod>(cuts: &[CartesianCut<E>]) -> Vec<(u64, u64)> {
    let mut out = Vec::new();
    for cut in cuts {
        for lid in 0..cut.num_nodes() {
            let src = cut.l2g(lid);
            for &ldst in cut.graph().edges(lid) {
                out.push((src, cut.l2g(ldst)));
            }
        }
    }
    out.sort_unstable();
    out
}

pub fn sorted_edges(edges: &[(u32, u32)]) -> Vec<(u64, u64)> {
    let mut out: Vec<(u64, u64)> = edges
        .iter()
        .map(|&(s, d)| (u64::from(s), u64::from(d)))
        .collect();
    out.sort_unstable();
    out
}

/// Universal partitioner invariants: local id round trips, contiguous
/// masters, ascending mirror lists, unique mastership, edge conservation,
/// and pairwise send/recv symmetry.
pub fn check_invariants<E: Pod>(
    cuts: &[CartesianCut<E>],
    num_global_nodes: u64,
    num_global_edges: u64,
) {
    for cut in cuts {
        assert_eq!(cut.num_global_nodes(), num_global_nodes);
        assert_eq!(cut.num_global_edges(), num_global_edges);

        for lid in 0..cut.num_nodes() {
            let gid = cut.l2g(lid);
            assert!(cut.is_local(gid));
            assert_eq!(cut.g2l(gid).unwrap(), lid);
        }

        let prefix = cut.graph().prefix_sums();
        assert_eq!(prefix.len(), cut.num_nodes() as usize + 1);
        assert_eq!(prefix[cut.num_nodes() as usize], cut.num_edges());

        let (master_begin, master_end) = cut.master_range();
        assert_eq!(master_end - master_begin, cut.num_owned());
        for lid in master_begin..master_end {
            assert!(cut.is_owned(cut.l2g(lid)));
        }
        for (begin, end) in cut.mirror_ranges() {
            for lid in begin..end {
                assert!(!cut.is_owned(cut.l2g(lid)));
            }
        }

        for list in cut.mirror_nodes() {
            assert!(
                list.windows(2).all(|w| w[0] < w[1]),
                "mirror list not strictly ascending"
            );
        }

        // every non-owned local is mirrored from exactly one peer
        let mut mirrored: Vec<u64> = cut.mirror_nodes().iter().flatten().copied().collect();
        mirrored.sort_unstable();
        let mut non_owned: Vec<u64> = (0..cut.num_nodes())
            .map(|lid| cut.l2g(lid))
            .filter(|&gid| !cut.is_owned(gid))
            .collect();
        non_owned.sort_unstable();
        assert_eq!(mirrored, non_owned);
    }

    let total_edges: u64 = cuts.iter().map(|c| c.num_edges()).sum();
    assert_eq!(total_edges, num_global_edges, "edges lost or duplicated");

    for gid in 0..num_global_nodes {
        let owners = cuts.iter().filter(|c| c.is_owned(gid)).count();
        assert_eq!(owners, 1, "gid {gid} mastered {owners} times");
    }

    check_symmetry(cuts);
}

/// `X.nothing_to_send(Y, t)` must equal `Y.nothing_to_recv(X, t)` for every
/// rank pair and sync tuple.
pub fn check_symmetry<E: Pod>(cuts: &[CartesianCut<E>]) {
    let kinds = [SyncKind::Reduce, SyncKind::Broadcast];
    let writes = [
        WriteLocation::Source,
        WriteLocation::Destination,
        WriteLocation::Any,
    ];
    let reads = [
        ReadLocation::Source,
        ReadLocation::Destination,
        ReadLocation::Any,
    ];
    for x in cuts {
        for y in cuts {
            if x.id() == y.id() {
                continue;
            }
            for &sync in &kinds {
                for &wl in &writes {
                    for &rl in &reads {
                        let send = x.nothing_to_send(y.id(), sync, wl, rl, None);
                        let recv = y.nothing_to_recv(x.id(), sync, wl, rl, None);
                        assert_eq!(
                            send,
                            recv,
                            "send/recv asymmetry between {} and {} for {sync:?}/{wl:?}/{rl:?}",
                            x.id(),
                            y.id()
                        );
                    }
                }
            }
        }
    }
}
