//! End-to-end partitioning on a 2x2 grid, plus the degenerate boundary
//! layouts.

mod util;

use grid_cut::config::PartitionerConfig;
use grid_cut::partition::CartesianCut;

/// The canonical 8-vertex example: masters split two per rank, every edge
/// stays at the intersection of its source row and destination column.
const EDGES: [(u32, u32); 9] = [
    (0, 1),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
    (4, 0),
    (5, 1),
    (6, 2),
    (7, 3),
];

fn cfg_for(path: std::path::PathBuf) -> PartitionerConfig {
    PartitionerConfig {
        filename: path,
        num_threads: Some(2),
        ..Default::default()
    }
}

#[test]
fn two_by_two_grid_placement() {
    let path = util::write_temp_graph("square", &util::adjacency(8, &EDGES));
    let cuts: Vec<CartesianCut<()>> = util::run_partition(4, &cfg_for(path.clone()));

    for (rank, masters) in [(0, [0u64, 1]), (1, [2, 3]), (2, [4, 5]), (3, [6, 7])] {
        assert_eq!(cuts[rank].num_owned(), 2);
        for gid in masters {
            assert!(cuts[rank].is_owned(gid), "rank {rank} should master {gid}");
        }
    }

    // rank 0: masters first, then its column partner's mirrored endpoints
    let c0 = &cuts[0];
    assert!(c0.is_vertex_cut());
    assert_eq!(c0.num_nodes(), 4);
    assert_eq!(c0.num_edges(), 3);
    assert_eq!(c0.master_range(), (0, 2));
    assert_eq!(c0.mirror_ranges(), vec![(2, 4)]);
    let dsts_of_0: Vec<u64> = c0
        .graph()
        .edges(c0.g2l(0).unwrap())
        .iter()
        .map(|&l| c0.l2g(l))
        .collect();
    assert_eq!(dsts_of_0, vec![1, 4], "per-source file order must hold");
    assert_eq!(c0.mirror_nodes()[2], vec![4, 5]);
    assert!(c0.mirror_nodes()[1].is_empty());
    assert!(c0.mirror_nodes()[3].is_empty());

    // column partners see each other's masters
    assert_eq!(cuts[2].mirror_nodes()[0], vec![0, 1]);
    assert_eq!(cuts[2].master_nodes()[0], vec![4, 5]);
    assert_eq!(cuts[1].mirror_nodes()[3], vec![6, 7]);
    assert_eq!(cuts[3].mirror_nodes()[1], vec![2, 3]);

    assert_eq!(util::collect_global_edges(&cuts), util::sorted_edges(&EDGES));
    util::check_invariants(&cuts, 8, 9);

    std::fs::remove_file(&path).ok();
}

#[test]
fn crossing_edges_are_shipped_to_the_owning_column_peer() {
    // (0,2) and (5,6) leave their reader's column, so their edges arrive at
    // the row peer owning the destination column via the exchange
    let mut edges = EDGES.to_vec();
    edges.push((0, 2));
    edges.push((5, 6));
    let path = util::write_temp_graph("square-cross", &util::adjacency(8, &edges));
    let cuts: Vec<CartesianCut<()>> = util::run_partition(4, &cfg_for(path.clone()));

    // rank 1 materializes (0,2): source 0 becomes an outgoing-edge mirror
    assert!(cuts[1].is_local(0));
    assert!(!cuts[1].is_owned(0));
    assert!(cuts[1].mirror_nodes()[0].contains(&0));
    // rank 3 materializes (5,6)
    assert!(cuts[3].is_local(5));
    assert!(cuts[3].mirror_nodes()[2].contains(&5));

    assert_eq!(util::collect_global_edges(&cuts), util::sorted_edges(&edges));
    util::check_invariants(&cuts, 8, 11);

    std::fs::remove_file(&path).ok();
}

#[test]
fn single_host_owns_everything() {
    let path = util::write_temp_graph("single", &util::adjacency(8, &EDGES));
    let cuts: Vec<CartesianCut<()>> = util::run_partition(1, &cfg_for(path.clone()));

    let c = &cuts[0];
    assert!(!c.is_vertex_cut());
    assert_eq!(c.num_owned(), 8);
    assert_eq!(c.num_nodes(), 8);
    assert_eq!(c.num_edges(), 9);
    assert!(c.mirror_nodes().iter().all(|l| l.is_empty()));
    assert!(c.mirror_ranges().is_empty());
    assert_eq!(util::collect_global_edges(&cuts), util::sorted_edges(&EDGES));
    util::check_invariants(&cuts, 8, 9);

    std::fs::remove_file(&path).ok();
}

#[test]
fn zero_edge_graph_constructs() {
    let path = util::write_temp_graph("zero-edges", &util::adjacency(8, &[]));
    let cuts: Vec<CartesianCut<()>> = util::run_partition(4, &cfg_for(path.clone()));

    for cut in &cuts {
        assert_eq!(cut.num_edges(), 0);
        assert_eq!(cut.num_nodes(), cut.num_owned());
        assert!(cut.graph().prefix_sums().iter().all(|&p| p == 0));
        assert!(cut.mirror_nodes().iter().all(|l| l.is_empty()));
    }
    util::check_invariants(&cuts, 8, 0);

    std::fs::remove_file(&path).ok();
}

#[test]
fn rank_without_masters_still_carries_mirrors() {
    // host 3 is weighted to zero: it owns nothing but still materializes the
    // edges landing in its grid cell
    let edges = [(0u32, 1u32), (4, 2), (5, 3)];
    let path = util::write_temp_graph("no-masters", &util::adjacency(6, &edges));
    let cfg = PartitionerConfig {
        scale_factor: vec![1, 1, 1, 0],
        ..cfg_for(path.clone())
    };
    let cuts: Vec<CartesianCut<()>> = util::run_partition(4, &cfg);

    let c3 = &cuts[3];
    assert_eq!(c3.num_owned(), 0);
    assert_eq!(c3.begin_master(), 0);
    assert_eq!(c3.master_range(), (0, 0));
    assert_eq!(c3.num_nodes(), 4);
    assert_eq!(c3.num_edges(), 2);
    assert_eq!(c3.mirror_ranges(), vec![(0, 4)]);
    assert_eq!(c3.mirror_nodes()[2], vec![4, 5]);
    assert_eq!(c3.mirror_nodes()[1], vec![2, 3]);

    assert_eq!(util::collect_global_edges(&cuts), util::sorted_edges(&edges));
    util::check_invariants(&cuts, 6, 3);

    std::fs::remove_file(&path).ok();
}
