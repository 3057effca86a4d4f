//! Master assignment: split the global id space into per-virtual-host ranges.

use crate::error::GridCutError;

/// Half-open global-id range `[begin, end)`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GidRange {
    pub begin: u64,
    pub end: u64,
}

impl GidRange {
    pub fn new(begin: u64, end: u64) -> Self {
        debug_assert!(begin <= end);
        Self { begin, end }
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.end - self.begin
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    #[inline]
    pub fn contains(&self, gid: u64) -> bool {
        gid >= self.begin && gid < self.end
    }

    pub fn iter(&self) -> std::ops::Range<u64> {
        self.begin..self.end
    }
}

/// Split `[0, num_global_nodes)` into `num_virtual_hosts` contiguous,
/// monotonically increasing ranges. With a non-empty `scale_factor` (one
/// weight per real host) block `b` is weighted by `scale_factor[b % num_hosts]`;
/// a zero weight yields an empty range for that block's host.
pub fn compute_masters(
    num_global_nodes: u64,
    num_hosts: usize,
    num_virtual_hosts: usize,
    scale_factor: &[u32],
) -> Result<Vec<GidRange>, GridCutError> {
    if !scale_factor.is_empty() && scale_factor.len() != num_hosts {
        return Err(GridCutError::ScaleFactorLength {
            got: scale_factor.len(),
            want: num_hosts,
        });
    }
    let weight = |block: usize| -> u64 {
        if scale_factor.is_empty() {
            1
        } else {
            u64::from(scale_factor[block % num_hosts])
        }
    };
    let total: u64 = (0..num_virtual_hosts).map(weight).sum();
    if total == 0 {
        return Err(GridCutError::InvalidGrid(
            "scale factor assigns zero weight everywhere".into(),
        ));
    }

    let mut ranges = Vec::with_capacity(num_virtual_hosts);
    let mut cumulative = 0u64;
    let mut begin = 0u64;
    for block in 0..num_virtual_hosts {
        cumulative += weight(block);
        let end = ((num_global_nodes as u128 * cumulative as u128) / total as u128) as u64;
        ranges.push(GidRange::new(begin, end));
        begin = end;
    }
    debug_assert_eq!(ranges.last().map(|r| r.end), Some(num_global_nodes));
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_partitions(ranges: &[GidRange], n: u64) {
        let mut expected = 0u64;
        for r in ranges {
            assert_eq!(r.begin, expected);
            expected = r.end;
        }
        assert_eq!(expected, n);
    }

    #[test]
    fn even_split() {
        let ranges = compute_masters(8, 4, 4, &[]).unwrap();
        assert_eq!(
            ranges,
            vec![
                GidRange::new(0, 2),
                GidRange::new(2, 4),
                GidRange::new(4, 6),
                GidRange::new(6, 8),
            ]
        );
    }

    #[test]
    fn decomposed_split_repeats_hosts() {
        let ranges = compute_masters(16, 4, 8, &[]).unwrap();
        assert_partitions(&ranges, 16);
        assert!(ranges.iter().all(|r| r.len() == 2));
    }

    #[test]
    fn weighted_split_respects_zero_weight() {
        let ranges = compute_masters(9, 3, 3, &[2, 0, 1]).unwrap();
        assert_partitions(&ranges, 9);
        assert_eq!(ranges[0].len(), 6);
        assert!(ranges[1].is_empty());
        assert_eq!(ranges[2].len(), 3);
    }

    #[test]
    fn wrong_scale_factor_length_fails() {
        assert!(matches!(
            compute_masters(10, 4, 4, &[1, 2]),
            Err(GridCutError::ScaleFactorLength { got: 2, want: 4 })
        ));
    }

    proptest! {
        #[test]
        fn always_partitions_exactly(
            n in 0u64..10_000,
            hosts in 1usize..17,
            d in 1u32..4,
            seed in any::<u32>(),
        ) {
            let weights: Vec<u32> = (0..hosts)
                .map(|h| (seed.rotate_left(h as u32) % 5) + 1)
                .collect();
            let v = hosts * d as usize;
            let ranges = compute_masters(n, hosts, v, &weights).unwrap();
            prop_assert_eq!(ranges.len(), v);
            assert_partitions(&ranges, n);
        }
    }
}
