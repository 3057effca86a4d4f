//! Global-id resolution against the master assignment.
//!
//! A linear probe over the (small, sorted) virtual-host ranges is all the
//! partitioner needs; the probe is not hot after construction.

use crate::error::GridCutError;
use crate::partition::grid::GridGeometry;
use crate::partition::masters::GidRange;

/// Borrowing view over the grid and `gid2host` ranges.
#[derive(Copy, Clone)]
pub struct GidLocator<'a> {
    grid: &'a GridGeometry,
    gid2host: &'a [GidRange],
    num_global_nodes: u64,
}

impl<'a> GidLocator<'a> {
    pub fn new(grid: &'a GridGeometry, gid2host: &'a [GidRange], num_global_nodes: u64) -> Self {
        debug_assert_eq!(gid2host.len(), grid.num_virtual_hosts());
        Self {
            grid,
            gid2host,
            num_global_nodes,
        }
    }

    /// Virtual host owning `gid`.
    pub fn host_of(&self, gid: u64) -> Result<usize, GridCutError> {
        for (host, range) in self.gid2host.iter().enumerate() {
            if range.contains(gid) {
                return Ok(host);
            }
        }
        Err(GridCutError::GidOutOfRange {
            gid,
            total: self.num_global_nodes,
        })
    }

    /// Real host mastering `gid`.
    pub fn owner_of(&self, gid: u64) -> Result<usize, GridCutError> {
        Ok(self.grid.virtual_to_real(self.host_of(gid)?))
    }

    /// Grid column `gid`'s block is routed to.
    pub fn column_host_of(&self, gid: u64) -> Result<usize, GridCutError> {
        Ok(self.grid.column_of_block(self.host_of(gid)?))
    }

    /// Dense index of `gid` within the concatenation of all blocks routed to
    /// its column, in ascending block order. Preserves global-id order up to
    /// block boundaries.
    pub fn column_index_of(&self, gid: u64) -> Result<u64, GridCutError> {
        let block = self.host_of(gid)?;
        let col = self.grid.column_of_block(block);
        let mut index = 0u64;
        for b in 0..=block {
            if self.grid.column_of_block(b) != col {
                continue;
            }
            let range = self.gid2host[b];
            if gid < range.end {
                index += gid - range.begin;
                break;
            }
            index += range.len();
        }
        Ok(index)
    }

    /// Total length of the blocks routed to `col`; sizes that column's
    /// witness bitmap.
    pub fn column_span(&self, col: usize) -> u64 {
        (0..self.grid.num_virtual_hosts())
            .filter(|&b| self.grid.column_of_block(b) == col)
            .map(|b| self.gid2host[b].len())
            .sum()
    }
}
