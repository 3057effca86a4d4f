//! Virtual process-grid geometry.
//!
//! `P` real hosts are factored into `R x C` with `R >= C` and `|R - C|`
//! minimal, optionally swapped, and `R` is then multiplied by the decompose
//! factor `D` so the virtual grid has `V = P * D` slots. A virtual host maps
//! to its real host by `v mod P`.

use crate::error::GridCutError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GridGeometry {
    num_hosts: usize,
    num_row_hosts: usize,
    num_column_hosts: usize,
    num_virtual_hosts: usize,
    decompose_factor: u32,
    column_blocked: bool,
    more_column_hosts: bool,
}

impl GridGeometry {
    /// Factor `num_hosts` into the virtual grid.
    pub fn factorize(
        num_hosts: usize,
        column_blocked: bool,
        more_column_hosts: bool,
        decompose_factor: u32,
    ) -> Result<Self, GridCutError> {
        if decompose_factor == 0 {
            return Err(GridCutError::InvalidDecomposeFactor);
        }
        if num_hosts == 0 {
            return Err(GridCutError::InvalidGrid("no hosts".into()));
        }
        if column_blocked && decompose_factor > 1 {
            // Contiguous column stripes do not line up with decomposed
            // blocks; the combination has no consistent column assignment.
            return Err(GridCutError::InvalidGrid(
                "checkerboard partitioning requires decompose factor 1".into(),
            ));
        }
        let mut num_column_hosts = (num_hosts as f64).sqrt() as usize;
        while num_hosts % num_column_hosts != 0 {
            num_column_hosts -= 1;
        }
        let mut num_row_hosts = num_hosts / num_column_hosts;
        debug_assert!(num_row_hosts >= num_column_hosts);
        if more_column_hosts {
            std::mem::swap(&mut num_row_hosts, &mut num_column_hosts);
        }
        num_row_hosts *= decompose_factor as usize;
        Ok(Self {
            num_hosts,
            num_row_hosts,
            num_column_hosts,
            num_virtual_hosts: num_hosts * decompose_factor as usize,
            decompose_factor,
            column_blocked,
            more_column_hosts,
        })
    }

    pub fn num_hosts(&self) -> usize {
        self.num_hosts
    }

    pub fn num_row_hosts(&self) -> usize {
        self.num_row_hosts
    }

    pub fn num_column_hosts(&self) -> usize {
        self.num_column_hosts
    }

    pub fn num_virtual_hosts(&self) -> usize {
        self.num_virtual_hosts
    }

    pub fn decompose_factor(&self) -> u32 {
        self.decompose_factor
    }

    pub fn column_blocked(&self) -> bool {
        self.column_blocked
    }

    /// Grid row of a (real or virtual) rank.
    #[inline]
    pub fn grid_row(&self, rank: usize) -> usize {
        rank / self.num_column_hosts
    }

    /// Grid column of a (real or virtual) rank.
    #[inline]
    pub fn grid_col(&self, rank: usize) -> usize {
        rank % self.num_column_hosts
    }

    /// Real host behind a virtual slot.
    #[inline]
    pub fn virtual_to_real(&self, virtual_host: usize) -> usize {
        virtual_host % self.num_hosts
    }

    /// Column a block is routed to: contiguous stripes under checkerboard,
    /// round-robin under strict cartesian. The single knob that switches the
    /// two regimes.
    #[inline]
    pub fn column_of_block(&self, block: usize) -> usize {
        if self.column_blocked {
            block / self.num_row_hosts
        } else {
            block % self.num_column_hosts
        }
    }

    /// Whether this layout actually splits vertices (as opposed to
    /// degenerating into an incoming/outgoing edge cut).
    pub fn is_vertex_cut(&self) -> bool {
        if self.more_column_hosts {
            // with swapped roles only the 1x1 grid degenerates
            !(self.num_row_hosts == 1 && self.num_column_hosts == 1)
        } else {
            !(self.num_row_hosts == 1 || self.num_column_hosts == 1)
        }
    }
}
