//! Distributed coefficient storage with ghost regions.
//!
//! A [`StencilVector`] stores the coefficients of a scalar tensor-product space that are owned
//! by one worker, padded on every axis by `ghost_width` layers of coefficients owned by its
//! neighbors. A [`BlockVector`] groups one stencil vector per component of a vector-valued
//! space.
use crate::comm::Message;
use crate::decomposition::{Direction, DomainDecomposition};
use crate::error::FeecError;
use crate::spline::SplineSpace;
use crate::util::{for_each_in_box, gather_box, ravel_index, scatter_box, strides, unravel_index};
use std::ops::{Add, Range, Sub};
use std::sync::Arc;

const GHOST_TAG: u32 = 100;

/// How the coefficients of a scalar tensor-product space are distributed over workers.
#[derive(Debug, Clone)]
pub struct StencilLayout {
    decomposition: Arc<DomainDecomposition>,
    npts: Vec<usize>,
    periodic: Vec<bool>,
    /// Owned coefficient range of every process-grid coordinate, per axis.
    ranges: Vec<Vec<Range<usize>>>,
    ghost_width: usize,
}

impl StencilLayout {
    /// Distributes the coefficients of the tensor product of `spaces`.
    ///
    /// Each basis function is owned by the worker owning its anchor cell (see
    /// [`SplineSpace::anchor_cells`]).
    pub fn new(decomposition: Arc<DomainDecomposition>, spaces: &[SplineSpace]) -> Result<Self, FeecError> {
        let ndim = decomposition.ndim();
        if spaces.len() != ndim {
            return Err(FeecError::IncompatibleSpaces(format!(
                "{} spaces given for a {ndim}-dimensional decomposition",
                spaces.len()
            )));
        }

        let ghost_width = decomposition.ghost_width();
        let mut ranges = Vec::with_capacity(ndim);
        for (axis, space) in spaces.iter().enumerate() {
            if space.ncells() != decomposition.ncells()[axis] || space.periodic() != decomposition.periodic()[axis] {
                return Err(FeecError::IncompatibleSpaces(format!(
                    "space along axis {axis} does not match the cells of the decomposition"
                )));
            }
            let anchors = space.anchor_cells();
            let axis_ranges: Vec<Range<usize>> = (0..decomposition.nprocs()[axis])
                .map(|coord| {
                    let cells = decomposition.cell_range(axis, coord);
                    let start = anchors.partition_point(|&cell| cell < cells.start);
                    let end = anchors.partition_point(|&cell| cell < cells.end);
                    start..end
                })
                .collect();
            if axis_ranges.iter().any(|r| r.len() < ghost_width.max(1)) {
                return Err(FeecError::InvalidDecomposition(format!(
                    "some worker owns fewer than {} coefficients along axis {axis}",
                    ghost_width.max(1)
                )));
            }
            ranges.push(axis_ranges);
        }

        Ok(Self {
            npts: spaces.iter().map(SplineSpace::nbasis).collect(),
            periodic: spaces.iter().map(SplineSpace::periodic).collect(),
            decomposition,
            ranges,
            ghost_width,
        })
    }

    pub fn decomposition(&self) -> &Arc<DomainDecomposition> {
        &self.decomposition
    }

    pub fn ndim(&self) -> usize {
        self.npts.len()
    }

    /// Global number of coefficients per axis.
    pub fn npts(&self) -> &[usize] {
        &self.npts
    }

    pub fn ghost_width(&self) -> usize {
        self.ghost_width
    }

    /// Global range of coefficients owned by this worker along `axis`.
    pub fn owned_range(&self, axis: usize) -> Range<usize> {
        self.ranges[axis][self.decomposition.coords()[axis]].clone()
    }

    /// Owned ranges along `axis` of all workers on the line through this worker, ordered by
    /// process-grid coordinate.
    pub fn axis_ranges(&self, axis: usize) -> &[Range<usize>] {
        &self.ranges[axis]
    }

    /// Number of owned coefficients per axis.
    pub fn owned_shape(&self) -> Vec<usize> {
        (0..self.ndim()).map(|axis| self.owned_range(axis).len()).collect()
    }

    /// Number of owned and ghost coefficients per axis.
    pub fn padded_shape(&self) -> Vec<usize> {
        (0..self.ndim())
            .map(|axis| self.owned_range(axis).len() + 2 * self.ghost_width)
            .collect()
    }

    pub fn num_owned(&self) -> usize {
        self.owned_shape().iter().product()
    }

    /// The box of owned coefficients in padded local coordinates.
    pub(crate) fn owned_box(&self) -> Vec<Range<usize>> {
        let g = self.ghost_width;
        self.owned_shape().iter().map(|&n| g..g + n).collect()
    }

    /// Whether `self` and `other` distribute the same index space in the same way.
    pub fn is_compatible(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.decomposition, &other.decomposition)
            && self.npts == other.npts
            && self.ranges == other.ranges
            && self.ghost_width == other.ghost_width
    }

    /// Padded local position of a global index along `axis`, if it is owned or a ghost.
    fn local_position(&self, axis: usize, index: usize) -> Option<usize> {
        let g = self.ghost_width;
        let n = self.npts[axis];
        let owned = self.owned_range(axis);
        if owned.contains(&index) {
            return Some(index - owned.start + g);
        }
        (0..g).find_map(|layer| {
            let backward = if owned.start >= g - layer {
                Some(owned.start - (g - layer))
            } else if self.periodic[axis] {
                Some(owned.start + n - (g - layer))
            } else {
                None
            };
            let forward = if owned.end + layer < n {
                Some(owned.end + layer)
            } else if self.periodic[axis] {
                Some(owned.end + layer - n)
            } else {
                None
            };
            if backward == Some(index) {
                Some(layer)
            } else if forward == Some(index) {
                Some(g + owned.len() + layer)
            } else {
                None
            }
        })
    }
}

/// Coefficients of a scalar tensor-product space owned by one worker, padded with ghost layers.
#[derive(Debug, Clone)]
pub struct StencilVector {
    layout: Arc<StencilLayout>,
    data: Vec<f64>,
    ghosts_in_sync: bool,
}

impl StencilVector {
    pub fn zeros(layout: Arc<StencilLayout>) -> Self {
        let len = layout.padded_shape().iter().product();
        Self {
            layout,
            data: vec![0.0; len],
            // All ghosts are zero, consistent with the (zero) owned data of the neighbors
            ghosts_in_sync: true,
        }
    }

    /// A vector whose owned coefficients are given by a function of the global multi-index.
    pub fn from_global_fn(layout: Arc<StencilLayout>, f: impl Fn(&[usize]) -> f64) -> Self {
        let owned_shape = layout.owned_shape();
        let starts: Vec<usize> = (0..layout.ndim()).map(|axis| layout.owned_range(axis).start).collect();
        let mut local = vec![0; layout.ndim()];
        let mut global = vec![0; layout.ndim()];
        let values: Vec<f64> = (0..layout.num_owned())
            .map(|flat| {
                unravel_index(flat, &owned_shape, &mut local);
                for ((g, l), s) in global.iter_mut().zip(&local).zip(&starts) {
                    *g = l + s;
                }
                f(&global)
            })
            .collect();
        let mut vector = Self::zeros(layout);
        vector.set_owned_values(&values);
        vector
    }

    pub fn layout(&self) -> &Arc<StencilLayout> {
        &self.layout
    }

    /// Owned and ghost coefficients in padded row-major order.
    pub fn padded_data(&self) -> &[f64] {
        &self.data
    }

    pub fn ghosts_in_sync(&self) -> bool {
        self.ghosts_in_sync
    }

    /// Copies the owned coefficients into a compact row-major array.
    pub fn owned_values(&self) -> Vec<f64> {
        gather_box(&self.data, &self.layout.padded_shape(), &self.layout.owned_box())
    }

    /// Overwrites the owned coefficients from a compact row-major array.
    ///
    /// Ghost regions are marked out of sync.
    ///
    /// # Panics
    ///
    /// Panics if the number of values differs from the number of owned coefficients.
    pub fn set_owned_values(&mut self, values: &[f64]) {
        scatter_box(
            &mut self.data,
            &self.layout.padded_shape(),
            &self.layout.owned_box(),
            values,
        );
        self.ghosts_in_sync = false;
    }

    /// The coefficient with the given global multi-index.
    ///
    /// Ghost coefficients can only be read while the ghost regions are in sync.
    pub fn get(&self, index: &[usize]) -> Result<f64, FeecError> {
        let layout = &self.layout;
        let mut local = Vec::with_capacity(index.len());
        let mut is_ghost = false;
        for (axis, &i) in index.iter().enumerate() {
            let position = layout
                .local_position(axis, i)
                .ok_or(FeecError::NonLocalCoefficient { axis, index: i })?;
            let owned = layout.ghost_width..layout.ghost_width + layout.owned_range(axis).len();
            is_ghost |= !owned.contains(&position);
            local.push(position);
        }
        if is_ghost && !self.ghosts_in_sync {
            return Err(FeecError::GhostsOutOfSync);
        }
        Ok(self.data[ravel_index(&local, &strides(&layout.padded_shape()))])
    }

    /// Refreshes the ghost regions with the owned coefficients of the neighboring workers.
    ///
    /// This is a collective operation. Axes are processed in order, and the slabs exchanged along
    /// an axis include the ghost layers of all previous axes, so corner regions are filled too.
    pub fn update_ghost_regions(&mut self) -> Result<(), FeecError> {
        let layout = Arc::clone(&self.layout);
        let decomposition = layout.decomposition();
        let comm = decomposition.comm();
        let g = layout.ghost_width;
        let padded_shape = layout.padded_shape();
        let owned_shape = layout.owned_shape();

        for axis in 0..layout.ndim() {
            let slab = |axis_range: Range<usize>| -> Vec<Range<usize>> {
                (0..layout.ndim())
                    .map(|b| {
                        if b == axis {
                            axis_range.clone()
                        } else if b < axis {
                            0..padded_shape[b]
                        } else {
                            g..g + owned_shape[b]
                        }
                    })
                    .collect()
            };
            let n = owned_shape[axis];

            let mut outgoing = Vec::new();
            if g > 0 {
                // The first owned layers fill the forward ghost of the backward neighbor and
                // vice versa
                if let Some(peer) = decomposition.neighbor(axis, Direction::Backward) {
                    outgoing.push(Message {
                        peer,
                        tag: ghost_tag(axis, Direction::Forward),
                        data: gather_box(&self.data, &padded_shape, &slab(g..2 * g)),
                    });
                }
                if let Some(peer) = decomposition.neighbor(axis, Direction::Forward) {
                    outgoing.push(Message {
                        peer,
                        tag: ghost_tag(axis, Direction::Backward),
                        data: gather_box(&self.data, &padded_shape, &slab(n..n + g)),
                    });
                }
            }

            for message in comm.exchange(outgoing)? {
                let ghost_range = if message.tag == ghost_tag(axis, Direction::Backward) {
                    0..g
                } else if message.tag == ghost_tag(axis, Direction::Forward) {
                    n + g..n + 2 * g
                } else {
                    return Err(FeecError::Communication(format!(
                        "unexpected message with tag {} during ghost update",
                        message.tag
                    )));
                };
                let ranges = slab(ghost_range);
                if message.data.len() != ranges.iter().map(|r| r.len()).product::<usize>() {
                    return Err(FeecError::Communication(format!(
                        "ghost slab from rank {} has the wrong size",
                        message.peer
                    )));
                }
                scatter_box(&mut self.data, &padded_shape, &ranges, &message.data);
            }
        }

        self.ghosts_in_sync = true;
        Ok(())
    }

    fn local_dot(&self, other: &Self) -> f64 {
        let mut sum = 0.0;
        for_each_in_box(&self.layout.padded_shape(), &self.layout.owned_box(), |idx| {
            sum += self.data[idx] * other.data[idx];
        });
        sum
    }

    fn local_max_abs(&self) -> f64 {
        let mut max = 0.0_f64;
        for_each_in_box(&self.layout.padded_shape(), &self.layout.owned_box(), |idx| {
            max = max.max(self.data[idx].abs());
        });
        max
    }

    fn check_reducible(&self) -> Result<(), FeecError> {
        if self.ghosts_in_sync {
            Ok(())
        } else {
            Err(FeecError::GhostsOutOfSync)
        }
    }

    /// Global dot product. Collective, and requires both vectors to have synchronized ghosts.
    pub fn dot(&self, other: &Self) -> Result<f64, FeecError> {
        assert_compatible(&self.layout, &other.layout);
        self.check_reducible()?;
        other.check_reducible()?;
        self.comm_sum(self.local_dot(other))
    }

    /// Global Euclidean norm. Collective.
    pub fn norm(&self) -> Result<f64, FeecError> {
        Ok(self.dot(self)?.sqrt())
    }

    /// Global maximum absolute coefficient. Collective.
    pub fn max_abs(&self) -> Result<f64, FeecError> {
        self.check_reducible()?;
        self.layout
            .decomposition()
            .comm()
            .all_reduce_max(self.local_max_abs())
    }

    fn comm_sum(&self, value: f64) -> Result<f64, FeecError> {
        self.layout.decomposition().comm().all_reduce_sum(value)
    }

    /// `self += alpha * x`, including ghost regions.
    pub fn axpy(&mut self, alpha: f64, x: &Self) {
        assert_compatible(&self.layout, &x.layout);
        for (y, x) in self.data.iter_mut().zip(&x.data) {
            *y += alpha * x;
        }
        self.ghosts_in_sync &= x.ghosts_in_sync;
    }

    pub fn scale(&mut self, alpha: f64) {
        for y in &mut self.data {
            *y *= alpha;
        }
    }
}

fn ghost_tag(axis: usize, ghost: Direction) -> u32 {
    let side = match ghost {
        Direction::Backward => 0,
        Direction::Forward => 1,
    };
    GHOST_TAG + 2 * axis as u32 + side
}

fn assert_compatible(a: &Arc<StencilLayout>, b: &Arc<StencilLayout>) {
    assert!(
        Arc::ptr_eq(a, b) || a.is_compatible(b),
        "vectors must belong to the same space"
    );
}

impl<'a> Add<&'a StencilVector> for &'a StencilVector {
    type Output = StencilVector;

    fn add(self, rhs: &'a StencilVector) -> StencilVector {
        let mut result = self.clone();
        result.axpy(1.0, rhs);
        result
    }
}

impl<'a> Sub<&'a StencilVector> for &'a StencilVector {
    type Output = StencilVector;

    fn sub(self, rhs: &'a StencilVector) -> StencilVector {
        let mut result = self.clone();
        result.axpy(-1.0, rhs);
        result
    }
}

/// Coefficients of a (possibly vector-valued) space, one stencil vector per component.
#[derive(Debug, Clone)]
pub struct BlockVector {
    blocks: Vec<StencilVector>,
}

impl From<StencilVector> for BlockVector {
    fn from(vector: StencilVector) -> Self {
        Self { blocks: vec![vector] }
    }
}

impl BlockVector {
    pub fn new(blocks: Vec<StencilVector>) -> Self {
        Self { blocks }
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[StencilVector] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [StencilVector] {
        &mut self.blocks
    }

    pub fn block(&self, index: usize) -> &StencilVector {
        &self.blocks[index]
    }

    pub fn into_blocks(self) -> Vec<StencilVector> {
        self.blocks
    }

    pub fn ghosts_in_sync(&self) -> bool {
        self.blocks.iter().all(StencilVector::ghosts_in_sync)
    }

    /// Collective. Every block is updated in turn.
    pub fn update_ghost_regions(&mut self) -> Result<(), FeecError> {
        self.blocks
            .iter_mut()
            .try_for_each(StencilVector::update_ghost_regions)
    }

    /// Global dot product summed over all blocks. Collective.
    pub fn dot(&self, other: &Self) -> Result<f64, FeecError> {
        assert_eq!(self.num_blocks(), other.num_blocks(), "block counts must match");
        let mut local = 0.0;
        for (a, b) in self.blocks.iter().zip(&other.blocks) {
            assert_compatible(&a.layout, &b.layout);
            a.check_reducible()?;
            b.check_reducible()?;
            local += a.local_dot(b);
        }
        match self.blocks.first() {
            Some(first) => first.comm_sum(local),
            None => Ok(0.0),
        }
    }

    pub fn norm(&self) -> Result<f64, FeecError> {
        Ok(self.dot(self)?.sqrt())
    }

    /// Global maximum absolute coefficient over all blocks. Collective.
    pub fn max_abs(&self) -> Result<f64, FeecError> {
        let mut local = 0.0_f64;
        for block in &self.blocks {
            block.check_reducible()?;
            local = local.max(block.local_max_abs());
        }
        match self.blocks.first() {
            Some(first) => first.layout.decomposition().comm().all_reduce_max(local),
            None => Ok(0.0),
        }
    }

    pub fn axpy(&mut self, alpha: f64, x: &Self) {
        assert_eq!(self.num_blocks(), x.num_blocks(), "block counts must match");
        for (y, x) in self.blocks.iter_mut().zip(&x.blocks) {
            y.axpy(alpha, x);
        }
    }

    pub fn scale(&mut self, alpha: f64) {
        for block in &mut self.blocks {
            block.scale(alpha);
        }
    }
}

impl<'a> Add<&'a BlockVector> for &'a BlockVector {
    type Output = BlockVector;

    fn add(self, rhs: &'a BlockVector) -> BlockVector {
        let mut result = self.clone();
        result.axpy(1.0, rhs);
        result
    }
}

impl<'a> Sub<&'a BlockVector> for &'a BlockVector {
    type Output = BlockVector;

    fn sub(self, rhs: &'a BlockVector) -> BlockVector {
        let mut result = self.clone();
        result.axpy(-1.0, rhs);
        result
    }
}
