//! Partitioning of a tensor-product cell grid across workers.
use crate::comm::{Communicator, SelfCommunicator};
use crate::error::FeecError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Side of a partition along a single axis.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Backward,
    Forward,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Self::Backward => Self::Forward,
            Self::Forward => Self::Backward,
        }
    }
}

/// Optional knobs for [`DomainDecomposition::with_settings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionSettings {
    /// Number of coefficient layers replicated from each neighbor.
    pub ghost_width: usize,
    /// Number of workers along each axis. Chosen automatically when absent.
    pub process_grid: Option<Vec<usize>>,
}

impl Default for DecompositionSettings {
    fn default() -> Self {
        Self {
            ghost_width: 1,
            process_grid: None,
        }
    }
}

/// A Cartesian partition of a grid of `ncells[0] x ... x ncells[d-1]` cells.
///
/// Workers are arranged in a process grid and numbered in row-major order. Each worker owns a
/// contiguous box of cells, and the boxes tile the cell grid exactly. Ownership of spline
/// coefficients is derived from cell ownership by
/// [`StencilLayout`](crate::stencil::StencilLayout).
#[derive(Clone)]
pub struct DomainDecomposition {
    ncells: Vec<usize>,
    periodic: Vec<bool>,
    nprocs: Vec<usize>,
    coords: Vec<usize>,
    local_cells: Vec<Range<usize>>,
    ghost_width: usize,
    comm: Arc<dyn Communicator>,
}

impl fmt::Debug for DomainDecomposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainDecomposition")
            .field("ncells", &self.ncells)
            .field("periodic", &self.periodic)
            .field("nprocs", &self.nprocs)
            .field("coords", &self.coords)
            .field("local_cells", &self.local_cells)
            .field("ghost_width", &self.ghost_width)
            .finish()
    }
}

impl DomainDecomposition {
    pub fn new(ncells: &[usize], periodic: &[bool], comm: Arc<dyn Communicator>) -> Result<Self, FeecError> {
        Self::with_settings(ncells, periodic, comm, DecompositionSettings::default())
    }

    /// A decomposition with a single worker owning every cell.
    pub fn serial(ncells: &[usize], periodic: &[bool]) -> Result<Self, FeecError> {
        Self::new(ncells, periodic, Arc::new(SelfCommunicator))
    }

    pub fn with_settings(
        ncells: &[usize],
        periodic: &[bool],
        comm: Arc<dyn Communicator>,
        settings: DecompositionSettings,
    ) -> Result<Self, FeecError> {
        let ndim = ncells.len();
        if !(1..=3).contains(&ndim) {
            return Err(FeecError::InvalidDecomposition(format!(
                "only 1, 2 or 3 dimensions are supported, got {ndim}"
            )));
        }
        if periodic.len() != ndim {
            return Err(FeecError::InvalidDecomposition(format!(
                "{} periodicity flags given for {ndim} axes",
                periodic.len()
            )));
        }
        if ncells.contains(&0) {
            return Err(FeecError::InvalidDecomposition(
                "every axis needs at least one cell".to_string(),
            ));
        }

        let size = comm.size();
        let nprocs = match settings.process_grid {
            Some(grid) => {
                if grid.len() != ndim || grid.iter().product::<usize>() != size {
                    return Err(FeecError::InvalidDecomposition(format!(
                        "process grid {grid:?} does not match {size} workers in {ndim} dimensions"
                    )));
                }
                grid
            }
            None => compute_process_grid(ncells, size)?,
        };
        if let Some(axis) = (0..ndim).find(|&axis| nprocs[axis] > ncells[axis]) {
            return Err(FeecError::InvalidDecomposition(format!(
                "{} workers along axis {axis} exceed the {} cells of that axis",
                nprocs[axis], ncells[axis]
            )));
        }

        let coords = rank_to_coords(comm.rank(), &nprocs);
        let local_cells = (0..ndim)
            .map(|axis| partition_range(ncells[axis], nprocs[axis], coords[axis]))
            .collect();
        let decomposition = Self {
            ncells: ncells.to_vec(),
            periodic: periodic.to_vec(),
            nprocs,
            coords,
            local_cells,
            ghost_width: settings.ghost_width,
            comm,
        };
        debug!("Created {decomposition:?}");
        Ok(decomposition)
    }

    pub fn ndim(&self) -> usize {
        self.ncells.len()
    }

    pub fn ncells(&self) -> &[usize] {
        &self.ncells
    }

    pub fn periodic(&self) -> &[bool] {
        &self.periodic
    }

    /// Number of workers along each axis.
    pub fn nprocs(&self) -> &[usize] {
        &self.nprocs
    }

    /// Position of this worker in the process grid.
    pub fn coords(&self) -> &[usize] {
        &self.coords
    }

    pub fn ghost_width(&self) -> usize {
        self.ghost_width
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn comm(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    /// Cells owned by this worker along the given axis.
    pub fn local_cells(&self, axis: usize) -> Range<usize> {
        self.local_cells[axis].clone()
    }

    /// Cells owned along `axis` by the workers at process-grid coordinate `coord`.
    pub fn cell_range(&self, axis: usize, coord: usize) -> Range<usize> {
        partition_range(self.ncells[axis], self.nprocs[axis], coord)
    }

    pub fn rank_of(&self, coords: &[usize]) -> usize {
        coords
            .iter()
            .zip(&self.nprocs)
            .fold(0, |rank, (&c, &n)| rank * n + c)
    }

    /// The neighboring worker along an axis, if there is one.
    ///
    /// Periodic axes wrap around, so a worker can be its own neighbor.
    pub fn neighbor(&self, axis: usize, direction: Direction) -> Option<usize> {
        let n = self.nprocs[axis];
        let c = self.coords[axis];
        let neighbor_coord = match direction {
            Direction::Backward if c > 0 => c - 1,
            Direction::Backward if self.periodic[axis] => n - 1,
            Direction::Forward if c + 1 < n => c + 1,
            Direction::Forward if self.periodic[axis] => 0,
            _ => return None,
        };
        let mut coords = self.coords.clone();
        coords[axis] = neighbor_coord;
        Some(self.rank_of(&coords))
    }

    /// The workers sharing this worker's coordinates on all axes but `axis`, ordered by their
    /// coordinate along `axis`.
    pub fn line(&self, axis: usize) -> Vec<usize> {
        let mut coords = self.coords.clone();
        (0..self.nprocs[axis])
            .map(|c| {
                coords[axis] = c;
                self.rank_of(&coords)
            })
            .collect()
    }
}

fn rank_to_coords(rank: usize, nprocs: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; nprocs.len()];
    let mut remainder = rank;
    for (coord, &n) in coords.iter_mut().zip(nprocs).rev() {
        *coord = remainder % n;
        remainder /= n;
    }
    coords
}

/// Splits `n` items into `parts` contiguous, nearly equally sized ranges.
fn partition_range(n: usize, parts: usize, k: usize) -> Range<usize> {
    (k * n / parts)..((k + 1) * n / parts)
}

/// Distributes the prime factors of `size` over the axes, largest factors first, each time
/// refining the axis with the most cells per worker.
fn compute_process_grid(ncells: &[usize], size: usize) -> Result<Vec<usize>, FeecError> {
    if size == 0 {
        return Err(FeecError::InvalidDecomposition("empty worker group".to_string()));
    }
    let mut factors = prime_factors(size);
    factors.reverse();
    let mut nprocs = vec![1; ncells.len()];
    for factor in factors {
        let axis = (0..ncells.len())
            .filter(|&axis| nprocs[axis] * factor <= ncells[axis])
            .max_by(|&a, &b| {
                let ratio = |axis: usize| ncells[axis] as f64 / nprocs[axis] as f64;
                ratio(a).total_cmp(&ratio(b)).then(b.cmp(&a))
            })
            .ok_or_else(|| {
                FeecError::InvalidDecomposition(format!("cannot distribute {ncells:?} cells over {size} workers"))
            })?;
        nprocs[axis] *= factor;
    }
    Ok(nprocs)
}

fn prime_factors(mut n: usize) -> Vec<usize> {
    let mut factors = Vec::new();
    let mut candidate = 2;
    while candidate * candidate <= n {
        while n % candidate == 0 {
            factors.push(candidate);
            n /= candidate;
        }
        candidate += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}
