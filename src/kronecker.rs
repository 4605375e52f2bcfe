//! Kronecker-structured operators on distributed tensor-product coefficient arrays.
//!
//! A [`KroneckerOperator`] represents `A_0 ⊗ A_1 ⊗ ... ⊗ A_{d-1}` and a [`KroneckerSolver`]
//! its inverse, without ever forming the tensor product: both act by sweeping the axes in
//! increasing order, applying the one-dimensional operator of each axis to every fiber along
//! it. When an axis is split across several workers, the workers on a line along that axis
//! first gather their owned blocks, sweep the full fibers and keep their own part.
use crate::error::FeecError;
use crate::stencil::{StencilLayout, StencilVector};
use crate::util::{concatenate_along_axis, restrict_axis, sweep_axis};
use log::debug;
use nalgebra::{DMatrix, DVectorView};
use std::sync::Arc;

/// Ratio between the smallest and largest pivot below which a matrix counts as singular.
const SINGULARITY_THRESHOLD: f64 = 1e-13;

const LINE_GATHER_TAG: u32 = 200;

/// Sweeps the axes of the owned coefficients of `x` with the given fiber operations.
fn sweep<F>(layout: &Arc<StencilLayout>, x: &StencilVector, fiber_ops: &[F]) -> Result<StencilVector, FeecError>
where
    F: Fn(&mut [f64]) + Sync,
{
    assert!(
        layout.is_compatible(x.layout()),
        "operator and vector must belong to the same space"
    );
    let decomposition = layout.decomposition();
    let mut shape = layout.owned_shape();
    let mut values = x.owned_values();

    for (axis, op) in fiber_ops.iter().enumerate() {
        if decomposition.nprocs()[axis] == 1 {
            sweep_axis(&mut values, &shape, axis, op);
            continue;
        }

        let line = decomposition.line(axis);
        let tag = LINE_GATHER_TAG + axis as u32;
        let blocks = decomposition.comm().all_gather(&line, tag, values)?;
        let ranges = layout.axis_ranges(axis);
        let blocks: Vec<(Vec<f64>, usize)> = blocks
            .into_iter()
            .zip(ranges)
            .map(|(block, range)| (block, range.len()))
            .collect();
        let mut full_shape = shape.clone();
        full_shape[axis] = layout.npts()[axis];
        let mut full = concatenate_along_axis(&blocks, &full_shape, axis);
        if full.len() != full_shape.iter().product::<usize>() {
            return Err(FeecError::Communication(format!(
                "line gather along axis {axis} returned inconsistent blocks"
            )));
        }
        sweep_axis(&mut full, &full_shape, axis, op);
        values = restrict_axis(&full, &full_shape, axis, layout.owned_range(axis));
        shape = layout.owned_shape();
    }

    let mut result = StencilVector::zeros(Arc::clone(layout));
    result.set_owned_values(&values);
    Ok(result)
}

/// The tensor product of one square matrix per axis.
#[derive(Debug, Clone)]
pub struct KroneckerOperator {
    layout: Arc<StencilLayout>,
    matrices: Vec<DMatrix<f64>>,
}

impl KroneckerOperator {
    /// # Panics
    ///
    /// Panics if the matrices do not match the global shape of the layout.
    pub fn new(layout: Arc<StencilLayout>, matrices: Vec<DMatrix<f64>>) -> Self {
        assert_eq!(matrices.len(), layout.ndim(), "one matrix per axis");
        for (matrix, &n) in matrices.iter().zip(layout.npts()) {
            assert_eq!(matrix.shape(), (n, n), "matrix shape must match the number of coefficients");
        }
        Self { layout, matrices }
    }

    pub fn layout(&self) -> &Arc<StencilLayout> {
        &self.layout
    }

    pub fn matrices(&self) -> &[DMatrix<f64>] {
        &self.matrices
    }

    /// Computes `(A_0 ⊗ ... ⊗ A_{d-1}) x`. Collective when any axis is split across workers.
    ///
    /// Only the owned coefficients of `x` are read, and the ghost regions of the result are
    /// out of sync.
    pub fn apply(&self, x: &StencilVector) -> Result<StencilVector, FeecError> {
        let ops: Vec<_> = self
            .matrices
            .iter()
            .map(|matrix| {
                move |fiber: &mut [f64]| {
                    let y = matrix * DVectorView::from_slice(fiber, fiber.len());
                    fiber.copy_from_slice(y.as_slice());
                }
            })
            .collect();
        sweep(&self.layout, x, &ops)
    }
}

/// An LU factorization with partial pivoting that only touches the band of the matrix.
///
/// Row interchanges widen the upper band of `U` to `lower + upper`, so factorization costs
/// `O(n lower (lower + upper))` and a solve `O(n (2 lower + upper))`. Periodic axes produce
/// matrices whose nonzeros wrap around the corners; their band is simply as wide as the matrix.
#[derive(Debug, Clone)]
pub struct BandedLu {
    /// `L` multipliers strictly below the diagonal and `U` on and above it.
    lu: DMatrix<f64>,
    pivots: Vec<usize>,
    lower: usize,
    upper: usize,
}

impl BandedLu {
    pub fn new(mut matrix: DMatrix<f64>) -> Self {
        assert!(matrix.is_square(), "banded factorization requires a square matrix");
        let n = matrix.nrows();
        let (lower, upper) = bandwidths(&matrix);
        let width = lower + upper;
        let mut pivots = Vec::with_capacity(n);

        for k in 0..n {
            let last_row = (k + lower).min(n - 1);
            let last_col = (k + width).min(n - 1);
            let mut pivot = k;
            for i in k + 1..=last_row {
                if matrix[(i, k)].abs() > matrix[(pivot, k)].abs() {
                    pivot = i;
                }
            }
            pivots.push(pivot);
            if pivot != k {
                for j in k..=last_col {
                    matrix.swap((k, j), (pivot, j));
                }
            }

            let diagonal = matrix[(k, k)];
            if diagonal == 0.0 {
                continue;
            }
            for i in k + 1..=last_row {
                let multiplier = matrix[(i, k)] / diagonal;
                matrix[(i, k)] = multiplier;
                if multiplier != 0.0 {
                    for j in k + 1..=last_col {
                        let update = multiplier * matrix[(k, j)];
                        matrix[(i, j)] -= update;
                    }
                }
            }
        }

        Self {
            lu: matrix,
            pivots,
            lower,
            upper,
        }
    }

    /// Number of nonzero diagonals below and above the main diagonal of the factorized matrix.
    pub fn bandwidths(&self) -> (usize, usize) {
        (self.lower, self.upper)
    }

    /// Absolute values of the diagonal of `U`.
    pub fn pivot_magnitudes(&self) -> Vec<f64> {
        self.lu.diagonal().iter().map(|u| u.abs()).collect()
    }

    /// Overwrites `b` with the solution of `A x = b`.
    ///
    /// Returns `false` if `U` has a zero on its diagonal, in which case `b` is left in an
    /// unspecified state.
    pub fn solve_mut(&self, b: &mut [f64]) -> bool {
        let n = self.lu.nrows();
        assert_eq!(b.len(), n, "right-hand side must match the matrix dimension");
        let width = self.lower + self.upper;

        for k in 0..n {
            b.swap(k, self.pivots[k]);
            let bk = b[k];
            for i in k + 1..=(k + self.lower).min(n.saturating_sub(1)) {
                b[i] -= self.lu[(i, k)] * bk;
            }
        }

        for i in (0..n).rev() {
            let diagonal = self.lu[(i, i)];
            if diagonal == 0.0 {
                return false;
            }
            let mut value = b[i];
            for j in i + 1..=(i + width).min(n - 1) {
                value -= self.lu[(i, j)] * b[j];
            }
            b[i] = value / diagonal;
        }
        true
    }
}

/// The lower and upper bandwidths of a square matrix.
fn bandwidths(matrix: &DMatrix<f64>) -> (usize, usize) {
    let mut lower = 0;
    let mut upper = 0;
    for j in 0..matrix.ncols() {
        for i in 0..matrix.nrows() {
            if matrix[(i, j)] != 0.0 {
                if i > j {
                    lower = lower.max(i - j);
                } else {
                    upper = upper.max(j - i);
                }
            }
        }
    }
    (lower, upper)
}

/// Solves with a [`KroneckerOperator`] by sweeping per-axis banded LU factorizations.
#[derive(Debug, Clone)]
pub struct KroneckerSolver {
    layout: Arc<StencilLayout>,
    factors: Vec<BandedLu>,
}

impl KroneckerSolver {
    /// Factorizes every axis matrix of `operator`.
    ///
    /// Fails with [`FeecError::SingularMatrix`] (reporting component 0) if a matrix is singular
    /// to working precision.
    pub fn new(operator: &KroneckerOperator) -> Result<Self, FeecError> {
        let factors = operator
            .matrices
            .iter()
            .enumerate()
            .map(|(axis, matrix)| {
                let lu = BandedLu::new(matrix.clone());
                let pivots = lu.pivot_magnitudes();
                let min = pivots.iter().copied().fold(f64::INFINITY, f64::min);
                let max = pivots.iter().copied().fold(0.0, f64::max);
                debug!(
                    "Axis {axis}: bandwidths {:?}, pivot ratio {:e}",
                    lu.bandwidths(),
                    min / max
                );
                if !(max > 0.0) || min / max < SINGULARITY_THRESHOLD {
                    Err(FeecError::SingularMatrix { component: 0, axis })
                } else {
                    Ok(lu)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            layout: Arc::clone(&operator.layout),
            factors,
        })
    }

    pub fn layout(&self) -> &Arc<StencilLayout> {
        &self.layout
    }

    pub fn factors(&self) -> &[BandedLu] {
        &self.factors
    }

    /// Computes `(A_0 ⊗ ... ⊗ A_{d-1})^{-1} b`. Collective when any axis is split across
    /// workers.
    pub fn solve(&self, b: &StencilVector) -> Result<StencilVector, FeecError> {
        let ops: Vec<_> = self
            .factors
            .iter()
            .map(|lu| {
                move |fiber: &mut [f64]| {
                    let solved = lu.solve_mut(fiber);
                    debug_assert!(solved, "axis factorization was checked for singularity at construction");
                }
            })
            .collect();
        sweep(&self.layout, b, &ops)
    }
}
