//! Commuting global projectors onto the spaces of the discrete de Rham complex.
//!
//! The degrees of freedom of a tensor-product spline space are point values along
//! point-evaluating axes (at the Greville abscissae) and integrals along histopolating axes
//! (over the intervals of the histopolation grid). A [`GlobalProjector`] evaluates these
//! degrees of freedom for an analytic function and solves the Kronecker-structured system
//! relating them to spline coefficients. Because the integral of a derivative over an interval
//! is the difference of point values at its ends, the projectors commute with the discrete
//! derivatives of [`crate::derivatives`].
use crate::error::FeecError;
use crate::field::FemField;
use crate::kronecker::{KroneckerOperator, KroneckerSolver};
use crate::space::{FemSpace, FormKind, TensorSpace, VectorSpace};
use crate::spline::{BasisKind, SplineSpace};
use crate::stencil::BlockVector;
use crate::util::unravel_index;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// A scalar function of the logical coordinates.
pub type FieldFunction = dyn Fn(&[f64]) -> f64 + Sync;

/// Settings for constructing a [`GlobalProjector`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectorSettings {
    /// Number of Gauss-Legendre points per knot interval used for histopolation.
    ///
    /// Integrals of splines of degree `p` are exact if this is at least `p + 1`, but the
    /// projected function is generally not polynomial, so larger orders reduce the consistency
    /// error of the commuting diagram.
    pub quadrature_order: usize,
}

impl Default for ProjectorSettings {
    fn default() -> Self {
        Self { quadrature_order: 5 }
    }
}

impl ProjectorSettings {
    pub fn with_quadrature_order(quadrature_order: usize) -> Self {
        Self { quadrature_order }
    }
}

/// Evaluation points and weights of the degrees of freedom owned along one axis.
///
/// Degree of freedom `i` is `sum_k weights[k] * f(points[k])` for `k` in
/// `offsets[i]..offsets[i + 1]`, stored like the rows of a CSR matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisDofs {
    points: Vec<f64>,
    weights: Vec<f64>,
    offsets: Vec<usize>,
}

impl AxisDofs {
    /// Degrees of freedom with global indices in `range`.
    pub fn new(space: &SplineSpace, range: std::ops::Range<usize>, quadrature_order: usize) -> Result<Self, FeecError> {
        let mut dofs = Self {
            points: Vec::new(),
            weights: Vec::new(),
            offsets: vec![0],
        };
        match space.basis() {
            BasisKind::B => {
                let greville = space.greville();
                for &g in &greville[range] {
                    dofs.points.push(g);
                    dofs.weights.push(1.0);
                    dofs.offsets.push(dofs.points.len());
                }
            }
            BasisKind::M => {
                let rules = space.histopolation_rules(quadrature_order)?;
                for (weights, points) in &rules[range] {
                    dofs.points.extend_from_slice(points);
                    dofs.weights.extend_from_slice(weights);
                    dofs.offsets.push(dofs.points.len());
                }
            }
        }
        Ok(dofs)
    }

    pub fn num_dofs(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Points and weights of degree of freedom `i`.
    pub fn dof(&self, i: usize) -> (&[f64], &[f64]) {
        let range = self.offsets[i]..self.offsets[i + 1];
        (&self.points[range.clone()], &self.weights[range])
    }

    /// Contracts the point axis `axis` of a compact array into degrees of freedom.
    fn contract(&self, data: &[f64], shape: &[usize], axis: usize) -> Vec<f64> {
        debug_assert_eq!(shape[axis], self.num_points());
        let inner: usize = shape[axis + 1..].iter().product();
        let outer: usize = shape[..axis].iter().product();
        let ndofs = self.num_dofs();
        let npoints = self.num_points();

        let mut result = vec![0.0; outer * ndofs * inner];
        for o in 0..outer {
            for i in 0..ndofs {
                let out = &mut result[(o * ndofs + i) * inner..(o * ndofs + i + 1) * inner];
                for k in self.offsets[i]..self.offsets[i + 1] {
                    let w = self.weights[k];
                    let row = &data[(o * npoints + k) * inner..(o * npoints + k + 1) * inner];
                    for (y, x) in out.iter_mut().zip(row) {
                        *y += w * x;
                    }
                }
            }
        }
        result
    }
}

/// Evaluates the owned degrees of freedom of `f` for a tensor product of axis degrees of
/// freedom, in compact row-major order.
///
/// Degrees of freedom along the first axis are processed in parallel. For each point along the
/// first axis, `f` is sampled on the tensor grid of the remaining axes, which is then contracted
/// axis by axis, so memory use stays proportional to a single plane of points.
pub fn evaluate_dofs(axes: &[AxisDofs], f: &FieldFunction) -> Vec<f64> {
    let (first, rest) = match axes.split_first() {
        Some(split) => split,
        None => return vec![f(&[])],
    };
    let rest_points: Vec<usize> = rest.iter().map(AxisDofs::num_points).collect();
    let rest_dofs: usize = rest.iter().map(AxisDofs::num_dofs).product();
    let plane_size: usize = rest_points.iter().product();

    let blocks: Vec<Vec<f64>> = (0..first.num_dofs())
        .into_par_iter()
        .map(|i| {
            let mut block = vec![0.0; rest_dofs];
            let mut coords = vec![0.0; axes.len()];
            let mut index = vec![0; rest.len()];
            let (points, weights) = first.dof(i);
            for (&x, &w) in points.iter().zip(weights) {
                coords[0] = x;
                let mut plane: Vec<f64> = (0..plane_size)
                    .map(|flat| {
                        unravel_index(flat, &rest_points, &mut index);
                        for (axis, (&k, dofs)) in index.iter().zip(rest).enumerate() {
                            coords[axis + 1] = dofs.points[k];
                        }
                        f(&coords)
                    })
                    .collect();
                let mut shape = rest_points.clone();
                for (axis, dofs) in rest.iter().enumerate() {
                    plane = dofs.contract(&plane, &shape, axis);
                    shape[axis] = dofs.num_dofs();
                }
                for (b, v) in block.iter_mut().zip(&plane) {
                    *b += w * v;
                }
            }
            block
        })
        .collect();
    blocks.concat()
}

/// Projector onto a tensor-product or vector-valued spline space.
///
/// Construction assembles and factorizes the one-dimensional matrices of every axis of every
/// component, which is comparatively expensive. The projector is immutable afterwards and can
/// be applied to any number of functions.
#[derive(Debug, Clone)]
pub struct GlobalProjector {
    space: FemSpace,
    settings: ProjectorSettings,
    dofs: Vec<Vec<AxisDofs>>,
    operators: Vec<KroneckerOperator>,
    solvers: Vec<KroneckerSolver>,
}

impl GlobalProjector {
    pub fn new(space: impl Into<FemSpace>, settings: ProjectorSettings) -> Result<Self, FeecError> {
        let space = space.into();
        let timer = Instant::now();
        let quadrature_order = settings.quadrature_order;

        let mut dofs = Vec::new();
        let mut operators = Vec::new();
        let mut solvers = Vec::new();
        for (component, tensor) in space.components().iter().enumerate() {
            for (axis, spline) in tensor.spaces().iter().enumerate() {
                if spline.basis() == BasisKind::M && quadrature_order < spline.degree() + 1 {
                    warn!(
                        "Quadrature order {quadrature_order} cannot integrate degree {} exactly \
                         (component {component}, axis {axis})",
                        spline.degree()
                    );
                }
            }

            let axis_dofs = tensor
                .spaces()
                .iter()
                .enumerate()
                .map(|(axis, spline)| AxisDofs::new(spline, tensor.layout().owned_range(axis), quadrature_order))
                .collect::<Result<Vec<_>, _>>()?;
            let matrices = tensor
                .spaces()
                .iter()
                .map(|spline| spline.dof_matrix(quadrature_order))
                .collect::<Result<Vec<_>, _>>()?;
            let operator = KroneckerOperator::new(Arc::clone(tensor.layout()), matrices);
            let solver = KroneckerSolver::new(&operator).map_err(|err| err.in_component(component))?;

            dofs.push(axis_dofs);
            operators.push(operator);
            solvers.push(solver);
        }

        info!(
            "Built {:?} projector with {} component(s) in {:.2?}",
            space.form(),
            space.num_components(),
            timer.elapsed()
        );
        Ok(Self {
            space,
            settings,
            dofs,
            operators,
            solvers,
        })
    }

    /// Projector onto a scalar space that is point-evaluating along every axis.
    pub fn h1(space: &TensorSpace, settings: ProjectorSettings) -> Result<Self, FeecError> {
        Self::with_form(space.clone().into(), FormKind::H1, settings)
    }

    /// Projector onto a scalar space that is histopolating along every axis.
    pub fn l2(space: &TensorSpace, settings: ProjectorSettings) -> Result<Self, FeecError> {
        Self::with_form(space.clone().into(), FormKind::L2, settings)
    }

    pub fn hcurl(space: &VectorSpace, settings: ProjectorSettings) -> Result<Self, FeecError> {
        Self::with_form(space.clone().into(), FormKind::Hcurl, settings)
    }

    pub fn hdiv(space: &VectorSpace, settings: ProjectorSettings) -> Result<Self, FeecError> {
        Self::with_form(space.clone().into(), FormKind::Hdiv, settings)
    }

    fn with_form(space: FemSpace, form: FormKind, settings: ProjectorSettings) -> Result<Self, FeecError> {
        if space.form() != Some(form) {
            return Err(FeecError::IncompatibleSpaces(format!(
                "expected a {form:?} space, got {:?}",
                space.form()
            )));
        }
        Self::new(space, settings)
    }

    pub fn space(&self) -> &FemSpace {
        &self.space
    }

    pub fn settings(&self) -> &ProjectorSettings {
        &self.settings
    }

    /// The Kronecker operators mapping coefficients to degrees of freedom, one per component.
    pub fn operators(&self) -> &[KroneckerOperator] {
        &self.operators
    }

    /// The inverses of [`operators`](Self::operators).
    pub fn solvers(&self) -> &[KroneckerSolver] {
        &self.solvers
    }

    /// Owned degrees of freedom of every axis of every component.
    pub fn axis_dofs(&self) -> &[Vec<AxisDofs>] {
        &self.dofs
    }

    fn check_vector(&self, x: &BlockVector) {
        assert!(
            self.space.contains(x),
            "vector must belong to the space of the projector"
        );
    }

    /// Maps coefficients to degrees of freedom. Collective.
    pub fn apply(&self, x: &BlockVector) -> Result<BlockVector, FeecError> {
        self.check_vector(x);
        let blocks = self
            .operators
            .iter()
            .zip(x.blocks())
            .map(|(op, block)| op.apply(block))
            .collect::<Result<_, _>>()?;
        Ok(BlockVector::new(blocks))
    }

    /// Maps degrees of freedom to coefficients. Collective.
    pub fn solve(&self, b: &BlockVector) -> Result<BlockVector, FeecError> {
        self.check_vector(b);
        let blocks = self
            .solvers
            .iter()
            .zip(b.blocks())
            .map(|(solver, block)| solver.solve(block))
            .collect::<Result<_, _>>()?;
        Ok(BlockVector::new(blocks))
    }

    /// The Euclidean norm of `solve(apply(x)) - x`. Collective.
    pub fn inverse_residual(&self, x: &BlockVector) -> Result<f64, FeecError> {
        let mut residual = &self.solve(&self.apply(x)?)? - x;
        residual.update_ghost_regions()?;
        residual.norm()
    }

    /// Evaluates the owned degrees of freedom of one function per component.
    pub fn evaluate_dofs(&self, functions: &[&FieldFunction]) -> Result<BlockVector, FeecError> {
        if functions.len() != self.space.num_components() {
            return Err(FeecError::ArityMismatch {
                expected: self.space.num_components(),
                actual: functions.len(),
            });
        }
        let blocks = self
            .space
            .components()
            .iter()
            .zip(&self.dofs)
            .zip(functions)
            .map(|((tensor, axis_dofs), f)| {
                let mut block = tensor.zeros();
                block.set_owned_values(&evaluate_dofs(axis_dofs, *f));
                block
            })
            .collect();
        Ok(BlockVector::new(blocks))
    }

    /// Projects one function per component onto the space. Collective.
    ///
    /// Every worker samples the functions only at the points of its owned degrees of freedom.
    /// The ghost regions of the returned coefficients are in sync.
    pub fn project(&self, functions: &[&FieldFunction]) -> Result<FemField, FeecError> {
        let timer = Instant::now();
        let dofs = self.evaluate_dofs(functions)?;
        let mut coefficients = self.solve(&dofs)?;
        coefficients.update_ghost_regions()?;
        debug!("Projection took {:.2?}", timer.elapsed());
        FemField::new(self.space.clone(), coefficients)
    }

    /// Projects a single function onto a scalar space.
    pub fn project_scalar(&self, f: &FieldFunction) -> Result<FemField, FeecError> {
        self.project(&[f])
    }
}
