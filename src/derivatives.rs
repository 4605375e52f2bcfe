//! Discrete derivatives between the spaces of the de Rham complex.
//!
//! The derivative of a B-spline expansion `sum_i c_i B_i` of degree `p` is exactly
//! `sum_i (c_{i+1} - c_i) M_i`, where `M_i` are the unit-integral splines of degree `p - 1` on the
//! same knots. Every operator in this module is therefore a signed sum of per-axis
//! coefficient differences, and composing two consecutive operators cancels exactly.
use crate::error::FeecError;
use crate::field::FemField;
use crate::space::{FemSpace, FormKind, TensorSpace, VectorSpace};
use crate::stencil::{BlockVector, StencilVector};
use crate::util::{ravel_index, strides, unravel_index};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The operators of the one-, two- and three-dimensional complexes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DerivativeKind {
    /// `H1 -> L2` in one dimension.
    Derivative1d,
    /// `H1 -> Hcurl` in two or three dimensions.
    Gradient,
    /// `H1 -> Hdiv` in two dimensions, `f -> (d_y f, -d_x f)`.
    VectorCurl2d,
    /// `Hcurl -> L2` in two dimensions, `u -> d_x u_1 - d_y u_0`.
    ScalarCurl2d,
    /// `Hcurl -> Hdiv` in three dimensions.
    Curl3d,
    /// `Hdiv -> L2` in two or three dimensions.
    Divergence,
}

impl DerivativeKind {
    /// The spaces connected by the operator, together with the dimension it is defined in.
    fn forms(self, ndim: usize) -> Option<(FormKind, FormKind)> {
        use DerivativeKind::*;
        use FormKind::*;
        match (self, ndim) {
            (Derivative1d, 1) => Some((H1, L2)),
            (Gradient, 2 | 3) => Some((H1, Hcurl)),
            (VectorCurl2d, 2) => Some((H1, Hdiv)),
            (ScalarCurl2d, 2) => Some((Hcurl, L2)),
            (Curl3d, 3) => Some((Hcurl, Hdiv)),
            (Divergence, 2 | 3) => Some((Hdiv, L2)),
            _ => None,
        }
    }

    /// The signed differences making up the operator.
    fn terms(self, ndim: usize) -> Vec<DifferenceTerm> {
        use DerivativeKind::*;
        let term = |target, source, axis, sign| DifferenceTerm {
            target,
            source,
            axis,
            sign,
        };
        match self {
            Derivative1d => vec![term(0, 0, 0, 1.0)],
            Gradient => (0..ndim).map(|axis| term(axis, 0, axis, 1.0)).collect(),
            VectorCurl2d => vec![term(0, 0, 1, 1.0), term(1, 0, 0, -1.0)],
            ScalarCurl2d => vec![term(0, 1, 0, 1.0), term(0, 0, 1, -1.0)],
            Curl3d => vec![
                term(0, 2, 1, 1.0),
                term(0, 1, 2, -1.0),
                term(1, 0, 2, 1.0),
                term(1, 2, 0, -1.0),
                term(2, 1, 0, 1.0),
                term(2, 0, 1, -1.0),
            ],
            Divergence => (0..ndim).map(|axis| term(0, axis, axis, 1.0)).collect(),
        }
    }
}

/// `target[j] += sign * (source[j + e_axis] - source[j])`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DifferenceTerm {
    pub target: usize,
    pub source: usize,
    pub axis: usize,
    pub sign: f64,
}

/// An exact discrete derivative between two spaces of the de Rham complex.
///
/// Periodic axes wrap the difference around; along clamped axes the target space has one
/// coefficient fewer than the source, so no boundary closure is needed.
#[derive(Debug, Clone)]
pub struct DerivativeOperator {
    kind: DerivativeKind,
    source: FemSpace,
    target: FemSpace,
    terms: Vec<DifferenceTerm>,
}

impl DerivativeOperator {
    pub fn new(kind: DerivativeKind, source: FemSpace, target: FemSpace) -> Result<Self, FeecError> {
        let ndim = source.ndim();
        let (source_form, target_form) = kind.forms(ndim).ok_or_else(|| {
            FeecError::IncompatibleSpaces(format!("{kind:?} is not defined in {ndim} dimensions"))
        })?;
        if source.form() != Some(source_form) || target.form() != Some(target_form) {
            return Err(FeecError::IncompatibleSpaces(format!(
                "{kind:?} maps {source_form:?} to {target_form:?}, got {:?} and {:?}",
                source.form(),
                target.form()
            )));
        }
        if !Arc::ptr_eq(source.decomposition(), target.decomposition()) {
            return Err(FeecError::IncompatibleSpaces(
                "source and target are distributed by different decompositions".to_string(),
            ));
        }
        let available = source.decomposition().ghost_width();
        if available < 1 {
            return Err(FeecError::InsufficientGhostWidth { required: 1, available });
        }

        let terms = kind.terms(ndim);
        for term in &terms {
            let from = &source.components()[term.source];
            let to = &target.components()[term.target];
            for axis in 0..ndim {
                let expected = if axis == term.axis {
                    from.space(axis).reduce_degree()?
                } else {
                    from.space(axis).clone()
                };
                if *to.space(axis) != expected {
                    return Err(FeecError::IncompatibleSpaces(format!(
                        "component {} of the target is not the derivative space of component {} \
                         of the source along axis {axis}",
                        term.target, term.source
                    )));
                }
            }
        }

        Ok(Self {
            kind,
            source,
            target,
            terms,
        })
    }

    /// `d/dx : H1 -> L2` in one dimension.
    pub fn derivative_1d(h1: &TensorSpace, l2: &TensorSpace) -> Result<Self, FeecError> {
        Self::new(DerivativeKind::Derivative1d, h1.clone().into(), l2.clone().into())
    }

    pub fn gradient(h1: &TensorSpace, hcurl: &VectorSpace) -> Result<Self, FeecError> {
        Self::new(DerivativeKind::Gradient, h1.clone().into(), hcurl.clone().into())
    }

    pub fn vector_curl_2d(h1: &TensorSpace, hdiv: &VectorSpace) -> Result<Self, FeecError> {
        Self::new(DerivativeKind::VectorCurl2d, h1.clone().into(), hdiv.clone().into())
    }

    pub fn scalar_curl_2d(hcurl: &VectorSpace, l2: &TensorSpace) -> Result<Self, FeecError> {
        Self::new(DerivativeKind::ScalarCurl2d, hcurl.clone().into(), l2.clone().into())
    }

    pub fn curl_3d(hcurl: &VectorSpace, hdiv: &VectorSpace) -> Result<Self, FeecError> {
        Self::new(DerivativeKind::Curl3d, hcurl.clone().into(), hdiv.clone().into())
    }

    pub fn divergence(hdiv: &VectorSpace, l2: &TensorSpace) -> Result<Self, FeecError> {
        Self::new(DerivativeKind::Divergence, hdiv.clone().into(), l2.clone().into())
    }

    pub fn kind(&self) -> DerivativeKind {
        self.kind
    }

    pub fn source(&self) -> &FemSpace {
        &self.source
    }

    pub fn target(&self) -> &FemSpace {
        &self.target
    }

    pub fn terms(&self) -> &[DifferenceTerm] {
        &self.terms
    }

    /// Applies the derivative to coefficients of the source space. Collective.
    ///
    /// The ghost regions of `x` are updated first, since the stencils reach one layer into the
    /// forward ghost region. The ghost regions of the result are out of sync.
    pub fn apply(&self, x: &mut BlockVector) -> Result<BlockVector, FeecError> {
        assert!(
            self.source.contains(x),
            "vector must belong to the source space of the derivative"
        );
        x.update_ghost_regions()?;

        let mut targets: Vec<Vec<f64>> = self
            .target
            .components()
            .iter()
            .map(|t| vec![0.0; t.layout().num_owned()])
            .collect();
        for term in &self.terms {
            let to = &self.target.components()[term.target];
            add_difference(&mut targets[term.target], to, x.block(term.source), term);
        }

        let blocks = self
            .target
            .components()
            .iter()
            .zip(targets)
            .map(|(tensor, values)| {
                let mut block = tensor.zeros();
                block.set_owned_values(&values);
                block
            })
            .collect();
        Ok(BlockVector::new(blocks))
    }

    /// Applies the derivative to a field, returning a field in the target space. Collective.
    pub fn apply_field(&self, field: &mut FemField) -> Result<FemField, FeecError> {
        let coefficients = self.apply(field.coefficients_mut())?;
        FemField::new(self.target.clone(), coefficients)
    }

    /// Assembles the operator as a global sparse matrix.
    ///
    /// Rows and columns enumerate the global coefficients component by component, each in
    /// row-major order. Every worker assembles the full matrix.
    pub fn to_sparse(&self) -> CsrMatrix<f64> {
        let offsets = |space: &FemSpace| -> Vec<usize> {
            let mut offsets = vec![0];
            for component in space.components() {
                offsets.push(offsets[offsets.len() - 1] + component.dim());
            }
            offsets
        };
        let source_offsets = offsets(&self.source);
        let target_offsets = offsets(&self.target);
        let mut coo = CooMatrix::new(
            target_offsets[target_offsets.len() - 1],
            source_offsets[source_offsets.len() - 1],
        );

        for term in &self.terms {
            let from = &self.source.components()[term.source];
            let to = &self.target.components()[term.target];
            let source_strides = strides(from.npts());
            let n = from.npts()[term.axis];
            let mut index = vec![0; to.ndim()];
            for flat in 0..to.dim() {
                unravel_index(flat, to.npts(), &mut index);
                let row = target_offsets[term.target] + flat;
                let col = source_offsets[term.source] + ravel_index(&index, &source_strides);
                index[term.axis] = (index[term.axis] + 1) % n;
                let next = source_offsets[term.source] + ravel_index(&index, &source_strides);
                coo.push(row, next, term.sign);
                coo.push(row, col, -term.sign);
            }
        }
        CsrMatrix::from(&coo)
    }
}

/// Adds one difference term to the compact owned values of a target component.
///
/// Source and target share their owned ranges on every axis, so the owned local index of the
/// target is also the local index of the source, and `j + e_axis` is either owned or the first
/// layer of the forward ghost region.
fn add_difference(target: &mut [f64], target_space: &TensorSpace, source: &StencilVector, term: &DifferenceTerm) {
    let owned_shape = target_space.layout().owned_shape();
    let source_layout = source.layout();
    let g = source_layout.ghost_width();
    let source_strides = strides(&source_layout.padded_shape());
    let source_data = source.padded_data();
    let step = source_strides[term.axis];

    target.par_iter_mut().enumerate().for_each(|(flat, value)| {
        let mut index = [0; 3];
        let index = &mut index[..owned_shape.len()];
        unravel_index(flat, &owned_shape, index);
        let j: usize = index
            .iter()
            .zip(&source_strides)
            .map(|(&i, &s)| (i + g) * s)
            .sum();
        *value += term.sign * (source_data[j + step] - source_data[j]);
    });
}
