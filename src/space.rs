//! Tensor-product and vector-valued spline spaces.
use crate::decomposition::DomainDecomposition;
use crate::error::FeecError;
use crate::spline::{BasisKind, SplineSpace};
use crate::stencil::{BlockVector, StencilLayout, StencilVector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tensor product of one-dimensional spline spaces, distributed by a domain decomposition.
///
/// Represents a single scalar component of a discrete differential form.
#[derive(Debug, Clone)]
pub struct TensorSpace {
    spaces: Vec<SplineSpace>,
    layout: Arc<StencilLayout>,
}

impl PartialEq for TensorSpace {
    fn eq(&self, other: &Self) -> bool {
        self.spaces == other.spaces && self.layout.is_compatible(&other.layout)
    }
}

impl TensorSpace {
    pub fn new(decomposition: Arc<DomainDecomposition>, spaces: Vec<SplineSpace>) -> Result<Self, FeecError> {
        let layout = StencilLayout::new(decomposition, &spaces)?;
        Ok(Self {
            spaces,
            layout: Arc::new(layout),
        })
    }

    pub fn ndim(&self) -> usize {
        self.spaces.len()
    }

    pub fn spaces(&self) -> &[SplineSpace] {
        &self.spaces
    }

    pub fn space(&self, axis: usize) -> &SplineSpace {
        &self.spaces[axis]
    }

    pub fn degrees(&self) -> Vec<usize> {
        self.spaces.iter().map(SplineSpace::degree).collect()
    }

    pub fn basis_kinds(&self) -> Vec<BasisKind> {
        self.spaces.iter().map(SplineSpace::basis).collect()
    }

    /// Global number of basis functions per axis.
    pub fn npts(&self) -> &[usize] {
        self.layout.npts()
    }

    /// Global dimension of the space.
    pub fn dim(&self) -> usize {
        self.npts().iter().product()
    }

    pub fn layout(&self) -> &Arc<StencilLayout> {
        &self.layout
    }

    pub fn decomposition(&self) -> &Arc<DomainDecomposition> {
        self.layout.decomposition()
    }

    pub fn zeros(&self) -> StencilVector {
        StencilVector::zeros(Arc::clone(&self.layout))
    }

    /// The companion space obtained by lowering the degree along the given axes.
    ///
    /// Only histopolating companions are supported, and only point-evaluating axes can be
    /// reduced. The result is distributed by the same decomposition, and shares the owned index
    /// ranges of `self` on all axes that are not reduced.
    pub fn reduce_degree(&self, axes: &[usize], basis: BasisKind) -> Result<Self, FeecError> {
        let mut spaces = self.spaces.clone();
        for &axis in axes {
            let space = spaces.get(axis).ok_or_else(|| {
                FeecError::IncompatibleSpaces(format!(
                    "cannot reduce axis {axis} of a {}-dimensional space",
                    self.ndim()
                ))
            })?;
            if basis != BasisKind::M || space.basis() != BasisKind::B {
                return Err(FeecError::UnsupportedBasis {
                    degree: space.degree(),
                    basis,
                });
            }
            spaces[axis] = space.reduce_degree()?;
        }
        Self::new(Arc::clone(self.decomposition()), spaces)
    }
}

/// An ordered sequence of tensor spaces, one per vector component.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSpace {
    components: Vec<TensorSpace>,
}

impl VectorSpace {
    pub fn new(components: Vec<TensorSpace>) -> Result<Self, FeecError> {
        let first = components
            .first()
            .ok_or_else(|| FeecError::IncompatibleSpaces("a vector space needs components".to_string()))?;
        let same_decomposition = components
            .iter()
            .all(|c| Arc::ptr_eq(c.decomposition(), first.decomposition()));
        if !same_decomposition {
            return Err(FeecError::IncompatibleSpaces(
                "all components must share one domain decomposition".to_string(),
            ));
        }
        Ok(Self { components })
    }

    pub fn components(&self) -> &[TensorSpace] {
        &self.components
    }

    pub fn zeros(&self) -> BlockVector {
        BlockVector::new(self.components.iter().map(TensorSpace::zeros).collect())
    }
}

/// A scalar or vector-valued discrete space.
#[derive(Debug, Clone, PartialEq)]
pub enum FemSpace {
    Scalar(TensorSpace),
    Vector(VectorSpace),
}

impl From<TensorSpace> for FemSpace {
    fn from(space: TensorSpace) -> Self {
        Self::Scalar(space)
    }
}

impl From<VectorSpace> for FemSpace {
    fn from(space: VectorSpace) -> Self {
        Self::Vector(space)
    }
}

impl FemSpace {
    /// The scalar components; a scalar space has exactly one.
    pub fn components(&self) -> &[TensorSpace] {
        match self {
            Self::Scalar(space) => std::slice::from_ref(space),
            Self::Vector(space) => space.components(),
        }
    }

    pub fn num_components(&self) -> usize {
        self.components().len()
    }

    pub fn ndim(&self) -> usize {
        self.components()[0].ndim()
    }

    pub fn decomposition(&self) -> &Arc<DomainDecomposition> {
        self.components()[0].decomposition()
    }

    pub fn zeros(&self) -> BlockVector {
        BlockVector::new(self.components().iter().map(TensorSpace::zeros).collect())
    }

    /// Whether `vector` has one block per component, laid out like the components.
    pub fn contains(&self, vector: &BlockVector) -> bool {
        vector.num_blocks() == self.num_components()
            && self
                .components()
                .iter()
                .zip(vector.blocks())
                .all(|(space, block)| space.layout().is_compatible(block.layout()))
    }

    /// The form degree this space discretizes, if it is one of the standard spaces.
    pub fn form(&self) -> Option<FormKind> {
        FormKind::classify(self)
    }
}

/// The spaces of the discrete de Rham complex.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormKind {
    /// Scalar, point-evaluating along every axis.
    H1,
    /// Vector-valued, component `i` histopolating along axis `i` only.
    Hcurl,
    /// Vector-valued, component `i` point-evaluating along axis `i` only.
    Hdiv,
    /// Scalar, histopolating along every axis.
    L2,
}

impl FormKind {
    pub fn classify(space: &FemSpace) -> Option<Self> {
        let kinds = |component: &TensorSpace| component.basis_kinds();
        match space {
            FemSpace::Scalar(scalar) => {
                let kinds = kinds(scalar);
                if kinds.iter().all(|&k| k == BasisKind::B) {
                    Some(Self::H1)
                } else if kinds.iter().all(|&k| k == BasisKind::M) {
                    Some(Self::L2)
                } else {
                    None
                }
            }
            FemSpace::Vector(vector) => {
                let components = vector.components();
                let ndim = components[0].ndim();
                if ndim < 2 || components.len() != ndim {
                    return None;
                }
                let matches = |histopolating_on_diagonal: bool| {
                    components.iter().enumerate().all(|(i, component)| {
                        kinds(component).iter().enumerate().all(|(axis, &kind)| {
                            let on_diagonal = axis == i;
                            (kind == BasisKind::M) == (on_diagonal == histopolating_on_diagonal)
                        })
                    })
                };
                if matches(true) {
                    Some(Self::Hcurl)
                } else if matches(false) {
                    Some(Self::Hdiv)
                } else {
                    None
                }
            }
        }
    }
}
