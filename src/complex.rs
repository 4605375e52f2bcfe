//! Assembly of complete discrete de Rham complexes.
use crate::derivatives::{DerivativeKind, DerivativeOperator};
use crate::error::FeecError;
use crate::projector::{GlobalProjector, ProjectorSettings};
use crate::space::{FemSpace, TensorSpace, VectorSpace};
use crate::spline::BasisKind;
use log::info;
use serde::{Deserialize, Serialize};

/// The two complexes available in two dimensions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Sequence2d {
    /// `H1 --grad--> Hcurl --curl--> L2`.
    #[default]
    Curl,
    /// `H1 --curl--> Hdiv --div--> L2`.
    Div,
}

/// A sequence of spaces, the derivatives connecting them and a projector onto each space.
///
/// All spaces are derived from a point-evaluating scalar space by degree reduction:
///
/// - 1D: `H1 -> L2`
/// - 2D: `H1 -> Hcurl -> L2` or `H1 -> Hdiv -> L2`
/// - 3D: `H1 -> Hcurl -> Hdiv -> L2`
#[derive(Debug, Clone)]
pub struct DeRhamComplex {
    spaces: Vec<FemSpace>,
    derivatives: Vec<DerivativeOperator>,
    projectors: Vec<GlobalProjector>,
}

impl DeRhamComplex {
    pub fn new(h1: TensorSpace, settings: ProjectorSettings) -> Result<Self, FeecError> {
        Self::with_sequence(h1, Sequence2d::default(), settings)
    }

    /// Like [`new`](Self::new), choosing the two-dimensional sequence explicitly. The sequence
    /// is ignored in one and three dimensions.
    pub fn with_sequence(h1: TensorSpace, sequence: Sequence2d, settings: ProjectorSettings) -> Result<Self, FeecError> {
        if h1.basis_kinds().iter().any(|&kind| kind != BasisKind::B) {
            return Err(FeecError::IncompatibleSpaces(
                "a de Rham complex starts from a point-evaluating space".to_string(),
            ));
        }
        let ndim = h1.ndim();
        let all_axes: Vec<usize> = (0..ndim).collect();
        let l2 = h1.reduce_degree(&all_axes, BasisKind::M)?;
        // Reduce exactly the axes selected by `axes` in component `i`
        let vector = |axes: &dyn Fn(usize) -> Vec<usize>| -> Result<VectorSpace, FeecError> {
            let components = (0..ndim)
                .map(|i| h1.reduce_degree(&axes(i), BasisKind::M))
                .collect::<Result<_, _>>()?;
            VectorSpace::new(components)
        };
        let hcurl = || vector(&|i| vec![i]);
        let hdiv = || vector(&|i| all_axes.iter().copied().filter(|&a| a != i).collect());

        let (spaces, kinds): (Vec<FemSpace>, Vec<DerivativeKind>) = match ndim {
            1 => (vec![h1.clone().into(), l2.into()], vec![DerivativeKind::Derivative1d]),
            2 => match sequence {
                Sequence2d::Curl => (
                    vec![h1.clone().into(), hcurl()?.into(), l2.into()],
                    vec![DerivativeKind::Gradient, DerivativeKind::ScalarCurl2d],
                ),
                Sequence2d::Div => (
                    vec![h1.clone().into(), hdiv()?.into(), l2.into()],
                    vec![DerivativeKind::VectorCurl2d, DerivativeKind::Divergence],
                ),
            },
            3 => (
                vec![h1.clone().into(), hcurl()?.into(), hdiv()?.into(), l2.into()],
                vec![DerivativeKind::Gradient, DerivativeKind::Curl3d, DerivativeKind::Divergence],
            ),
            _ => {
                return Err(FeecError::IncompatibleSpaces(format!(
                    "no de Rham complex in {ndim} dimensions"
                )))
            }
        };

        let derivatives = kinds
            .iter()
            .zip(spaces.windows(2))
            .map(|(&kind, pair)| DerivativeOperator::new(kind, pair[0].clone(), pair[1].clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let projectors = spaces
            .iter()
            .map(|space| GlobalProjector::new(space.clone(), settings))
            .collect::<Result<Vec<_>, _>>()?;

        info!("Assembled {ndim}D de Rham complex with {} spaces", spaces.len());
        Ok(Self {
            spaces,
            derivatives,
            projectors,
        })
    }

    /// Number of spaces in the complex.
    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    pub fn spaces(&self) -> &[FemSpace] {
        &self.spaces
    }

    pub fn space(&self, k: usize) -> &FemSpace {
        &self.spaces[k]
    }

    /// The derivative from space `k` to space `k + 1`.
    pub fn derivative(&self, k: usize) -> &DerivativeOperator {
        &self.derivatives[k]
    }

    pub fn derivatives(&self) -> &[DerivativeOperator] {
        &self.derivatives
    }

    pub fn projector(&self, k: usize) -> &GlobalProjector {
        &self.projectors[k]
    }

    pub fn projectors(&self) -> &[GlobalProjector] {
        &self.projectors
    }
}
