//! Error types shared by all parts of the library.
use crate::spline::BasisKind;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Errors produced while building or applying projectors and derivative operators.
///
/// Every error is fatal for the call that produced it: no operation in this crate leaves a
/// partially updated coefficient vector behind.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum FeecError {
    /// The number of supplied functions does not match the number of components of the space.
    ArityMismatch { expected: usize, actual: usize },
    /// The basis kind cannot be used with the given degree.
    UnsupportedBasis { degree: usize, basis: BasisKind },
    /// The knot sequence or breakpoints do not describe a valid spline space.
    InvalidKnots(String),
    /// Two spaces that are required to be related (for example source and target of a
    /// derivative) are not.
    IncompatibleSpaces(String),
    /// The ghost regions are narrower than the stencil of an operator requires.
    InsufficientGhostWidth { required: usize, available: usize },
    /// The interpolation or histopolation matrix along an axis is singular to working precision.
    SingularMatrix { component: usize, axis: usize },
    /// The domain cannot be partitioned as requested.
    InvalidDecomposition(String),
    /// A collective operation failed.
    Communication(String),
    /// Ghost regions were read before being synchronized.
    GhostsOutOfSync,
    /// A coefficient is neither owned nor part of the ghost region of this worker.
    NonLocalCoefficient { axis: usize, index: usize },
    /// A quadrature rule could not be constructed.
    Quadrature(feec_quadrature::Error),
}

impl FeecError {
    /// Attributes an error raised for a scalar space to the given vector component.
    pub(crate) fn in_component(self, component: usize) -> Self {
        match self {
            Self::SingularMatrix { axis, .. } => Self::SingularMatrix { component, axis },
            other => other,
        }
    }
}

impl Display for FeecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArityMismatch { expected, actual } => {
                write!(
                    f,
                    "Expected one function per component ({expected}), but {actual} were supplied"
                )
            }
            Self::UnsupportedBasis { degree, basis } => {
                write!(f, "Basis kind {basis:?} is not supported for degree {degree}")
            }
            Self::InvalidKnots(msg) => write!(f, "Invalid knot sequence: {msg}"),
            Self::IncompatibleSpaces(msg) => write!(f, "Incompatible spaces: {msg}"),
            Self::InsufficientGhostWidth { required, available } => {
                write!(
                    f,
                    "Ghost width {available} is smaller than the required stencil half-width {required}"
                )
            }
            Self::SingularMatrix { component, axis } => {
                write!(
                    f,
                    "The projection matrix of component {component} along axis {axis} is singular"
                )
            }
            Self::InvalidDecomposition(msg) => write!(f, "Invalid domain decomposition: {msg}"),
            Self::Communication(msg) => write!(f, "Communication failure: {msg}"),
            Self::GhostsOutOfSync => {
                write!(f, "Ghost regions must be updated before this operation")
            }
            Self::NonLocalCoefficient { axis, index } => {
                write!(
                    f,
                    "Coefficient {index} along axis {axis} is not available on this worker"
                )
            }
            Self::Quadrature(err) => write!(f, "Quadrature failure: {err}"),
        }
    }
}

impl Error for FeecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Quadrature(err) => Some(err),
            _ => None,
        }
    }
}

impl From<feec_quadrature::Error> for FeecError {
    fn from(err: feec_quadrature::Error) -> Self {
        Self::Quadrature(err)
    }
}
