//! Quadrature rules for one-dimensional element grids.
//!
//! The main purpose of this crate is to support the `feec` projectors, which need to integrate
//! analytic functions against spline bases on arbitrary (refined) partitions of an interval.
//! All rules are built from Gauss-Legendre rules on the reference interval `[-1, 1]`, which are
//! then mapped affinely onto each element of a grid.
//!
//! The crate is deliberately small and stateless: a rule is a pair of weights and points, and a
//! [`QuadratureGrid`](grid::QuadratureGrid) is simply such a rule replicated on every element of
//! a grid of breakpoints.

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod grid;
pub mod univariate;

pub use grid::QuadratureGrid;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A rule with zero points was requested.
    EmptyRule,
    /// The element grid is not a strictly increasing sequence of at least two breakpoints.
    InvalidGrid,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRule => write!(f, "A quadrature rule needs at least one point"),
            Self::InvalidGrid => {
                write!(
                    f,
                    "Element grids must consist of at least two strictly increasing breakpoints"
                )
            }
        }
    }
}

impl std::error::Error for Error {}

/// A one-dimensional rule, stored as `(weights, points)`.
pub type Rule = (Vec<f64>, Vec<f64>);

/// Approximates the integral of `f` with the given rule.
pub fn integrate(rule: &Rule, f: impl Fn(f64) -> f64) -> f64 {
    let (weights, points) = rule;
    weights.iter().zip(points).map(|(w, &x)| w * f(x)).sum()
}
