//! Commuting projectors and discrete derivatives on tensor-product spline spaces.
//!
//! This crate discretizes scalar and vector fields on the logical domain `[0, 1]^d`,
//! `d ∈ {1, 2, 3}`, into coefficients of tensor-product spline spaces that form a discrete
//! de Rham complex. The central guarantee is that projection commutes with differentiation:
//! projecting a field and applying a [`DerivativeOperator`](derivatives::DerivativeOperator)
//! yields the same coefficients as projecting the exact derivative of the field.
//!
//! The main building blocks are
//!
//! - [`spline::SplineSpace`]: one-dimensional B-spline (point-evaluating) and M-spline
//!   (histopolating) spaces,
//! - [`space::TensorSpace`] and [`space::VectorSpace`]: their tensor and vector compositions,
//!   distributed over workers by a [`decomposition::DomainDecomposition`],
//! - [`projector::GlobalProjector`]: interpolation/histopolation onto a space, solved with a
//!   Kronecker-structured solver,
//! - [`derivatives::DerivativeOperator`]: the exact gradient, curl and divergence,
//! - [`complex::DeRhamComplex`]: all of the above, assembled for a given dimension.
//!
//! Communication between workers is explicit: every decomposition carries a
//! [`comm::Communicator`], and all operations that communicate are documented as collective.

pub mod comm;
pub mod complex;
pub mod decomposition;
pub mod derivatives;
pub mod error;
pub mod field;
pub mod kronecker;
pub mod projector;
pub mod space;
pub mod spline;
pub mod stencil;
pub mod util;

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate feec_quadrature as quadrature;
pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use error::FeecError;
