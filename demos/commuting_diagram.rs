//! Measures how well the projectors of a periodic de Rham complex commute with the discrete
//! derivatives, and prints the results as JSON.
//!
//! Run with an optional configuration file:
//!
//! ```text
//! cargo run --release --example commuting_diagram -- config.json
//! ```
//!
//! where `config.json` may override any of the fields of `DemoConfig`, e.g.
//! `{ "ndim": 2, "ncells": 16, "projector": { "quadrature_order": 8 } }`.
use eyre::{eyre, WrapErr};
use feec::complex::{DeRhamComplex, Sequence2d};
use feec::decomposition::DomainDecomposition;
use feec::projector::{FieldFunction, ProjectorSettings};
use feec::space::TensorSpace;
use feec::spline::{uniform_breaks, SplineSpace};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct DemoConfig {
    ndim: usize,
    ncells: usize,
    degree: usize,
    multiplicity: usize,
    periodic: bool,
    sequence: Sequence2d,
    projector: ProjectorSettings,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            ndim: 3,
            ncells: 8,
            degree: 2,
            multiplicity: 1,
            periodic: true,
            sequence: Sequence2d::Curl,
            projector: ProjectorSettings::default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DerivativeReport {
    kind: String,
    commutation_error: f64,
    inverse_residual: f64,
}

#[derive(Debug, Serialize)]
struct Report {
    config: DemoConfig,
    dimensions: Vec<usize>,
    derivatives: Vec<DerivativeReport>,
}

/// A smooth periodic function with a different phase for every component.
fn component_function(component: usize) -> Box<FieldFunction> {
    let phase = 0.25 * component as f64;
    Box::new(move |x: &[f64]| x.iter().map(|&xi| (2.0 * PI * (xi + phase)).sin()).product::<f64>())
}

/// Analytic partial derivative of [`component_function`].
fn component_derivative(component: usize, axis: usize) -> Box<FieldFunction> {
    let phase = 0.25 * component as f64;
    Box::new(move |x: &[f64]| {
        x.iter()
            .enumerate()
            .map(|(a, &xi)| {
                let arg = 2.0 * PI * (xi + phase);
                if a == axis {
                    2.0 * PI * arg.cos()
                } else {
                    arg.sin()
                }
            })
            .product::<f64>()
    })
}

fn main() -> eyre::Result<()> {
    let config: DemoConfig = match std::env::args().nth(1) {
        Some(path) => {
            let file = std::fs::File::open(&path).wrap_err_with(|| format!("failed to open {path}"))?;
            serde_json::from_reader(file).wrap_err("failed to parse demo configuration")?
        }
        None => DemoConfig::default(),
    };

    let ndim = config.ndim;
    let decomposition = Arc::new(DomainDecomposition::serial(
        &vec![config.ncells; ndim],
        &vec![config.periodic; ndim],
    )?);
    let breaks = uniform_breaks(0.0, 1.0, config.ncells);
    let spline = SplineSpace::from_breaks(config.degree, &breaks, config.periodic, config.multiplicity)?;
    let h1 = TensorSpace::new(decomposition, vec![spline; ndim])?;
    let complex = DeRhamComplex::with_sequence(h1, config.sequence, config.projector)?;

    let mut reports = Vec::new();
    for (k, derivative) in complex.derivatives().iter().enumerate() {
        let source_projector = complex.projector(k);
        let target_projector = complex.projector(k + 1);

        // Project the source function and differentiate it
        let sources: Vec<Box<FieldFunction>> = (0..source_projector.space().num_components())
            .map(component_function)
            .collect();
        let source_refs: Vec<&FieldFunction> = sources.iter().map(|f| &**f).collect();
        let mut projected = source_projector.project(&source_refs)?;
        let lhs = derivative.apply_field(&mut projected)?;

        // Project the analytic derivative, assembled from the same difference terms
        let targets: Vec<Box<FieldFunction>> = (0..target_projector.space().num_components())
            .map(|target| {
                let terms: Vec<(f64, Box<FieldFunction>)> = derivative
                    .terms()
                    .iter()
                    .filter(|term| term.target == target)
                    .map(|term| (term.sign, component_derivative(term.source, term.axis)))
                    .collect();
                Box::new(move |x: &[f64]| terms.iter().map(|(sign, f)| sign * f(x)).sum::<f64>())
                    as Box<FieldFunction>
            })
            .collect();
        let target_refs: Vec<&FieldFunction> = targets.iter().map(|f| &**f).collect();
        let rhs = target_projector.project(&target_refs)?;

        let mut difference = lhs.coefficients() - rhs.coefficients();
        difference.update_ghost_regions()?;
        let commutation_error = difference.max_abs()?;
        let inverse_residual = target_projector.inverse_residual(rhs.coefficients())?;
        if !commutation_error.is_finite() {
            return Err(eyre!("{:?} produced a non-finite error", derivative.kind()));
        }

        reports.push(DerivativeReport {
            kind: format!("{:?}", derivative.kind()),
            commutation_error,
            inverse_residual,
        });
    }

    let report = Report {
        dimensions: complex
            .spaces()
            .iter()
            .map(|space| space.components().iter().map(TensorSpace::dim).sum::<usize>())
            .collect(),
        config,
        derivatives: reports,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
