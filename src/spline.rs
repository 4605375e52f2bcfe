//! One-dimensional spline spaces.
//!
//! A [`SplineSpace`] is described by its degree, a knot sequence, a periodicity flag and a
//! [`BasisKind`]. Point-evaluating spaces use the usual B-spline basis; histopolating spaces use
//! the same splines rescaled to unit integral (sometimes called M-splines or Curry-Schoenberg
//! splines). The scaling is what makes the derivative of a B-spline expansion an exact,
//! knot-independent difference of coefficients in the companion M-spline space.
use crate::error::FeecError;
use feec_quadrature::{QuadratureGrid, Rule};
use itertools::Itertools;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Relative tolerance used when comparing knot values.
const KNOT_TOLERANCE: f64 = 1e-12;

/// Kind of a spline basis.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasisKind {
    /// Point-evaluating B-splines, whose degrees of freedom are point values at the Greville
    /// abscissae.
    B,
    /// Histopolating M-splines of unit integral, whose degrees of freedom are integrals over the
    /// intervals of the histopolation grid.
    M,
}

/// `ncells + 1` equidistant breakpoints on `[start, end]`.
pub fn uniform_breaks(start: f64, end: f64, ncells: usize) -> Vec<f64> {
    (0..=ncells)
        .map(|i| {
            if i == ncells {
                end
            } else {
                start + (end - start) * (i as f64) / (ncells as f64)
            }
        })
        .collect()
}

/// Builds the knot sequence of a spline space of the given degree on a grid of breakpoints.
///
/// Every interior breakpoint is repeated `multiplicity` times, so the splines are
/// `C^(degree - multiplicity)` across cell interfaces. Non-periodic sequences are clamped,
/// that is the end points are repeated `degree + 1` times. Periodic sequences extend the grid
/// periodically by `degree` knots on each side.
pub fn make_knots(breaks: &[f64], degree: usize, periodic: bool, multiplicity: usize) -> Result<Vec<f64>, FeecError> {
    if breaks.len() < 2 || breaks.windows(2).any(|w| !(w[0] < w[1])) {
        return Err(FeecError::InvalidKnots(
            "breakpoints must be strictly increasing and describe at least one cell".to_string(),
        ));
    }
    if degree == 0 {
        return Err(FeecError::UnsupportedBasis {
            degree,
            basis: BasisKind::B,
        });
    }
    if multiplicity == 0 || multiplicity > degree {
        return Err(FeecError::InvalidKnots(format!(
            "interior multiplicity {multiplicity} must lie between 1 and the degree {degree}"
        )));
    }

    let ncells = breaks.len() - 1;
    let first = breaks[0];
    let last = breaks[ncells];

    if periodic {
        let length = last - first;
        let base: Vec<f64> = breaks[..ncells]
            .iter()
            .flat_map(|&x| std::iter::repeat(x).take(multiplicity))
            .collect();
        let n = base.len();
        if n <= degree {
            return Err(FeecError::InvalidKnots(format!(
                "a periodic space of degree {degree} needs more than {degree} basis functions, got {n}"
            )));
        }
        // Knot `degree` is the last copy of the first breakpoint
        let knots = (0..n + 2 * degree + 1)
            .map(|k| {
                let shifted = k as isize - degree as isize + multiplicity as isize - 1;
                let period = shifted.div_euclid(n as isize);
                let r = shifted.rem_euclid(n as isize) as usize;
                base[r] + length * period as f64
            })
            .collect();
        Ok(knots)
    } else {
        let mut knots = vec![first; degree + 1];
        for &x in &breaks[1..ncells] {
            knots.extend(std::iter::repeat(x).take(multiplicity));
        }
        knots.extend(std::iter::repeat(last).take(degree + 1));
        Ok(knots)
    }
}

/// A one-dimensional spline space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplineSpace {
    degree: usize,
    knots: Vec<f64>,
    periodic: bool,
    basis: BasisKind,
    nbasis: usize,
    /// Distinct knots inside the domain, including its end points.
    breaks: Vec<f64>,
}

impl SplineSpace {
    pub fn new(degree: usize, knots: Vec<f64>, periodic: bool, basis: BasisKind) -> Result<Self, FeecError> {
        if basis == BasisKind::B && degree == 0 {
            return Err(FeecError::UnsupportedBasis { degree, basis });
        }
        if knots.len() < 2 * degree + 2 {
            return Err(FeecError::InvalidKnots(format!(
                "{} knots are too few for degree {degree}",
                knots.len()
            )));
        }
        if knots.iter().any(|t| !t.is_finite()) || knots.windows(2).any(|w| w[1] < w[0]) {
            return Err(FeecError::InvalidKnots(
                "knots must be finite and non-decreasing".to_string(),
            ));
        }

        let n_ext = knots.len() - degree - 1;
        let (start, end) = (knots[degree], knots[n_ext]);
        if !(start < end) {
            return Err(FeecError::InvalidKnots("the domain is empty".to_string()));
        }
        let tol = KNOT_TOLERANCE * (end - start);

        let max_multiplicity = match basis {
            BasisKind::B => degree,
            BasisKind::M => degree + 1,
        };
        let interior_multiplicity = knots
            .iter()
            .filter(|&&t| t > start + tol && t < end - tol)
            .dedup_by_with_count(|a, b| (*a - *b).abs() <= tol)
            .map(|(count, _)| count)
            .max()
            .unwrap_or(0);
        if interior_multiplicity > max_multiplicity {
            return Err(FeecError::InvalidKnots(format!(
                "interior knot multiplicity {interior_multiplicity} exceeds {max_multiplicity}"
            )));
        }

        let nbasis = if periodic {
            let n = n_ext - degree;
            let length = end - start;
            let consistent = (0..knots.len() - n).all(|k| (knots[k + n] - knots[k] - length).abs() <= tol);
            if !consistent {
                return Err(FeecError::InvalidKnots(
                    "periodic knots do not repeat with the period of the domain".to_string(),
                ));
            }
            n
        } else {
            let clamped = knots[..=degree].iter().all(|&t| t == start) && knots[n_ext..].iter().all(|&t| t == end);
            if !clamped {
                return Err(FeecError::InvalidKnots(format!(
                    "non-periodic knots must repeat each end point {} times",
                    degree + 1
                )));
            }
            n_ext
        };

        let breaks = knots[degree..=n_ext]
            .iter()
            .copied()
            .dedup_by(|a, b| (*a - *b).abs() <= tol)
            .collect();

        Ok(Self {
            degree,
            knots,
            periodic,
            basis,
            nbasis,
            breaks,
        })
    }

    /// A point-evaluating space on the given breakpoints, with interior knots repeated
    /// `multiplicity` times.
    pub fn from_breaks(degree: usize, breaks: &[f64], periodic: bool, multiplicity: usize) -> Result<Self, FeecError> {
        let knots = make_knots(breaks, degree, periodic, multiplicity)?;
        Self::new(degree, knots, periodic, BasisKind::B)
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    pub fn periodic(&self) -> bool {
        self.periodic
    }

    pub fn basis(&self) -> BasisKind {
        self.basis
    }

    /// Number of basis functions.
    pub fn nbasis(&self) -> usize {
        self.nbasis
    }

    /// Distinct knots inside the domain, including both end points.
    pub fn breaks(&self) -> &[f64] {
        &self.breaks
    }

    pub fn ncells(&self) -> usize {
        self.breaks.len() - 1
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.knots[self.degree], self.knots[self.num_extended()])
    }

    /// Number of basis functions before periodic identification.
    fn num_extended(&self) -> usize {
        self.knots.len() - self.degree - 1
    }

    fn tolerance(&self) -> f64 {
        let (start, end) = self.domain();
        KNOT_TOLERANCE * (end - start)
    }

    /// Maps a point into the domain: periodic spaces wrap around, others clamp.
    pub fn wrap(&self, x: f64) -> f64 {
        let (start, end) = self.domain();
        if self.periodic {
            let wrapped = start + (x - start).rem_euclid(end - start);
            if wrapped >= end {
                start
            } else {
                wrapped
            }
        } else {
            x.clamp(start, end)
        }
    }

    /// Index `k` of the knot span `[T[k], T[k + 1])` containing `x`, for `x` inside the domain.
    ///
    /// The right end point of the domain belongs to the last non-empty span.
    pub fn find_span(&self, x: f64) -> usize {
        let p = self.degree;
        let count = self.knots[p..self.num_extended()].partition_point(|&t| t <= x);
        p + count.saturating_sub(1)
    }

    /// Evaluates the `degree + 1` basis functions that may be non-zero at `x`.
    ///
    /// `x` is wrapped into the domain first. The values are written to `values`, and the
    /// (unwrapped) index of the first of these basis functions is returned.
    ///
    /// # Panics
    ///
    /// Panics if `values` has fewer than `degree + 1` entries.
    pub fn basis_values(&self, x: f64, values: &mut [f64]) -> usize {
        let p = self.degree;
        let t = &self.knots;
        let x = self.wrap(x);
        let span = self.find_span(x);

        let mut left = vec![0.0; p + 1];
        let mut right = vec![0.0; p + 1];
        values[0] = 1.0;
        for j in 1..=p {
            left[j] = x - t[span + 1 - j];
            right[j] = t[span + j] - x;
            let mut saved = 0.0;
            for r in 0..j {
                let tmp = values[r] / (right[r + 1] + left[j - r]);
                values[r] = saved + right[r + 1] * tmp;
                saved = left[j - r] * tmp;
            }
            values[j] = saved;
        }

        let first = span - p;
        if self.basis == BasisKind::M {
            for (r, value) in values[..=p].iter_mut().enumerate() {
                let i = first + r;
                *value *= (p + 1) as f64 / (t[i + p + 1] - t[i]);
            }
        }
        first
    }

    /// The basis functions that may be non-zero at `x`, as `(index, value)` pairs.
    ///
    /// For periodic spaces the indices are reduced modulo the number of basis functions, so the
    /// same index may occur more than once when the space has very few basis functions.
    pub fn nonzero_basis(&self, x: f64) -> Vec<(usize, f64)> {
        let mut values = vec![0.0; self.degree + 1];
        let first = self.basis_values(x, &mut values);
        values
            .into_iter()
            .enumerate()
            .map(|(r, value)| ((first + r) % self.nbasis, value))
            .collect()
    }

    /// Evaluates the spline with the given coefficients at `x`.
    ///
    /// # Panics
    ///
    /// Panics if the number of coefficients differs from the number of basis functions.
    pub fn evaluate(&self, coefficients: &[f64], x: f64) -> f64 {
        assert_eq!(coefficients.len(), self.nbasis, "one coefficient per basis function");
        self.nonzero_basis(x)
            .into_iter()
            .map(|(i, value)| coefficients[i] * value)
            .sum()
    }

    /// Greville abscissae, one per basis function, wrapped into the domain.
    pub fn greville(&self) -> Vec<f64> {
        let p = self.degree;
        let t = &self.knots;
        (0..self.nbasis)
            .map(|i| {
                let g = if p == 0 {
                    0.5 * (t[i] + t[i + 1])
                } else {
                    t[i + 1..=i + p].iter().sum::<f64>() / p as f64
                };
                self.wrap(g)
            })
            .collect()
    }

    /// The `nbasis + 1` points bounding the histopolation intervals.
    ///
    /// Point `i` is the average of the knots `T[i..=i + degree]`. For periodic spaces the last
    /// point equals the first shifted by one period, and the first point may lie outside the
    /// domain.
    pub fn histopolation_grid(&self) -> Vec<f64> {
        let p = self.degree;
        (0..=self.nbasis)
            .map(|i| self.knots[i..=i + p].iter().sum::<f64>() / (p + 1) as f64)
            .collect()
    }

    /// Quadrature rules for the histopolation intervals, one rule per basis function.
    ///
    /// Each interval is split at the knots it contains, and every piece receives a
    /// Gauss-Legendre rule with `quadrature_order` points, so the integrand is polynomial on
    /// every piece. Points are wrapped into the domain.
    pub fn histopolation_rules(&self, quadrature_order: usize) -> Result<Vec<Rule>, FeecError> {
        let tol = self.tolerance();
        let knots: Vec<f64> = self
            .knots
            .iter()
            .copied()
            .dedup_by(|a, b| (*a - *b).abs() <= tol)
            .collect();
        self.histopolation_grid()
            .windows(2)
            .map(|interval| {
                let (a, b) = (interval[0], interval[1]);
                let mut cuts = vec![a];
                cuts.extend(knots.iter().filter(|&&t| t > a + tol && t < b - tol));
                cuts.push(b);
                let grid = QuadratureGrid::new(&cuts, quadrature_order)?;
                let points = grid.points().iter().map(|&x| self.wrap(x)).collect();
                Ok((grid.weights().to_vec(), points))
            })
            .collect()
    }

    /// The matrix `A[(i, j)] = B_j(g_i)` of basis functions evaluated at the Greville abscissae.
    pub fn collocation_matrix(&self) -> DMatrix<f64> {
        let n = self.nbasis;
        let mut matrix = DMatrix::zeros(n, n);
        for (i, g) in self.greville().into_iter().enumerate() {
            for (j, value) in self.nonzero_basis(g) {
                matrix[(i, j)] += value;
            }
        }
        matrix
    }

    /// The matrix `H[(i, j)]` of integrals of basis function `j` over histopolation interval `i`.
    pub fn histopolation_matrix(&self, quadrature_order: usize) -> Result<DMatrix<f64>, FeecError> {
        let n = self.nbasis;
        let mut matrix = DMatrix::zeros(n, n);
        for (i, (weights, points)) in self.histopolation_rules(quadrature_order)?.iter().enumerate() {
            for (w, &x) in weights.iter().zip(points) {
                for (j, value) in self.nonzero_basis(x) {
                    matrix[(i, j)] += w * value;
                }
            }
        }
        Ok(matrix)
    }

    /// The square matrix mapping coefficients to degrees of freedom: the collocation matrix for
    /// point-evaluating spaces and the histopolation matrix for histopolating spaces.
    pub fn dof_matrix(&self, quadrature_order: usize) -> Result<DMatrix<f64>, FeecError> {
        match self.basis {
            BasisKind::B => Ok(self.collocation_matrix()),
            BasisKind::M => self.histopolation_matrix(quadrature_order),
        }
    }

    /// The histopolating space of one degree lower on the same breakpoints.
    ///
    /// The derivative of any spline in `self` lies in the reduced space, and its coefficients are
    /// the differences of consecutive coefficients of `self`.
    pub fn reduce_degree(&self) -> Result<Self, FeecError> {
        if self.degree == 0 {
            return Err(FeecError::UnsupportedBasis {
                degree: self.degree,
                basis: self.basis,
            });
        }
        let knots = self.knots[1..self.knots.len() - 1].to_vec();
        Self::new(self.degree - 1, knots, self.periodic, BasisKind::M)
    }

    /// The cell each basis function is assigned to for the purpose of distributing coefficients.
    ///
    /// Basis function `i` is anchored at knot `T[i + degree]`. A space and its degree-reduced
    /// companion share the anchors of their common basis functions.
    pub fn anchor_cells(&self) -> Vec<usize> {
        let tol = self.tolerance();
        let ncells = self.ncells();
        (0..self.nbasis)
            .map(|i| {
                let t = self.knots[i + self.degree];
                self.breaks[..ncells]
                    .partition_point(|&b| b <= t + tol)
                    .saturating_sub(1)
            })
            .collect()
    }
}
