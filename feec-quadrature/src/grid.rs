//! Quadrature rules replicated over the elements of a one-dimensional grid.

use crate::univariate::gauss;
use crate::Error;

/// A Gauss-Legendre rule mapped onto every element of a grid of breakpoints.
///
/// Points and weights are stored element by element, so the points of element `e` occupy the
/// range `e * k .. (e + 1) * k`, where `k` is the number of points per element.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureGrid {
    points: Vec<f64>,
    weights: Vec<f64>,
    points_per_element: usize,
}

impl QuadratureGrid {
    /// Constructs a grid with `points_per_element` Gauss-Legendre points on every element
    /// `[breaks[e], breaks[e + 1]]`.
    ///
    /// A rule with `k` points integrates polynomials of degree `2k - 1` exactly on each element.
    pub fn new(breaks: &[f64], points_per_element: usize) -> Result<Self, Error> {
        if breaks.len() < 2 || breaks.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(Error::InvalidGrid);
        }
        let (ref_weights, ref_points) = gauss(points_per_element)?;

        let num_elements = breaks.len() - 1;
        let mut points = Vec::with_capacity(num_elements * points_per_element);
        let mut weights = Vec::with_capacity(num_elements * points_per_element);
        for element in breaks.windows(2) {
            let (a, b) = (element[0], element[1]);
            let half_length = 0.5 * (b - a);
            let midpoint = 0.5 * (a + b);
            for (w, xi) in ref_weights.iter().zip(&ref_points) {
                points.push(midpoint + half_length * xi);
                weights.push(half_length * w);
            }
        }

        Ok(Self {
            points,
            weights,
            points_per_element,
        })
    }

    pub fn num_elements(&self) -> usize {
        self.points.len() / self.points_per_element
    }

    pub fn points_per_element(&self) -> usize {
        self.points_per_element
    }

    /// All quadrature points, element by element.
    pub fn points(&self) -> &[f64] {
        &self.points
    }

    /// All quadrature weights, element by element.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// # Panics
    ///
    /// Panics if `element` is out of bounds.
    pub fn element_points(&self, element: usize) -> &[f64] {
        let k = self.points_per_element;
        &self.points[element * k..(element + 1) * k]
    }

    /// # Panics
    ///
    /// Panics if `element` is out of bounds.
    pub fn element_weights(&self, element: usize) -> &[f64] {
        let k = self.points_per_element;
        &self.weights[element * k..(element + 1) * k]
    }

    /// Integrates `f` over every element, returning one value per element.
    pub fn integrate(&self, f: impl Fn(f64) -> f64) -> Vec<f64> {
        self.points
            .chunks_exact(self.points_per_element)
            .zip(self.weights.chunks_exact(self.points_per_element))
            .map(|(points, weights)| points.iter().zip(weights).map(|(&x, w)| w * f(x)).sum::<f64>())
            .collect()
    }
}
