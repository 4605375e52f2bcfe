use crate::spline::SplineSpace;
use ::proptest::collection::vec;
use ::proptest::prelude::*;

/// Parameters for generating arbitrary point-evaluating spline spaces on `[0, 1]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SplineSpaceParams {
    pub max_degree: usize,
    pub max_cells: usize,
}

impl Default for SplineSpaceParams {
    fn default() -> Self {
        Self {
            max_degree: 3,
            max_cells: 10,
        }
    }
}

/// Strictly increasing breakpoints from 0 to 1 with cells of varying size.
pub fn breaks(ncells: usize) -> impl Strategy<Value = Vec<f64>> {
    // Keep the ratio between the largest and smallest cell bounded, so that the
    // interpolation matrices stay well conditioned
    vec(0.5..2.0, ncells).prop_map(|lengths| {
        let total: f64 = lengths.iter().sum();
        let mut breaks = Vec::with_capacity(lengths.len() + 1);
        let mut x = 0.0;
        breaks.push(x);
        for length in &lengths[..lengths.len() - 1] {
            x += length / total;
            breaks.push(x);
        }
        breaks.push(1.0);
        breaks
    })
}

/// Coefficient values of moderate magnitude.
pub fn coefficients(len: usize) -> impl Strategy<Value = Vec<f64>> {
    vec(-1.0..1.0, len)
}

impl Arbitrary for SplineSpace {
    type Parameters = SplineSpaceParams;
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(params: Self::Parameters) -> Self::Strategy {
        (1..=params.max_degree, any::<bool>())
            .prop_flat_map(move |(degree, periodic)| {
                // Periodic spaces need more basis functions than their degree
                let min_cells = degree + 1;
                let ncells = min_cells..=params.max_cells.max(min_cells);
                (Just(degree), Just(periodic), 1..=degree, ncells.prop_flat_map(breaks))
            })
            .prop_map(|(degree, periodic, multiplicity, breaks)| {
                SplineSpace::from_breaks(degree, &breaks, periodic, multiplicity)
                    .expect("generated parameters always describe a valid space")
            })
            .boxed()
    }
}
