use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Poor man's approx assertion for slices of coefficients
#[macro_export]
macro_rules! assert_approx_slice_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let x: &[f64] = &$x;
        let y: &[f64] = &$y;
        assert_eq!(x.len(), y.len(), "slices must have the same length");

        let max_absdiff = $crate::max_abs_diff(x, y);
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {:?}", x);
            println!("right: {:?}", y);
            println!("max absdiff: {:e}", max_absdiff);
        }
        assert!(approx_eq);
    }};
}

pub fn max_abs_diff(x: &[f64], y: &[f64]) -> f64 {
    x.iter()
        .zip(y)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max)
}

/// The dense Kronecker product `A ⊗ B`, used as a reference for structured operators.
pub fn kronecker_product(a: &DMatrix<f64>, b: &DMatrix<f64>) -> DMatrix<f64> {
    let (ra, ca) = a.shape();
    let (rb, cb) = b.shape();
    DMatrix::from_fn(ra * rb, ca * cb, |i, j| a[(i / rb, j / cb)] * b[(i % rb, j % cb)])
}

/// Seeded pseudo-random values in `[-1, 1)`, reproducible across workers and runs.
pub fn pseudo_random_values(seed: u64, len: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
}
