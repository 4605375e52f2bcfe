//! Gauss-Legendre rules for the reference interval `[-1, 1]`, and their affine images.

use crate::{Error, Rule};
use std::f64::consts::PI;

/// Newton iterations are stopped once the update falls below this threshold.
const ROOT_TOLERANCE: f64 = 1e-15;

/// Newton converges quadratically from the Chebyshev-like initial guess, so this is never reached
/// in practice. It only guards against cycling between two floating-point neighbors.
const MAX_NEWTON_ITERATIONS: usize = 100;

/// Value and derivative of the Legendre polynomial `P_n` at `x`.
///
/// Uses the three-term recurrence
///
/// ```text
/// m P_m(x) = (2m - 1) x P_{m-1}(x) - (m - 1) P_{m-2}(x),
/// ```
///
/// and the derivative identity `(x^2 - 1) P_n'(x) = n (x P_n(x) - P_{n-1}(x))`. The derivative is
/// therefore only valid in the open interval `(-1, 1)`, which is where all roots live.
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let (mut p_current, mut p_previous) = (1.0, 0.0);
    for m in 1..=n {
        let m = m as f64;
        let p_next = ((2.0 * m - 1.0) * x * p_current - (m - 1.0) * p_previous) / m;
        p_previous = p_current;
        p_current = p_next;
    }
    let n = n as f64;
    let derivative = n * (x * p_current - p_previous) / (x * x - 1.0);
    (p_current, derivative)
}

/// Gauss-Legendre quadrature with `num_points` points on `[-1, 1]`.
///
/// A rule with `n` points integrates polynomials of degree up to `2n - 1` exactly. Points are
/// returned in ascending order.
pub fn gauss(num_points: usize) -> Result<Rule, Error> {
    let n = num_points;
    if n == 0 {
        return Err(Error::EmptyRule);
    }

    // Roots are symmetric about the origin, so only half of them are computed
    let half = (n + 1) / 2;
    let mut points = vec![0.0; n];
    let mut weights = vec![0.0; n];

    for i in 0..half {
        // cos(..) gives the i-th largest root, we store it mirrored at the front
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        for _ in 0..MAX_NEWTON_ITERATIONS {
            let (p, dp) = legendre(n, x);
            let dx = p / dp;
            x -= dx;
            if dx.abs() <= ROOT_TOLERANCE {
                break;
            }
        }
        let derivative = legendre(n, x).1;

        let w = 2.0 / ((1.0 - x * x) * derivative * derivative);
        points[i] = -x;
        weights[i] = w;
        points[n - 1 - i] = x;
        weights[n - 1 - i] = w;
    }

    // For odd n the middle root is exactly zero
    if n % 2 == 1 {
        points[n / 2] = 0.0;
    }

    Ok((weights, points))
}

/// Gauss-Legendre quadrature with `num_points` points on the interval `[a, b]`.
pub fn gauss_on_interval(num_points: usize, a: f64, b: f64) -> Result<Rule, Error> {
    let (weights, points) = gauss(num_points)?;
    Ok(map_to_interval((weights, points), a, b))
}

/// Maps a rule on `[-1, 1]` affinely onto `[a, b]`.
pub fn map_to_interval(rule: Rule, a: f64, b: f64) -> Rule {
    let (mut weights, mut points) = rule;
    let half_length = 0.5 * (b - a);
    let midpoint = 0.5 * (a + b);
    for (w, x) in weights.iter_mut().zip(points.iter_mut()) {
        *w *= half_length;
        *x = midpoint + half_length * *x;
    }
    (weights, points)
}
