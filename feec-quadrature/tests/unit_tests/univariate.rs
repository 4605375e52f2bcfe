use feec_quadrature::univariate::{gauss, gauss_on_interval};
use feec_quadrature::{integrate, Error};

use matrixcompare::assert_scalar_eq;

#[test]
fn gauss_rules_satisfy_expected_accuracy() {
    for n in 1..=64 {
        let expected_polynomial_degree = 2 * n - 1;
        let rule = gauss(n).unwrap();

        assert!(rule.0.iter().all(|&w| w > 0.0));
        assert!(rule.1.windows(2).all(|x| x[0] < x[1]));

        for alpha in 0..=expected_polynomial_degree as i32 {
            let monomial_integral = (1.0 - (-1.0f64).powi(alpha + 1)) / (alpha as f64 + 1.0);
            let estimated_integral = integrate(&rule, |x| x.powi(alpha));
            assert_scalar_eq!(estimated_integral, monomial_integral, comp = abs, tol = 1e-14);
        }
    }
}

#[test]
fn gauss_rule_without_points_is_rejected() {
    assert_eq!(gauss(0), Err(Error::EmptyRule));
}

#[test]
fn gauss_rules_on_intervals_integrate_polynomials() {
    let (a, b) = (0.25, 1.75);
    for n in 1..=8 {
        let rule = gauss_on_interval(n, a, b).unwrap();
        assert!(rule.1.iter().all(|&x| a < x && x < b));
        for alpha in 0..=(2 * n - 1) as i32 {
            let exact = (b.powi(alpha + 1) - a.powi(alpha + 1)) / (alpha as f64 + 1.0);
            let tol = 1e-13 * exact.abs().max(1.0);
            assert_scalar_eq!(integrate(&rule, |x| x.powi(alpha)), exact, comp = abs, tol = tol);
        }
    }
}
