use feec::quadrature::QuadratureGrid;
use feec::spline::{make_knots, uniform_breaks, BasisKind, SplineSpace};
use feec::FeecError;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::DMatrix;
use proptest::prelude::*;

fn integrate_over_domain(space: &SplineSpace, f: impl Fn(f64) -> f64) -> f64 {
    let grid = QuadratureGrid::new(space.breaks(), space.degree() + 2).unwrap();
    grid.integrate(f).iter().sum()
}

#[test]
fn clamped_knots() {
    let breaks = uniform_breaks(0.0, 1.0, 4);
    let knots = make_knots(&breaks, 2, false, 1).unwrap();
    assert_eq!(knots, vec![0.0, 0.0, 0.0, 0.25, 0.5, 0.75, 1.0, 1.0, 1.0]);

    let knots = make_knots(&breaks, 3, false, 2).unwrap();
    assert_eq!(
        knots,
        vec![0.0, 0.0, 0.0, 0.0, 0.25, 0.25, 0.5, 0.5, 0.75, 0.75, 1.0, 1.0, 1.0, 1.0]
    );
}

#[test]
fn periodic_knots() {
    let breaks = uniform_breaks(0.0, 1.0, 4);
    let knots = make_knots(&breaks, 2, true, 1).unwrap();
    assert_eq!(knots, vec![-0.5, -0.25, 0.0, 0.25, 0.5, 0.75, 1.0, 1.25, 1.5]);

    // Knot `degree` is the last copy of the first breakpoint
    let knots = make_knots(&breaks, 2, true, 2).unwrap();
    assert_eq!(knots.len(), 8 + 2 * 2 + 1);
    assert_eq!(&knots[..5], &[-0.25, 0.0, 0.0, 0.25, 0.25]);
    assert_eq!(knots[2 + 8], 1.0);
}

#[test]
fn invalid_knot_parameters_are_rejected() {
    let breaks = uniform_breaks(0.0, 1.0, 4);
    assert!(matches!(make_knots(&breaks, 2, false, 0), Err(FeecError::InvalidKnots(_))));
    assert!(matches!(make_knots(&breaks, 2, false, 3), Err(FeecError::InvalidKnots(_))));
    assert!(matches!(
        make_knots(&[0.0, 0.5, 0.5, 1.0], 2, false, 1),
        Err(FeecError::InvalidKnots(_))
    ));
    assert!(matches!(make_knots(&[0.0], 2, false, 1), Err(FeecError::InvalidKnots(_))));
    // Too few cells for a periodic cubic space
    assert!(matches!(
        make_knots(&uniform_breaks(0.0, 1.0, 3), 3, true, 1),
        Err(FeecError::InvalidKnots(_))
    ));
    assert_eq!(
        make_knots(&breaks, 0, false, 1),
        Err(FeecError::UnsupportedBasis {
            degree: 0,
            basis: BasisKind::B
        })
    );
}

#[test]
fn invalid_spaces_are_rejected() {
    assert_eq!(
        SplineSpace::new(0, vec![0.0, 0.5, 1.0], false, BasisKind::B),
        Err(FeecError::UnsupportedBasis {
            degree: 0,
            basis: BasisKind::B
        })
    );
    // Not clamped
    assert!(matches!(
        SplineSpace::new(2, vec![0.0, 0.0, 0.1, 0.5, 1.0, 1.0, 1.0], false, BasisKind::B),
        Err(FeecError::InvalidKnots(_))
    ));
    // Decreasing
    assert!(matches!(
        SplineSpace::new(1, vec![0.0, 0.0, 0.6, 0.5, 1.0, 1.0], false, BasisKind::B),
        Err(FeecError::InvalidKnots(_))
    ));
    // Interior multiplicity exceeds the degree of a B-spline space
    assert!(matches!(
        SplineSpace::new(1, vec![0.0, 0.0, 0.5, 0.5, 1.0, 1.0], false, BasisKind::B),
        Err(FeecError::InvalidKnots(_))
    ));
    // Periodic knots that do not repeat
    assert!(matches!(
        SplineSpace::new(1, vec![-0.3, 0.0, 0.5, 1.0, 1.5], true, BasisKind::B),
        Err(FeecError::InvalidKnots(_))
    ));
}

#[test]
fn basis_counts() {
    let breaks = uniform_breaks(0.0, 1.0, 8);
    for &(degree, periodic, multiplicity, expected) in &[
        (2, false, 1, 10),
        (3, false, 1, 11),
        (3, false, 2, 18),
        (2, true, 1, 8),
        (3, true, 2, 16),
    ] {
        let space = SplineSpace::from_breaks(degree, &breaks, periodic, multiplicity).unwrap();
        assert_eq!(space.nbasis(), expected);
        assert_eq!(space.ncells(), 8);
        assert_eq!(space.domain(), (0.0, 1.0));

        let reduced = space.reduce_degree().unwrap();
        assert_eq!(reduced.basis(), BasisKind::M);
        assert_eq!(reduced.degree(), degree - 1);
        let expected_reduced = if periodic { expected } else { expected - 1 };
        assert_eq!(reduced.nbasis(), expected_reduced);
        assert_eq!(reduced.breaks(), space.breaks());
    }
}

#[test]
fn reducing_piecewise_constants_fails() {
    let breaks = uniform_breaks(0.0, 1.0, 4);
    let constants = SplineSpace::from_breaks(1, &breaks, false, 1)
        .unwrap()
        .reduce_degree()
        .unwrap();
    assert_eq!(constants.degree(), 0);
    assert_eq!(
        constants.reduce_degree(),
        Err(FeecError::UnsupportedBasis {
            degree: 0,
            basis: BasisKind::M
        })
    );
}

#[test]
fn find_span_handles_domain_end() {
    let space = SplineSpace::from_breaks(2, &uniform_breaks(0.0, 1.0, 4), false, 1).unwrap();
    assert_eq!(space.find_span(0.0), 2);
    assert_eq!(space.find_span(0.3), 3);
    assert_eq!(space.find_span(0.5), 4);
    assert_eq!(space.find_span(1.0), 5);
}

#[test]
fn periodic_wrap() {
    let space = SplineSpace::from_breaks(2, &uniform_breaks(0.0, 1.0, 4), true, 1).unwrap();
    assert_scalar_eq!(space.wrap(1.25), 0.25, comp = abs, tol = 1e-15);
    assert_scalar_eq!(space.wrap(-0.25), 0.75, comp = abs, tol = 1e-15);
    assert_eq!(space.wrap(1.0), 0.0);

    let clamped = SplineSpace::from_breaks(2, &uniform_breaks(0.0, 1.0, 4), false, 1).unwrap();
    assert_eq!(clamped.wrap(1.25), 1.0);
    assert_eq!(clamped.wrap(-0.25), 0.0);
}

#[test]
fn greville_abscissae_reproduce_linear_functions() {
    let breaks = [0.0, 0.1, 0.35, 0.5, 0.8, 1.0];
    for &(degree, multiplicity) in &[(1, 1), (2, 1), (2, 2), (3, 1), (3, 3)] {
        let space = SplineSpace::from_breaks(degree, &breaks, false, multiplicity).unwrap();
        let greville = space.greville();
        assert_eq!(greville.len(), space.nbasis());
        assert_eq!(greville[0], 0.0);
        assert_eq!(greville[greville.len() - 1], 1.0);
        for &x in &[0.0, 0.05, 0.2, 0.5, 0.77, 1.0] {
            assert_scalar_eq!(space.evaluate(&greville, x), x, comp = abs, tol = 1e-14);
        }
    }
}

#[test]
fn collocation_matrix_rows_sum_to_one() {
    let space = SplineSpace::from_breaks(3, &uniform_breaks(0.0, 1.0, 6), true, 2).unwrap();
    let matrix = space.collocation_matrix();
    let n = space.nbasis();
    let row_sums = &matrix * DMatrix::from_element(n, 1, 1.0);
    assert_matrix_eq!(row_sums, DMatrix::from_element(n, 1, 1.0), comp = abs, tol = 1e-14);
}

#[test]
fn histopolation_intervals_tile_one_period() {
    for &periodic in &[true, false] {
        let space = SplineSpace::from_breaks(3, &uniform_breaks(0.0, 1.0, 6), periodic, 1)
            .unwrap()
            .reduce_degree()
            .unwrap();
        let grid = space.histopolation_grid();
        assert_eq!(grid.len(), space.nbasis() + 1);
        assert_scalar_eq!(grid[grid.len() - 1] - grid[0], 1.0, comp = abs, tol = 1e-14);
        if !periodic {
            assert_eq!(grid[0], 0.0);
        }

        // Every basis function integrates to one over the union of the intervals
        let matrix = space.histopolation_matrix(4).unwrap();
        let n = space.nbasis();
        let column_sums = DMatrix::from_element(1, n, 1.0) * &matrix;
        assert_matrix_eq!(column_sums, DMatrix::from_element(1, n, 1.0), comp = abs, tol = 1e-13);
    }
}

#[test]
fn histopolation_rules_lie_in_domain() {
    let space = SplineSpace::from_breaks(2, &uniform_breaks(0.0, 1.0, 5), true, 1)
        .unwrap()
        .reduce_degree()
        .unwrap();
    let rules = space.histopolation_rules(3).unwrap();
    assert_eq!(rules.len(), space.nbasis());
    for (weights, points) in &rules {
        assert_eq!(weights.len(), points.len());
        assert!(points.iter().all(|&x| (0.0..1.0).contains(&x)));
    }
    assert!(matches!(space.histopolation_rules(0), Err(FeecError::Quadrature(_))));
}

#[test]
fn anchors_assign_basis_functions_to_cells() {
    let breaks = uniform_breaks(0.0, 1.0, 4);
    let clamped = SplineSpace::from_breaks(2, &breaks, false, 1).unwrap();
    assert_eq!(clamped.anchor_cells(), vec![0, 1, 2, 3, 3, 3]);
    assert_eq!(clamped.reduce_degree().unwrap().anchor_cells(), vec![0, 1, 2, 3, 3]);

    let periodic = SplineSpace::from_breaks(2, &breaks, true, 2).unwrap();
    assert_eq!(periodic.anchor_cells(), vec![0, 1, 1, 2, 2, 3, 3, 3]);
}

proptest! {
    #[test]
    fn b_splines_form_partition_of_unity(space in any::<SplineSpace>(), x in 0.0..=1.0f64) {
        let sum: f64 = space.nonzero_basis(x).iter().map(|(_, v)| v).sum();
        prop_assert!((sum - 1.0).abs() < 1e-13);
        prop_assert!(space.nonzero_basis(x).iter().all(|&(_, v)| v >= -1e-15));
    }

    #[test]
    fn m_splines_have_unit_integral(space in any::<SplineSpace>()) {
        let reduced = space.reduce_degree().unwrap();
        for i in 0..reduced.nbasis() {
            let basis_function = |x: f64| -> f64 {
                reduced.nonzero_basis(x)
                    .into_iter()
                    .filter(|&(j, _)| j == i)
                    .map(|(_, v)| v)
                    .sum()
            };
            let integral = integrate_over_domain(&reduced, basis_function);
            prop_assert!((integral - 1.0).abs() < 1e-12, "basis {}: {}", i, integral);
        }
    }

    #[test]
    fn derivative_is_difference_of_coefficients(
        space in any::<SplineSpace>(),
        seed in 0..1000u64,
        x in 0.01..0.99f64,
    ) {
        let coefficients = util::pseudo_random_values(seed, space.nbasis());
        let reduced = space.reduce_degree().unwrap();
        let n = space.nbasis();
        let differences: Vec<f64> = (0..reduced.nbasis())
            .map(|j| coefficients[(j + 1) % n] - coefficients[j])
            .collect();

        // Central differences are accurate away from breakpoints
        let h = 1e-6;
        prop_assume!(space.breaks().iter().all(|&b| (b - x).abs() > 2.0 * h));
        let fd = (space.evaluate(&coefficients, x + h) - space.evaluate(&coefficients, x - h)) / (2.0 * h);
        let exact = reduced.evaluate(&differences, x);
        prop_assert!((fd - exact).abs() < 1e-4 * (1.0 + exact.abs()), "{} vs {}", fd, exact);
    }
}
