use super::{max_abs_difference, serial_h1_space, sine_product, COMMUTING_TOLERANCE, INVERSE_TOLERANCE};
use feec::complex::{DeRhamComplex, Sequence2d};
use feec::derivatives::DerivativeKind;
use feec::projector::ProjectorSettings;
use feec::space::FormKind;
use nalgebra_sparse::CsrMatrix;

fn assert_composition_vanishes(first: &CsrMatrix<f64>, second: &CsrMatrix<f64>) {
    let product = second * first;
    assert_eq!(product.nrows(), second.nrows());
    assert_eq!(product.ncols(), first.ncols());
    // Entries are sums of products of ±1, so cancellation is exact
    assert!(product.values().iter().all(|&v| v == 0.0));
}

#[test]
fn periodic_quadratic_gradient_scenario() {
    let h1 = serial_h1_space(3, 8, 2, true, 1);
    let complex = DeRhamComplex::new(h1, ProjectorSettings::default()).unwrap();
    assert_eq!(complex.len(), 4);
    assert_eq!(complex.derivative(0).kind(), DerivativeKind::Gradient);

    let f = sine_product(1.0, None);
    let df: Vec<_> = (0..3).map(|axis| sine_product(1.0, Some(axis))).collect();
    let mut u0 = complex.projector(0).project_scalar(&*f).unwrap();
    let u1 = complex.projector(1).project(&[&*df[0], &*df[1], &*df[2]]).unwrap();
    let du0 = complex.derivative(0).apply(u0.coefficients_mut()).unwrap();

    assert!(max_abs_difference(&du0, u1.coefficients()) < COMMUTING_TOLERANCE);
    assert!(complex.projector(0).inverse_residual(u0.coefficients()).unwrap() < INVERSE_TOLERANCE);
    assert!(complex.projector(1).inverse_residual(u1.coefficients()).unwrap() < INVERSE_TOLERANCE);
}

#[test]
fn complexes_have_expected_forms() {
    let forms = |complex: &DeRhamComplex| -> Vec<_> { complex.spaces().iter().map(|s| s.form()).collect() };

    let complex_1d = DeRhamComplex::new(serial_h1_space(1, 6, 2, false, 1), Default::default()).unwrap();
    assert_eq!(forms(&complex_1d), vec![Some(FormKind::H1), Some(FormKind::L2)]);

    let h1 = serial_h1_space(2, 6, 2, true, 1);
    let curl = DeRhamComplex::with_sequence(h1.clone(), Sequence2d::Curl, Default::default()).unwrap();
    let div = DeRhamComplex::with_sequence(h1, Sequence2d::Div, Default::default()).unwrap();
    assert_eq!(
        forms(&curl),
        vec![Some(FormKind::H1), Some(FormKind::Hcurl), Some(FormKind::L2)]
    );
    assert_eq!(
        forms(&div),
        vec![Some(FormKind::H1), Some(FormKind::Hdiv), Some(FormKind::L2)]
    );

    let complex_3d = DeRhamComplex::new(serial_h1_space(3, 4, 2, false, 1), Default::default()).unwrap();
    assert_eq!(
        forms(&complex_3d),
        vec![
            Some(FormKind::H1),
            Some(FormKind::Hcurl),
            Some(FormKind::Hdiv),
            Some(FormKind::L2)
        ]
    );
}

#[test]
fn consecutive_derivatives_vanish() {
    for &periodic in &[true, false] {
        for &multiplicity in &[1, 2] {
            let h1 = serial_h1_space(2, 5, 3, periodic, multiplicity);
            for sequence in [Sequence2d::Curl, Sequence2d::Div] {
                let complex = DeRhamComplex::with_sequence(h1.clone(), sequence, Default::default()).unwrap();
                let d0 = complex.derivative(0).to_sparse();
                let d1 = complex.derivative(1).to_sparse();
                assert_composition_vanishes(&d0, &d1);
            }

            let h1 = serial_h1_space(3, 4, 2, periodic, multiplicity);
            let complex = DeRhamComplex::new(h1, Default::default()).unwrap();
            let grad = complex.derivative(0).to_sparse();
            let curl = complex.derivative(1).to_sparse();
            let div = complex.derivative(2).to_sparse();
            assert_composition_vanishes(&grad, &curl);
            assert_composition_vanishes(&curl, &div);
        }
    }
}

#[test]
fn discrete_curl_of_projected_gradient_is_zero() {
    let h1 = serial_h1_space(3, 6, 3, false, 2);
    let complex = DeRhamComplex::new(h1, ProjectorSettings::with_quadrature_order(6)).unwrap();

    let f = sine_product(1.0, None);
    let mut u0 = complex.projector(0).project_scalar(&*f).unwrap();
    let mut grad_u0 = complex.derivative(0).apply(u0.coefficients_mut()).unwrap();
    let mut curl_grad_u0 = complex.derivative(1).apply(&mut grad_u0).unwrap();
    curl_grad_u0.update_ghost_regions().unwrap();

    assert!(curl_grad_u0.max_abs().unwrap() < 1e-12);
}

#[test]
fn projection_is_idempotent() {
    let h1 = serial_h1_space(2, 8, 3, true, 2);
    let complex = DeRhamComplex::with_sequence(h1, Sequence2d::Div, ProjectorSettings::with_quadrature_order(6)).unwrap();

    let f1 = sine_product(1.0, None);
    let f2 = sine_product(2.0, Some(0));
    let first = complex.projector(1).project(&[&*f1, &*f2]).unwrap();
    let second = complex.projector(1).project(&[&*f1, &*f2]).unwrap();

    for (a, b) in first.coefficients().blocks().iter().zip(second.coefficients().blocks()) {
        assert_eq!(a.owned_values(), b.owned_values());
    }
}
