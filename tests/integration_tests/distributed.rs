//! Runs every projector and derivative of a complex on several workers and compares with a
//! single worker.
use super::{h1_space, max_abs_difference, sine_product, COMMUTING_TOLERANCE, INVERSE_TOLERANCE};
use feec::comm::{Communicator, ThreadCommunicator};
use feec::complex::DeRhamComplex;
use feec::decomposition::{DecompositionSettings, DomainDecomposition};
use feec::projector::{FieldFunction, ProjectorSettings};
use feec::stencil::{BlockVector, StencilVector};
use std::collections::HashMap;
use std::sync::Arc;
use util::{assert_approx_slice_eq, pseudo_random_values};

type Entries = Vec<HashMap<Vec<usize>, f64>>;

/// Owned coefficients of every block, keyed by global multi-index.
fn owned_entries(vector: &BlockVector) -> Entries {
    vector.blocks().iter().map(block_entries).collect()
}

fn block_entries(block: &StencilVector) -> HashMap<Vec<usize>, f64> {
    let layout = block.layout();
    let ranges: Vec<_> = (0..layout.ndim()).map(|axis| layout.owned_range(axis)).collect();
    let values = block.owned_values();
    let mut index: Vec<usize> = ranges.iter().map(|r| r.start).collect();
    let mut entries = HashMap::new();
    for value in values {
        entries.insert(index.clone(), value);
        // Row-major odometer over the owned box
        for axis in (0..index.len()).rev() {
            index[axis] += 1;
            if index[axis] < ranges[axis].end {
                break;
            }
            index[axis] = ranges[axis].start;
        }
    }
    entries
}

fn merge(parts: Vec<Entries>) -> Entries {
    let mut merged: Entries = Vec::new();
    for part in parts {
        if merged.is_empty() {
            merged = vec![HashMap::new(); part.len()];
        }
        for (target, block) in merged.iter_mut().zip(part) {
            for (index, value) in block {
                assert!(target.insert(index, value).is_none(), "coefficient owned twice");
            }
        }
    }
    merged
}

fn assert_entries_eq(distributed: &Entries, serial: &Entries, tolerance: f64) {
    assert_eq!(distributed.len(), serial.len());
    for (d, s) in distributed.iter().zip(serial) {
        assert_eq!(d.len(), s.len(), "every coefficient must be owned by exactly one worker");
        for (index, value) in s {
            let other = d[index];
            assert!(
                (other - value).abs() <= tolerance,
                "coefficient {index:?}: {other} vs {value}"
            );
        }
    }
}

struct Outcome {
    commuting_error: f64,
    exactness_error: f64,
    inverse_residuals: Vec<f64>,
    projected: Vec<Entries>,
    derivatives: Vec<Entries>,
}

/// The fields projected onto space `k`: the sine product on the first space, its exact
/// gradient on the second, and sine products with one factor differentiated per component
/// further along.
fn fields_for_space(k: usize, ndim: usize, num_components: usize) -> Vec<Box<FieldFunction>> {
    match k {
        0 => vec![sine_product(1.0, None)],
        1 => (0..ndim).map(|axis| sine_product(1.0, Some(axis))).collect(),
        _ if num_components == 1 => vec![sine_product(1.0, None)],
        _ => (0..num_components)
            .map(|c| sine_product(1.0, Some(c % ndim)))
            .collect(),
    }
}

/// Projects sine products onto every space of the complex and applies every derivative, on
/// whatever workers `comm` describes.
fn run_complex(comm: Arc<dyn Communicator>, ncells: &[usize], periodic: &[bool], settings: DecompositionSettings) -> Outcome {
    let decomposition = DomainDecomposition::with_settings(ncells, periodic, comm, settings).unwrap();
    let h1 = h1_space(Arc::new(decomposition), 2, 1);
    let ndim = h1.ndim();
    let complex = DeRhamComplex::new(h1, ProjectorSettings::default()).unwrap();

    let mut fields = Vec::new();
    for (k, (space, projector)) in complex.spaces().iter().zip(complex.projectors()).enumerate() {
        let functions = fields_for_space(k, ndim, space.num_components());
        let functions: Vec<&FieldFunction> = functions.iter().map(|f| &**f).collect();
        fields.push(projector.project(&functions).unwrap());
    }

    let mut derivatives = Vec::new();
    for (k, derivative) in complex.derivatives().iter().enumerate() {
        let mut result = derivative.apply(fields[k].coefficients_mut()).unwrap();
        result.update_ghost_regions().unwrap();
        derivatives.push(result);
    }

    // The gradient of the projected sine product against the projected exact gradient
    let commuting_error = max_abs_difference(&derivatives[0], fields[1].coefficients());

    let mut exactness_error: f64 = 0.0;
    for k in 1..complex.derivatives().len() {
        let mut twice = complex.derivative(k).apply(&mut derivatives[k - 1]).unwrap();
        twice.update_ghost_regions().unwrap();
        exactness_error = exactness_error.max(twice.max_abs().unwrap());
    }

    Outcome {
        commuting_error,
        exactness_error,
        inverse_residuals: complex
            .projectors()
            .iter()
            .zip(&fields)
            .map(|(projector, field)| projector.inverse_residual(field.coefficients()).unwrap())
            .collect(),
        projected: fields.iter().map(|field| owned_entries(field.coefficients())).collect(),
        derivatives: derivatives.iter().map(owned_entries).collect(),
    }
}

fn check_against_serial(workers: usize, ncells: &[usize], periodic: &[bool], settings: DecompositionSettings) {
    let serial = run_complex(
        Arc::new(feec::comm::SelfCommunicator),
        ncells,
        periodic,
        DecompositionSettings::default(),
    );
    assert_eq!(serial.projected.len(), ncells.len() + 1);
    assert_eq!(serial.derivatives.len(), ncells.len());
    let outcomes = ThreadCommunicator::run(workers, |comm| run_complex(comm, ncells, periodic, settings.clone()));

    for outcome in &outcomes {
        assert!(outcome.commuting_error < COMMUTING_TOLERANCE);
        assert!((outcome.commuting_error - serial.commuting_error).abs() < 1e-14);
        assert!(outcome.exactness_error < 1e-12, "d∘d = {:e}", outcome.exactness_error);
        assert_eq!(outcome.inverse_residuals.len(), serial.inverse_residuals.len());
        for residual in &outcome.inverse_residuals {
            assert!(*residual < INVERSE_TOLERANCE);
        }
    }

    let mut projected: Vec<Vec<Entries>> = vec![Vec::new(); serial.projected.len()];
    let mut derivatives: Vec<Vec<Entries>> = vec![Vec::new(); serial.derivatives.len()];
    for outcome in outcomes {
        for (k, entries) in outcome.projected.into_iter().enumerate() {
            projected[k].push(entries);
        }
        for (k, entries) in outcome.derivatives.into_iter().enumerate() {
            derivatives[k].push(entries);
        }
    }
    for (parts, expected) in projected.into_iter().zip(&serial.projected) {
        assert_entries_eq(&merge(parts), expected, 1e-13);
    }
    for (parts, expected) in derivatives.into_iter().zip(&serial.derivatives) {
        assert_entries_eq(&merge(parts), expected, 1e-13);
    }
}

#[test]
fn one_dimensional_complex_on_three_workers() {
    check_against_serial(3, &[12], &[true], DecompositionSettings::default());
    check_against_serial(3, &[12], &[false], DecompositionSettings::default());
}

#[test]
fn two_dimensional_complex_on_four_workers() {
    check_against_serial(4, &[8, 8], &[true, false], DecompositionSettings::default());
}

#[test]
fn two_dimensional_complex_on_explicit_process_grid() {
    let settings = DecompositionSettings {
        ghost_width: 2,
        process_grid: Some(vec![1, 3]),
    };
    check_against_serial(3, &[6, 9], &[false, true], settings);
}

#[test]
fn three_dimensional_complex_on_eight_workers() {
    check_against_serial(8, &[6, 6, 6], &[true, false, true], DecompositionSettings::default());
}

#[test]
fn ghost_regions_mirror_neighbor_coefficients() {
    // Encodes the global index in the value, so every ghost can be checked directly
    let encode = |index: &[usize]| index.iter().fold(0.0, |acc, &i| 100.0 * acc + i as f64);

    let failures = ThreadCommunicator::run(4, |comm| {
        let settings = DecompositionSettings {
            ghost_width: 2,
            process_grid: None,
        };
        let decomposition = DomainDecomposition::with_settings(&[8, 8], &[true, false], comm, settings).unwrap();
        let h1 = h1_space(Arc::new(decomposition), 3, 1);
        let mut vector = StencilVector::from_global_fn(Arc::clone(h1.layout()), encode);
        let layout = Arc::clone(vector.layout());
        let before_sync = vector.get(&[0, 0]);
        vector.update_ghost_regions().unwrap();

        let mut failures = Vec::new();
        let npts = layout.npts();
        let x_range = layout.owned_range(0);
        let y_range = layout.owned_range(1);
        // Periodic along x: two layers on each side wrap around
        let xs: Vec<usize> = (0..x_range.len() + 4)
            .map(|k| (x_range.start + npts[0] + k - 2) % npts[0])
            .collect();
        // Clamped along y: ghosts only exist towards interior neighbors
        let ys: Vec<usize> = (y_range.start.saturating_sub(2)..(y_range.end + 2).min(npts[1])).collect();
        for &i in &xs {
            for &j in &ys {
                match vector.get(&[i, j]) {
                    Ok(value) if value == encode(&[i, j]) => {}
                    other => failures.push(format!("({i}, {j}): {other:?}")),
                }
            }
        }
        (before_sync.is_ok(), failures)
    });

    for (_, failures) in &failures {
        assert!(failures.is_empty(), "{failures:?}");
    }
    // The corner (0, 0) is a ghost for at least one worker before synchronization
    assert!(failures.iter().any(|(ok, _)| !ok));
}

#[test]
fn distributed_reductions_match_serial() {
    let ncells = [7, 5];
    let periodic = [false, true];
    let value = |index: &[usize]| pseudo_random_values((index[0] * 31 + index[1]) as u64, 1)[0];

    let serial = {
        let decomposition = DomainDecomposition::serial(&ncells, &periodic).unwrap();
        let h1 = h1_space(Arc::new(decomposition), 2, 1);
        let mut x = StencilVector::from_global_fn(Arc::clone(h1.layout()), value);
        x.update_ghost_regions().unwrap();
        (x.dot(&x).unwrap(), x.max_abs().unwrap())
    };
    let results = ThreadCommunicator::run(2, |comm| {
        let decomposition = DomainDecomposition::new(&ncells, &periodic, comm).unwrap();
        let h1 = h1_space(Arc::new(decomposition), 2, 1);
        let mut x = StencilVector::from_global_fn(Arc::clone(h1.layout()), value);
        let unsynced = x.dot(&x).is_err();
        x.update_ghost_regions().unwrap();
        (unsynced, x.dot(&x).unwrap(), x.max_abs().unwrap())
    });

    for (unsynced, dot, max) in results {
        assert!(unsynced);
        assert_approx_slice_eq!([dot, max], [serial.0, serial.1], abstol = 1e-12);
    }
}
