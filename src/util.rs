//! Helpers for dense row-major arrays of up to three dimensions.
use rayon::prelude::*;
use std::ops::Range;

/// Row-major strides of an array with the given shape.
pub fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

/// Converts a flat row-major index into a multi-index.
pub fn unravel_index(mut flat: usize, shape: &[usize], multi_index: &mut [usize]) {
    for (idx, &n) in multi_index.iter_mut().zip(shape).rev() {
        *idx = flat % n;
        flat /= n;
    }
}

pub fn ravel_index(multi_index: &[usize], strides: &[usize]) -> usize {
    multi_index.iter().zip(strides).map(|(i, s)| i * s).sum()
}

/// Calls `f` with the flat index of every entry of the box `ranges` in an array of the given
/// shape, in row-major order.
pub fn for_each_in_box(shape: &[usize], ranges: &[Range<usize>], mut f: impl FnMut(usize)) {
    debug_assert_eq!(shape.len(), ranges.len());
    if ranges.iter().any(|r| r.is_empty()) {
        return;
    }
    let strides = strides(shape);
    let mut multi_index: Vec<usize> = ranges.iter().map(|r| r.start).collect();
    loop {
        f(ravel_index(&multi_index, &strides));
        // Advance like an odometer, last axis fastest
        let mut axis = ranges.len();
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            multi_index[axis] += 1;
            if multi_index[axis] < ranges[axis].end {
                break;
            }
            multi_index[axis] = ranges[axis].start;
        }
    }
}

/// Copies the box `ranges` out of `data` into a compact row-major array.
pub fn gather_box(data: &[f64], shape: &[usize], ranges: &[Range<usize>]) -> Vec<f64> {
    let mut values = Vec::with_capacity(ranges.iter().map(|r| r.len()).product());
    for_each_in_box(shape, ranges, |idx| values.push(data[idx]));
    values
}

/// Writes a compact row-major array into the box `ranges` of `data`.
///
/// # Panics
///
/// Panics if `values` and the box differ in size.
pub fn scatter_box(data: &mut [f64], shape: &[usize], ranges: &[Range<usize>], values: &[f64]) {
    let box_size: usize = ranges.iter().map(|r| r.len()).product();
    assert_eq!(values.len(), box_size, "box and values must have the same size");
    let mut next = 0;
    for_each_in_box(shape, ranges, |idx| {
        data[idx] = values[next];
        next += 1;
    });
}

/// Applies `op` to every one-dimensional fiber of `data` along `axis`.
///
/// Fibers are first copied into a contiguous buffer, so `op` always receives a contiguous slice
/// of length `shape[axis]`. Fibers are processed in parallel.
pub fn sweep_axis<F>(data: &mut [f64], shape: &[usize], axis: usize, op: F)
where
    F: Fn(&mut [f64]) + Sync,
{
    let n = shape[axis];
    if n == 0 || data.is_empty() {
        return;
    }
    let inner: usize = shape[axis + 1..].iter().product();
    let outer: usize = shape[..axis].iter().product();

    let mut fibers = vec![0.0; data.len()];
    for o in 0..outer {
        for k in 0..n {
            for i in 0..inner {
                fibers[(o * inner + i) * n + k] = data[(o * n + k) * inner + i];
            }
        }
    }

    fibers.par_chunks_mut(n).for_each(|fiber| op(fiber));

    for o in 0..outer {
        for k in 0..n {
            for i in 0..inner {
                data[(o * n + k) * inner + i] = fibers[(o * inner + i) * n + k];
            }
        }
    }
}

/// Concatenates arrays that agree in shape on every axis but `axis`.
///
/// `blocks` pairs each compact array with its extent along `axis`; `shape` gives the common
/// extents of the other axes (its entry for `axis` is ignored).
pub fn concatenate_along_axis(blocks: &[(Vec<f64>, usize)], shape: &[usize], axis: usize) -> Vec<f64> {
    let inner: usize = shape[axis + 1..].iter().product();
    let outer: usize = shape[..axis].iter().product();
    let total: usize = blocks.iter().map(|(_, len)| len).sum();

    let mut result = Vec::with_capacity(outer * total * inner);
    for o in 0..outer {
        for (block, len) in blocks {
            let chunk = len * inner;
            result.extend_from_slice(&block[o * chunk..(o + 1) * chunk]);
        }
    }
    result
}

/// Extracts the slab `range` along `axis` from a compact array.
pub fn restrict_axis(data: &[f64], shape: &[usize], axis: usize, range: Range<usize>) -> Vec<f64> {
    let ranges: Vec<_> = shape
        .iter()
        .enumerate()
        .map(|(a, &n)| if a == axis { range.clone() } else { 0..n })
        .collect();
    gather_box(data, shape, &ranges)
}
