//! Sliding-window polynomial surface background.
//!
//! Square windows are laid over the frame on a regular grid of origins,
//! each fitted independently in coordinates normalised to `[-1, 1]`. Every
//! pixel takes the median of the evaluations of all fitted windows that
//! cover it.

use std::ops::Range;

use rayon::prelude::*;

use super::{fallback_background, BackgroundEstimate};
use crate::config::PolynomialConfig;
use crate::math::polynomial::{FitError, NormalEquations, PolynomialBasis};
use crate::math::statistics::median_f32_mut;
use crate::{Frame, Mask};

/// Window origins along one axis of length `len`.
///
/// Returns the effective window size (clamped to `len`) and the sorted
/// origins. The last window always ends flush with the far edge.
pub(super) fn window_origins(len: usize, window_size: usize, step: usize) -> (usize, Vec<usize>) {
    let size = window_size.min(len);
    if size == 0 {
        return (0, Vec::new());
    }
    let step = step.max(1);
    let mut origins: Vec<usize> = (0..=len - size).step_by(step).collect();
    if origins.last().is_some_and(|&last| last + size < len) {
        origins.push(len - size);
    }
    (size, origins)
}

/// For each coordinate along an axis, the range of origin indices whose
/// window covers it.
fn covering_ranges(len: usize, size: usize, origins: &[usize]) -> Vec<Range<usize>> {
    (0..len)
        .map(|p| {
            let start = origins.partition_point(|&o| o + size <= p);
            let end = origins.partition_point(|&o| o <= p);
            start..end
        })
        .collect()
}

/// Maps `p` in `[origin, origin + size)` onto `[-1, 1]`.
#[inline]
fn normalize(p: usize, origin: usize, size: usize) -> f64 {
    if size <= 1 {
        0.0
    } else {
        2.0 * (p - origin) as f64 / (size - 1) as f64 - 1.0
    }
}

enum WindowFit {
    Fitted(Vec<f64>),
    Sparse,
    Singular,
}

pub(super) fn polynomial_background(
    data: &Frame,
    excluded: &Mask,
    config: &PolynomialConfig,
) -> BackgroundEstimate {
    let width = data.width();
    let height = data.height();
    let basis = PolynomialBasis::new(config.degree);
    let step = config.resolution.step(config.window_size);

    let (size_x, x_origins) = window_origins(width, config.window_size, step);
    let (size_y, y_origins) = window_origins(height, config.window_size, step);
    let nx = x_origins.len();
    let windows_total = nx * y_origins.len();

    let fits: Vec<WindowFit> = (0..windows_total)
        .into_par_iter()
        .map_init(
            || NormalEquations::new(basis),
            |normal, window| {
                let x0 = x_origins[window % nx];
                let y0 = y_origins[window / nx];
                normal.reset();
                for y in y0..y0 + size_y {
                    let yn = normalize(y, y0, size_y);
                    let row = data.row(y);
                    let skip = excluded.row(y);
                    for x in x0..x0 + size_x {
                        if !skip[x] {
                            normal.add(normalize(x, x0, size_x), yn, row[x] as f64);
                        }
                    }
                }
                match normal.solve() {
                    Ok(coeffs) => WindowFit::Fitted(coeffs),
                    Err(FitError::TooFewSamples { .. }) => WindowFit::Sparse,
                    Err(FitError::Singular) => WindowFit::Singular,
                }
            },
        )
        .collect();

    let mut windows_fit = 0;
    let mut windows_skipped_sparse = 0;
    let mut windows_skipped_singular = 0;
    for fit in &fits {
        match fit {
            WindowFit::Fitted(_) => windows_fit += 1,
            WindowFit::Sparse => windows_skipped_sparse += 1,
            WindowFit::Singular => windows_skipped_singular += 1,
        }
    }

    let x_cover = covering_ranges(width, size_x, &x_origins);
    let y_cover = covering_ranges(height, size_y, &y_origins);

    let mut background = Frame::new_default(width, height);
    let mut estimated = Mask::new_default(width, height);
    background
        .pixels_mut()
        .par_chunks_mut(width.max(1))
        .zip(estimated.pixels_mut().par_chunks_mut(width.max(1)))
        .enumerate()
        .for_each_init(
            || (vec![0.0f64; basis.num_terms()], Vec::new()),
            |(terms, values), (y, (out_row, estimated_row))| {
                for (x, (out, has_estimate)) in
                    out_row.iter_mut().zip(estimated_row.iter_mut()).enumerate()
                {
                    values.clear();
                    for iy in y_cover[y].clone() {
                        let yn = normalize(y, y_origins[iy], size_y);
                        for ix in x_cover[x].clone() {
                            if let WindowFit::Fitted(coeffs) = &fits[iy * nx + ix] {
                                let xn = normalize(x, x_origins[ix], size_x);
                                values.push(basis.evaluate(coeffs, xn, yn, terms) as f32);
                            }
                        }
                    }
                    if !values.is_empty() {
                        *out = median_f32_mut(values);
                        *has_estimate = true;
                    }
                }
            },
        );

    let fallback_pixels = estimated.pixels().len() - estimated.count_set();
    if fallback_pixels > 0 {
        let fallback = fallback_background(data, excluded);
        background
            .pixels_mut()
            .par_iter_mut()
            .zip(estimated.pixels().par_iter())
            .zip(fallback.pixels().par_iter())
            .for_each(|((out, &has_estimate), &fill)| {
                if !has_estimate {
                    *out = fill;
                }
            });
    }

    BackgroundEstimate {
        background,
        windows_total,
        windows_fit,
        windows_skipped_sparse,
        windows_skipped_singular,
        fallback_pixels,
    }
}
