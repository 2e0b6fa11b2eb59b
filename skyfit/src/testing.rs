//! Synthetic frames for unit tests.

use glam::DVec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::Frame;

/// Additive background `a(x) + b(y)` with a linear and a quadratic term.
pub fn separable_gradient(width: usize, height: usize) -> Frame {
    Frame::from_fn(width, height, |x, y| {
        let (x, y) = (x as f32, y as f32);
        10.0 + 0.05 * x + 0.002 * y * y
    })
}

/// Circular Gaussian source of `amplitude` and standard deviation `sigma`.
pub fn gaussian_source(
    width: usize,
    height: usize,
    center: DVec2,
    amplitude: f32,
    sigma: f64,
) -> Frame {
    Frame::from_fn(width, height, |x, y| {
        let d2 = (DVec2::new(x as f64, y as f64) - center).length_squared();
        amplitude * (-d2 / (2.0 * sigma * sigma)).exp() as f32
    })
}

/// Uniform noise in `[-amplitude, amplitude)` from a seeded generator.
pub fn uniform_noise(width: usize, height: usize, amplitude: f32, seed: u64) -> Frame {
    let mut rng = StdRng::seed_from_u64(seed);
    Frame::from_fn(width, height, |_, _| {
        rng.random_range(-amplitude..amplitude)
    })
}

/// Cell-wise sum of two frames.
pub fn add(a: &Frame, b: &Frame) -> Frame {
    a.zip_map(b, |&x, &y| x + y)
}

pub fn max_abs_diff(a: &Frame, b: &Frame) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}
