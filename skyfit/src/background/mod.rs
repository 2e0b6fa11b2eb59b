//! Smooth background models fitted to a masked frame.
//!
//! Pixels flagged in the exclusion mask never contribute to a fit; the
//! model is still evaluated everywhere, so the background always has the
//! shape of the input.

mod polynomial;
mod simple;

use tracing::{debug, warn};

use crate::config::{BackgroundMode, SimpleCombine};
use crate::error::SliceError;
use crate::{Frame, Mask};

pub use simple::simple_background;

/// Fraction of skipped polynomial windows at which a fit is reported as degraded.
const SKIPPED_WINDOW_WARN_FRACTION: f64 = 0.5;

/// Background model and fit counters for one frame.
#[derive(Debug, Clone)]
pub struct BackgroundEstimate {
    pub background: Frame,
    /// Polynomial windows laid over the frame.
    pub windows_total: usize,
    pub windows_fit: usize,
    /// Windows with fewer usable pixels than polynomial terms.
    pub windows_skipped_sparse: usize,
    /// Windows whose normal equations were singular.
    pub windows_skipped_singular: usize,
    /// Pixels not covered by any fitted window, filled by the additive
    /// row/column estimate.
    pub fallback_pixels: usize,
}

impl BackgroundEstimate {
    fn without_windows(background: Frame) -> Self {
        Self {
            background,
            windows_total: 0,
            windows_fit: 0,
            windows_skipped_sparse: 0,
            windows_skipped_singular: 0,
            fallback_pixels: 0,
        }
    }
}

/// Estimates the background of `data`, ignoring pixels set in `excluded`.
///
/// [`BackgroundMode::None`] returns `data` unchanged. A polynomial model that
/// fails [`PolynomialConfig::validate`] is rejected with
/// [`SliceError::Configuration`].
///
/// [`PolynomialConfig::validate`]: crate::config::PolynomialConfig::validate
pub fn estimate_background(
    data: &Frame,
    excluded: &Mask,
    mode: &BackgroundMode,
) -> Result<BackgroundEstimate, SliceError> {
    if !excluded.same_shape(data) {
        return Err(SliceError::ShapeMismatch {
            expected: data.shape(),
            actual: excluded.shape(),
        });
    }

    let estimate = match mode {
        BackgroundMode::None => BackgroundEstimate::without_windows(data.clone()),
        BackgroundMode::Simple { combine } => {
            BackgroundEstimate::without_windows(simple_background(data, excluded, *combine))
        }
        BackgroundMode::Polynomial(config) => {
            config.validate()?;
            polynomial::polynomial_background(data, excluded, config)
        }
    };

    if estimate.windows_total > 0 {
        debug!(
            windows_total = estimate.windows_total,
            windows_fit = estimate.windows_fit,
            sparse = estimate.windows_skipped_sparse,
            singular = estimate.windows_skipped_singular,
            fallback_pixels = estimate.fallback_pixels,
            "Polynomial background fitted"
        );
        let skipped = estimate.windows_total - estimate.windows_fit;
        if skipped as f64 >= SKIPPED_WINDOW_WARN_FRACTION * estimate.windows_total as f64 {
            warn!(
                skipped,
                windows_total = estimate.windows_total,
                fallback_pixels = estimate.fallback_pixels,
                "Many background windows could not be fitted, filling with row/column medians"
            );
        }
    }

    Ok(estimate)
}

/// Simple estimate used where no polynomial window applies.
#[inline]
fn fallback_background(data: &Frame, excluded: &Mask) -> Frame {
    simple_background(data, excluded, SimpleCombine::Additive)
}
