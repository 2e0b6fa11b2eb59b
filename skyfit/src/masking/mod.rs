//! Source masking by angular interpolation of the surrounding annulus.
//!
//! Each dither trial shifts the aperture center, bins the valid annulus
//! pixels into equal angular sectors and replaces every aperture pixel with
//! the median of its sector. Trials are then median-combined per pixel over
//! the trials that replaced it.

mod dither;
#[cfg(test)]
mod tests;

pub use dither::DitherGrid;

use glam::DVec2;
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::config::MaskingConfig;
use crate::error::SliceError;
use crate::geometry::{angular_sector, to_polar, ApertureGeometry, Region};
use crate::math::statistics::median_f32_mut;
use crate::{Frame, Mask};

/// A frame with the source replaced by its interpolated surroundings.
#[derive(Debug, Clone)]
pub struct MaskedFrame {
    pub frame: Frame,
    /// Pixels replaced in at least one valid trial.
    pub mask: Mask,
    pub trials_used: usize,
    pub trials_total: usize,
}

impl MaskedFrame {
    #[inline]
    pub fn replaced_pixels(&self) -> usize {
        self.mask.count_set()
    }
}

/// Masks the source at `center`.
///
/// `valid` marks pixels usable as annulus samples; `None` treats every pixel
/// as valid. Pixels outside every valid trial's aperture keep their value.
///
/// Fails with [`SliceError::Geometry`] when no trial has both an in-frame
/// aperture pixel and a valid annulus pixel.
pub fn mask_source(
    data: &Frame,
    valid: Option<&Mask>,
    center: DVec2,
    geometry: &ApertureGeometry,
    config: &MaskingConfig,
) -> Result<MaskedFrame, SliceError> {
    if let Some(valid) = valid {
        if !valid.same_shape(data) {
            return Err(SliceError::ShapeMismatch {
                expected: data.shape(),
                actual: valid.shape(),
            });
        }
    }

    let offsets = config.dither.offsets();
    let trials: Vec<Option<Vec<(usize, f32)>>> = offsets
        .par_iter()
        .map(|&offset| run_trial(data, valid, center + offset, geometry, config))
        .collect();

    let trials_total = trials.len();
    let mut replacements: Vec<(usize, f32)> = Vec::new();
    let mut trials_used = 0;
    for trial in trials.into_iter().flatten() {
        trials_used += 1;
        replacements.extend(trial);
    }

    if trials_used == 0 {
        return Err(SliceError::Geometry {
            x: center.x,
            y: center.y,
            width: data.width(),
            height: data.height(),
        });
    }

    // Group by pixel; the order of values inside a group does not affect the median.
    replacements.sort_unstable_by_key(|&(index, _)| index);

    let mut frame = data.clone();
    let mut mask = Mask::new_default(data.width(), data.height());
    let mut scratch = Vec::with_capacity(trials_total);
    for group in replacements.chunk_by(|a, b| a.0 == b.0) {
        let index = group[0].0;
        scratch.clear();
        scratch.extend(group.iter().map(|&(_, value)| value));
        frame.pixels_mut()[index] = median_f32_mut(&mut scratch);
        mask.pixels_mut()[index] = true;
    }

    debug!(
        x = center.x,
        y = center.y,
        trials_used,
        trials_total,
        replaced = mask.count_set(),
        "Masked source"
    );

    Ok(MaskedFrame {
        frame,
        mask,
        trials_used,
        trials_total,
    })
}

/// One masking trial. Returns `(pixel index, value)` for every replaced
/// aperture pixel, or `None` if the trial is unusable.
fn run_trial(
    data: &Frame,
    valid: Option<&Mask>,
    center: DVec2,
    geometry: &ApertureGeometry,
    config: &MaskingConfig,
) -> Option<Vec<(usize, f32)>> {
    let (x0, y0, x1, y1) = geometry.pixel_bounds(center, data.width(), data.height())?;
    let sectors = config.sectors;

    let mut sector_samples: Vec<Vec<f32>> = vec![Vec::new(); sectors];
    let mut ring = Vec::new();
    // (pixel index, sector)
    let mut aperture = Vec::new();

    for y in y0..y1 {
        for x in x0..x1 {
            let pixel = DVec2::new(x as f64, y as f64);
            let index = data.index_of(x, y);
            match geometry.classify(pixel - center) {
                Region::Aperture => {
                    let (_, angle) = to_polar(center, pixel);
                    aperture.push((index, angular_sector(angle, sectors)));
                }
                Region::Annulus => {
                    if valid.is_none_or(|mask| mask.pixels()[index]) {
                        let (_, angle) = to_polar(center, pixel);
                        let value = data.pixels()[index];
                        sector_samples[angular_sector(angle, sectors)].push(value);
                        ring.push(value);
                    }
                }
                Region::Outside => {}
            }
        }
    }

    if aperture.is_empty() || ring.is_empty() {
        trace!(x = center.x, y = center.y, "Dither trial has no usable pixels");
        return None;
    }

    let ring_median = median_f32_mut(&mut ring);
    let min_samples = config.min_sector_pixels.max(1);
    let sector_values: Vec<f32> = sector_samples
        .iter_mut()
        .map(|samples| {
            if samples.len() >= min_samples {
                median_f32_mut(samples)
            } else {
                ring_median
            }
        })
        .collect();

    Some(
        aperture
            .into_iter()
            .map(|(index, sector)| (index, sector_values[sector]))
            .collect(),
    )
}
