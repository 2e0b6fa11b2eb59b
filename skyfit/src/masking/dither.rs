use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Offsets applied to the source position, one masking trial per offset.
///
/// Serialized as a plain list of `[dx, dy]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DitherGrid {
    offsets: Vec<DVec2>,
}

impl DitherGrid {
    /// The eight neighbours of the origin at distance `step` along the axes
    /// and diagonals.
    pub fn canonical(step: f64) -> Self {
        let s = step;
        Self {
            offsets: vec![
                DVec2::new(s, 0.0),
                DVec2::new(-s, 0.0),
                DVec2::new(0.0, s),
                DVec2::new(0.0, -s),
                DVec2::new(s, s),
                DVec2::new(s, -s),
                DVec2::new(-s, s),
                DVec2::new(-s, -s),
            ],
        }
    }

    /// A single undithered trial at the source position.
    pub fn single() -> Self {
        Self {
            offsets: vec![DVec2::ZERO],
        }
    }

    pub fn new(offsets: Vec<DVec2>) -> Self {
        Self { offsets }
    }

    #[inline]
    pub fn offsets(&self) -> &[DVec2] {
        &self.offsets
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.offsets.is_empty() {
            return Err(ConfigError::EmptyDitherGrid);
        }
        for offset in &self.offsets {
            for value in [offset.x, offset.y] {
                if !value.is_finite() {
                    return Err(ConfigError::NonFinite {
                        name: "dither offset",
                        value,
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for DitherGrid {
    fn default() -> Self {
        Self::canonical(1.0)
    }
}
