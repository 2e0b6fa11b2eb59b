//! Per-slice aperture sizing.

use crate::config::{ApertureSchedule, ApertureShape, GeometryConfig};
use crate::error::ConfigError;
use crate::geometry::{ApertureGeometry, Ellipse};

fn positive(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

fn finite(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::NonFinite { name, value })
    }
}

/// Resolves the aperture and annulus geometry of each slice.
#[derive(Debug, Clone)]
pub struct ApertureScheduler {
    schedule: Schedule,
    annulus_width: f64,
}

#[derive(Debug, Clone)]
enum Schedule {
    Fixed(Ellipse),
    PsfScaled {
        psf_widths: Vec<f64>,
        width_scale: f64,
        axis_ratio: f64,
        position_angle: f64,
    },
}

impl ApertureScheduler {
    /// Validates the geometry configuration. Every radius, width and scale
    /// must be positive and finite.
    pub fn new(config: &GeometryConfig) -> Result<Self, ConfigError> {
        let annulus_width = positive("annulus width", config.annulus_width)?;

        let schedule = match &config.schedule {
            ApertureSchedule::Fixed {
                aperture: ApertureShape::Circular { radius },
            } => Schedule::Fixed(Ellipse::circle(positive("aperture radius", *radius)?)),
            ApertureSchedule::Fixed {
                aperture:
                    ApertureShape::Elliptical {
                        semi_major,
                        semi_minor,
                        position_angle_deg,
                    },
            } => Schedule::Fixed(Ellipse::new(
                positive("aperture semi-major axis", *semi_major)?,
                positive("aperture semi-minor axis", *semi_minor)?,
                finite("position angle", *position_angle_deg)?.to_radians(),
            )),
            ApertureSchedule::PsfScaled {
                psf_widths,
                width_scale,
                axis_ratio,
                position_angle_deg,
            } => {
                for &width in psf_widths {
                    positive("PSF width", width)?;
                }
                let axis_ratio = positive("axis ratio", *axis_ratio)?;
                if axis_ratio > 1.0 {
                    return Err(ConfigError::OutOfRange {
                        name: "axis ratio",
                        range: "(0, 1]",
                        value: axis_ratio,
                    });
                }
                Schedule::PsfScaled {
                    psf_widths: psf_widths.clone(),
                    width_scale: positive("width scale", *width_scale)?,
                    axis_ratio,
                    position_angle: finite("position angle", *position_angle_deg)?.to_radians(),
                }
            }
        };

        Ok(Self {
            schedule,
            annulus_width,
        })
    }

    /// The PSF width table must have exactly one entry per slice.
    pub fn validate_slice_count(&self, num_slices: usize) -> Result<(), ConfigError> {
        match &self.schedule {
            Schedule::PsfScaled { psf_widths, .. } if psf_widths.len() != num_slices => {
                Err(ConfigError::PsfTableLength {
                    table_len: psf_widths.len(),
                    num_slices,
                })
            }
            _ => Ok(()),
        }
    }

    /// Geometry for slice `index`. Callers validate the slice count first.
    pub fn resolve(&self, index: usize) -> ApertureGeometry {
        let aperture = match &self.schedule {
            Schedule::Fixed(ellipse) => *ellipse,
            Schedule::PsfScaled {
                psf_widths,
                width_scale,
                axis_ratio,
                position_angle,
            } => {
                let semi_major = width_scale * psf_widths[index];
                if *axis_ratio == 1.0 {
                    Ellipse::circle(semi_major)
                } else {
                    Ellipse::new(semi_major, semi_major * axis_ratio, *position_angle)
                }
            }
        };
        ApertureGeometry::new(aperture, self.annulus_width)
    }

    #[inline]
    pub fn aperture_radius(&self, index: usize) -> f64 {
        self.resolve(index).aperture_radius()
    }

    #[inline]
    pub fn annulus_outer_radius(&self, index: usize) -> f64 {
        self.resolve(index).annulus_outer_radius()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_schedule_is_constant() {
        let scheduler = ApertureScheduler::new(&GeometryConfig::circular(4.0, 2.5)).unwrap();
        for i in [0, 3, 100] {
            assert_eq!(scheduler.aperture_radius(i), 4.0);
            assert_eq!(scheduler.annulus_outer_radius(i), 6.5);
        }
        assert!(scheduler.validate_slice_count(17).is_ok());
    }

    #[test]
    fn test_psf_scaled_schedule() {
        let config = GeometryConfig::psf_scaled(vec![1.0, 2.0, 4.0], 1.5, 3.0);
        let scheduler = ApertureScheduler::new(&config).unwrap();
        assert_eq!(scheduler.aperture_radius(0), 1.5);
        assert_eq!(scheduler.aperture_radius(1), 3.0);
        assert_eq!(scheduler.aperture_radius(2), 6.0);
        assert_eq!(scheduler.annulus_outer_radius(2), 9.0);
        assert!(scheduler.resolve(1).aperture.is_circle());
    }

    #[test]
    fn test_psf_table_length_mismatch() {
        let config = GeometryConfig::psf_scaled(vec![1.0, 2.0], 1.0, 3.0);
        let scheduler = ApertureScheduler::new(&config).unwrap();
        assert_eq!(
            scheduler.validate_slice_count(3),
            Err(ConfigError::PsfTableLength {
                table_len: 2,
                num_slices: 3
            })
        );
        assert!(scheduler.validate_slice_count(2).is_ok());
    }

    #[test]
    fn test_elliptical_psf_schedule() {
        let config = GeometryConfig {
            schedule: ApertureSchedule::PsfScaled {
                psf_widths: vec![2.0],
                width_scale: 2.0,
                axis_ratio: 0.5,
                position_angle_deg: 90.0,
            },
            annulus_width: 1.0,
        };
        let geometry = ApertureScheduler::new(&config).unwrap().resolve(0);
        assert_eq!(geometry.aperture.semi_major, 4.0);
        assert_eq!(geometry.aperture.semi_minor, 2.0);
        assert!((geometry.aperture.position_angle - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_geometry_rejected() {
        assert!(matches!(
            ApertureScheduler::new(&GeometryConfig::circular(3.0, 0.0)),
            Err(ConfigError::NonPositive {
                name: "annulus width",
                ..
            })
        ));
        assert!(matches!(
            ApertureScheduler::new(&GeometryConfig::psf_scaled(vec![1.0, -2.0], 1.0, 2.0)),
            Err(ConfigError::NonPositive {
                name: "PSF width",
                ..
            })
        ));
        assert!(matches!(
            ApertureScheduler::new(&GeometryConfig::psf_scaled(vec![1.0], f64::NAN, 2.0)),
            Err(ConfigError::NonPositive {
                name: "width scale",
                ..
            })
        ));

        let config = GeometryConfig {
            schedule: ApertureSchedule::PsfScaled {
                psf_widths: vec![1.0],
                width_scale: 1.0,
                axis_ratio: 1.5,
                position_angle_deg: 0.0,
            },
            annulus_width: 1.0,
        };
        assert!(matches!(
            ApertureScheduler::new(&config),
            Err(ConfigError::OutOfRange { .. })
        ));
    }
}
