//! Configuration for a background subtraction run.
//!
//! [`Config`] is the typed configuration consumed by
//! [`BackgroundSubtractor`](crate::BackgroundSubtractor). It can be built
//! directly, or from the flat [`Options`] bundle (usually read from YAML)
//! using the option names `src_x`, `aper_rad`, `bkg_mode` and so on.

use glam::DVec2;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::{ConfigError, Error};
use crate::masking::DitherGrid;

/// Highest supported polynomial degree for window fits.
pub const MAX_POLYNOMIAL_DEGREE: u8 = 5;

// ============================================================================
// Enums
// ============================================================================

/// Background model selector, as spelled in the `bkg_mode` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BackgroundModeKind {
    None,
    Simple,
    Polynomial,
}

/// Window overlap density for polynomial background fits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Windows tile the frame without overlap.
    Low,
    /// Windows step by half their size.
    #[default]
    Medium,
    /// Windows step by a quarter of their size.
    High,
}

impl Resolution {
    /// Step between neighbouring window origins, never below one pixel.
    pub fn step(self, window_size: usize) -> usize {
        let step = match self {
            Resolution::Low => window_size,
            Resolution::Medium => window_size / 2,
            Resolution::High => window_size / 4,
        };
        step.max(1)
    }
}

/// How row and column medians are merged in simple mode.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum SimpleCombine {
    /// `row[y] + col[x] - median(rows)`. Exact for separable additive backgrounds.
    #[default]
    Additive,
    /// `(row[y] + col[x]) / 2`.
    Mean,
    /// Row medians only.
    Rows,
    /// Column medians only.
    Columns,
}

/// Treatment of NaN pixels in the raw input.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum NanPolicy {
    /// NaN pixels become zero and take part in all statistics.
    #[default]
    Zero,
    /// NaN pixels become zero in the outputs but are left out of annulus
    /// statistics and background fits.
    Exclude,
}

/// What the driver does when a slice fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Process every slice and report failures per slice.
    #[default]
    Continue,
    /// Stop at the first failing slice.
    Abort,
}

// ============================================================================
// Geometry
// ============================================================================

/// Aperture shape with fixed dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum ApertureShape {
    Circular {
        radius: f64,
    },
    Elliptical {
        semi_major: f64,
        semi_minor: f64,
        position_angle_deg: f64,
    },
}

/// How the aperture size is chosen for each slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schedule", rename_all = "snake_case")]
pub enum ApertureSchedule {
    /// Same aperture for every slice.
    Fixed { aperture: ApertureShape },
    /// Semi-major axis of slice `i` is `width_scale * psf_widths[i]`.
    PsfScaled {
        psf_widths: Vec<f64>,
        width_scale: f64,
        /// Semi-minor over semi-major axis; 1.0 gives circles.
        axis_ratio: f64,
        position_angle_deg: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryConfig {
    pub schedule: ApertureSchedule,
    /// Radial width of the annulus outside the aperture, in pixels.
    pub annulus_width: f64,
}

impl GeometryConfig {
    pub fn circular(radius: f64, annulus_width: f64) -> Self {
        Self {
            schedule: ApertureSchedule::Fixed {
                aperture: ApertureShape::Circular { radius },
            },
            annulus_width,
        }
    }

    pub fn psf_scaled(psf_widths: Vec<f64>, width_scale: f64, annulus_width: f64) -> Self {
        Self {
            schedule: ApertureSchedule::PsfScaled {
                psf_widths,
                width_scale,
                axis_ratio: 1.0,
                position_angle_deg: 0.0,
            },
            annulus_width,
        }
    }
}

/// Source position, fixed or tracked per slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceTrack {
    Fixed(DVec2),
    PerSlice(Vec<DVec2>),
}

impl SourceTrack {
    /// Position of the source in slice `index`.
    pub fn position(&self, index: usize) -> DVec2 {
        match self {
            SourceTrack::Fixed(p) => *p,
            SourceTrack::PerSlice(track) => track[index],
        }
    }

    pub fn validate_slice_count(&self, num_slices: usize) -> Result<(), ConfigError> {
        match self {
            SourceTrack::PerSlice(track) if track.len() != num_slices => {
                Err(ConfigError::SourceTrackLength {
                    track_len: track.len(),
                    num_slices,
                })
            }
            _ => Ok(()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let check = |p: &DVec2| {
            for value in [p.x, p.y] {
                if !value.is_finite() {
                    return Err(ConfigError::NonFinite {
                        name: "source position",
                        value,
                    });
                }
            }
            Ok(())
        };
        match self {
            SourceTrack::Fixed(p) => check(p),
            SourceTrack::PerSlice(track) => track.iter().try_for_each(check),
        }
    }
}

// ============================================================================
// Masking and background
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskingConfig {
    /// Number of equal-width angular sectors the annulus is split into.
    pub sectors: usize,
    /// Sectors with fewer annulus samples than this use the whole-ring median.
    pub min_sector_pixels: usize,
    pub dither: DitherGrid,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            sectors: 8,
            min_sector_pixels: 3,
            dither: DitherGrid::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolynomialConfig {
    /// Total degree of the fitted surface.
    pub degree: u8,
    /// Side of the square fit windows in pixels.
    pub window_size: usize,
    pub resolution: Resolution,
}

impl Default for PolynomialConfig {
    fn default() -> Self {
        Self {
            degree: 2,
            window_size: 32,
            resolution: Resolution::Medium,
        }
    }
}

impl PolynomialConfig {
    /// Checks the degree range and that a window can hold a full fit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.degree > MAX_POLYNOMIAL_DEGREE {
            return Err(ConfigError::Degree {
                degree: self.degree,
                max: MAX_POLYNOMIAL_DEGREE,
            });
        }
        let terms = polynomial_terms(self.degree);
        if self.window_size * self.window_size < terms {
            return Err(ConfigError::WindowTooSmall {
                window_size: self.window_size,
                degree: self.degree,
                terms,
            });
        }
        Ok(())
    }
}

/// Number of coefficients of a total-degree-`degree` 2D polynomial.
#[inline]
pub fn polynomial_terms(degree: u8) -> usize {
    let k = degree as usize;
    (k + 1) * (k + 2) / 2
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum BackgroundMode {
    /// Masking only; the masked frame stands in for the background.
    None,
    Simple {
        combine: SimpleCombine,
    },
    Polynomial(PolynomialConfig),
}

impl Default for BackgroundMode {
    fn default() -> Self {
        Self::Simple {
            combine: SimpleCombine::Additive,
        }
    }
}

impl BackgroundMode {
    pub fn kind(&self) -> BackgroundModeKind {
        match self {
            BackgroundMode::None => BackgroundModeKind::None,
            BackgroundMode::Simple { .. } => BackgroundModeKind::Simple,
            BackgroundMode::Polynomial(_) => BackgroundModeKind::Polynomial,
        }
    }
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceTrack,
    pub geometry: GeometryConfig,
    #[serde(default)]
    pub masking: MaskingConfig,
    #[serde(default)]
    pub background: BackgroundMode,
    /// Let replaced aperture pixels take part in background fits.
    #[serde(default)]
    pub use_replaced_pixels: bool,
    #[serde(default)]
    pub nan_policy: NanPolicy,
    /// Worker threads; `None` uses every available core. Clamped to the core count.
    #[serde(default)]
    pub worker_pool_size: Option<usize>,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Config {
    /// Circular aperture at `source` with default masking and simple background.
    pub fn new(source: DVec2, aperture_radius: f64, annulus_width: f64) -> Self {
        Self {
            source: SourceTrack::Fixed(source),
            geometry: GeometryConfig::circular(aperture_radius, annulus_width),
            masking: MaskingConfig::default(),
            background: BackgroundMode::default(),
            use_replaced_pixels: false,
            nan_policy: NanPolicy::default(),
            worker_pool_size: None,
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Checks every slice-independent constraint. Slice-count checks happen
    /// when a cube is known.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.source.validate()?;
        crate::aperture::ApertureScheduler::new(&self.geometry)?;

        if self.masking.sectors == 0 {
            return Err(ConfigError::ZeroSectors);
        }
        self.masking.dither.validate()?;

        if let BackgroundMode::Polynomial(poly) = &self.background {
            poly.validate()?;
        }

        if self.worker_pool_size == Some(0) {
            return Err(ConfigError::ZeroWorkers);
        }

        Ok(())
    }

    /// Builds a typed configuration from the flat option bundle.
    pub fn from_options(options: &Options) -> Result<Self, ConfigError> {
        let src_x = options.src_x.ok_or(ConfigError::Missing("src_x"))?;
        let src_y = options.src_y.ok_or(ConfigError::Missing("src_y"))?;
        let annulus_width = options.ann_width.ok_or(ConfigError::Missing("ann_width"))?;

        let geometry = match (options.aper_rad, &options.psf_width_table) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Conflicting("aper_rad", "psf_width_table"))
            }
            (Some(radius), None) => GeometryConfig::circular(radius, annulus_width),
            (None, Some(table)) => GeometryConfig::psf_scaled(
                table.clone(),
                options.width_scale.unwrap_or(1.0),
                annulus_width,
            ),
            (None, None) => return Err(ConfigError::Missing("aper_rad")),
        };

        let kind = match &options.bkg_mode {
            Some(mode) => {
                parse_option::<BackgroundModeKind>("bkg_mode", mode, "none, simple, polynomial")?
            }
            None => BackgroundModeKind::Simple,
        };

        let background = match kind {
            BackgroundModeKind::None => BackgroundMode::None,
            BackgroundModeKind::Simple => BackgroundMode::Simple {
                combine: match &options.combine {
                    Some(rule) => parse_option("combine", rule, "additive, mean, rows, columns")?,
                    None => SimpleCombine::default(),
                },
            },
            BackgroundModeKind::Polynomial => {
                let defaults = PolynomialConfig::default();
                BackgroundMode::Polynomial(PolynomialConfig {
                    degree: options.degree.unwrap_or(defaults.degree),
                    window_size: options.window_size.unwrap_or(defaults.window_size),
                    resolution: match &options.resolution {
                        Some(res) => parse_option("resolution", res, "low, medium, high")?,
                        None => defaults.resolution,
                    },
                })
            }
        };

        let mut masking = MaskingConfig::default();
        if let Some(sectors) = options.sectors {
            masking.sectors = sectors;
        }
        if let Some(step) = options.dither_step {
            masking.dither = DitherGrid::canonical(step);
        }

        let nan_policy = match &options.nan_policy {
            Some(policy) => parse_option("nan_policy", policy, "zero, exclude")?,
            None => NanPolicy::default(),
        };

        let config = Self {
            source: SourceTrack::Fixed(DVec2::new(src_x, src_y)),
            geometry,
            masking,
            background,
            use_replaced_pixels: false,
            nan_policy,
            worker_pool_size: options.worker_pool_size,
            failure_policy: FailurePolicy::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses a YAML option bundle and converts it with [`Config::from_options`].
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let options: Options = serde_yml::from_str(yaml)?;
        Ok(Self::from_options(&options)?)
    }
}

fn parse_option<T: std::str::FromStr>(
    option: &'static str,
    value: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::UnsupportedOption {
            option,
            value: value.to_string(),
            expected,
        })
}

/// Flat option bundle using the conventional option names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    pub src_x: Option<f64>,
    pub src_y: Option<f64>,
    pub aper_rad: Option<f64>,
    pub ann_width: Option<f64>,
    pub psf_width_table: Option<Vec<f64>>,
    pub width_scale: Option<f64>,
    pub bkg_mode: Option<String>,
    pub combine: Option<String>,
    pub degree: Option<u8>,
    pub window_size: Option<usize>,
    pub resolution: Option<String>,
    pub worker_pool_size: Option<usize>,
    pub sectors: Option<usize>,
    pub dither_step: Option<f64>,
    pub nan_policy: Option<String>,
}
