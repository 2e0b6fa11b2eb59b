//! Source masking and background modelling for integral-field spectral cubes.
//!
//! For every wavelength slice the source aperture is replaced by an angular
//! interpolation of the surrounding annulus (repeated over a dither grid and
//! median-combined), a smooth background is fitted to the masked frame, and
//! the background is subtracted from the raw data.
//!
//! ```no_run
//! use glam::DVec2;
//! use skyfit::{BackgroundSubtractor, Config, DataCube, Frame};
//!
//! # fn main() -> skyfit::Result<()> {
//! let frames = vec![Frame::new_filled(64, 64, 1.0f32); 4];
//! let cube = DataCube::new(frames)?;
//! let subtractor = BackgroundSubtractor::new(Config::new(DVec2::new(32.0, 32.0), 4.0, 3.0))?;
//! let products = subtractor.run(&cube)?.into_products()?;
//! assert_eq!(products.residual.len(), 4);
//! # Ok(())
//! # }
//! ```

pub mod aperture;
pub mod background;
pub mod config;
pub mod cube;
pub mod driver;
pub mod error;
pub mod geometry;
pub mod masking;
pub mod math;

#[cfg(test)]
pub(crate) mod testing;

pub use common::buffer2::Buffer2;

/// Single-precision image frame, `height × width`, row-major.
pub type Frame = Buffer2<f32>;
/// Per-pixel flags with the shape of a [`Frame`].
pub type Mask = Buffer2<bool>;

pub use aperture::ApertureScheduler;
pub use background::{estimate_background, BackgroundEstimate};
pub use config::{
    ApertureSchedule, ApertureShape, BackgroundMode, BackgroundModeKind, Config, FailurePolicy,
    GeometryConfig, MaskingConfig, NanPolicy, Options, PolynomialConfig, Resolution,
    SimpleCombine, SourceTrack,
};
pub use cube::{collapse, locate_source, Cube, DataCube, SourceCandidate, SourceDetector};
pub use driver::{
    BackgroundSubtractor, CancelToken, CubeProducts, RunOutcome, RunReport, SliceDiagnostics,
    SliceProducts,
};
pub use error::{ConfigError, Error, Result, SliceError};
pub use geometry::{ApertureGeometry, Ellipse, Region};
pub use masking::{mask_source, DitherGrid, MaskedFrame};
