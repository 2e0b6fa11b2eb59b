//! Error types for configuration, per-slice processing and cube runs.

use thiserror::Error;

/// Malformed or inconsistent configuration. Always detected before any
/// slice is processed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be positive and finite, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("{name} must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },

    #[error("{name} must be in {range}, got {value}")]
    OutOfRange {
        name: &'static str,
        range: &'static str,
        value: f64,
    },

    #[error("PSF width table has {table_len} entries but the cube has {num_slices} slices")]
    PsfTableLength { table_len: usize, num_slices: usize },

    #[error("Source track has {track_len} positions but the cube has {num_slices} slices")]
    SourceTrackLength { track_len: usize, num_slices: usize },

    #[error("Unsupported {option} '{value}', expected one of: {expected}")]
    UnsupportedOption {
        option: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Polynomial degree must be 0-{max}, got {degree}")]
    Degree { degree: u8, max: u8 },

    #[error(
        "window_size {window_size} holds fewer pixels than the {terms} terms of a degree {degree} fit"
    )]
    WindowTooSmall {
        window_size: usize,
        degree: u8,
        terms: usize,
    },

    #[error("Dither grid must contain at least one offset")]
    EmptyDitherGrid,

    #[error("Angular sector count must be at least 1")]
    ZeroSectors,

    #[error("worker_pool_size must be at least 1")]
    ZeroWorkers,

    #[error("Missing required option '{0}'")]
    Missing(&'static str),

    #[error("Options '{0}' and '{1}' are mutually exclusive")]
    Conflicting(&'static str, &'static str),
}

/// Failure confined to a single slice.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SliceError {
    #[error(
        "Aperture at ({x:.2}, {y:.2}) has no usable dither trial on the {width}x{height} frame"
    )]
    Geometry {
        x: f64,
        y: f64,
        width: usize,
        height: usize,
    },

    #[error("Slice shape {actual:?} does not match cube shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Cancelled before processing started")]
    Cancelled,

    #[error("Invalid background model: {0}")]
    Configuration(#[from] ConfigError),
}

/// Top-level error of a background subtraction run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Failed to parse options: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("Cube has no slices")]
    EmptyCube,

    #[error("Run cancelled before dispatch")]
    Cancelled,

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Slice {index} failed: {source}")]
    Slice {
        index: usize,
        #[source]
        source: SliceError,
    },

    #[error("{} of {total} slices failed (first failing slice: {first})", .failed.len())]
    PartialFailure {
        first: usize,
        failed: Vec<usize>,
        total: usize,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psf_table_length_message() {
        let err = ConfigError::PsfTableLength {
            table_len: 3,
            num_slices: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains('3'));
        assert!(msg.contains('5'));
    }

    #[test]
    fn test_unsupported_option_message() {
        let err = ConfigError::UnsupportedOption {
            option: "bkg_mode",
            value: "spline".to_string(),
            expected: "none, simple, polynomial",
        };
        assert_eq!(
            err.to_string(),
            "Unsupported bkg_mode 'spline', expected one of: none, simple, polynomial"
        );
    }

    #[test]
    fn test_slice_error_carries_index() {
        use std::error::Error as StdError;

        let err = Error::Slice {
            index: 7,
            source: SliceError::Geometry {
                x: -40.0,
                y: 10.0,
                width: 20,
                height: 20,
            },
        };
        assert!(err.to_string().contains("Slice 7"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_partial_failure_message() {
        let err = Error::PartialFailure {
            first: 2,
            failed: vec![2, 4],
            total: 10,
        };
        assert_eq!(
            err.to_string(),
            "2 of 10 slices failed (first failing slice: 2)"
        );
    }

    #[test]
    fn test_config_error_converts() {
        let err: Error = ConfigError::ZeroSectors.into();
        assert!(matches!(err, Error::Configuration(ConfigError::ZeroSectors)));
    }
}
