//! Cube access, wavelength collapse and source location.

use std::borrow::Cow;

use glam::DVec2;
use rayon::prelude::*;

use crate::error::{Error, SliceError};
use crate::math::statistics::median_of;
use crate::Frame;

/// Read access to a sequence of equally shaped frames.
///
/// Slices may be produced lazily; the driver requests each one exactly once.
pub trait Cube: Sync {
    fn num_slices(&self) -> usize;

    /// `(height, width)` shared by every slice.
    fn shape(&self) -> (usize, usize);

    fn slice(&self, index: usize) -> Cow<'_, Frame>;
}

/// A single 2D image is a cube with one slice.
impl Cube for Frame {
    fn num_slices(&self) -> usize {
        1
    }

    fn shape(&self) -> (usize, usize) {
        Frame::shape(self)
    }

    fn slice(&self, _index: usize) -> Cow<'_, Frame> {
        Cow::Borrowed(self)
    }
}

/// In-memory cube.
#[derive(Debug, Clone, PartialEq)]
pub struct DataCube {
    frames: Vec<Frame>,
}

impl DataCube {
    /// Every frame must share the shape of the first.
    pub fn new(frames: Vec<Frame>) -> Result<Self, Error> {
        let Some(first) = frames.first() else {
            return Err(Error::EmptyCube);
        };
        let expected = first.shape();
        if let Some((index, frame)) = frames
            .iter()
            .enumerate()
            .find(|(_, frame)| frame.shape() != expected)
        {
            return Err(Error::Slice {
                index,
                source: SliceError::ShapeMismatch {
                    expected,
                    actual: frame.shape(),
                },
            });
        }
        Ok(Self { frames })
    }

    pub fn from_frame(frame: Frame) -> Self {
        Self {
            frames: vec![frame],
        }
    }

    #[inline]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

impl Cube for DataCube {
    fn num_slices(&self) -> usize {
        self.frames.len()
    }

    fn shape(&self) -> (usize, usize) {
        self.frames[0].shape()
    }

    fn slice(&self, index: usize) -> Cow<'_, Frame> {
        Cow::Borrowed(&self.frames[index])
    }
}

/// Median stack of all slices along the wavelength axis.
///
/// NaN samples are skipped; a pixel that is NaN in every slice stays NaN.
pub fn collapse<C: Cube + ?Sized>(cube: &C) -> Frame {
    let (height, width) = cube.shape();
    let slices: Vec<Cow<'_, Frame>> = (0..cube.num_slices()).map(|i| cube.slice(i)).collect();

    let mut stacked = Frame::new_filled(width, height, f32::NAN);
    stacked
        .pixels_mut()
        .par_chunks_mut(width.max(1))
        .enumerate()
        .for_each_init(Vec::new, |scratch, (y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let samples = slices
                    .iter()
                    .map(|frame| frame[(x, y)])
                    .filter(|v| !v.is_nan());
                if let Some(median) = median_of(samples, scratch) {
                    *out = median;
                }
            }
        });
    stacked
}

/// A point source reported by a [`SourceDetector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceCandidate {
    pub position: DVec2,
    pub peak_flux: f32,
}

/// External point-source finder run on a collapsed image.
pub trait SourceDetector {
    fn detect(&self, image: &Frame) -> Vec<SourceCandidate>;
}

/// Position of the brightest detected source in the collapsed cube.
pub fn locate_source<C, D>(cube: &C, detector: &D) -> Option<DVec2>
where
    C: Cube + ?Sized,
    D: SourceDetector + ?Sized,
{
    let image = collapse(cube);
    detector
        .detect(&image)
        .into_iter()
        .filter(|c| c.peak_flux.is_finite() && c.position.is_finite())
        .max_by(|a, b| a.peak_flux.total_cmp(&b.peak_flux))
        .map(|c| c.position)
}
