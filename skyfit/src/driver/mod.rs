//! Per-slice background subtraction over a cube.
//!
//! [`BackgroundSubtractor`] validates its configuration once, checks the
//! cube against the per-slice tables before reading any slice, then
//! processes slices independently on a dedicated rayon pool.


use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::DVec2;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use crate::aperture::ApertureScheduler;
use crate::background::estimate_background;
use crate::config::{Config, FailurePolicy, NanPolicy};
use crate::cube::Cube;
use crate::error::{Error, Result, SliceError};
use crate::geometry::ApertureGeometry;
use crate::masking::mask_source;
use crate::{Frame, Mask};

// ============================================================================
// Cancellation
// ============================================================================

/// Shared flag that stops a run. Slices already in progress finish; slices
/// not yet started report [`SliceError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Products
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SliceDiagnostics {
    pub center: DVec2,
    pub aperture: ApertureGeometry,
    pub trials_used: usize,
    pub trials_total: usize,
    pub replaced_pixels: usize,
    /// Non-finite input pixels, zeroed in every output.
    pub invalid_pixels: usize,
    pub windows_total: usize,
    pub windows_fit: usize,
    pub windows_skipped_sparse: usize,
    pub windows_skipped_singular: usize,
    pub fallback_pixels: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SliceProducts {
    /// Input minus background.
    pub residual: Frame,
    pub background: Frame,
    /// Input with the source replaced.
    pub masked: Frame,
    pub mask: Mask,
    pub diagnostics: SliceDiagnostics,
}

/// Products of a fully successful run, indexed by slice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CubeProducts {
    pub residual: Vec<Frame>,
    pub background: Vec<Frame>,
    pub masked: Vec<Frame>,
    pub mask: Vec<Mask>,
    pub diagnostics: Vec<SliceDiagnostics>,
}

impl CubeProducts {
    #[inline]
    pub fn len(&self) -> usize {
        self.residual.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.residual.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Complete,
    Partial { failed: Vec<usize> },
    Failed,
}

/// One result per slice, in slice order.
#[derive(Debug)]
pub struct RunReport {
    slices: Vec<Result<SliceProducts, SliceError>>,
}

impl RunReport {
    #[inline]
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    #[inline]
    pub fn slices(&self) -> &[Result<SliceProducts, SliceError>] {
        &self.slices
    }

    pub fn get(&self, index: usize) -> Option<&Result<SliceProducts, SliceError>> {
        self.slices.get(index)
    }

    /// Failed slices with their errors, in slice order.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &SliceError)> + '_ {
        self.slices
            .iter()
            .enumerate()
            .filter_map(|(index, result)| result.as_ref().err().map(|err| (index, err)))
    }

    pub fn outcome(&self) -> RunOutcome {
        let failed: Vec<usize> = self.failures().map(|(index, _)| index).collect();
        if failed.is_empty() {
            RunOutcome::Complete
        } else if failed.len() == self.slices.len() {
            RunOutcome::Failed
        } else {
            RunOutcome::Partial { failed }
        }
    }

    /// Splits the products into per-kind sequences. Fails with
    /// [`Error::PartialFailure`] if any slice failed.
    pub fn into_products(self) -> Result<CubeProducts> {
        let failed: Vec<usize> = self.failures().map(|(index, _)| index).collect();
        if let Some(&first) = failed.first() {
            return Err(Error::PartialFailure {
                first,
                failed,
                total: self.slices.len(),
            });
        }

        let mut products = CubeProducts::default();
        for slice in self.slices.into_iter().flatten() {
            products.residual.push(slice.residual);
            products.background.push(slice.background);
            products.masked.push(slice.masked);
            products.mask.push(slice.mask);
            products.diagnostics.push(slice.diagnostics);
        }
        Ok(products)
    }
}

// ============================================================================
// Input preparation
// ============================================================================

/// A slice with non-finite pixels zeroed.
struct PreparedFrame {
    data: Frame,
    /// Finite input pixels. Only present when some pixel is non-finite.
    finite: Option<Mask>,
    invalid_pixels: usize,
}

impl PreparedFrame {
    fn new(frame: &Frame) -> Self {
        let invalid_pixels = frame.iter().filter(|v| !v.is_finite()).count();
        if invalid_pixels == 0 {
            return Self {
                data: frame.clone(),
                finite: None,
                invalid_pixels,
            };
        }
        Self {
            data: frame.map(|&v| if v.is_finite() { v } else { 0.0 }),
            finite: Some(frame.map(|v| v.is_finite())),
            invalid_pixels,
        }
    }

    /// Pixels usable as samples under `policy`.
    fn valid(&self, policy: NanPolicy) -> Option<&Mask> {
        match policy {
            NanPolicy::Zero => None,
            NanPolicy::Exclude => self.finite.as_ref(),
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Runs masking and background subtraction with one validated [`Config`].
#[derive(Debug, Clone)]
pub struct BackgroundSubtractor {
    config: Config,
    scheduler: ApertureScheduler,
}

impl BackgroundSubtractor {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let scheduler = ApertureScheduler::new(&config.geometry)?;
        Ok(Self { config, scheduler })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run<C: Cube + ?Sized>(&self, cube: &C) -> Result<RunReport> {
        self.run_with_cancel(cube, &CancelToken::new())
    }

    pub fn run_with_cancel<C: Cube + ?Sized>(
        &self,
        cube: &C,
        cancel: &CancelToken,
    ) -> Result<RunReport> {
        let num_slices = cube.num_slices();
        if num_slices == 0 {
            return Err(Error::EmptyCube);
        }
        self.scheduler.validate_slice_count(num_slices)?;
        self.config.source.validate_slice_count(num_slices)?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let pool = self.build_pool()?;
        let shape = cube.shape();
        info!(
            slices = num_slices,
            height = shape.0,
            width = shape.1,
            mode = %self.config.background.kind(),
            workers = pool.current_num_threads(),
            "Starting background subtraction"
        );

        let slices = match self.config.failure_policy {
            FailurePolicy::Continue => pool.install(|| {
                (0..num_slices)
                    .into_par_iter()
                    .map(|index| self.process_slice(cube, index, shape, cancel))
                    .collect::<Vec<_>>()
            }),
            FailurePolicy::Abort => pool
                .install(|| {
                    (0..num_slices)
                        .into_par_iter()
                        .map(|index| {
                            self.process_slice(cube, index, shape, cancel)
                                .map_err(|source| Error::Slice { index, source })
                        })
                        .collect::<Result<Vec<_>>>()
                })?
                .into_iter()
                .map(Ok)
                .collect(),
        };

        let report = RunReport { slices };
        let failed = report.failures().count();
        if failed == 0 {
            info!(slices = num_slices, "Background subtraction complete");
        } else {
            warn!(
                failed,
                slices = num_slices,
                "Background subtraction finished with failed slices"
            );
        }
        Ok(report)
    }

    /// Processes a single 2D image as slice 0.
    pub fn process_frame(&self, frame: &Frame) -> Result<SliceProducts> {
        self.scheduler.validate_slice_count(1)?;
        self.config.source.validate_slice_count(1)?;
        self.process(frame, 0)
            .map_err(|source| Error::Slice { index: 0, source })
    }

    fn build_pool(&self) -> Result<ThreadPool> {
        let cores = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        let threads = self
            .config
            .worker_pool_size
            .map_or(cores, |requested| requested.min(cores))
            .max(1);
        Ok(ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("skyfit-{i}"))
            .build()?)
    }

    fn process_slice<C: Cube + ?Sized>(
        &self,
        cube: &C,
        index: usize,
        shape: (usize, usize),
        cancel: &CancelToken,
    ) -> Result<SliceProducts, SliceError> {
        if cancel.is_cancelled() {
            return Err(SliceError::Cancelled);
        }
        let frame = cube.slice(index);
        if frame.shape() != shape {
            return Err(SliceError::ShapeMismatch {
                expected: shape,
                actual: frame.shape(),
            });
        }

        let result = self.process(&frame, index);
        if let Err(err) = &result {
            warn!(slice = index, error = %err, "Slice failed");
        }
        result
    }

    fn process(&self, frame: &Frame, index: usize) -> Result<SliceProducts, SliceError> {
        let prepared = PreparedFrame::new(frame);
        let valid = prepared.valid(self.config.nan_policy);
        let center = self.config.source.position(index);
        let aperture = self.scheduler.resolve(index);

        let masked = mask_source(&prepared.data, valid, center, &aperture, &self.config.masking)?;

        let invalid = valid.map(|valid| valid.map(|&ok| !ok));
        let excluded = match (self.config.use_replaced_pixels, invalid) {
            (true, Some(invalid)) => invalid,
            (true, None) => Mask::new_default(frame.width(), frame.height()),
            (false, Some(invalid)) => masked.mask.union(&invalid),
            (false, None) => masked.mask.clone(),
        };

        let estimate = estimate_background(&masked.frame, &excluded, &self.config.background)?;

        let residual = match &prepared.finite {
            Some(finite) => Frame::from_fn(frame.width(), frame.height(), |x, y| {
                if finite[(x, y)] {
                    prepared.data[(x, y)] - estimate.background[(x, y)]
                } else {
                    0.0
                }
            }),
            None => prepared.data.zip_map(&estimate.background, |d, b| d - b),
        };

        let diagnostics = SliceDiagnostics {
            center,
            aperture,
            trials_used: masked.trials_used,
            trials_total: masked.trials_total,
            replaced_pixels: masked.replaced_pixels(),
            invalid_pixels: prepared.invalid_pixels,
            windows_total: estimate.windows_total,
            windows_fit: estimate.windows_fit,
            windows_skipped_sparse: estimate.windows_skipped_sparse,
            windows_skipped_singular: estimate.windows_skipped_singular,
            fallback_pixels: estimate.fallback_pixels,
        };
        debug!(
            slice = index,
            trials_used = diagnostics.trials_used,
            replaced = diagnostics.replaced_pixels,
            invalid = diagnostics.invalid_pixels,
            "Slice processed"
        );

        Ok(SliceProducts {
            residual,
            background: estimate.background,
            masked: masked.frame,
            mask: masked.mask,
            diagnostics,
        })
    }
}
