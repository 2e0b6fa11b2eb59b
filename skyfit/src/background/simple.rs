//! Row and column median backgrounds.

use rayon::prelude::*;

use crate::config::SimpleCombine;
use crate::math::statistics::{median_f32_mut, median_of, median_of_present};
use crate::{Frame, Mask};

/// Background from the medians of the non-excluded pixels of each row and
/// column, merged according to `combine`.
pub fn simple_background(data: &Frame, excluded: &Mask, combine: SimpleCombine) -> Frame {
    let width = data.width();
    let height = data.height();

    let rows = fill_missing(
        data.pixels()
            .par_chunks(width.max(1))
            .zip(excluded.pixels().par_chunks(width.max(1)))
            .map_init(Vec::new, |scratch, (row, skip)| {
                median_of(
                    row.iter()
                        .zip(skip)
                        .filter(|&(_, &skip)| !skip)
                        .map(|(&v, _)| v),
                    scratch,
                )
            })
            .collect(),
    );

    let columns = fill_missing(
        (0..width)
            .into_par_iter()
            .map_init(Vec::new, |scratch, x| {
                median_of(
                    data.column(x)
                        .zip(excluded.column(x))
                        .filter(|&(_, &skip)| !skip)
                        .map(|(&v, _)| v),
                    scratch,
                )
            })
            .collect(),
    );

    match combine {
        SimpleCombine::Additive => {
            let mut sorted = rows.clone();
            let offset = if sorted.is_empty() {
                0.0
            } else {
                median_f32_mut(&mut sorted)
            };
            Frame::from_fn(width, height, |x, y| rows[y] + columns[x] - offset)
        }
        SimpleCombine::Mean => Frame::from_fn(width, height, |x, y| (rows[y] + columns[x]) * 0.5),
        SimpleCombine::Rows => Frame::from_fn(width, height, |_, y| rows[y]),
        SimpleCombine::Columns => Frame::from_fn(width, height, |x, _| columns[x]),
    }
}

/// Rows or columns without a usable pixel take the median of the others,
/// or zero if none has one.
fn fill_missing(medians: Vec<Option<f32>>) -> Vec<f32> {
    let fill = median_of_present(&medians).unwrap_or(0.0);
    medians.into_iter().map(|m| m.unwrap_or(fill)).collect()
}
