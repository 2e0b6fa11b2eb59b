//! Median statistics over pixel samples.


/// Calculate the median of f32 values in-place.
///
/// Mutates the input buffer (partial sort via quickselect). The result only
/// depends on the multiset of values, never on their order.
#[inline]
pub fn median_f32_mut(data: &mut [f32]) -> f32 {
    debug_assert!(!data.is_empty());

    let len = data.len();
    let mid = len / 2;

    let (left_part, median, _) = data.select_nth_unstable_by(mid, f32::total_cmp);
    let upper = *median;
    if len & 1 == 1 {
        return upper;
    }
    let lower = left_part.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    (lower + upper) * 0.5
}

/// Median of `values`, or `None` when the iterator is empty.
///
/// `scratch` is cleared and reused so repeated calls do not allocate.
pub fn median_of<I>(values: I, scratch: &mut Vec<f32>) -> Option<f32>
where
    I: IntoIterator<Item = f32>,
{
    scratch.clear();
    scratch.extend(values);
    if scratch.is_empty() {
        None
    } else {
        Some(median_f32_mut(scratch))
    }
}

/// Median of the `Some` entries of `values`, or `None` if there are none.
pub fn median_of_present(values: &[Option<f32>]) -> Option<f32> {
    let mut scratch = Vec::with_capacity(values.len());
    median_of(values.iter().flatten().copied(), &mut scratch)
}
