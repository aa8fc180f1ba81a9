//! Clamped index arithmetic for moving through a question sequence.
//!
//! Movement past either end is a no-op. There is no wraparound and no error.

/// Clamp `index` into `[0, len - 1]`. An empty sequence always yields 0.
#[must_use]
pub fn clamp_index(index: usize, len: usize) -> usize {
    index.min(len.saturating_sub(1))
}

#[must_use]
pub fn step_forward(current: usize, len: usize) -> usize {
    clamp_index(current.saturating_add(1), len)
}

#[must_use]
pub fn step_back(current: usize, len: usize) -> usize {
    clamp_index(current.saturating_sub(1), len)
}
