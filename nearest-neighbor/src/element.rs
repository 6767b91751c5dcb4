use crate::kernel;

/// A descriptor component type together with its distance policy.
///
/// Matching ranks candidates by raw inner product (the `score`) and only
/// converts the two winners into squared distances at the end with
/// [`Element::finalize`]. Each implementation decides how wide its lanes are
/// for the vectorized path and how the inner product maps back onto a
/// distance for its value domain.
pub trait Element: Copy + Send + Sync + 'static {
    /// The inner product and distance type.
    type Score: Copy + PartialOrd + core::fmt::Debug + Send + Sync;

    /// Number of components processed per lane block on the vectorized path.
    const LANES: usize;

    /// A score that every real candidate beats.
    const FARTHEST: Self::Score;

    /// Portable inner product, valid for any dimension.
    fn score_scalar(a: &[Self], b: &[Self]) -> Self::Score;

    /// Vectorized inner product. The slices must be a multiple of [`Element::LANES`] long.
    fn score_simd(a: &[Self], b: &[Self]) -> Self::Score;

    /// Turns an inner product into a squared distance.
    fn finalize(score: Self::Score) -> Self::Score;
}

/// Quantized descriptors.
///
/// Components are signed 8-bit values stored in `i16`, and descriptors are
/// expected to be scaled so their squared norm is `COMPONENT_MAX²`.
impl Element for i16 {
    type Score = i32;

    const LANES: usize = 8;
    const FARTHEST: i32 = i32::MIN;

    fn score_scalar(a: &[i16], b: &[i16]) -> i32 {
        kernel::scalar::dot_i16(a, b)
    }

    fn score_simd(a: &[i16], b: &[i16]) -> i32 {
        kernel::simd::dot_i16(a, b)
    }

    fn finalize(score: i32) -> i32 {
        let norm = quantized::SQUARED_NORM;
        2 * norm - 2 * score.clamp(0, norm)
    }
}

/// Unit-normalized floating point descriptors.
///
/// The squared euclidean distance between two unit vectors is `2 - 2 * <a, b>`.
/// It is clamped to `[0, 1]`, so every pair further apart than 90 degrees
/// reads as the same distance.
impl Element for f32 {
    type Score = f32;

    const LANES: usize = 4;
    const FARTHEST: f32 = f32::NEG_INFINITY;

    fn score_scalar(a: &[f32], b: &[f32]) -> f32 {
        kernel::scalar::dot_f32(a, b)
    }

    fn score_simd(a: &[f32], b: &[f32]) -> f32 {
        kernel::simd::dot_f32(a, b)
    }

    fn finalize(score: f32) -> f32 {
        (2.0 - 2.0 * score).clamp(0.0, 1.0)
    }
}

/// Constants of the quantized value domain.
pub mod quantized {
    /// Largest magnitude of a quantized component.
    ///
    /// Components are signed 8-bit values. If the quantization width changes,
    /// this is the only constant to update.
    pub const COMPONENT_MAX: i32 = i8::MAX as i32;

    /// Squared norm of a quantized unit descriptor and the largest inner product
    /// that finalization accepts.
    pub const SQUARED_NORM: i32 = COMPONENT_MAX * COMPONENT_MAX;

    /// Largest distance finalization can produce.
    pub const MAX_DISTANCE: i32 = 2 * SQUARED_NORM;
}
