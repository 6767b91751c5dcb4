use crate::Element;
use log::*;

/// How inner products are computed during a scan.
///
/// Both strategies produce the same ranking. The vectorized strategy needs
/// the descriptor dimension to be a multiple of [`Element::LANES`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Portable one-component-at-a-time loop.
    Scalar,
    /// Lane-parallel loop using the `wide` SIMD types.
    Simd,
}

impl Strategy {
    /// Picks the fastest strategy the running CPU supports.
    pub fn detect() -> Self {
        let strategy = if simd_available() {
            Strategy::Simd
        } else {
            Strategy::Scalar
        };
        debug!("detected {:?} inner product strategy", strategy);
        strategy
    }

    /// Picks the fastest supported strategy that can handle `dimensions`.
    pub fn detect_for<T: Element>(dimensions: usize) -> Self {
        let strategy = Self::detect();
        if strategy.supports::<T>(dimensions) {
            strategy
        } else {
            warn!(
                "dimension {} is not a multiple of {} lanes, falling back to scalar search",
                dimensions,
                T::LANES
            );
            Strategy::Scalar
        }
    }

    /// Returns true if this strategy can scan descriptors of `dimensions` components.
    pub fn supports<T: Element>(self, dimensions: usize) -> bool {
        match self {
            Strategy::Scalar => true,
            Strategy::Simd => dimensions % T::LANES == 0,
        }
    }

    #[inline]
    pub(crate) fn score<T: Element>(self, a: &[T], b: &[T]) -> T::Score {
        match self {
            Strategy::Scalar => T::score_scalar(a, b),
            Strategy::Simd => T::score_simd(a, b),
        }
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn simd_available() -> bool {
    is_x86_feature_detected!("sse2")
}

#[cfg(target_arch = "aarch64")]
fn simd_available() -> bool {
    std::arch::is_aarch64_feature_detected!("neon")
}

#[cfg(target_arch = "wasm32")]
fn simd_available() -> bool {
    cfg!(target_feature = "simd128")
}

#[cfg(not(any(
    target_arch = "x86",
    target_arch = "x86_64",
    target_arch = "aarch64",
    target_arch = "wasm32"
)))]
fn simd_available() -> bool {
    false
}
