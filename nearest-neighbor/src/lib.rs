//! Exhaustive nearest neighbor search for local image descriptors.
//!
//! A [`NearestNeighbor`] owns a [`DescriptorSpace`] and answers, for any
//! query descriptor, which two stored descriptors are closest and how far away
//! they are. The search is a single linear scan, so it is exact, and the
//! returned pair is what downstream correspondence search needs for a ratio
//! test.
//!
//! Two value domains are supported through the [`Element`] trait:
//!
//! * `i16` holding signed 8-bit quantized components, with distances in
//!   `[0, 2 * 127²]`.
//! * `f32` unit-normalized components, with distances in `[0, 1]`.
//!
//! ```
//! use nearest_neighbor::{DescriptorSpace, NearestNeighbor};
//!
//! let space = DescriptorSpace::new(4, vec![
//!     1.0f32, 0.0, 0.0, 0.0,
//!     0.0, 1.0, 0.0, 0.0,
//!     0.0, 0.0, 1.0, 0.0,
//! ]).unwrap();
//! let nn = NearestNeighbor::new(space);
//! let result = nn.find(&[0.0, 1.0, 0.0, 0.0]);
//! assert_eq!(result.index_1st_best, 1);
//! assert_eq!(result.dist_1st_best, 0.0);
//! ```

mod element;
mod kernel;
mod strategy;

pub use element::{quantized, Element};
pub use strategy::Strategy;

use log::*;
use thiserror::Error;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("descriptor dimension must be non-zero")]
    ZeroDimension,
    #[error("buffer of {len} components is not a whole number of {dimensions}-dimensional descriptors")]
    RaggedBuffer { len: usize, dimensions: usize },
    #[error("descriptor {index} has {actual} components, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("{strategy:?} strategy needs a dimension divisible by {lanes}, got {dimensions}")]
    UnsupportedDimension {
        strategy: Strategy,
        dimensions: usize,
        lanes: usize,
    },
}

/// A read-only set of descriptors of one fixed dimension stored back to back.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorSpace<T> {
    elements: Vec<T>,
    dimensions: usize,
}

impl<T: Element> DescriptorSpace<T> {
    /// Wraps a flat buffer of `dimensions`-sized descriptors.
    pub fn new(dimensions: usize, elements: Vec<T>) -> Result<Self, Error> {
        if dimensions == 0 {
            return Err(Error::ZeroDimension);
        }
        if elements.len() % dimensions != 0 {
            return Err(Error::RaggedBuffer {
                len: elements.len(),
                dimensions,
            });
        }
        Ok(Self {
            elements,
            dimensions,
        })
    }

    /// Copies individual descriptors into one contiguous space.
    pub fn from_descriptors<I, D>(dimensions: usize, descriptors: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = D>,
        D: AsRef<[T]>,
    {
        if dimensions == 0 {
            return Err(Error::ZeroDimension);
        }
        let mut elements = Vec::new();
        for (index, descriptor) in descriptors.into_iter().enumerate() {
            let descriptor = descriptor.as_ref();
            if descriptor.len() != dimensions {
                return Err(Error::DimensionMismatch {
                    index,
                    expected: dimensions,
                    actual: descriptor.len(),
                });
            }
            elements.extend_from_slice(descriptor);
        }
        Self::new(dimensions, elements)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// The number of descriptors in the space.
    pub fn len(&self) -> usize {
        self.elements.len() / self.dimensions
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The descriptor at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn descriptor(&self, index: usize) -> &[T] {
        &self.elements[index * self.dimensions..(index + 1) * self.dimensions]
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[T]> + Clone + '_ {
        self.elements.chunks_exact(self.dimensions)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.elements
    }
}

/// The two closest descriptors to a query.
///
/// Indices refer to positions in the searched [`DescriptorSpace`]. When the
/// space holds fewer than two descriptors the missing entries keep index `0`
/// and the largest possible distance.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MatchResult<D> {
    pub index_1st_best: usize,
    pub index_2nd_best: usize,
    pub dist_1st_best: D,
    pub dist_2nd_best: D,
}

/// Exhaustive top-2 search over a descriptor space.
#[derive(Debug, Clone)]
pub struct NearestNeighbor<T> {
    space: DescriptorSpace<T>,
    strategy: Strategy,
}

impl<T: Element> NearestNeighbor<T> {
    /// Creates a matcher using the fastest strategy the CPU and the dimension allow.
    pub fn new(space: DescriptorSpace<T>) -> Self {
        let strategy = Strategy::detect_for::<T>(space.dimensions());
        Self { space, strategy }
    }

    /// Creates a matcher that always uses `strategy`.
    pub fn with_strategy(space: DescriptorSpace<T>, strategy: Strategy) -> Result<Self, Error> {
        if !strategy.supports::<T>(space.dimensions()) {
            return Err(Error::UnsupportedDimension {
                strategy,
                dimensions: space.dimensions(),
                lanes: T::LANES,
            });
        }
        Ok(Self { space, strategy })
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn space(&self) -> &DescriptorSpace<T> {
        &self.space
    }

    pub fn into_space(self) -> DescriptorSpace<T> {
        self.space
    }

    /// Finds the best and second best match for `query`.
    ///
    /// The query must have exactly [`DescriptorSpace::dimensions`] components.
    /// Candidates are compared by inner product in index order with strict
    /// comparisons, so of two equally close descriptors the lower index wins.
    pub fn find(&self, query: &[T]) -> MatchResult<T::Score> {
        debug_assert_eq!(
            query.len(),
            self.space.dimensions(),
            "query dimension does not match the descriptor space"
        );
        // Scores hold inner products until finalization.
        let mut result = MatchResult {
            index_1st_best: 0,
            index_2nd_best: 0,
            dist_1st_best: T::FARTHEST,
            dist_2nd_best: T::FARTHEST,
        };
        for (index, candidate) in self.space.iter().enumerate() {
            let score = self.strategy.score(query, candidate);
            if score > result.dist_2nd_best {
                if score > result.dist_1st_best {
                    result.index_2nd_best = result.index_1st_best;
                    result.dist_2nd_best = result.dist_1st_best;
                    result.index_1st_best = index;
                    result.dist_1st_best = score;
                } else {
                    result.index_2nd_best = index;
                    result.dist_2nd_best = score;
                }
            }
        }
        result.dist_1st_best = T::finalize(result.dist_1st_best);
        result.dist_2nd_best = T::finalize(result.dist_2nd_best);
        result
    }

    /// Runs [`NearestNeighbor::find`] for every descriptor in `queries`.
    ///
    /// Results are in query order.
    pub fn find_all(&self, queries: &DescriptorSpace<T>) -> Vec<MatchResult<T::Score>> {
        debug_assert_eq!(queries.dimensions(), self.space.dimensions());
        trace!(
            "matching {} queries against {} descriptors",
            queries.len(),
            self.space.len()
        );
        #[cfg(not(feature = "rayon"))]
        {
            queries.iter().map(|query| self.find(query)).collect()
        }
        #[cfg(feature = "rayon")]
        {
            queries
                .as_slice()
                .par_chunks_exact(queries.dimensions())
                .map(|query| self.find(query))
                .collect()
        }
    }
}
