//! Contiguous block partitioning of a globally indexed set.
//!
//! For `len` items over `parts` ranks, with `n = len / parts` and `r = len % parts`,
//! ranks `0..r` own `n + 1` consecutive indices and ranks `r..parts` own `n`.
//! [`local_range`] and [`owner_of`] are exact inverses of each other; the rest of
//! the crate relies on every rank deriving the same ranges from `(len, parts)`
//! without communicating.

use crate::mesh_error::MeshDistError;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Half-open range `[first, last)` of global indices owned by one rank.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexRange {
    pub first: usize,
    pub last: usize,
}

impl IndexRange {
    pub fn len(&self) -> usize {
        self.last - self.first
    }

    pub fn is_empty(&self) -> bool {
        self.first == self.last
    }

    pub fn contains(&self, index: usize) -> bool {
        self.first <= index && index < self.last
    }

    pub fn as_range(&self) -> Range<usize> {
        self.first..self.last
    }
}

impl From<IndexRange> for Range<usize> {
    fn from(r: IndexRange) -> Self {
        r.as_range()
    }
}

impl std::fmt::Display for IndexRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.first, self.last)
    }
}

/// Range of `[0, len)` owned by `rank` when split over `parts` ranks.
pub fn local_range(len: usize, parts: usize, rank: usize) -> Result<IndexRange, MeshDistError> {
    if parts == 0 || rank >= parts {
        return Err(MeshDistError::InvalidRank { rank, size: parts });
    }
    let n = len / parts;
    let r = len % parts;
    let (first, count) = if rank < r {
        (rank * (n + 1), n + 1)
    } else {
        (rank * n + r, n)
    };
    Ok(IndexRange {
        first,
        last: first + count,
    })
}

/// Rank owning global `index` when `[0, len)` is split over `parts` ranks.
pub fn owner_of(index: usize, len: usize, parts: usize) -> Result<usize, MeshDistError> {
    if parts == 0 {
        return Err(MeshDistError::InvalidRank { rank: 0, size: 0 });
    }
    if index >= len {
        return Err(MeshDistError::OutOfRange { index, len });
    }
    let n = len / parts;
    let r = len % parts;
    // First r ranks own n + 1 indices each; n > 0 below since index >= r * (n + 1) and index < len.
    if index < r * (n + 1) {
        Ok(index / (n + 1))
    } else {
        Ok(r + (index - r * (n + 1)) / n)
    }
}

/// A fixed `(len, parts)` pair with convenience queries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPartition {
    len: usize,
    parts: usize,
}

impl IndexPartition {
    pub fn new(len: usize, parts: usize) -> Result<Self, MeshDistError> {
        if parts == 0 {
            return Err(MeshDistError::InvalidRank { rank: 0, size: 0 });
        }
        Ok(Self { len, parts })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn parts(&self) -> usize {
        self.parts
    }

    pub fn range(&self, rank: usize) -> Result<IndexRange, MeshDistError> {
        local_range(self.len, self.parts, rank)
    }

    pub fn owner(&self, index: usize) -> Result<usize, MeshDistError> {
        owner_of(index, self.len, self.parts)
    }

    /// All ranges in rank order; they tile `[0, len)`.
    pub fn ranges(&self) -> impl Iterator<Item = IndexRange> + '_ {
        (0..self.parts).filter_map(move |rank| self.range(rank).ok())
    }

    /// Number of indices owned by each rank.
    pub fn counts(&self) -> Vec<usize> {
        self.ranges().map(|r| r.len()).collect()
    }
}

#[cfg(test)]
mod tests;
