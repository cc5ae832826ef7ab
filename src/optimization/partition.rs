use std::{num::NonZeroUsize, ops::Range};

/// A near equal split of `[0, total_len)` into contiguous ranges, one per update task.
///
/// The first `total_len % parts` ranges hold one extra element, so lengths differ
/// by at most one. The same inputs always produce the same plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    ranges: Vec<Range<usize>>,
}

impl PartitionPlan {
    /// Creates a new `PartitionPlan`.
    ///
    /// # Arguments
    /// * `total_len` - The length of the index space.
    /// * `parts` - The amount of ranges, trailing ranges are empty if `parts > total_len`.
    ///
    /// # Returns
    /// A new `PartitionPlan` instance.
    pub fn new(total_len: usize, parts: NonZeroUsize) -> Self {
        let parts = parts.get();
        let base = total_len / parts;
        let extra = total_len % parts;

        let mut start = 0;
        let ranges = (0..parts)
            .map(|i| {
                let len = if i < extra { base + 1 } else { base };
                let range = start..start + len;
                start += len;
                range
            })
            .collect();

        Self { ranges }
    }

    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The same plan restricted to `[0, limit)`, ranges past `limit` become empty.
    pub fn clamp(&self, limit: usize) -> Self {
        let ranges = self
            .ranges
            .iter()
            .map(|range| range.start.min(limit)..range.end.min(limit))
            .collect();

        Self { ranges }
    }

    /// Splits `data` into one disjoint mutable slice per range.
    ///
    /// # Panics
    /// If `data` is shorter than the plan.
    pub fn split_mut<'a, T>(&self, mut data: &'a mut [T]) -> Vec<&'a mut [T]> {
        let mut consumed = 0;

        self.ranges
            .iter()
            .map(|range| {
                let (_, rest) = std::mem::take(&mut data).split_at_mut(range.start - consumed);
                let (chunk, rest) = rest.split_at_mut(range.len());
                consumed = range.end;
                data = rest;
                chunk
            })
            .collect()
    }

    /// Splits `data` into one slice per range.
    pub fn split<'a, T>(&self, data: &'a [T]) -> Vec<&'a [T]> {
        self.ranges.iter().map(|range| &data[range.clone()]).collect()
    }
}
