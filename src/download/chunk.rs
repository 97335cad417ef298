//! Byte-range partitioning for parallel direct transfers.

use std::path::{Path, PathBuf};

use super::client::ByteRange;

/// Ordered, contiguous, non-overlapping ranges covering `[0, total_bytes)`.
///
/// Every chunk but the last has the same length; the last absorbs the
/// remainder of the integer division.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    total_bytes: u64,
    ranges: Vec<ByteRange>,
}

impl ChunkPlan {
    /// Splits `total_bytes` into `count` ranges.
    ///
    /// Returns `None` for an empty resource or a zero count. When the resource
    /// is smaller than `count` bytes the count shrinks so no range is empty.
    #[must_use]
    pub fn new(total_bytes: u64, count: usize) -> Option<Self> {
        if total_bytes == 0 || count == 0 {
            return None;
        }
        let count = (count as u64).min(total_bytes);
        let chunk_size = total_bytes / count;

        let ranges = (0..count)
            .map(|i| {
                let start = i * chunk_size;
                let end = if i == count - 1 {
                    total_bytes - 1
                } else {
                    start + chunk_size - 1
                };
                ByteRange { start, end }
            })
            .collect();

        Some(Self {
            total_bytes,
            ranges,
        })
    }

    /// Ranges in index order.
    #[must_use]
    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    /// Number of chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// A plan always has at least one chunk.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Size of the whole resource.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

/// Path of chunk `index` inside `chunk_dir` (`chunk.<index>`).
#[must_use]
pub fn chunk_path(chunk_dir: &Path, index: usize) -> PathBuf {
    chunk_dir.join(format!("chunk.{index}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn assert_contiguous(plan: &ChunkPlan) {
        let ranges = plan.ranges();
        assert_eq!(ranges[0].start, 0);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start, "gap or overlap in {ranges:?}");
        }
        assert_eq!(ranges.last().unwrap().end, plan.total_bytes() - 1);
        let covered: u64 = ranges.iter().map(ByteRange::len).sum();
        assert_eq!(covered, plan.total_bytes());
    }

    #[test]
    fn test_plan_equal_chunks_last_takes_remainder() {
        let plan = ChunkPlan::new(50_000_003, 8).unwrap();
        assert_eq!(plan.len(), 8);
        assert_eq!(plan.ranges()[0].len(), 6_250_000);
        assert_eq!(plan.ranges()[7].len(), 6_250_003);
        assert_contiguous(&plan);
    }

    #[test]
    fn test_plan_contiguous_for_many_sizes() {
        for total in [1_u64, 7, 8, 9, 1023, 10_000_001, 52_428_800] {
            for count in [1_usize, 2, 3, 8, 32] {
                let plan = ChunkPlan::new(total, count).unwrap();
                assert!(plan.len() <= count);
                assert_contiguous(&plan);
            }
        }
    }

    #[test]
    fn test_plan_shrinks_count_for_tiny_resources() {
        let plan = ChunkPlan::new(3, 8).unwrap();
        assert_eq!(plan.len(), 3);
        assert!(plan.ranges().iter().all(|r| r.len() == 1));
    }

    #[test]
    fn test_plan_rejects_empty_inputs() {
        assert!(ChunkPlan::new(0, 8).is_none());
        assert!(ChunkPlan::new(100, 0).is_none());
    }

    #[test]
    fn test_chunk_path() {
        assert_eq!(
            chunk_path(Path::new("/d/a.mp4.chunks"), 3),
            PathBuf::from("/d/a.mp4.chunks/chunk.3")
        );
    }
}
