use crate::storage::segment::SegmentId;

/// What a merge policy sees of a segment
#[derive(Debug, Clone, Copy)]
pub struct SegmentSummary {
    pub id: SegmentId,
    pub live_docs: u32,
}

/// Policy for deciding when and how to merge segments
pub trait MergePolicy: Send + Sync {
    /// Check if segments should be merged
    fn should_merge(&self, segments: &[SegmentSummary]) -> bool;

    /// Select segments to merge (positions into `segments`)
    fn select_segments_to_merge(&self, segments: &[SegmentSummary]) -> Vec<usize>;
}

/// Once `merge_factor` segments accumulate, merges the adjacent run of
/// `merge_factor` segments with the fewest live documents. Runs stay
/// adjacent so document order across segments is preserved.
pub struct LogMergePolicy {
    pub merge_factor: usize,
    pub min_segments_to_merge: usize,
}

impl LogMergePolicy {
    pub fn new(merge_factor: usize) -> Self {
        LogMergePolicy {
            merge_factor: merge_factor.max(2),
            min_segments_to_merge: 2,
        }
    }
}

impl Default for LogMergePolicy {
    fn default() -> Self {
        LogMergePolicy::new(10)
    }
}

impl MergePolicy for LogMergePolicy {
    fn should_merge(&self, segments: &[SegmentSummary]) -> bool {
        segments.len() >= self.merge_factor
    }

    fn select_segments_to_merge(&self, segments: &[SegmentSummary]) -> Vec<usize> {
        if !self.should_merge(segments) {
            return Vec::new();
        }

        let window = self.merge_factor.min(segments.len());
        if window < self.min_segments_to_merge {
            return Vec::new();
        }

        let start = (0..=segments.len() - window)
            .min_by_key(|&start| {
                segments[start..start + window].iter().map(|s| s.live_docs as u64).sum::<u64>()
            })
            .unwrap_or(0);
        (start..start + window).collect()
    }
}
