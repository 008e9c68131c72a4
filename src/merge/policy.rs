//! Merge policies.
//!
//! A policy looks at the live segment set, in global order, and proposes
//! contiguous runs of segments to merge. Only contiguous runs are proposed so
//! that a merged segment can take the place of its inputs without changing
//! the global document order.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::error::{LexisError, Result};
use crate::segment::SegmentId;

/// Parameters of the size-tiered merge policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergePolicyConfig {
    /// Segments smaller than this many bytes are "small".
    pub small_segment_bytes: u64,

    /// Merging starts once there are more small segments than this.
    pub max_small_segments: usize,

    /// Maximum number of segments merged at once.
    pub max_merge_width: usize,

    /// Minimum number of small segments worth merging.
    pub min_merge_width: usize,

    /// Deletion ratio (0.0-1.0) above which a segment is compacted.
    pub deletion_threshold: f64,
}

impl Default for MergePolicyConfig {
    fn default() -> Self {
        MergePolicyConfig {
            small_segment_bytes: 4 * 1024 * 1024,
            max_small_segments: 8,
            max_merge_width: 10,
            min_merge_width: 2,
            deletion_threshold: 0.3,
        }
    }
}

impl MergePolicyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_merge_width < 2 {
            return Err(LexisError::config("min_merge_width must be at least 2"));
        }
        if self.max_merge_width < self.min_merge_width {
            return Err(LexisError::config(
                "max_merge_width must not be smaller than min_merge_width",
            ));
        }
        if !(self.deletion_threshold > 0.0 && self.deletion_threshold <= 1.0) {
            return Err(LexisError::config("deletion_threshold must be in (0, 1]"));
        }
        Ok(())
    }
}

/// What a policy needs to know about a live segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentInfo {
    pub id: SegmentId,
    pub size_bytes: u64,
    pub doc_count: u32,
    pub deleted_count: u32,
}

impl SegmentInfo {
    pub fn deletion_ratio(&self) -> f64 {
        if self.doc_count == 0 {
            0.0
        } else {
            f64::from(self.deleted_count) / f64::from(self.doc_count)
        }
    }
}

/// Why a merge was proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeReason {
    /// Too many small segments.
    SmallSegments,

    /// Deleted documents should be expunged.
    Deletions,

    /// Explicit request to merge everything.
    Forced,
}

/// A contiguous run of segments to merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeCandidate {
    /// Segment ids, in global order.
    pub segments: Vec<SegmentId>,

    /// Priority score (higher = more urgent).
    pub priority: f64,

    /// Size of the inputs in bytes.
    pub estimated_size: u64,

    pub reason: MergeReason,
}

impl MergeCandidate {
    fn from_run(run: &[SegmentInfo], priority: f64, reason: MergeReason) -> Self {
        MergeCandidate {
            segments: run.iter().map(|s| s.id).collect(),
            priority,
            estimated_size: run.iter().map(|s| s.size_bytes).sum(),
            reason,
        }
    }

    /// Merge every segment into one, if that changes anything.
    pub fn forced(segments: &[SegmentInfo]) -> Option<Self> {
        let worthwhile = segments.len() > 1 || segments.iter().any(|s| s.deleted_count > 0);
        worthwhile.then(|| Self::from_run(segments, f64::MAX, MergeReason::Forced))
    }
}

/// Strategy for selecting merges.
pub trait MergePolicy: Debug + Send + Sync {
    /// Propose disjoint merges, most urgent first.
    fn find_merges(&self, segments: &[SegmentInfo]) -> Vec<MergeCandidate>;

    fn name(&self) -> &'static str;
}

/// Size-tiered policy: merge runs of small segments once there are too many
/// of them, and compact segments with many deletions.
#[derive(Debug, Clone, Default)]
pub struct TieredMergePolicy {
    config: MergePolicyConfig,
}

impl TieredMergePolicy {
    pub fn new(config: MergePolicyConfig) -> Self {
        TieredMergePolicy { config }
    }

    pub fn config(&self) -> &MergePolicyConfig {
        &self.config
    }

    fn is_small(&self, segment: &SegmentInfo) -> bool {
        segment.size_bytes < self.config.small_segment_bytes
    }

    fn small_runs(&self, segments: &[SegmentInfo], taken: &mut [bool]) -> Vec<MergeCandidate> {
        let small_count = segments.iter().filter(|s| self.is_small(s)).count();
        if small_count <= self.config.max_small_segments {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        let mut start = 0;
        while start < segments.len() {
            if !self.is_small(&segments[start]) {
                start += 1;
                continue;
            }
            let mut end = start;
            while end < segments.len() && self.is_small(&segments[end]) {
                end += 1;
            }

            let mut chunk_start = start;
            while chunk_start < end {
                let chunk_end = (chunk_start + self.config.max_merge_width).min(end);
                let width = chunk_end - chunk_start;
                if width >= self.config.min_merge_width {
                    candidates.push(MergeCandidate::from_run(
                        &segments[chunk_start..chunk_end],
                        width as f64,
                        MergeReason::SmallSegments,
                    ));
                    taken[chunk_start..chunk_end].fill(true);
                }
                chunk_start = chunk_end;
            }
            start = end;
        }
        candidates
    }

    fn deletion_runs(&self, segments: &[SegmentInfo], taken: &mut [bool]) -> Vec<MergeCandidate> {
        let threshold = self.config.deletion_threshold;
        let over = |taken: &[bool], i: usize| {
            !taken[i] && segments[i].deletion_ratio() > threshold
        };

        let mut candidates = Vec::new();
        let mut start = 0;
        while start < segments.len() {
            if !over(taken, start) {
                start += 1;
                continue;
            }
            let mut end = start + 1;
            while end < segments.len()
                && end - start < self.config.max_merge_width
                && over(taken, end)
            {
                end += 1;
            }
            let run = &segments[start..end];
            let deleted: u64 = run.iter().map(|s| u64::from(s.deleted_count)).sum();
            let docs: u64 = run.iter().map(|s| u64::from(s.doc_count)).sum::<u64>().max(1);
            candidates.push(MergeCandidate::from_run(
                run,
                100.0 + 100.0 * deleted as f64 / docs as f64,
                MergeReason::Deletions,
            ));
            taken[start..end].fill(true);
            start = end;
        }
        candidates
    }
}

impl MergePolicy for TieredMergePolicy {
    fn find_merges(&self, segments: &[SegmentInfo]) -> Vec<MergeCandidate> {
        let mut taken = vec![false; segments.len()];
        let mut candidates = self.small_runs(segments, &mut taken);
        candidates.extend(self.deletion_runs(segments, &mut taken));
        candidates.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        candidates
    }

    fn name(&self) -> &'static str {
        "tiered"
    }
}

/// Never proposes a merge.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMergePolicy;

impl MergePolicy for NoMergePolicy {
    fn find_merges(&self, _segments: &[SegmentInfo]) -> Vec<MergeCandidate> {
        Vec::new()
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: SegmentId, size: u64) -> SegmentInfo {
        SegmentInfo {
            id,
            size_bytes: size,
            doc_count: 100,
            deleted_count: 0,
        }
    }

    fn policy() -> TieredMergePolicy {
        TieredMergePolicy::new(MergePolicyConfig {
            small_segment_bytes: 1000,
            max_small_segments: 3,
            max_merge_width: 3,
            min_merge_width: 2,
            deletion_threshold: 0.3,
        })
    }

    #[test]
    fn test_no_merge_below_threshold() {
        let segments = vec![info(1, 10), info(2, 10), info(3, 10)];
        assert!(policy().find_merges(&segments).is_empty());
    }

    #[test]
    fn test_contiguous_small_runs() {
        let segments = vec![
            info(1, 5000),
            info(2, 10),
            info(3, 10),
            info(4, 5000),
            info(5, 10),
            info(6, 10),
            info(7, 10),
            info(8, 10),
        ];
        let merges = policy().find_merges(&segments);
        let runs: Vec<Vec<SegmentId>> = merges.iter().map(|m| m.segments.clone()).collect();
        assert_eq!(runs, vec![vec![5, 6, 7], vec![2, 3]]);
        assert!(merges.iter().all(|m| m.reason == MergeReason::SmallSegments));
        assert_eq!(merges[0].estimated_size, 30);
    }

    #[test]
    fn test_deletion_candidates() {
        let mut heavy = info(2, 5000);
        heavy.deleted_count = 50;
        let segments = vec![info(1, 5000), heavy, info(3, 5000)];
        let merges = policy().find_merges(&segments);
        assert_eq!(merges.len(), 1);
        assert_eq!(merges[0].segments, vec![2]);
        assert_eq!(merges[0].reason, MergeReason::Deletions);
    }

    #[test]
    fn test_adjacent_deletion_heavy_segments_merge_together() {
        let heavy = |id| SegmentInfo {
            deleted_count: 60,
            ..info(id, 5000)
        };
        let segments = vec![
            heavy(1),
            heavy(2),
            info(3, 5000),
            heavy(4),
            heavy(5),
            heavy(6),
            heavy(7),
        ];
        let merges = policy().find_merges(&segments);
        let runs: Vec<Vec<SegmentId>> = merges.iter().map(|m| m.segments.clone()).collect();
        assert_eq!(runs.len(), 3);
        assert!(runs.contains(&vec![1, 2]));
        assert!(runs.contains(&vec![4, 5, 6]));
        assert!(runs.contains(&vec![7]));
        assert!(merges.iter().all(|m| m.reason == MergeReason::Deletions));
    }

    #[test]
    fn test_forced_candidate() {
        assert!(MergeCandidate::forced(&[info(1, 10)]).is_none());
        let forced = MergeCandidate::forced(&[info(1, 10), info(2, 10)]).unwrap();
        assert_eq!(forced.segments, vec![1, 2]);
        assert!(NoMergePolicy.find_merges(&[info(1, 1), info(2, 1)]).is_empty());
    }

    #[test]
    fn test_config_validation() {
        MergePolicyConfig::default().validate().unwrap();
        let bad = MergePolicyConfig {
            min_merge_width: 1,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
