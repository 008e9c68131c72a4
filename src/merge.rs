//! Segment merging.
//!
//! - [`policy`] decides which contiguous runs of segments to merge,
//! - [`merger`] writes the merged segment,
//! - [`scheduler`] runs the policy on a background thread.

pub mod merger;
pub mod policy;
pub mod scheduler;

pub use merger::{MergeResult, MergeStats, SegmentMerger};
pub use policy::{MergeCandidate, MergePolicy, MergePolicyConfig, NoMergePolicy, TieredMergePolicy};
pub use scheduler::MergeScheduler;
