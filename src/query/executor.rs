//! Plan execution.
//!
//! Each segment of the snapshot is executed independently: its cursor tree
//! yields candidate documents, deleted documents and documents rejected by
//! the attribute filters are skipped, and only the survivors are scored.
//! Per-segment results are sorted in rank order and combined by a lazy
//! k-way merge ([`RankedStream`]). Segments run in parallel on a `rayon`
//! pool when the executor has one.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use crate::document::{AttributeValue, DocId, GroupKey};
use crate::error::{LexisError, Result};
use crate::index::segment_set::{LiveSegment, Snapshot};
use crate::query::cancel::CancellationToken;
use crate::query::cursor::{self, Hit};
use crate::query::planner::ExecutionPlan;
use crate::query::request::{Filter, SortMode};
use crate::query::scorer::{RankingMode, Scorer};
use crate::segment::LocalDocNo;

/// Documents between two cancellation checks.
const CANCEL_CHECK_INTERVAL: u32 = 256;

/// A match that survived deletions and filters.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub score: f32,

    /// Index of the segment in the snapshot.
    pub segment: usize,
    pub local: LocalDocNo,

    /// Value of the sort attribute, when sorting by attribute.
    pub sort_value: Option<AttributeValue>,

    /// Group of the document, when grouping.
    pub group: Option<GroupKey>,
}

/// Direction of the attribute sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    Relevance,
    AttributeAsc,
    AttributeDesc,
}

impl From<&SortMode> for RankOrder {
    fn from(sort: &SortMode) -> Self {
        match sort {
            SortMode::Relevance => RankOrder::Relevance,
            SortMode::AttributeAsc(_) => RankOrder::AttributeAsc,
            SortMode::AttributeDesc(_) => RankOrder::AttributeDesc,
        }
    }
}

impl RankOrder {
    /// `Less` ranks first. Documents missing the sort attribute come last;
    /// ties fall back to score descending, then external id ascending.
    pub fn compare(self, a: &ScoredDoc, b: &ScoredDoc) -> Ordering {
        let by_attribute = match self {
            RankOrder::Relevance => Ordering::Equal,
            RankOrder::AttributeAsc | RankOrder::AttributeDesc => {
                match (&a.sort_value, &b.sort_value) {
                    (Some(x), Some(y)) if self == RankOrder::AttributeAsc => x.sort_cmp(y),
                    (Some(x), Some(y)) => y.sort_cmp(x),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            }
        };
        by_attribute
            .then_with(|| b.score.total_cmp(&a.score))
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    }
}

/// How one execution filters, scores and collects.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions<'a> {
    pub ranking: RankingMode,
    pub field_weights: &'a [u32],
    pub filters: &'a [Filter],
    pub sort: &'a SortMode,
    pub group_by: Option<&'a str>,

    /// Best matches kept per segment; `None` keeps every match.
    pub keep: Option<usize>,
    pub cancellation: Option<&'a CancellationToken>,
}

/// Matches of one segment, best first.
#[derive(Debug, Clone, Default)]
pub struct SegmentResults {
    pub docs: Vec<ScoredDoc>,

    /// Matches before truncation to `keep`.
    pub matched: u64,
}

/// Heap entry ordered so that the worst-ranked document is the greatest.
struct Ranked {
    doc: ScoredDoc,
    order: RankOrder,
    source: usize,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order
            .compare(&self.doc, &other.doc)
            .then_with(|| self.source.cmp(&other.source))
    }
}

/// Collects the matches of one segment, bounded when `keep` is set.
struct Collector {
    order: RankOrder,
    keep: Option<usize>,
    heap: BinaryHeap<Ranked>,
    all: Vec<ScoredDoc>,
}

impl Collector {
    fn new(order: RankOrder, keep: Option<usize>) -> Self {
        Collector {
            order,
            keep,
            heap: BinaryHeap::new(),
            all: Vec::new(),
        }
    }

    fn push(&mut self, doc: ScoredDoc) {
        match self.keep {
            None => self.all.push(doc),
            Some(0) => {}
            Some(keep) => {
                self.heap.push(Ranked {
                    doc,
                    order: self.order,
                    source: 0,
                });
                if self.heap.len() > keep {
                    self.heap.pop();
                }
            }
        }
    }

    fn into_sorted(self) -> Vec<ScoredDoc> {
        match self.keep {
            None => {
                let mut docs = self.all;
                let order = self.order;
                docs.sort_by(|a, b| order.compare(a, b));
                docs
            }
            Some(_) => self
                .heap
                .into_sorted_vec()
                .into_iter()
                .map(|r| r.doc)
                .collect(),
        }
    }
}

/// Runs execution plans against snapshots.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl Executor {
    /// Executes segments one after another on the calling thread.
    pub fn sequential() -> Self {
        Executor { pool: None }
    }

    /// Executes segments on a dedicated pool of `threads` threads; 0 means
    /// one per CPU and 1 means sequential execution.
    pub fn with_threads(threads: usize) -> Result<Self> {
        let threads = if threads == 0 { num_cpus::get() } else { threads };
        if threads <= 1 {
            return Ok(Self::sequential());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("lexis-search-{i}"))
            .build()
            .map_err(|e| LexisError::other(format!("failed to build search pool: {e}")))?;
        Ok(Executor {
            pool: Some(Arc::new(pool)),
        })
    }

    /// Execute `plan` against every segment of `snapshot`.
    pub fn execute(
        &self,
        plan: &ExecutionPlan,
        snapshot: &Snapshot,
        options: &ExecuteOptions<'_>,
    ) -> Result<RankedStream> {
        let scorer = Scorer::new(options.ranking, plan, snapshot, options.field_weights);
        let segments = snapshot.segments();
        let run = |(index, live): (usize, &LiveSegment)| {
            execute_segment(index, live, plan, &scorer, options)
        };

        let per_segment = match &self.pool {
            Some(pool) if segments.len() > 1 => pool.install(|| {
                segments
                    .par_iter()
                    .enumerate()
                    .map(run)
                    .collect::<Result<Vec<_>>>()
            })?,
            _ => segments
                .iter()
                .enumerate()
                .map(run)
                .collect::<Result<Vec<_>>>()?,
        };

        Ok(RankedStream::new(
            per_segment,
            RankOrder::from(options.sort),
            options.cancellation.cloned(),
        ))
    }
}

fn execute_segment(
    index: usize,
    live: &LiveSegment,
    plan: &ExecutionPlan,
    scorer: &Scorer,
    options: &ExecuteOptions<'_>,
) -> Result<SegmentResults> {
    if let Some(token) = options.cancellation {
        token.check()?;
    }
    let segment = &live.segment;
    let Some(mut cursor) = cursor::build(&plan.root, segment)? else {
        return Ok(SegmentResults::default());
    };

    let sort_attribute = options.sort.attribute();
    let mut collector = Collector::new(RankOrder::from(options.sort), options.keep);
    let mut hits: Vec<Hit> = Vec::new();
    let mut matched = 0u64;
    let mut steps = 0u32;

    while let Some(local) = cursor.doc() {
        steps = steps.wrapping_add(1);
        if steps % CANCEL_CHECK_INTERVAL == 0 {
            if let Some(token) = options.cancellation {
                token.check()?;
            }
        }

        let candidate = if live.is_deleted(local) {
            None
        } else {
            segment
                .stored(local)
                .filter(|stored| options.filters.iter().all(|f| f.accepts(stored)))
        };
        let group = match (candidate, options.group_by) {
            (Some(stored), Some(attribute)) => stored.attributes.get(attribute).map(|v| Some(v.group_key())),
            (Some(_), None) => Some(None),
            (None, _) => None,
        };

        if let (Some(stored), Some(group)) = (candidate, group) {
            hits.clear();
            cursor.collect_matches(&mut hits)?;
            matched += 1;
            collector.push(ScoredDoc {
                doc_id: stored.doc_id,
                score: scorer.score(&hits, stored),
                segment: index,
                local,
                sort_value: sort_attribute.and_then(|a| stored.attributes.get(a).cloned()),
                group,
            });
        }
        cursor.advance()?;
    }

    debug!(
        segment = segment.id(),
        candidates = steps,
        matched,
        "executed segment"
    );
    Ok(SegmentResults {
        docs: collector.into_sorted(),
        matched,
    })
}

/// Lazy k-way merge of per-segment results in rank order.
///
/// Yields an error, once, when the query's cancellation token fires.
pub struct RankedStream {
    sources: Vec<std::vec::IntoIter<ScoredDoc>>,
    heap: BinaryHeap<Reverse<Ranked>>,
    order: RankOrder,
    total_matched: u64,
    cancellation: Option<CancellationToken>,
    done: bool,
}

impl RankedStream {
    pub fn new(
        per_segment: Vec<SegmentResults>,
        order: RankOrder,
        cancellation: Option<CancellationToken>,
    ) -> Self {
        let total_matched = per_segment.iter().map(|s| s.matched).sum();
        let mut sources: Vec<_> = per_segment.into_iter().map(|s| s.docs.into_iter()).collect();
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (source, docs) in sources.iter_mut().enumerate() {
            if let Some(doc) = docs.next() {
                heap.push(Reverse(Ranked { doc, order, source }));
            }
        }
        RankedStream {
            sources,
            heap,
            order,
            total_matched,
            cancellation,
            done: false,
        }
    }

    /// Matches over all segments, before any truncation.
    pub fn total_matched(&self) -> u64 {
        self.total_matched
    }
}

impl Iterator for RankedStream {
    type Item = Result<ScoredDoc>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(Err(err)) = self.cancellation.as_ref().map(|t| t.check()) {
            self.done = true;
            self.heap.clear();
            return Some(Err(err));
        }

        let Reverse(Ranked { doc, source, .. }) = self.heap.pop()?;
        if let Some(next) = self.sources[source].next() {
            self.heap.push(Reverse(Ranked {
                doc: next,
                order: self.order,
                source,
            }));
        }
        Some(Ok(doc))
    }
}
