//! Relevance ranking.
//!
//! Scores are computed from the hits a document's cursor collected and the
//! document's stored field lengths. Term rarity and average document length
//! come from the statistics of the whole snapshot, so a document scores the
//! same no matter which segment holds it.

use std::fmt;
use std::str::FromStr;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{LexisError, Result};
use crate::index::segment_set::Snapshot;
use crate::query::cursor::Hit;
use crate::query::planner::ExecutionPlan;
use crate::segment::attributes::StoredDocument;
use crate::segment::types::position_field;

/// Default BM25 term frequency saturation.
pub const DEFAULT_K1: f32 = 1.2;

/// Default BM25 length normalization.
pub const DEFAULT_B: f32 = 0.75;

fn default_k1() -> f32 {
    DEFAULT_K1
}

fn default_b() -> f32 {
    DEFAULT_B
}

/// How matches are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RankingMode {
    /// Weighted longest run of query terms in query order, per field,
    /// plus BM25 scaled into `[0, 1]`.
    #[default]
    ProximityBm25,

    /// Okapi BM25.
    Bm25 {
        #[serde(default = "default_k1")]
        k1: f32,
        #[serde(default = "default_b")]
        b: f32,
    },

    /// Sum of `(1 + ln tf) × idf` over query terms.
    TfIdf,

    /// Sum of field weights over all hits.
    WordCount,

    /// Every match scores 1.
    None,
}

impl RankingMode {
    /// BM25 with the default parameters.
    pub fn bm25() -> Self {
        RankingMode::Bm25 {
            k1: DEFAULT_K1,
            b: DEFAULT_B,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RankingMode::ProximityBm25 => "proximity_bm25",
            RankingMode::Bm25 { .. } => "bm25",
            RankingMode::TfIdf => "tfidf",
            RankingMode::WordCount => "wordcount",
            RankingMode::None => "none",
        }
    }
}

impl fmt::Display for RankingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RankingMode {
    type Err = LexisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "proximity_bm25" | "proximity-bm25" => Ok(RankingMode::ProximityBm25),
            "bm25" => Ok(RankingMode::bm25()),
            "tfidf" | "tf_idf" | "tf-idf" => Ok(RankingMode::TfIdf),
            "wordcount" | "word_count" => Ok(RankingMode::WordCount),
            "none" => Ok(RankingMode::None),
            other => Err(LexisError::config(format!("unknown ranking mode '{other}'"))),
        }
    }
}

/// Scores documents of one query against one snapshot.
#[derive(Debug, Clone)]
pub struct Scorer {
    mode: RankingMode,
    k1: f32,
    b: f32,
    /// Per plan slot.
    idf: Vec<f32>,
    query_pos: Vec<u32>,
    positive: Vec<bool>,
    /// Largest possible BM25 sum, for scaling into `[0, 1]`.
    bm25_max: f32,
    avg_doc_len: f32,
    field_weights: Vec<f32>,
}

/// Inverse document frequency that stays positive for very common terms.
fn inverse_doc_freq(doc_count: f32, doc_freq: f32) -> f32 {
    (1.0 + (doc_count - doc_freq + 0.5) / (doc_freq + 0.5)).ln()
}

impl Scorer {
    pub fn new(
        mode: RankingMode,
        plan: &ExecutionPlan,
        snapshot: &Snapshot,
        field_weights: &[u32],
    ) -> Self {
        let (k1, b) = match mode {
            RankingMode::Bm25 { k1, b } => (k1, b),
            _ => (DEFAULT_K1, DEFAULT_B),
        };

        let doc_count = snapshot.doc_count().max(1) as f32;
        let mut by_text: AHashMap<&str, f32> = AHashMap::new();
        let idf: Vec<f32> = plan
            .terms
            .iter()
            .map(|term| {
                *by_text.entry(term.text.as_str()).or_insert_with(|| {
                    inverse_doc_freq(doc_count, snapshot.doc_freq(&term.text) as f32)
                })
            })
            .collect();
        let positive: Vec<bool> = plan.terms.iter().map(|t| !t.negated).collect();
        let bm25_max: f32 = idf
            .iter()
            .zip(&positive)
            .filter(|(_, positive)| **positive)
            .map(|(idf, _)| idf * (k1 + 1.0))
            .sum();

        let total_len: u64 = snapshot.total_field_lengths(plan.field_count).iter().sum();
        let avg_doc_len = if total_len == 0 {
            1.0
        } else {
            total_len as f32 / doc_count
        };

        Scorer {
            mode,
            k1,
            b,
            idf,
            query_pos: plan.terms.iter().map(|t| t.query_pos).collect(),
            positive,
            bm25_max,
            avg_doc_len,
            field_weights: field_weights.iter().map(|&w| w as f32).collect(),
        }
    }

    pub fn mode(&self) -> RankingMode {
        self.mode
    }

    /// Score one document from its hits.
    pub fn score(&self, hits: &[Hit], doc: &StoredDocument) -> f32 {
        match self.mode {
            RankingMode::None => 1.0,
            RankingMode::WordCount => self.word_count(hits),
            RankingMode::TfIdf => self.tf_idf(hits),
            RankingMode::Bm25 { .. } => self.bm25(hits, doc),
            RankingMode::ProximityBm25 => {
                let bm25 = if self.bm25_max > 0.0 {
                    (self.bm25(hits, doc) / self.bm25_max).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                self.proximity(hits) + bm25
            }
        }
    }

    fn weight(&self, field: usize) -> f32 {
        self.field_weights.get(field).copied().unwrap_or(1.0)
    }

    fn term_freqs(&self, hits: &[Hit]) -> Vec<u32> {
        let mut tf = vec![0u32; self.idf.len()];
        for hit in hits {
            if let Some(count) = tf.get_mut(hit.slot) {
                *count += 1;
            }
        }
        tf
    }

    fn bm25(&self, hits: &[Hit], doc: &StoredDocument) -> f32 {
        let doc_len = doc.total_length() as f32;
        let norm = self.k1 * (1.0 - self.b + self.b * doc_len / self.avg_doc_len);
        self.term_freqs(hits)
            .iter()
            .enumerate()
            .filter(|&(slot, &tf)| tf > 0 && self.positive[slot])
            .map(|(slot, &tf)| {
                let tf = tf as f32;
                self.idf[slot] * tf * (self.k1 + 1.0) / (tf + norm)
            })
            .sum()
    }

    fn tf_idf(&self, hits: &[Hit]) -> f32 {
        self.term_freqs(hits)
            .iter()
            .enumerate()
            .filter(|&(slot, &tf)| tf > 0 && self.positive[slot])
            .map(|(slot, &tf)| (1.0 + (tf as f32).ln()) * self.idf[slot])
            .sum()
    }

    fn word_count(&self, hits: &[Hit]) -> f32 {
        hits.iter()
            .map(|hit| self.weight(position_field(hit.position)))
            .sum()
    }

    /// Per field, the longest run of hits at consecutive positions whose
    /// query positions are consecutive too, times the field weight.
    fn proximity(&self, hits: &[Hit]) -> f32 {
        let mut ordered: Vec<(u32, u32)> = hits
            .iter()
            .filter(|hit| self.positive.get(hit.slot).copied().unwrap_or(false))
            .map(|hit| (hit.position, self.query_pos[hit.slot]))
            .collect();
        ordered.sort_unstable();
        ordered.dedup();

        let mut runs: AHashMap<(u32, u32), u32> = AHashMap::with_capacity(ordered.len());
        let mut best: Vec<(usize, u32)> = Vec::new();
        for &(position, query_pos) in &ordered {
            let previous = match (position.checked_sub(1), query_pos.checked_sub(1)) {
                (Some(p), Some(q)) if position_field(p) == position_field(position) => {
                    runs.get(&(p, q)).copied().unwrap_or(0)
                }
                _ => 0,
            };
            let run = previous + 1;
            runs.insert((position, query_pos), run);

            let field = position_field(position);
            match best.iter_mut().find(|(f, _)| *f == field) {
                Some((_, longest)) => *longest = (*longest).max(run),
                None => best.push((field, run)),
            }
        }

        best.iter()
            .map(|&(field, longest)| self.weight(field) * longest as f32)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::index::segment_set::SegmentSet;
    use crate::query::planner::{PlanNode, QueryTerm};
    use crate::segment::types::make_position;

    fn plan(terms: &[&str]) -> ExecutionPlan {
        ExecutionPlan {
            root: PlanNode::Empty,
            terms: terms
                .iter()
                .enumerate()
                .map(|(i, t)| QueryTerm {
                    text: t.to_string(),
                    query_pos: i as u32,
                    negated: false,
                })
                .collect(),
            field_count: 2,
        }
    }

    fn empty_snapshot() -> Snapshot {
        Snapshot::new(std::sync::Arc::new(SegmentSet::default()))
    }

    fn doc(lengths: Vec<u32>) -> StoredDocument {
        StoredDocument {
            doc_id: 1,
            field_lengths: lengths,
            attributes: BTreeMap::new(),
        }
    }

    fn hit(slot: usize, field: usize, word: u32) -> Hit {
        Hit {
            slot,
            position: make_position(field, word),
        }
    }

    #[test]
    fn test_mode_parsing_and_serde() {
        assert_eq!("bm25".parse::<RankingMode>().unwrap(), RankingMode::bm25());
        assert_eq!("WordCount".parse::<RankingMode>().unwrap(), RankingMode::WordCount);
        assert!("sph04".parse::<RankingMode>().is_err());

        let mode: RankingMode = serde_json::from_str(r#"{"mode":"bm25","k1":2.0}"#).unwrap();
        assert_eq!(mode, RankingMode::Bm25 { k1: 2.0, b: DEFAULT_B });
        assert_eq!(
            serde_json::to_string(&RankingMode::ProximityBm25).unwrap(),
            r#"{"mode":"proximity_bm25"}"#
        );
    }

    #[test]
    fn test_proximity_rewards_query_order() {
        let plan = plan(&["quick", "brown", "fox"]);
        let scorer = Scorer::new(RankingMode::ProximityBm25, &plan, &empty_snapshot(), &[2, 1]);
        let stored = doc(vec![3, 10]);

        let in_order = [hit(0, 0, 0), hit(1, 0, 1), hit(2, 0, 2)];
        let scattered = [hit(0, 0, 0), hit(2, 0, 1), hit(1, 0, 2)];
        let in_body = [hit(0, 1, 0), hit(1, 1, 1), hit(2, 1, 2)];

        let ordered = scorer.score(&in_order, &stored);
        assert!((6.0..=7.0).contains(&ordered));
        assert!(scorer.score(&scattered, &stored) < ordered);
        assert!(scorer.score(&in_body, &stored) < ordered);
    }

    #[test]
    fn test_word_count_and_none() {
        let plan = plan(&["a", "b"]);
        let hits = [hit(0, 0, 0), hit(0, 1, 4), hit(1, 1, 5)];
        let stored = doc(vec![1, 6]);

        let scorer = Scorer::new(RankingMode::WordCount, &plan, &empty_snapshot(), &[3, 1]);
        assert_eq!(scorer.score(&hits, &stored), 5.0);

        let scorer = Scorer::new(RankingMode::None, &plan, &empty_snapshot(), &[3, 1]);
        assert_eq!(scorer.score(&hits, &stored), 1.0);
    }

    #[test]
    fn test_bm25_saturates_and_normalizes_length() {
        let plan = plan(&["a"]);
        let scorer = Scorer::new(RankingMode::bm25(), &plan, &empty_snapshot(), &[1, 1]);

        let one = scorer.score(&[hit(0, 0, 0)], &doc(vec![1, 0]));
        let many: Vec<Hit> = (0..10).map(|w| hit(0, 0, w)).collect();
        let ten = scorer.score(&many, &doc(vec![10, 0]));
        assert!(ten > one);
        assert!(ten < one * 10.0);

        let long_doc = scorer.score(&[hit(0, 0, 0)], &doc(vec![50, 50]));
        assert!(long_doc < one);
        assert_eq!(scorer.score(&[], &doc(vec![1, 0])), 0.0);
    }

    #[test]
    fn test_negated_terms_do_not_score() {
        let mut plan = plan(&["a", "b"]);
        plan.terms[1].negated = true;
        let scorer = Scorer::new(RankingMode::TfIdf, &plan, &empty_snapshot(), &[1, 1]);
        let stored = doc(vec![2, 0]);
        assert_eq!(
            scorer.score(&[hit(0, 0, 0), hit(1, 0, 1)], &stored),
            scorer.score(&[hit(0, 0, 0)], &stored)
        );
    }
}
