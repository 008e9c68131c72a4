//! Pagination and grouping of ranked matches.

use ahash::AHashMap;

use crate::document::GroupKey;
use crate::error::Result;
use crate::query::executor::{RankedStream, ScoredDoc};

/// One entry of a result page.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedHit {
    pub doc: ScoredDoc,

    /// Matches sharing the hit's group, when grouping.
    pub group_count: Option<u64>,
}

/// A page of ranked matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedResults {
    pub hits: Vec<AggregatedHit>,

    /// Matches, or groups when grouping.
    pub total_matched: u64,
}

/// Cut the page `offset..offset + limit` out of `stream`.
///
/// With `grouped`, every group is represented by its best-ranked match and
/// groups are ordered by that match. Matches carrying no group are dropped.
pub fn aggregate(
    stream: RankedStream,
    limit: usize,
    offset: usize,
    grouped: bool,
) -> Result<AggregatedResults> {
    if grouped {
        aggregate_groups(stream, limit, offset)
    } else {
        paginate(stream, limit, offset)
    }
}

fn paginate(mut stream: RankedStream, limit: usize, offset: usize) -> Result<AggregatedResults> {
    let total_matched = stream.total_matched();
    let mut hits = Vec::with_capacity(limit.min(1024));
    for (rank, doc) in stream.by_ref().take(offset.saturating_add(limit)).enumerate() {
        let doc = doc?;
        if rank >= offset {
            hits.push(AggregatedHit {
                doc,
                group_count: None,
            });
        }
    }
    Ok(AggregatedResults {
        hits,
        total_matched,
    })
}

fn aggregate_groups(stream: RankedStream, limit: usize, offset: usize) -> Result<AggregatedResults> {
    let mut index: AHashMap<GroupKey, usize> = AHashMap::new();
    let mut groups: Vec<(ScoredDoc, u64)> = Vec::new();

    for doc in stream {
        let doc = doc?;
        let Some(key) = doc.group.clone() else {
            continue;
        };
        match index.get(&key) {
            Some(&slot) => groups[slot].1 += 1,
            None => {
                index.insert(key, groups.len());
                groups.push((doc, 1));
            }
        }
    }

    let total_matched = groups.len() as u64;
    let hits = groups
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|(doc, count)| AggregatedHit {
            doc,
            group_count: Some(count),
        })
        .collect();
    Ok(AggregatedResults {
        hits,
        total_matched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::AttributeValue;
    use crate::query::executor::{RankOrder, SegmentResults};

    fn doc(doc_id: u64, score: f32, group: Option<i64>) -> ScoredDoc {
        ScoredDoc {
            doc_id,
            score,
            segment: 0,
            local: doc_id as u32,
            sort_value: None,
            group: group.map(|g| AttributeValue::Int(g).group_key()),
        }
    }

    fn stream(segments: Vec<Vec<ScoredDoc>>) -> RankedStream {
        let per_segment = segments
            .into_iter()
            .map(|docs| SegmentResults {
                matched: docs.len() as u64,
                docs,
            })
            .collect();
        RankedStream::new(per_segment, RankOrder::Relevance, None)
    }

    fn ids(results: &AggregatedResults) -> Vec<u64> {
        results.hits.iter().map(|h| h.doc.doc_id).collect()
    }

    #[test]
    fn test_pagination() {
        let segments = || {
            vec![
                vec![doc(1, 5.0, None), doc(3, 3.0, None), doc(5, 1.0, None)],
                vec![doc(2, 4.0, None), doc(4, 2.0, None)],
            ]
        };

        let page = aggregate(stream(segments()), 2, 0, false).unwrap();
        assert_eq!(ids(&page), vec![1, 2]);
        assert_eq!(page.total_matched, 5);

        let page = aggregate(stream(segments()), 2, 2, false).unwrap();
        assert_eq!(ids(&page), vec![3, 4]);

        let page = aggregate(stream(segments()), 10, 4, false).unwrap();
        assert_eq!(ids(&page), vec![5]);

        let page = aggregate(stream(segments()), 10, 9, false).unwrap();
        assert!(page.hits.is_empty());
        assert_eq!(page.total_matched, 5);
    }

    #[test]
    fn test_grouping_keeps_best_per_group() {
        let segments = vec![
            vec![doc(1, 9.0, Some(10)), doc(2, 7.0, Some(20)), doc(3, 1.0, Some(10))],
            vec![doc(4, 8.0, Some(10)), doc(5, 6.0, None), doc(6, 2.0, Some(30))],
        ];
        let page = aggregate(stream(segments), 10, 0, true).unwrap();
        assert_eq!(ids(&page), vec![1, 2, 6]);
        assert_eq!(page.total_matched, 3);
        let counts: Vec<_> = page.hits.iter().map(|h| h.group_count).collect();
        assert_eq!(counts, vec![Some(3), Some(1), Some(1)]);
    }

    #[test]
    fn test_grouped_pagination() {
        let segments = vec![vec![
            doc(1, 4.0, Some(1)),
            doc(2, 3.0, Some(2)),
            doc(3, 2.0, Some(3)),
            doc(4, 1.0, Some(1)),
        ]];
        let page = aggregate(stream(segments), 1, 1, true).unwrap();
        assert_eq!(ids(&page), vec![2]);
        assert_eq!(page.total_matched, 3);
    }
}
