//! Searching an index.
//!
//! A [`Searcher`] runs every request against one snapshot of the segment
//! set: the query is parsed and planned with the index analyzers, executed
//! per segment, and the requested page is aggregated with the attributes of
//! its documents.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::analysis::analyzer::PerFieldAnalyzer;
use crate::config::{IndexConfig, SearchConfig};
use crate::error::{LexisError, Result};
use crate::index::{IndexManager, Snapshot};
use crate::query::aggregator::aggregate;
use crate::query::executor::{ExecuteOptions, Executor};
use crate::query::parser::QueryParser;
use crate::query::planner;
use crate::query::request::{QueryInput, SearchHit, SearchRequest, SearchResults, SearchStatus};

/// Executes search requests against the published segments of an index.
#[derive(Debug, Clone)]
pub struct Searcher {
    manager: Arc<IndexManager>,
    analyzers: Arc<PerFieldAnalyzer>,
    parser: QueryParser,
    executor: Executor,
    field_weights: Vec<u32>,
    config: SearchConfig,
}

impl Searcher {
    pub fn new(
        manager: Arc<IndexManager>,
        analyzers: Arc<PerFieldAnalyzer>,
        config: &IndexConfig,
    ) -> Result<Self> {
        Ok(Searcher {
            manager,
            analyzers,
            parser: QueryParser::new(),
            executor: Executor::with_threads(config.search.search_threads)?,
            field_weights: config.fields.iter().map(|f| f.weight).collect(),
            config: config.search.clone(),
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search the current snapshot.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResults> {
        let snapshot = self.manager.current_snapshot();
        self.search_snapshot(&snapshot, request)
    }

    /// Search a snapshot taken earlier.
    pub fn search_snapshot(
        &self,
        snapshot: &Snapshot,
        request: &SearchRequest,
    ) -> Result<SearchResults> {
        let started = Instant::now();
        let result = self.run(snapshot, request);
        match &result {
            Ok(results) => debug!(
                snapshot = snapshot.version(),
                matched = results.total_matched,
                returned = results.hits.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "search finished"
            ),
            Err(LexisError::OperationCancelled(reason)) => info!(
                snapshot = snapshot.version(),
                reason = %reason,
                "search cancelled"
            ),
            Err(_) => {}
        }
        result.map(|mut results| {
            results.took_ms = started.elapsed().as_millis() as u64;
            results
        })
    }

    fn run(&self, snapshot: &Snapshot, request: &SearchRequest) -> Result<SearchResults> {
        let query = match &request.query {
            QueryInput::Text(text) => Cow::Owned(self.parser.parse(text)?),
            QueryInput::Node(node) => Cow::Borrowed(node),
        };
        let plan = planner::plan(&query, &self.analyzers)?;

        let mut warnings = Vec::new();
        let mut status = SearchStatus::Ok;
        if snapshot.is_partial() {
            status = SearchStatus::Partial;
            warnings.push(format!(
                "segments {:?} failed validation and were not searched",
                snapshot.excluded_segments()
            ));
        }

        if plan.is_empty() {
            let mut results = SearchResults::empty(SearchStatus::EmptyQuery, snapshot.version());
            results.warnings = warnings;
            return Ok(results);
        }

        let offset = request.offset;
        let max_matches = request.max_matches.unwrap_or(self.config.max_matches);
        let mut limit = request.limit.unwrap_or(self.config.default_limit);
        if offset.saturating_add(limit) > max_matches {
            limit = max_matches.saturating_sub(offset);
            warnings.push(format!("results are limited to the first {max_matches} matches"));
        }

        let grouped = request.group_by.is_some();
        let options = ExecuteOptions {
            ranking: request.ranking.unwrap_or(self.config.default_ranking),
            field_weights: &self.field_weights,
            filters: &request.filters,
            sort: &request.sort,
            group_by: request.group_by.as_deref(),
            keep: if grouped { None } else { Some(offset + limit) },
            cancellation: request.cancellation.as_ref(),
        };
        let stream = self.executor.execute(&plan, snapshot, &options)?;
        let page = aggregate(stream, limit, offset, grouped)?;

        let segments = snapshot.segments();
        let hits = page
            .hits
            .into_iter()
            .map(|hit| SearchHit {
                doc_id: hit.doc.doc_id,
                score: hit.doc.score,
                attributes: segments
                    .get(hit.doc.segment)
                    .and_then(|live| live.segment.stored(hit.doc.local))
                    .map(|stored| stored.attributes.clone())
                    .unwrap_or_default(),
                group_count: hit.group_count,
            })
            .collect();

        Ok(SearchResults {
            hits,
            total_matched: page.total_matched,
            status,
            warnings,
            snapshot_version: snapshot.version(),
            took_ms: 0,
        })
    }
}
