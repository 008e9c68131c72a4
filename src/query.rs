//! Query language, planning and execution.
//!
//! A query string is parsed into a [`QueryNode`] tree, analyzed per field
//! into an [`ExecutionPlan`], executed segment by segment against a
//! snapshot and finally paginated or grouped into a result page.

pub mod aggregator;
pub mod ast;
pub mod cancel;
pub mod cursor;
pub mod executor;
pub mod parser;
pub mod planner;
pub mod request;
pub mod scorer;

pub use aggregator::{AggregatedHit, AggregatedResults, aggregate};
pub use ast::QueryNode;
pub use cancel::CancellationToken;
pub use executor::{Executor, RankOrder, RankedStream, ScoredDoc};
pub use parser::QueryParser;
pub use planner::{ExecutionPlan, plan};
pub use request::{
    Filter, QueryInput, SearchHit, SearchRequest, SearchResults, SearchStatus, SortMode,
};
pub use scorer::RankingMode;
