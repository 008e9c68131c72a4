//! Command line argument parsing using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::document::DocId;

/// lexis - inspect and query a full-text index
#[derive(Parser, Debug, Clone)]
#[command(name = "lexis")]
#[command(about = "Build, query and inspect a lexis full-text index")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct LexisArgs {
    /// Verbosity level, repeat for more (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "json", global = true)]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl LexisArgs {
    /// Effective verbosity: 0 quiet, 1 normal, 2 verbose, 3 debug.
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose.saturating_add(1).min(3)
        }
    }

    /// Default log directive for the effective verbosity.
    pub fn log_level(&self) -> &'static str {
        match self.verbosity() {
            0 => "error",
            1 => "warn",
            2 => "info",
            _ => "debug",
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a new index
    Create(CreateArgs),

    /// Add documents from a JSON lines file
    Index(IndexArgs),

    /// Search an index
    Search(SearchArgs),

    /// Delete documents by id
    Delete(DeleteArgs),

    /// Merge segments
    Merge(MergeArgs),

    /// Show index statistics
    Stats(StatsArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct CreateArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH", env = "LEXIS_INDEX")]
    pub index_path: PathBuf,

    /// Index configuration file (JSON)
    #[arg(short, long, value_name = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Full-text fields, used when no configuration file is given
    #[arg(long, value_delimiter = ',', default_value = "title,body")]
    pub fields: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct IndexArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH", env = "LEXIS_INDEX")]
    pub index_path: PathBuf,

    /// Documents, one JSON object per line
    #[arg(value_name = "DOCUMENT_FILE")]
    pub document_file: PathBuf,

    /// Flush a segment every N documents; 0 leaves it to the memory budget
    #[arg(short, long, default_value = "0")]
    pub batch_size: usize,

    /// Stop at the first malformed line instead of skipping it
    #[arg(long)]
    pub strict: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct SearchArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH", env = "LEXIS_INDEX")]
    pub index_path: PathBuf,

    /// Query string
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Maximum number of results to return
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Offset for pagination
    #[arg(short, long, default_value = "0")]
    pub offset: usize,

    /// Ranking mode (proximity_bm25, bm25, tfidf, wordcount, none)
    #[arg(short, long)]
    pub ranking: Option<String>,

    /// Sort by attribute ascending
    #[arg(long, value_name = "ATTRIBUTE", conflicts_with = "sort_desc")]
    pub sort_asc: Option<String>,

    /// Sort by attribute descending
    #[arg(long, value_name = "ATTRIBUTE")]
    pub sort_desc: Option<String>,

    /// Collapse results sharing a value of this attribute
    #[arg(long, value_name = "ATTRIBUTE")]
    pub group_by: Option<String>,

    /// Give up after this many milliseconds
    #[arg(long, value_name = "MILLIS")]
    pub timeout_ms: Option<u64>,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH", env = "LEXIS_INDEX")]
    pub index_path: PathBuf,

    /// Document ids
    #[arg(value_name = "IDS", value_delimiter = ',', required = true)]
    pub ids: Vec<DocId>,
}

#[derive(Parser, Debug, Clone)]
pub struct MergeArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH", env = "LEXIS_INDEX")]
    pub index_path: PathBuf,

    /// Merge all segments into one
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct StatsArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH", env = "LEXIS_INDEX")]
    pub index_path: PathBuf,

    /// Include per-segment statistics
    #[arg(short, long)]
    pub detailed: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Short human-readable summary
    Human,
    /// One JSON document per result
    Json,
}
