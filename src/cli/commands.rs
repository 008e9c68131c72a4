//! Command implementations for the lexis CLI.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::{FieldConfig, IndexConfig};
use crate::document::Document;
use crate::error::{LexisError, Result};
use crate::index::Index;
use crate::query::cancel::CancellationToken;
use crate::query::request::{SearchRequest, SortMode};
use crate::query::scorer::RankingMode;

/// Execute a CLI command.
pub fn execute_command(args: LexisArgs) -> Result<()> {
    match &args.command {
        Command::Create(create_args) => create_index(create_args, &args),
        Command::Index(index_args) => index_documents(index_args, &args),
        Command::Search(search_args) => search_index(search_args, &args),
        Command::Delete(delete_args) => delete_documents(delete_args, &args),
        Command::Merge(merge_args) => merge_index(merge_args, &args),
        Command::Stats(stats_args) => show_stats(stats_args, &args),
    }
}

/// Load an index configuration from a JSON file.
pub fn load_config(path: &Path) -> Result<IndexConfig> {
    let json = fs::read_to_string(path).map_err(|e| {
        LexisError::config(format!("cannot read config {}: {e}", path.display()))
    })?;
    IndexConfig::from_json_str(&json)
}

fn create_index(args: &CreateArgs, cli_args: &LexisArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => IndexConfig::with_fields(
            args.fields.iter().map(|name| FieldConfig::text(name.as_str())).collect(),
        ),
    };
    let fields = config.fields.iter().map(|f| f.name.clone()).collect();

    let index = Index::create_in_dir(&args.index_path, config)?;
    index.close()?;
    info!(path = %args.index_path.display(), "created index");

    output_result(
        "Index created",
        &CreationReport {
            path: args.index_path.display().to_string(),
            fields,
        },
        cli_args,
    )
}

fn index_documents(args: &IndexArgs, cli_args: &LexisArgs) -> Result<()> {
    let index = Index::open_dir(&args.index_path)?;
    let writer = index.writer();
    let started = Instant::now();

    let reader = BufReader::new(File::open(&args.document_file)?);
    let mut added = 0u64;
    let mut skipped = 0u64;
    let mut flushed = 0u64;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: Document = match serde_json::from_str(&line) {
            Ok(doc) => doc,
            Err(e) if args.strict => {
                return Err(LexisError::other(format!("line {}: {e}", line_no + 1)));
            }
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "skipping malformed document");
                skipped += 1;
                continue;
            }
        };
        writer.add_document(&doc)?;
        added += 1;

        if args.batch_size > 0 && added % args.batch_size as u64 == 0 && writer.flush()?.is_some() {
            flushed += 1;
        }
    }
    if writer.flush()?.is_some() {
        flushed += 1;
    }
    index.close()?;

    let duration = started.elapsed();
    output_result(
        "Documents indexed",
        &IndexingReport {
            documents_added: added,
            documents_skipped: skipped,
            segments_flushed: flushed,
            duration_ms: duration.as_millis() as u64,
            docs_per_second: if duration.as_secs_f64() > 0.0 {
                added as f64 / duration.as_secs_f64()
            } else {
                0.0
            },
        },
        cli_args,
    )
}

/// Build the request described by the `search` arguments.
pub fn build_request(args: &SearchArgs) -> Result<SearchRequest> {
    let mut request = SearchRequest::new(args.query.as_str()).with_offset(args.offset);
    if let Some(limit) = args.limit {
        request = request.with_limit(limit);
    }
    if let Some(ranking) = &args.ranking {
        request = request.with_ranking(ranking.parse::<RankingMode>()?);
    }
    if let Some(attribute) = &args.sort_asc {
        request = request.with_sort(SortMode::AttributeAsc(attribute.clone()));
    }
    if let Some(attribute) = &args.sort_desc {
        request = request.with_sort(SortMode::AttributeDesc(attribute.clone()));
    }
    if let Some(attribute) = &args.group_by {
        request = request.with_group_by(attribute.as_str());
    }
    if let Some(timeout) = args.timeout_ms {
        request =
            request.with_cancellation(CancellationToken::with_timeout(Duration::from_millis(timeout)));
    }
    Ok(request)
}

fn search_index(args: &SearchArgs, cli_args: &LexisArgs) -> Result<()> {
    let request = build_request(args)?;
    let index = Index::open_dir(&args.index_path)?;
    let results = index.searcher()?.search(&request)?;
    output_search(&results, cli_args)
}

fn delete_documents(args: &DeleteArgs, cli_args: &LexisArgs) -> Result<()> {
    let index = Index::open_dir(&args.index_path)?;
    let deleted = index.writer().delete_documents(&args.ids)?;
    index.close()?;

    output_result(
        "Documents deleted",
        &DeletionReport {
            requested: args.ids.len(),
            deleted,
        },
        cli_args,
    )
}

fn merge_index(args: &MergeArgs, cli_args: &LexisArgs) -> Result<()> {
    let index = Index::open_dir(&args.index_path)?;
    let started = Instant::now();
    let segments_before = index.stats().segment_count;

    let writer = index.writer();
    let merges = if args.force {
        usize::from(writer.force_merge()?.is_some())
    } else {
        writer.merge_now()?
    };
    index.close()?;

    output_result(
        "Segments merged",
        &MergeReport {
            segments_before,
            segments_after: index.stats().segment_count,
            merges,
            duration_ms: started.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

fn show_stats(args: &StatsArgs, cli_args: &LexisArgs) -> Result<()> {
    let index = Index::open_dir(&args.index_path)?;
    let mut stats = index.stats();
    if !args.detailed {
        stats.segments.clear();
    }
    output_result("Index statistics", &stats, cli_args)
}
