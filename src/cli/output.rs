//! Output formatting for CLI commands.

use std::io::{self, Write};

use serde::Serialize;
use serde_json::Value;

use crate::cli::args::{LexisArgs, OutputFormat};
use crate::error::Result;
use crate::query::request::SearchResults;

/// Summary of a `create` run.
#[derive(Debug, Serialize)]
pub struct CreationReport {
    pub path: String,
    pub fields: Vec<String>,
}

/// Summary of an `index` run.
#[derive(Debug, Serialize)]
pub struct IndexingReport {
    pub documents_added: u64,
    pub documents_skipped: u64,
    pub segments_flushed: u64,
    pub duration_ms: u64,
    pub docs_per_second: f64,
}

/// Summary of a `delete` run.
#[derive(Debug, Serialize)]
pub struct DeletionReport {
    pub requested: usize,
    pub deleted: usize,
}

/// Summary of a `merge` run.
#[derive(Debug, Serialize)]
pub struct MergeReport {
    pub segments_before: usize,
    pub segments_after: usize,
    pub merges: usize,
    pub duration_ms: u64,
}

/// Print `result` to stdout in the selected format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &LexisArgs) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_result(&mut out, message, result, args.output_format, args.pretty)
}

/// Print search results to stdout in the selected format.
pub fn output_search(results: &SearchResults, args: &LexisArgs) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.output_format {
        OutputFormat::Json => write_json(&mut out, results, args.pretty),
        OutputFormat::Human => write_search_human(&mut out, results),
    }
}

pub fn write_result<W: Write, T: Serialize>(
    out: &mut W,
    message: &str,
    result: &T,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(out, result, pretty),
        OutputFormat::Human => {
            writeln!(out, "{message}")?;
            write_fields(out, &serde_json::to_value(result)?, 1)
        }
    }
}

fn write_json<W: Write, T: Serialize>(out: &mut W, result: &T, pretty: bool) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, result)?;
    } else {
        serde_json::to_writer(&mut *out, result)?;
    }
    writeln!(out)?;
    Ok(())
}

fn write_fields<W: Write>(out: &mut W, value: &Value, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                match value {
                    Value::Object(_) | Value::Array(_) => {
                        writeln!(out, "{indent}{key}:")?;
                        write_fields(out, value, depth + 1)?;
                    }
                    scalar => writeln!(out, "{indent}{key}: {scalar}")?,
                }
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                writeln!(out, "{indent}[{i}]")?;
                write_fields(out, item, depth + 1)?;
            }
        }
        scalar => writeln!(out, "{indent}{scalar}")?,
    }
    Ok(())
}

fn write_search_human<W: Write>(out: &mut W, results: &SearchResults) -> Result<()> {
    writeln!(
        out,
        "{} of {} matches ({:?}, {} ms)",
        results.hits.len(),
        results.total_matched,
        results.status,
        results.took_ms
    )?;
    for warning in &results.warnings {
        writeln!(out, "warning: {warning}")?;
    }
    for hit in &results.hits {
        write!(out, "{:>10}  {:.4}", hit.doc_id, hit.score)?;
        if let Some(count) = hit.group_count {
            write!(out, "  group={count}")?;
        }
        for (name, value) in &hit.attributes {
            write!(out, "  {name}={}", serde_json::to_string(value)?)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::document::AttributeValue;
    use crate::query::request::{SearchHit, SearchStatus};

    #[test]
    fn test_json_is_one_line() {
        let report = DeletionReport {
            requested: 3,
            deleted: 2,
        };
        let mut out = Vec::new();
        write_result(&mut out, "deleted", &report, OutputFormat::Json, false).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"requested\":3,\"deleted\":2}\n"
        );
    }

    #[test]
    fn test_human_lists_fields() {
        let report = DeletionReport {
            requested: 3,
            deleted: 2,
        };
        let mut out = Vec::new();
        write_result(&mut out, "Deleted documents", &report, OutputFormat::Human, false).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Deleted documents\n"));
        assert!(text.contains("  deleted: 2\n"));
    }

    #[test]
    fn test_human_search_output() {
        let mut attributes = BTreeMap::new();
        attributes.insert("year".to_string(), AttributeValue::Int(2021));
        let results = SearchResults {
            hits: vec![SearchHit {
                doc_id: 42,
                score: 1.5,
                attributes,
                group_count: Some(3),
            }],
            total_matched: 7,
            status: SearchStatus::Ok,
            warnings: vec!["results are limited".to_string()],
            snapshot_version: 1,
            took_ms: 2,
        };
        let mut out = Vec::new();
        write_search_human(&mut out, &results).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "1 of 7 matches (Ok, 2 ms)");
        assert_eq!(lines[1], "warning: results are limited");
        assert!(lines[2].contains("42"));
        assert!(lines[2].contains("group=3"));
        assert!(lines[2].contains("year="));
    }
}
