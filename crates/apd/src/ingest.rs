//! `apd ingest`: load fetcher output into the store.
//!
//! Fetchers write one JSON object per line, each a
//! [`ContentUpsert`](apd_core::models::ContentUpsert). Every record is
//! upserted and scored immediately. A malformed line is logged and counted
//! as failed; the rest of the file still loads.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use apd_core::models::ContentUpsert;
use apd_core::pipeline::{self, BatchSummary};
use apd_core::quality::QualityFilter;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Parse a JSONL document. Blank lines are skipped. Returns the parsed
/// records and the number of lines that could not be parsed.
pub fn parse_jsonl(content: &str) -> (Vec<ContentUpsert>, usize) {
    let mut records = Vec::new();
    let mut malformed = 0;

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ContentUpsert>(line) {
            Ok(record) if record.content_id.trim().is_empty() => {
                warn!(line = index + 1, "record has no content_id, skipping");
                malformed += 1;
            }
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(line = index + 1, error = %e, "malformed record, skipping");
                malformed += 1;
            }
        }
    }
    (records, malformed)
}

pub async fn run_ingest(config: &Config, path: &Path) -> Result<BatchSummary> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let (records, malformed) = parse_jsonl(&content);

    let store = SqliteStore::open(config).await?;
    let filter = QualityFilter::new(config.quality.clone());
    let mut summary = pipeline::ingest(&store, &filter, &records).await;
    summary.failed += malformed;

    println!("ingest {}", path.display());
    println!("  records read: {}", records.len() + malformed);
    println!("  upserted and scored: {}", summary.succeeded);
    println!("  failed: {}", summary.failed);
    println!("ok");
    Ok(summary)
}
