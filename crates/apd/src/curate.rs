//! Curation commands: `evaluate`, `dedup`, and `merge`.

use anyhow::Result;

use apd_core::dedup::Deduplicator;
use apd_core::models::MergeStrategy;
use apd_core::pipeline::{self, BatchSummary};
use apd_core::quality::QualityFilter;
use apd_core::store::Store;

use crate::config::Config;
use crate::embedding;
use crate::sqlite_store::SqliteStore;

/// Score a period. With `all`, records that already carry a score are
/// re-scored too.
pub async fn run_evaluate(config: &Config, period: Option<&str>, all: bool) -> Result<BatchSummary> {
    let store = SqliteStore::open(config).await?;
    let filter = QualityFilter::new(config.quality.clone());
    let summary = pipeline::evaluate_period(&store, &filter, period, !all).await?;

    println!("evaluate {}", period.unwrap_or("all periods"));
    println!("  scored: {}", summary.succeeded);
    println!("  failed: {}", summary.failed);
    Ok(summary)
}

/// Find duplicate groups in a period, persist them, and optionally merge.
pub async fn run_dedup(
    config: &Config,
    period: Option<&str>,
    semantic: bool,
    merge: bool,
) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let model = embedding::create_model(&config.embedding)?;
    let deduplicator = Deduplicator::new(config.dedup.clone(), model);

    let (result, summary) = pipeline::dedup_period(&store, &deduplicator, period, semantic).await?;
    let stats = result.stats();

    println!("dedup {}", period.unwrap_or("all periods"));
    println!("  records:            {}", stats.total);
    println!("  unique:             {}", stats.unique);
    println!("  groups:             {}", stats.groups);
    println!("  duplicates removed: {}", stats.duplicates_removed);
    println!(
        "  dedup rate:         {:.1}%",
        stats.deduplication_rate * 100.0
    );
    for (method, count) in &stats.detection_methods {
        println!("    {:<20} {}", method, count);
    }
    if summary.failed > 0 {
        println!("  group writes failed: {}", summary.failed);
    }

    if !result.groups.is_empty() {
        println!();
        for group in &result.groups {
            println!(
                "  {}  {} <- {}  ({})",
                group.group_id,
                group.canonical_id,
                group.duplicate_ids.join(", "),
                group.detection_method
            );
        }
    }

    if merge {
        let strategy = config.merge_strategy()?;
        let merged = pipeline::merge_groups(&store, &strategy).await?;
        println!();
        println!("  merged groups: {}", merged.succeeded);
    }
    Ok(())
}

/// Resolve pending groups. `strategy` overrides the configured default.
pub async fn run_merge(config: &Config, strategy: Option<MergeStrategy>) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let strategy = match strategy {
        Some(s) => s,
        None => config.merge_strategy()?,
    };

    let pending = store
        .list_duplicate_groups()
        .await?
        .iter()
        .filter(|g| g.survivor_id.is_none())
        .count();
    let summary = pipeline::merge_groups(&store, &strategy).await?;

    println!("merge");
    println!("  pending groups: {}", pending);
    println!("  merged:         {}", summary.succeeded);
    println!("  failed:         {}", summary.failed);
    Ok(())
}
