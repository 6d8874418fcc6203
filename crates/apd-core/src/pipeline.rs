//! Batch operations that compose the store with the quality filter and the
//! deduplicator.
//!
//! Every helper treats records independently: a failed write is logged,
//! counted in the [`BatchSummary`], and the batch moves on.

use std::fmt;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dedup::{merge, DedupResult, Deduplicator};
use crate::models::{ContentUpsert, MergeStrategy, QualityAnnotation};
use crate::quality::QualityFilter;
use crate::store::{ListFilter, ListOrder, Store};

/// Outcome counts of a batch operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    fn record<T>(&mut self, what: &str, id: &str, result: &Result<T>) {
        match result {
            Ok(_) => self.succeeded += 1,
            Err(e) => {
                warn!(content_id = id, error = %e, "{} failed", what);
                self.failed += 1;
            }
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded, self.failed)
    }
}

/// Upsert each record and score it immediately.
pub async fn ingest(
    store: &dyn Store,
    filter: &QualityFilter,
    upserts: &[ContentUpsert],
) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for upsert in upserts {
        let result = ingest_one(store, filter, upsert).await;
        summary.record("ingest", &upsert.content_id, &result);
    }
    info!(%summary, "ingest complete");
    summary
}

async fn ingest_one(store: &dyn Store, filter: &QualityFilter, upsert: &ContentUpsert) -> Result<()> {
    let record = store.upsert(upsert).await?;
    let score = filter.evaluate_record(&record);
    store
        .save_quality(&record.content_id, &QualityAnnotation::from(&score))
        .await?;
    debug!(
        content_id = %record.content_id,
        score = score.total_score,
        passed = score.passed,
        "ingested"
    );
    Ok(())
}

/// Score every record in `period`. With `only_unevaluated`, records that
/// already carry a score are skipped.
pub async fn evaluate_period(
    store: &dyn Store,
    filter: &QualityFilter,
    period: Option<&str>,
    only_unevaluated: bool,
) -> Result<BatchSummary> {
    let records = store
        .list(&ListFilter::new().period(period).order(ListOrder::ContentId))
        .await?;

    let mut summary = BatchSummary::default();
    for record in records
        .iter()
        .filter(|r| !only_unevaluated || r.evaluated_at.is_none())
    {
        let score = filter.evaluate_record(record);
        let result = store
            .save_quality(&record.content_id, &QualityAnnotation::from(&score))
            .await;
        summary.record("quality write", &record.content_id, &result);
    }
    info!(period = period.unwrap_or("all"), %summary, "evaluation complete");
    Ok(summary)
}

/// Deduplicate a period's records in ingestion order and persist the groups.
///
/// Records already merged away are left out of the batch.
pub async fn dedup_period(
    store: &dyn Store,
    deduplicator: &Deduplicator,
    period: Option<&str>,
    use_semantic: bool,
) -> Result<(DedupResult, BatchSummary)> {
    let mut records = store
        .list(&ListFilter::new().period(period).order(ListOrder::Created))
        .await?;
    records.retain(|r| r.merged_into.is_none());

    let result = deduplicator.find_duplicates(&records, use_semantic);

    let mut summary = BatchSummary::default();
    for group in &result.groups {
        let saved = store.save_duplicate_group(group).await;
        summary.record("group write", &group.canonical_id, &saved);
    }
    Ok((result, summary))
}

/// Resolve every unmerged persisted group with `strategy`.
///
/// `Manual` only applies to the group containing its survivor.
pub async fn merge_groups(store: &dyn Store, strategy: &MergeStrategy) -> Result<BatchSummary> {
    let groups = store.list_duplicate_groups().await?;

    let mut summary = BatchSummary::default();
    for group in groups.iter().filter(|g| g.survivor_id.is_none()) {
        if let MergeStrategy::Manual { survivor_id } = strategy {
            if !group.member_ids().any(|id| id == survivor_id) {
                continue;
            }
        }

        let mut members = Vec::new();
        for id in group.member_ids() {
            if let Some(record) = store.get(id).await? {
                members.push(record);
            }
        }

        let result = match merge(group, &members, strategy) {
            Some(survivor) => store
                .mark_merged(&group.group_id, &survivor.content_id)
                .await
                .map(|_| ()),
            None => Err(anyhow::anyhow!("no surviving record in group {}", group.group_id)),
        };
        summary.record("merge", &group.group_id, &result);
    }
    info!(%summary, "merge complete");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dedup::DedupConfig;
    use crate::models::{ContentType, Status};
    use crate::similarity::NoModel;
    use crate::store::memory::InMemoryStore;

    fn paper(id: &str, title: &str, pdf_url: &str) -> ContentUpsert {
        let mut u = ContentUpsert::new(id, "2026-01-14");
        u.content_type = Some(ContentType::Paper);
        u.title = Some(title.to_string());
        u.pdf_url = Some(pdf_url.to_string());
        u
    }

    #[tokio::test]
    async fn test_ingest_scores_each_record() {
        let store = InMemoryStore::new();
        let summary = ingest(
            &store,
            &QualityFilter::default(),
            &[
                paper("2601.00001", "A long enough paper title", "https://arxiv.org/abs/2601.00001"),
                paper("2601.00002", "Tiny", "https://arxiv.org/abs/2601.00002"),
                ContentUpsert::new("", "2026-01-14"),
            ],
        )
        .await;
        assert_eq!(summary, BatchSummary { succeeded: 2, failed: 1 });

        let tiny = store.get("2601.00002").await.unwrap().unwrap();
        assert!(tiny.filtered_out);
        assert_eq!(tiny.quality_score, Some(0.0));
        assert!(tiny.evaluated_at.is_some());
    }

    #[tokio::test]
    async fn test_evaluate_period_skips_evaluated() {
        let store = InMemoryStore::new();
        let filter = QualityFilter::default();
        ingest(&store, &filter, &[paper("a", "A long enough paper title", "https://x.org/a.pdf")]).await;
        store
            .upsert(&paper("b", "Another long paper title", "https://x.org/b.pdf"))
            .await
            .unwrap();

        let summary = evaluate_period(&store, &filter, Some("2026-W03"), true)
            .await
            .unwrap();
        assert_eq!(summary.succeeded, 1);

        let all = evaluate_period(&store, &filter, Some("2026-W03"), false)
            .await
            .unwrap();
        assert_eq!(all.succeeded, 2);
    }

    #[tokio::test]
    async fn test_dedup_then_merge() {
        let store = InMemoryStore::new();
        let filter = QualityFilter::default();
        ingest(
            &store,
            &filter,
            &[
                paper("a", "Sparse attention for long documents", "https://arxiv.org/abs/2601.03252"),
                paper("b", "Different title entirely here", "https://arxiv.org/pdf/2601.03252.pdf"),
                paper("c", "Unrelated protein folding study", "https://arxiv.org/abs/2601.09999"),
            ],
        )
        .await;

        let dedup = Deduplicator::new(DedupConfig::default(), Arc::new(NoModel));
        let (result, summary) = dedup_period(&store, &dedup, Some("2026-W03"), false)
            .await
            .unwrap();
        assert_eq!(result.groups.len(), 1);
        assert_eq!(result.unique_count, 2);
        assert_eq!(summary.succeeded, 1);

        // Dedup never touches status.
        let b = store.get("b").await.unwrap().unwrap();
        assert_eq!(b.status, Status::New);
        assert!(b.merged_into.is_none());

        let merged = merge_groups(&store, &MergeStrategy::KeepFirst).await.unwrap();
        assert_eq!(merged.succeeded, 1);
        let b = store.get("b").await.unwrap().unwrap();
        assert_eq!(b.merged_into.as_deref(), Some("a"));

        // Already resolved groups are skipped.
        let again = merge_groups(&store, &MergeStrategy::KeepFirst).await.unwrap();
        assert_eq!(again.total(), 0);

        let rerun = dedup_period(&store, &dedup, Some("2026-W03"), false)
            .await
            .unwrap();
        assert!(rerun.0.groups.is_empty());
    }
}
