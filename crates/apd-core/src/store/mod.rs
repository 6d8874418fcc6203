//! Storage abstraction for Auto Paper Digest.
//!
//! The [`Store`] trait defines every read and write the deduplicator,
//! quality filter, recommender, and pipeline helpers need, so backends are
//! pluggable (SQLite in the app crate, [`memory::InMemoryStore`] for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    ContentRecord, ContentType, ContentUpsert, DuplicateGroup, QualityAnnotation,
    RecommendationLogEntry, Status, UserInteraction,
};
use crate::period::expand_period;

/// Ordering for [`Store::list`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListOrder {
    /// Most recently updated first.
    #[default]
    RecentlyUpdated,
    /// Highest quality first; unevaluated records last.
    QualityDesc,
    /// Ascending `content_id`.
    ContentId,
    /// Oldest first, by `created_at`.
    Created,
}

/// Filter for [`Store::list`]. The default lists everything.
#[derive(Debug, Clone, PartialEq)]
pub struct ListFilter {
    /// Period key; a week also matches its dates.
    pub period: Option<String>,
    /// Empty means any status.
    pub statuses: Vec<Status>,
    pub content_type: Option<ContentType>,
    /// Excludes unevaluated records when set.
    pub min_quality: Option<f64>,
    pub include_filtered: bool,
    pub include_merged: bool,
    pub order: ListOrder,
    pub limit: Option<usize>,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            period: None,
            statuses: Vec::new(),
            content_type: None,
            min_quality: None,
            include_filtered: true,
            include_merged: true,
            order: ListOrder::default(),
            limit: None,
        }
    }
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a recommender may serve: not filtered out, not merged away.
    pub fn eligible() -> Self {
        Self {
            include_filtered: false,
            include_merged: false,
            ..Self::default()
        }
    }

    pub fn period(mut self, period: Option<&str>) -> Self {
        self.period = period.map(str::to_string);
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn min_quality(mut self, min_quality: f64) -> Self {
        self.min_quality = Some(min_quality);
        self
    }

    pub fn order(mut self, order: ListOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Stored period ids matched by the period filter, if any.
    pub fn period_keys(&self) -> Option<Vec<String>> {
        self.period.as_deref().map(expand_period)
    }

    /// Evaluate every predicate except ordering and limit.
    pub fn matches(&self, record: &ContentRecord, period_keys: Option<&HashSet<String>>) -> bool {
        if let Some(keys) = period_keys {
            if !keys.contains(&record.period_id) {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&record.status) {
            return false;
        }
        if let Some(ct) = self.content_type {
            if record.content_type != ct {
                return false;
            }
        }
        if let Some(min) = self.min_quality {
            match record.quality_score {
                Some(q) if q >= min => {}
                _ => return false,
            }
        }
        if !self.include_filtered && record.filtered_out {
            return false;
        }
        if !self.include_merged && record.merged_into.is_some() {
            return false;
        }
        true
    }
}

/// Sort in place by `order`. Ties break on `content_id`.
pub fn sort_records(records: &mut [ContentRecord], order: ListOrder) {
    match order {
        ListOrder::RecentlyUpdated => records.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.content_id.cmp(&b.content_id))
        }),
        ListOrder::QualityDesc => records.sort_by(|a, b| {
            let qa = a.quality_score.unwrap_or(f64::NEG_INFINITY);
            let qb = b.quality_score.unwrap_or(f64::NEG_INFINITY);
            qb.total_cmp(&qa).then_with(|| a.content_id.cmp(&b.content_id))
        }),
        ListOrder::ContentId => records.sort_by(|a, b| a.content_id.cmp(&b.content_id)),
        ListOrder::Created => records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.content_id.cmp(&b.content_id))
        }),
    }
}

/// Abstract storage backend.
///
/// Not-found is never an error: lookups return `Ok(None)` and updates
/// return `Ok(None)` or `Ok(false)`. Every per-record write is atomic.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](Store::upsert) | Create or update a record, non-null fields only |
/// | [`advance_status`](Store::advance_status) | Move a record along the pipeline |
/// | [`list`](Store::list) | Filtered, ordered listing |
/// | [`list_ready_for_stage`](Store::list_ready_for_stage) | Work queue for a stage |
/// | [`retry_errored`](Store::retry_errored) | Reset errored records to their failed stage |
/// | [`save_quality`](Store::save_quality) | Write quality annotation |
/// | [`save_duplicate_group`](Store::save_duplicate_group) | Persist a dedup group |
/// | [`mark_merged`](Store::mark_merged) | Resolve a group to a survivor |
/// | [`record_interaction`](Store::record_interaction) | Append to the interaction log |
/// | [`save_recommendation`](Store::save_recommendation) | Append to the recommendation log |
#[async_trait]
pub trait Store: Send + Sync {
    /// Create the record if absent, else apply every non-null field.
    /// Always bumps `updated_at`. Returns the stored record.
    async fn upsert(&self, upsert: &ContentUpsert) -> Result<ContentRecord>;

    async fn get(&self, content_id: &str) -> Result<Option<ContentRecord>>;

    /// Records whose normalized title matches `title`, by `content_id`.
    async fn find_by_title(&self, title: &str) -> Result<Vec<ContentRecord>>;

    /// Replace the status, optionally setting `last_error` and incrementing
    /// `retry_count`. Returns `Ok(None)` if the id is absent and an error
    /// wrapping [`TransitionError`](crate::models::TransitionError) if the
    /// move would regress the pipeline.
    async fn advance_status(
        &self,
        content_id: &str,
        new_status: Status,
        error: Option<&str>,
        increment_retry: bool,
    ) -> Result<Option<ContentRecord>>;

    async fn list(&self, filter: &ListFilter) -> Result<Vec<ContentRecord>>;

    /// Records at any stage strictly before `target` with
    /// `retry_count < max_retries`, ordered by `content_id`.
    async fn list_ready_for_stage(
        &self,
        period: Option<&str>,
        target: Status,
        max_retries: i64,
    ) -> Result<Vec<ContentRecord>>;

    /// Reset `ERROR` records with `retry_count < max_retries` to the stage
    /// they failed from, incrementing `retry_count`. Returns how many were reset.
    async fn retry_errored(&self, period: Option<&str>, max_retries: i64) -> Result<usize>;

    /// Number of records per status.
    async fn status_counts(&self, period: Option<&str>) -> Result<BTreeMap<Status, usize>>;

    /// Final-stage records with a video artifact, ordered by `content_id`.
    async fn list_publishable(&self, period: Option<&str>) -> Result<Vec<ContentRecord>>;

    /// Write quality fields. Returns `false` if the id is absent.
    async fn save_quality(&self, content_id: &str, annotation: &QualityAnnotation) -> Result<bool>;

    /// Insert or replace a group keyed by `group_id`.
    async fn save_duplicate_group(&self, group: &DuplicateGroup) -> Result<()>;

    async fn get_duplicate_group(&self, group_id: &str) -> Result<Option<DuplicateGroup>>;

    async fn list_duplicate_groups(&self) -> Result<Vec<DuplicateGroup>>;

    /// Record `survivor_id` on the group and set `merged_into` on every
    /// other member. Idempotent. Returns `false` if the group is absent;
    /// fails if `survivor_id` is not a member.
    async fn mark_merged(&self, group_id: &str, survivor_id: &str) -> Result<bool>;

    async fn record_interaction(&self, interaction: &UserInteraction) -> Result<()>;

    /// All interactions by `user_id`, oldest first.
    async fn user_interactions(&self, user_id: &str) -> Result<Vec<UserInteraction>>;

    /// Favorite and share interactions on any of `content_ids`.
    async fn endorsements_for_content(&self, content_ids: &[String]) -> Result<Vec<UserInteraction>>;

    /// Favorite and share interactions by any of `user_ids`.
    async fn endorsements_by_users(&self, user_ids: &[String]) -> Result<Vec<UserInteraction>>;

    async fn save_recommendation(&self, entry: &RecommendationLogEntry) -> Result<()>;
}
