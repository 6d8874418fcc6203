//! In-memory [`Store`] implementation for tests and dry runs.
//!
//! Records and groups live in `HashMap`s, the two logs in `Vec`s, each
//! behind a `std::sync::RwLock`. Each method takes its lock once, so every
//! per-record write is atomic.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{
    ContentRecord, ContentUpsert, DuplicateGroup, QualityAnnotation, RecommendationLogEntry,
    Status, UserInteraction,
};
use crate::period::expand_period;
use crate::similarity::title_hash;

use super::{sort_records, ListFilter, ListOrder, Store};

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, ContentRecord>>,
    groups: RwLock<HashMap<String, DuplicateGroup>>,
    interactions: RwLock<Vec<UserInteraction>>,
    recommendations: RwLock<Vec<RecommendationLogEntry>>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn period_set(period: Option<&str>) -> Option<HashSet<String>> {
    period.map(|p| expand_period(p).into_iter().collect())
}

fn in_period(record: &ContentRecord, keys: &Option<HashSet<String>>) -> bool {
    keys.as_ref().map_or(true, |k| k.contains(&record.period_id))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of logged recommendations.
    pub fn recommendation_count(&self) -> Result<usize> {
        Ok(read(&self.recommendations)?.len())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert(&self, upsert: &ContentUpsert) -> Result<ContentRecord> {
        if upsert.content_id.trim().is_empty() {
            bail!("content_id must not be empty");
        }
        let mut records = write(&self.records)?;
        let record = match records.get_mut(&upsert.content_id) {
            Some(existing) => {
                existing.merge_upsert(upsert);
                existing.updated_at = Utc::now();
                existing.clone()
            }
            None => {
                let record = upsert.clone().into_record();
                records.insert(record.content_id.clone(), record.clone());
                record
            }
        };
        Ok(record)
    }

    async fn get(&self, content_id: &str) -> Result<Option<ContentRecord>> {
        Ok(read(&self.records)?.get(content_id).cloned())
    }

    async fn find_by_title(&self, title: &str) -> Result<Vec<ContentRecord>> {
        let wanted = title_hash(title);
        let records = read(&self.records)?;
        let mut out: Vec<ContentRecord> = records
            .values()
            .filter(|r| r.title.as_deref().is_some_and(|t| title_hash(t) == wanted))
            .cloned()
            .collect();
        sort_records(&mut out, ListOrder::ContentId);
        Ok(out)
    }

    async fn advance_status(
        &self,
        content_id: &str,
        new_status: Status,
        error: Option<&str>,
        increment_retry: bool,
    ) -> Result<Option<ContentRecord>> {
        let mut records = write(&self.records)?;
        let Some(record) = records.get_mut(content_id) else {
            return Ok(None);
        };
        // Apply to a copy so a rejected move leaves the stored record untouched.
        let mut updated = record.clone();
        updated.apply_transition(new_status, error, increment_retry)?;
        *record = updated.clone();
        Ok(Some(updated))
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<ContentRecord>> {
        let keys: Option<HashSet<String>> = filter.period_keys().map(|k| k.into_iter().collect());
        let records = read(&self.records)?;
        let mut out: Vec<ContentRecord> = records
            .values()
            .filter(|r| filter.matches(r, keys.as_ref()))
            .cloned()
            .collect();
        sort_records(&mut out, filter.order);
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn list_ready_for_stage(
        &self,
        period: Option<&str>,
        target: Status,
        max_retries: i64,
    ) -> Result<Vec<ContentRecord>> {
        let keys = period_set(period);
        let stages = target.predecessors();
        let records = read(&self.records)?;
        let mut out: Vec<ContentRecord> = records
            .values()
            .filter(|r| in_period(r, &keys))
            .filter(|r| stages.contains(&r.status) && r.retry_count < max_retries)
            .cloned()
            .collect();
        sort_records(&mut out, ListOrder::ContentId);
        Ok(out)
    }

    async fn retry_errored(&self, period: Option<&str>, max_retries: i64) -> Result<usize> {
        let keys = period_set(period);
        let mut records = write(&self.records)?;
        let mut reset = 0;
        for record in records.values_mut() {
            if in_period(record, &keys) && record.is_retryable(max_retries) {
                record.reset_for_retry()?;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn status_counts(&self, period: Option<&str>) -> Result<BTreeMap<Status, usize>> {
        let keys = period_set(period);
        let records = read(&self.records)?;
        let mut counts = BTreeMap::new();
        for record in records.values().filter(|r| in_period(r, &keys)) {
            *counts.entry(record.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn list_publishable(&self, period: Option<&str>) -> Result<Vec<ContentRecord>> {
        let keys = period_set(period);
        let records = read(&self.records)?;
        let mut out: Vec<ContentRecord> = records
            .values()
            .filter(|r| in_period(r, &keys))
            .filter(|r| r.status == Status::FINAL && r.video_path.is_some())
            .cloned()
            .collect();
        sort_records(&mut out, ListOrder::ContentId);
        Ok(out)
    }

    async fn save_quality(&self, content_id: &str, annotation: &QualityAnnotation) -> Result<bool> {
        let mut records = write(&self.records)?;
        let Some(record) = records.get_mut(content_id) else {
            return Ok(false);
        };
        record.quality_score = Some(annotation.quality_score);
        record.citation_score = Some(annotation.citation_score);
        record.venue_score = Some(annotation.venue_score);
        record.recency_score = Some(annotation.recency_score);
        record.quality_reasons = annotation.reasons.clone();
        record.filtered_out = annotation.filtered_out;
        record.filter_reason = annotation.filter_reason.clone();
        record.evaluated_at = Some(annotation.evaluated_at);
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn save_duplicate_group(&self, group: &DuplicateGroup) -> Result<()> {
        write(&self.groups)?.insert(group.group_id.clone(), group.clone());
        Ok(())
    }

    async fn get_duplicate_group(&self, group_id: &str) -> Result<Option<DuplicateGroup>> {
        Ok(read(&self.groups)?.get(group_id).cloned())
    }

    async fn list_duplicate_groups(&self) -> Result<Vec<DuplicateGroup>> {
        let mut groups: Vec<DuplicateGroup> = read(&self.groups)?.values().cloned().collect();
        groups.sort_by(|a, b| a.group_id.cmp(&b.group_id));
        Ok(groups)
    }

    async fn mark_merged(&self, group_id: &str, survivor_id: &str) -> Result<bool> {
        let mut groups = write(&self.groups)?;
        let Some(group) = groups.get_mut(group_id) else {
            return Ok(false);
        };
        if !group.member_ids().any(|id| id == survivor_id) {
            bail!("{} is not a member of group {}", survivor_id, group_id);
        }

        let mut records = write(&self.records)?;
        let now = Utc::now();
        for id in group.member_ids() {
            if let Some(record) = records.get_mut(id) {
                let merged_into = (id != survivor_id).then(|| survivor_id.to_string());
                if record.merged_into != merged_into {
                    record.merged_into = merged_into;
                    record.updated_at = now;
                }
            }
        }
        group.survivor_id = Some(survivor_id.to_string());
        Ok(true)
    }

    async fn record_interaction(&self, interaction: &UserInteraction) -> Result<()> {
        write(&self.interactions)?.push(interaction.clone());
        Ok(())
    }

    async fn user_interactions(&self, user_id: &str) -> Result<Vec<UserInteraction>> {
        Ok(read(&self.interactions)?
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn endorsements_for_content(&self, content_ids: &[String]) -> Result<Vec<UserInteraction>> {
        Ok(read(&self.interactions)?
            .iter()
            .filter(|i| i.action_type.is_endorsement() && content_ids.contains(&i.content_id))
            .cloned()
            .collect())
    }

    async fn endorsements_by_users(&self, user_ids: &[String]) -> Result<Vec<UserInteraction>> {
        Ok(read(&self.interactions)?
            .iter()
            .filter(|i| i.action_type.is_endorsement() && user_ids.contains(&i.user_id))
            .cloned()
            .collect())
    }

    async fn save_recommendation(&self, entry: &RecommendationLogEntry) -> Result<()> {
        write(&self.recommendations)?.push(entry.clone());
        Ok(())
    }
}
