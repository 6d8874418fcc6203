//! SQLite-backed [`Store`] implementation.
//!
//! Every read-modify-write (upsert, status change, retry reset, merge) loads
//! the row inside a transaction, applies the change through the same
//! [`ContentRecord`] methods the in-memory store uses, writes the full row
//! back, and commits. A failure anywhere rolls the whole record back.
//! Returned records are read back from the row, so timestamps carry the
//! stored (microsecond) precision.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use apd_core::models::{
    ContentRecord, ContentType, ContentUpsert, DuplicateGroup, QualityAnnotation,
    RecommendationLogEntry, Status, UserInteraction,
};
use apd_core::period::expand_period;
use apd_core::similarity::title_hash;
use apd_core::store::{ListFilter, ListOrder, Store};

use crate::config::Config;
use crate::{db, migrate};

const CONTENT_COLUMNS: &str = "content_id, period_id, content_type, title, summary, \
    source_url, hf_url, pdf_url, github_stars, github_language, github_description, \
    news_source, news_rank, pdf_path, video_path, quality_score, citation_score, \
    venue_score, recency_score, quality_reasons, filtered_out, filter_reason, \
    evaluated_at, status, error_stage, retry_count, last_error, merged_into, \
    title_hash, created_at, updated_at";

const ENDORSEMENT_ACTIONS: &str = "('favorite', 'share')";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and apply pending migrations.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("invalid timestamp '{}'", value))?
        .with_timezone(&Utc))
}

fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_ts).transpose()
}

fn record_from_row(row: &SqliteRow) -> Result<ContentRecord> {
    let content_type: String = row.get("content_type");
    let status: String = row.get("status");
    let error_stage: Option<String> = row.get("error_stage");
    let reasons_json: String = row.get("quality_reasons");
    let filtered_out: i64 = row.get("filtered_out");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(ContentRecord {
        content_id: row.get("content_id"),
        period_id: row.get("period_id"),
        content_type: ContentType::from_stored(&content_type),
        title: row.get("title"),
        summary: row.get("summary"),
        source_url: row.get("source_url"),
        hf_url: row.get("hf_url"),
        pdf_url: row.get("pdf_url"),
        github_stars: row.get("github_stars"),
        github_language: row.get("github_language"),
        github_description: row.get("github_description"),
        news_source: row.get("news_source"),
        news_rank: row.get("news_rank"),
        pdf_path: row.get("pdf_path"),
        video_path: row.get("video_path"),
        quality_score: row.get("quality_score"),
        citation_score: row.get("citation_score"),
        venue_score: row.get("venue_score"),
        recency_score: row.get("recency_score"),
        quality_reasons: serde_json::from_str(&reasons_json).unwrap_or_default(),
        filtered_out: filtered_out != 0,
        filter_reason: row.get("filter_reason"),
        evaluated_at: parse_opt_ts(row.get("evaluated_at"))?,
        status: status.parse()?,
        error_stage: error_stage.as_deref().map(str::parse).transpose()?,
        retry_count: row.get("retry_count"),
        last_error: row.get("last_error"),
        merged_into: row.get("merged_into"),
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

fn group_from_row(row: &SqliteRow) -> Result<DuplicateGroup> {
    let duplicate_ids: String = row.get("duplicate_ids");
    let scores: String = row.get("similarity_scores");
    let method: String = row.get("detection_method");
    let created_at: String = row.get("created_at");

    Ok(DuplicateGroup {
        group_id: row.get("group_id"),
        canonical_id: row.get("canonical_id"),
        duplicate_ids: serde_json::from_str(&duplicate_ids)?,
        similarity_scores: serde_json::from_str(&scores)?,
        detection_method: method.parse()?,
        survivor_id: row.get("survivor_id"),
        created_at: parse_ts(&created_at)?,
    })
}

fn interaction_from_row(row: &SqliteRow) -> Result<UserInteraction> {
    let action: String = row.get("action_type");
    let created_at: String = row.get("created_at");
    Ok(UserInteraction {
        user_id: row.get("user_id"),
        content_id: row.get("content_id"),
        action_type: action.parse()?,
        weight: row.get("weight"),
        created_at: parse_ts(&created_at)?,
    })
}

async fn fetch_record(conn: &mut SqliteConnection, content_id: &str) -> Result<Option<ContentRecord>> {
    let row = sqlx::query(&format!(
        "SELECT {CONTENT_COLUMNS} FROM content WHERE content_id = ?"
    ))
    .bind(content_id)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(record_from_row).transpose()
}

/// Insert or overwrite every column of `record` except `created_at`.
async fn write_record(conn: &mut SqliteConnection, record: &ContentRecord) -> Result<()> {
    let reasons = serde_json::to_string(&record.quality_reasons)?;
    let hash = record.title.as_deref().map(title_hash);

    sqlx::query(&format!(
        r#"
        INSERT INTO content ({CONTENT_COLUMNS})
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(content_id) DO UPDATE SET
            period_id = excluded.period_id,
            content_type = excluded.content_type,
            title = excluded.title,
            summary = excluded.summary,
            source_url = excluded.source_url,
            hf_url = excluded.hf_url,
            pdf_url = excluded.pdf_url,
            github_stars = excluded.github_stars,
            github_language = excluded.github_language,
            github_description = excluded.github_description,
            news_source = excluded.news_source,
            news_rank = excluded.news_rank,
            pdf_path = excluded.pdf_path,
            video_path = excluded.video_path,
            quality_score = excluded.quality_score,
            citation_score = excluded.citation_score,
            venue_score = excluded.venue_score,
            recency_score = excluded.recency_score,
            quality_reasons = excluded.quality_reasons,
            filtered_out = excluded.filtered_out,
            filter_reason = excluded.filter_reason,
            evaluated_at = excluded.evaluated_at,
            status = excluded.status,
            error_stage = excluded.error_stage,
            retry_count = excluded.retry_count,
            last_error = excluded.last_error,
            merged_into = excluded.merged_into,
            title_hash = excluded.title_hash,
            updated_at = excluded.updated_at
        "#
    ))
    .bind(&record.content_id)
    .bind(&record.period_id)
    .bind(record.content_type.as_str())
    .bind(&record.title)
    .bind(&record.summary)
    .bind(&record.source_url)
    .bind(&record.hf_url)
    .bind(&record.pdf_url)
    .bind(record.github_stars)
    .bind(&record.github_language)
    .bind(&record.github_description)
    .bind(&record.news_source)
    .bind(record.news_rank)
    .bind(&record.pdf_path)
    .bind(&record.video_path)
    .bind(record.quality_score)
    .bind(record.citation_score)
    .bind(record.venue_score)
    .bind(record.recency_score)
    .bind(reasons)
    .bind(record.filtered_out as i64)
    .bind(&record.filter_reason)
    .bind(record.evaluated_at.as_ref().map(format_ts))
    .bind(record.status.as_str())
    .bind(record.error_stage.map(|s| s.as_str()))
    .bind(record.retry_count)
    .bind(&record.last_error)
    .bind(&record.merged_into)
    .bind(hash)
    .bind(format_ts(&record.created_at))
    .bind(format_ts(&record.updated_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// `SELECT ... FROM content WHERE 1 = 1` with an optional period clause.
fn content_query(period: Option<&str>) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::new(format!("SELECT {CONTENT_COLUMNS} FROM content WHERE 1 = 1"));
    push_period(&mut qb, period);
    qb
}

fn push_period(qb: &mut QueryBuilder<'static, Sqlite>, period: Option<&str>) {
    if let Some(period) = period {
        push_in(qb, "period_id", expand_period(period));
    }
}

fn push_in(qb: &mut QueryBuilder<'static, Sqlite>, column: &str, values: Vec<String>) {
    qb.push(format!(" AND {column} IN ("));
    let mut separated = qb.separated(", ");
    for value in values {
        separated.push_bind(value);
    }
    separated.push_unseparated(")");
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert(&self, upsert: &ContentUpsert) -> Result<ContentRecord> {
        if upsert.content_id.trim().is_empty() {
            bail!("content_id must not be empty");
        }

        let mut tx = self.pool.begin().await?;
        let record = match fetch_record(&mut tx, &upsert.content_id).await? {
            Some(mut existing) => {
                existing.merge_upsert(upsert);
                existing.updated_at = Utc::now();
                existing
            }
            None => upsert.clone().into_record(),
        };
        write_record(&mut tx, &record).await?;
        let stored = fetch_record(&mut tx, &record.content_id)
            .await?
            .with_context(|| format!("{} vanished during upsert", record.content_id))?;
        tx.commit().await?;

        debug!(content_id = %stored.content_id, "upserted");
        Ok(stored)
    }

    async fn get(&self, content_id: &str) -> Result<Option<ContentRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_record(&mut conn, content_id).await
    }

    async fn find_by_title(&self, title: &str) -> Result<Vec<ContentRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {CONTENT_COLUMNS} FROM content WHERE title_hash = ? ORDER BY content_id"
        ))
        .bind(title_hash(title))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn advance_status(
        &self,
        content_id: &str,
        new_status: Status,
        error: Option<&str>,
        increment_retry: bool,
    ) -> Result<Option<ContentRecord>> {
        let mut tx = self.pool.begin().await?;
        let Some(mut record) = fetch_record(&mut tx, content_id).await? else {
            return Ok(None);
        };
        // Dropping the transaction on a rejected move rolls it back.
        record.apply_transition(new_status, error, increment_retry)?;
        write_record(&mut tx, &record).await?;
        let stored = fetch_record(&mut tx, content_id).await?;
        tx.commit().await?;

        debug!(content_id, status = %new_status, "status updated");
        Ok(stored)
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<ContentRecord>> {
        let mut qb = content_query(filter.period.as_deref());

        if !filter.statuses.is_empty() {
            let statuses = filter.statuses.iter().map(|s| s.as_str().to_string()).collect();
            push_in(&mut qb, "status", statuses);
        }
        if let Some(ct) = filter.content_type {
            qb.push(" AND content_type = ");
            qb.push_bind(ct.as_str());
        }
        if let Some(min) = filter.min_quality {
            qb.push(" AND quality_score IS NOT NULL AND quality_score >= ");
            qb.push_bind(min);
        }
        if !filter.include_filtered {
            qb.push(" AND filtered_out = 0");
        }
        if !filter.include_merged {
            qb.push(" AND merged_into IS NULL");
        }

        qb.push(match filter.order {
            ListOrder::RecentlyUpdated => " ORDER BY updated_at DESC, content_id ASC",
            ListOrder::QualityDesc => {
                " ORDER BY quality_score IS NULL, quality_score DESC, content_id ASC"
            }
            ListOrder::ContentId => " ORDER BY content_id ASC",
            ListOrder::Created => " ORDER BY created_at ASC, content_id ASC",
        });
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit as i64);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn list_ready_for_stage(
        &self,
        period: Option<&str>,
        target: Status,
        max_retries: i64,
    ) -> Result<Vec<ContentRecord>> {
        let stages = target.predecessors();
        if stages.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = content_query(period);
        push_in(
            &mut qb,
            "status",
            stages.iter().map(|s| s.as_str().to_string()).collect(),
        );
        qb.push(" AND retry_count < ");
        qb.push_bind(max_retries);
        qb.push(" ORDER BY content_id ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn retry_errored(&self, period: Option<&str>, max_retries: i64) -> Result<usize> {
        let mut qb = QueryBuilder::new("SELECT content_id FROM content WHERE status = 'ERROR'");
        push_period(&mut qb, period);
        qb.push(" AND retry_count < ");
        qb.push_bind(max_retries);
        qb.push(" ORDER BY content_id ASC");
        let ids: Vec<String> = qb
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| row.get("content_id"))
            .collect();

        let mut reset = 0;
        for id in ids {
            let mut tx = self.pool.begin().await?;
            let Some(mut record) = fetch_record(&mut tx, &id).await? else {
                continue;
            };
            // Re-checked inside the transaction in case another run got here first.
            if !record.is_retryable(max_retries) {
                continue;
            }
            record.reset_for_retry()?;
            write_record(&mut tx, &record).await?;
            tx.commit().await?;
            reset += 1;
        }
        Ok(reset)
    }

    async fn status_counts(&self, period: Option<&str>) -> Result<BTreeMap<Status, usize>> {
        let mut qb = QueryBuilder::new("SELECT status, COUNT(*) AS n FROM content WHERE 1 = 1");
        push_period(&mut qb, period);
        qb.push(" GROUP BY status");

        let mut counts: BTreeMap<Status, usize> = BTreeMap::new();
        for row in qb.build().fetch_all(&self.pool).await? {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            counts.insert(status.parse::<Status>()?, n as usize);
        }
        Ok(counts)
    }

    async fn list_publishable(&self, period: Option<&str>) -> Result<Vec<ContentRecord>> {
        let mut qb = content_query(period);
        qb.push(" AND status = ");
        qb.push_bind(Status::FINAL.as_str());
        qb.push(" AND video_path IS NOT NULL ORDER BY content_id ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn save_quality(&self, content_id: &str, annotation: &QualityAnnotation) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE content SET
                quality_score = ?,
                citation_score = ?,
                venue_score = ?,
                recency_score = ?,
                quality_reasons = ?,
                filtered_out = ?,
                filter_reason = ?,
                evaluated_at = ?,
                updated_at = ?
            WHERE content_id = ?
            "#,
        )
        .bind(annotation.quality_score)
        .bind(annotation.citation_score)
        .bind(annotation.venue_score)
        .bind(annotation.recency_score)
        .bind(serde_json::to_string(&annotation.reasons)?)
        .bind(annotation.filtered_out as i64)
        .bind(&annotation.filter_reason)
        .bind(format_ts(&annotation.evaluated_at))
        .bind(format_ts(&Utc::now()))
        .bind(content_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn save_duplicate_group(&self, group: &DuplicateGroup) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO duplicate_groups (group_id, canonical_id, duplicate_ids,
                                          similarity_scores, detection_method,
                                          survivor_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(group_id) DO UPDATE SET
                canonical_id = excluded.canonical_id,
                duplicate_ids = excluded.duplicate_ids,
                similarity_scores = excluded.similarity_scores,
                detection_method = excluded.detection_method,
                survivor_id = excluded.survivor_id,
                created_at = excluded.created_at
            "#,
        )
        .bind(&group.group_id)
        .bind(&group.canonical_id)
        .bind(serde_json::to_string(&group.duplicate_ids)?)
        .bind(serde_json::to_string(&group.similarity_scores)?)
        .bind(group.detection_method.as_str())
        .bind(&group.survivor_id)
        .bind(format_ts(&group.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_duplicate_group(&self, group_id: &str) -> Result<Option<DuplicateGroup>> {
        let row = sqlx::query("SELECT * FROM duplicate_groups WHERE group_id = ?")
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(group_from_row).transpose()
    }

    async fn list_duplicate_groups(&self) -> Result<Vec<DuplicateGroup>> {
        let rows = sqlx::query("SELECT * FROM duplicate_groups ORDER BY group_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(group_from_row).collect()
    }

    async fn mark_merged(&self, group_id: &str, survivor_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM duplicate_groups WHERE group_id = ?")
            .bind(group_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(group) = row.as_ref().map(group_from_row).transpose()? else {
            return Ok(false);
        };
        if !group.member_ids().any(|id| id == survivor_id) {
            bail!("{} is not a member of group {}", survivor_id, group_id);
        }

        let now = format_ts(&Utc::now());
        for id in group.member_ids() {
            let merged_into = (id != survivor_id).then_some(survivor_id);
            sqlx::query(
                "UPDATE content SET merged_into = ?, updated_at = ? WHERE content_id = ? AND merged_into IS NOT ?",
            )
            .bind(merged_into)
            .bind(&now)
            .bind(id)
            .bind(merged_into)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE duplicate_groups SET survivor_id = ? WHERE group_id = ?")
            .bind(survivor_id)
            .bind(group_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn record_interaction(&self, interaction: &UserInteraction) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_interactions (user_id, content_id, action_type, weight, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&interaction.user_id)
        .bind(&interaction.content_id)
        .bind(interaction.action_type.as_str())
        .bind(interaction.weight)
        .bind(format_ts(&interaction.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn user_interactions(&self, user_id: &str) -> Result<Vec<UserInteraction>> {
        let rows = sqlx::query("SELECT * FROM user_interactions WHERE user_id = ? ORDER BY id")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(interaction_from_row).collect()
    }

    async fn endorsements_for_content(&self, content_ids: &[String]) -> Result<Vec<UserInteraction>> {
        if content_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::new(format!(
            "SELECT * FROM user_interactions WHERE action_type IN {ENDORSEMENT_ACTIONS}"
        ));
        push_in(&mut qb, "content_id", content_ids.to_vec());
        qb.push(" ORDER BY id");
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(interaction_from_row).collect()
    }

    async fn endorsements_by_users(&self, user_ids: &[String]) -> Result<Vec<UserInteraction>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::new(format!(
            "SELECT * FROM user_interactions WHERE action_type IN {ENDORSEMENT_ACTIONS}"
        ));
        push_in(&mut qb, "user_id", user_ids.to_vec());
        qb.push(" ORDER BY id");
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(interaction_from_row).collect()
    }

    async fn save_recommendation(&self, entry: &RecommendationLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO recommendations (user_id, content_id, strategy, score, reasons, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.user_id)
        .bind(&entry.content_id)
        .bind(entry.strategy.as_str())
        .bind(entry.score)
        .bind(serde_json::to_string(&entry.reasons)?)
        .bind(format_ts(&entry.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
