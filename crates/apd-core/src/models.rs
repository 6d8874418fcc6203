//! Core data models shared by the store, the deduplicator, the quality
//! filter, and the recommender.
//!
//! A [`ContentRecord`] is one harvested item (paper, repository, or news
//! item). Everything else in this module either annotates a record
//! ([`QualityScore`], [`DuplicateGroup`]) or is logged against it
//! ([`UserInteraction`], [`RecommendationLogEntry`]).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a stored or user-supplied enum value cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ============ Content type ============

/// Kind of harvested content.
///
/// `Unknown` covers rows written by older fetchers with a type this build
/// does not recognise; such records are scored with a neutral default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Paper,
    #[serde(alias = "GITHUB")]
    Repository,
    News,
    #[serde(other)]
    Unknown,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Paper => "PAPER",
            ContentType::Repository => "REPOSITORY",
            ContentType::News => "NEWS",
            ContentType::Unknown => "UNKNOWN",
        }
    }

    /// Lenient parse used when decoding stored rows. Never fails.
    pub fn from_stored(value: &str) -> Self {
        value.parse().unwrap_or(ContentType::Unknown)
    }
}

impl FromStr for ContentType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PAPER" => Ok(ContentType::Paper),
            "REPOSITORY" | "GITHUB" | "REPO" => Ok(ContentType::Repository),
            "NEWS" => Ok(ContentType::News),
            _ => Err(ParseError::new("content type", s)),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Pipeline status ============

/// Processing stage of a record.
///
/// Stages advance in the order `NEW → PDF_OK → NBLM_OK → VIDEO_OK`. Any
/// stage may move to `ERROR`; an errored record may be reset to the stage
/// it failed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    New,
    PdfOk,
    NblmOk,
    VideoOk,
    Error,
}

impl Status {
    /// The ordered pipeline stages (excluding `ERROR`).
    pub const STAGES: [Status; 4] = [Status::New, Status::PdfOk, Status::NblmOk, Status::VideoOk];

    /// The final stage; records here are handed to publishing.
    pub const FINAL: Status = Status::VideoOk;

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::New => "NEW",
            Status::PdfOk => "PDF_OK",
            Status::NblmOk => "NBLM_OK",
            Status::VideoOk => "VIDEO_OK",
            Status::Error => "ERROR",
        }
    }

    /// Position in [`Status::STAGES`], or `None` for `ERROR`.
    pub fn stage_index(&self) -> Option<usize> {
        Self::STAGES.iter().position(|s| s == self)
    }

    /// Stages strictly before `self`. Empty for `NEW` and `ERROR`.
    pub fn predecessors(&self) -> &'static [Status] {
        match self.stage_index() {
            Some(idx) => &Self::STAGES[..idx],
            None => &[],
        }
    }

    /// Whether a record at `self` may move to `next`.
    ///
    /// Allowed: staying put, advancing, moving to `ERROR`, and leaving
    /// `ERROR` for any stage (a retry reset).
    pub fn can_transition_to(&self, next: Status) -> bool {
        match (self.stage_index(), next.stage_index()) {
            (_, None) => true,
            (None, Some(_)) => true,
            (Some(cur), Some(nxt)) => nxt >= cur,
        }
    }
}

impl FromStr for Status {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(Status::New),
            "PDF_OK" => Ok(Status::PdfOk),
            "NBLM_OK" => Ok(Status::NblmOk),
            "VIDEO_OK" => Ok(Status::VideoOk),
            "ERROR" => Ok(Status::Error),
            _ => Err(ParseError::new("status", s)),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status change. Returned (wrapped in `anyhow`) by
/// [`Store::advance_status`](crate::store::Store::advance_status).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("status of {content_id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub content_id: String,
    pub from: Status,
    pub to: Status,
}

// ============ Content record ============

/// One harvested item tracked through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub content_id: String,
    pub period_id: String,
    pub content_type: ContentType,

    pub title: Option<String>,
    pub summary: Option<String>,
    pub source_url: Option<String>,
    pub hf_url: Option<String>,
    pub pdf_url: Option<String>,

    pub github_stars: Option<i64>,
    pub github_language: Option<String>,
    pub github_description: Option<String>,

    pub news_source: Option<String>,
    pub news_rank: Option<i64>,

    pub pdf_path: Option<String>,
    pub video_path: Option<String>,

    pub quality_score: Option<f64>,
    pub citation_score: Option<f64>,
    pub venue_score: Option<f64>,
    pub recency_score: Option<f64>,
    pub quality_reasons: Vec<String>,
    pub filtered_out: bool,
    pub filter_reason: Option<String>,
    pub evaluated_at: Option<DateTime<Utc>>,

    pub status: Status,
    /// Stage a record was at when it moved to `ERROR`.
    pub error_stage: Option<Status>,
    pub retry_count: i64,
    pub last_error: Option<String>,
    /// Survivor id once this record has been merged away as a duplicate.
    pub merged_into: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentRecord {
    /// A fresh `NEW` record with every optional field empty.
    pub fn new(content_id: &str, period_id: &str, content_type: ContentType) -> Self {
        let now = Utc::now();
        Self {
            content_id: content_id.to_string(),
            period_id: period_id.to_string(),
            content_type,
            title: None,
            summary: None,
            source_url: None,
            hf_url: None,
            pdf_url: None,
            github_stars: None,
            github_language: None,
            github_description: None,
            news_source: None,
            news_rank: None,
            pdf_path: None,
            video_path: None,
            quality_score: None,
            citation_score: None,
            venue_score: None,
            recency_score: None,
            quality_reasons: Vec::new(),
            filtered_out: false,
            filter_reason: None,
            evaluated_at: None,
            status: Status::New,
            error_stage: None,
            retry_count: 0,
            last_error: None,
            merged_into: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The URL used for exact-match deduplication: the PDF link, falling
    /// back to the generic source link.
    pub fn primary_url(&self) -> Option<&str> {
        self.pdf_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or(self.source_url.as_deref().filter(|u| !u.is_empty()))
    }

    pub fn title_or_empty(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    /// Move to `next`, rejecting regressions. Moving to `ERROR` remembers
    /// the stage the record failed from; leaving `ERROR` clears it.
    pub fn apply_transition(
        &mut self,
        next: Status,
        error: Option<&str>,
        increment_retry: bool,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                content_id: self.content_id.clone(),
                from: self.status,
                to: next,
            });
        }

        if next == Status::Error {
            if self.status != Status::Error {
                self.error_stage = Some(self.status);
            }
        } else {
            self.error_stage = None;
        }
        self.status = next;
        if let Some(e) = error {
            self.last_error = Some(e.to_string());
        }
        if increment_retry {
            self.retry_count += 1;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Whether an errored record may be reset under `max_retries`.
    pub fn is_retryable(&self, max_retries: i64) -> bool {
        self.status == Status::Error && self.retry_count < max_retries
    }

    /// Reset an errored record to the stage it failed from.
    pub fn reset_for_retry(&mut self) -> Result<(), TransitionError> {
        let stage = self.error_stage.unwrap_or(Status::New);
        self.apply_transition(stage, None, true)
    }

    /// Apply every non-`None` field of `upsert`. Never clears a field.
    pub fn merge_upsert(&mut self, upsert: &ContentUpsert) {
        fn set<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *slot = Some(v.clone());
            }
        }

        if let Some(ct) = upsert.content_type {
            self.content_type = ct;
        }
        set(&mut self.title, &upsert.title);
        set(&mut self.summary, &upsert.summary);
        set(&mut self.source_url, &upsert.source_url);
        set(&mut self.hf_url, &upsert.hf_url);
        set(&mut self.pdf_url, &upsert.pdf_url);
        set(&mut self.github_stars, &upsert.github_stars);
        set(&mut self.github_language, &upsert.github_language);
        set(&mut self.github_description, &upsert.github_description);
        set(&mut self.news_source, &upsert.news_source);
        set(&mut self.news_rank, &upsert.news_rank);
        set(&mut self.pdf_path, &upsert.pdf_path);
        set(&mut self.video_path, &upsert.video_path);
    }
}

/// Fields supplied by a fetcher to [`Store::upsert`](crate::store::Store::upsert).
///
/// `content_id` and `period_id` are required; every other field is applied
/// only when present. On insert a missing `content_type` defaults to `PAPER`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentUpsert {
    pub content_id: String,
    pub period_id: String,
    pub content_type: Option<ContentType>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub source_url: Option<String>,
    pub hf_url: Option<String>,
    pub pdf_url: Option<String>,
    pub github_stars: Option<i64>,
    pub github_language: Option<String>,
    pub github_description: Option<String>,
    pub news_source: Option<String>,
    pub news_rank: Option<i64>,
    pub pdf_path: Option<String>,
    pub video_path: Option<String>,
}

impl ContentUpsert {
    pub fn new(content_id: &str, period_id: &str) -> Self {
        Self {
            content_id: content_id.to_string(),
            period_id: period_id.to_string(),
            ..Default::default()
        }
    }

    pub fn into_record(self) -> ContentRecord {
        let mut record = ContentRecord::new(
            &self.content_id,
            &self.period_id,
            self.content_type.unwrap_or(ContentType::Paper),
        );
        record.merge_upsert(&self);
        record
    }
}

/// Type-specific scoring inputs, extracted from a record.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentFields {
    Paper(PaperFields),
    Repository(RepositoryFields),
    News(NewsFields),
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperFields {
    pub content_id: String,
    pub title: Option<String>,
    pub pdf_url: Option<String>,
    pub hf_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryFields {
    pub name: String,
    pub stars: Option<i64>,
    pub language: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewsFields {
    pub title: Option<String>,
    pub rank: Option<i64>,
    pub source: Option<String>,
}

impl From<&ContentRecord> for ContentFields {
    fn from(record: &ContentRecord) -> Self {
        match record.content_type {
            ContentType::Paper => ContentFields::Paper(PaperFields {
                content_id: record.content_id.clone(),
                title: record.title.clone(),
                pdf_url: record.pdf_url.clone(),
                hf_url: record.hf_url.clone(),
            }),
            ContentType::Repository => ContentFields::Repository(RepositoryFields {
                name: record
                    .title
                    .clone()
                    .unwrap_or_else(|| record.content_id.clone()),
                stars: record.github_stars,
                language: record.github_language.clone(),
                description: record
                    .github_description
                    .clone()
                    .or_else(|| record.summary.clone()),
            }),
            ContentType::News => ContentFields::News(NewsFields {
                title: record.title.clone(),
                rank: record.news_rank,
                source: record.news_source.clone(),
            }),
            ContentType::Unknown => ContentFields::Unknown,
        }
    }
}

// ============ Quality ============

/// Result of evaluating one record. Folded into the record's quality fields.
///
/// The three sub-score slots are shared across content types:
///
/// | Slot | Paper | Repository | News |
/// |------|-------|------------|------|
/// | `citation_score` | citations | stars | rank |
/// | `venue_score` | venue/link heuristics | language | source trust |
/// | `recency_score` | arXiv-id age | description completeness | always 100 |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub total_score: f64,
    pub citation_score: f64,
    pub venue_score: f64,
    pub recency_score: f64,
    pub reasons: Vec<String>,
    pub passed: bool,
}

impl QualityScore {
    /// A zero score that failed a hard rule.
    pub fn rejected(reason: String) -> Self {
        Self {
            total_score: 0.0,
            citation_score: 0.0,
            venue_score: 0.0,
            recency_score: 0.0,
            reasons: vec![reason],
            passed: false,
        }
    }
}

/// Quality fields written back to a record after evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityAnnotation {
    pub quality_score: f64,
    pub citation_score: f64,
    pub venue_score: f64,
    pub recency_score: f64,
    pub reasons: Vec<String>,
    pub filtered_out: bool,
    pub filter_reason: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl From<&QualityScore> for QualityAnnotation {
    fn from(score: &QualityScore) -> Self {
        let filter_reason = if score.passed {
            None
        } else {
            Some(
                score
                    .reasons
                    .first()
                    .cloned()
                    .unwrap_or_else(|| format!("quality score {:.1} below threshold", score.total_score)),
            )
        };
        Self {
            quality_score: score.total_score,
            citation_score: score.citation_score,
            venue_score: score.venue_score,
            recency_score: score.recency_score,
            reasons: score.reasons.clone(),
            filtered_out: !score.passed,
            filter_reason,
            evaluated_at: Utc::now(),
        }
    }
}

// ============ Deduplication ============

/// Which tier of the similarity cascade matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    ExactUrl,
    TitleSimilarity,
    SemanticSimilarity,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::ExactUrl => "exact_url",
            DetectionMethod::TitleSimilarity => "title_similarity",
            DetectionMethod::SemanticSimilarity => "semantic_similarity",
        }
    }
}

impl FromStr for DetectionMethod {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact_url" => Ok(DetectionMethod::ExactUrl),
            "title_similarity" => Ok(DetectionMethod::TitleSimilarity),
            "semantic_similarity" => Ok(DetectionMethod::SemanticSimilarity),
            _ => Err(ParseError::new("detection method", s)),
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical record and the records judged to duplicate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub group_id: String,
    pub canonical_id: String,
    pub duplicate_ids: Vec<String>,
    pub similarity_scores: BTreeMap<String, f64>,
    /// Method of the most recent match added to the group.
    pub detection_method: DetectionMethod,
    /// Set once the group has been resolved by a merge.
    pub survivor_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DuplicateGroup {
    /// Canonical id followed by every duplicate id.
    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.canonical_id.as_str()).chain(self.duplicate_ids.iter().map(String::as_str))
    }
}

/// How [`merge`](crate::dedup::merge) picks the surviving record of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    KeepFirst,
    KeepHighestQuality,
    Manual { survivor_id: String },
}

impl FromStr for MergeStrategy {
    type Err = ParseError;

    /// Parses `keep_first`, `keep_highest_quality`, or `manual:<id>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep_first" => Ok(MergeStrategy::KeepFirst),
            "keep_highest_quality" => Ok(MergeStrategy::KeepHighestQuality),
            other => match other.strip_prefix("manual:") {
                Some(id) if !id.is_empty() => Ok(MergeStrategy::Manual {
                    survivor_id: id.to_string(),
                }),
                _ => Err(ParseError::new("merge strategy", s)),
            },
        }
    }
}

// ============ Interactions and recommendations ============

/// A user action on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    View,
    Favorite,
    Share,
    Download,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::View => "view",
            ActionType::Favorite => "favorite",
            ActionType::Share => "share",
            ActionType::Download => "download",
        }
    }

    /// Weight recorded when the caller does not supply one.
    pub fn default_weight(&self) -> f64 {
        match self {
            ActionType::View => 1.0,
            ActionType::Favorite => 3.0,
            ActionType::Share => 5.0,
            ActionType::Download => 2.0,
        }
    }

    /// Actions that count as an endorsement for collaborative filtering.
    pub fn is_endorsement(&self) -> bool {
        matches!(self, ActionType::Favorite | ActionType::Share)
    }
}

impl FromStr for ActionType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "view" => Ok(ActionType::View),
            "favorite" => Ok(ActionType::Favorite),
            "share" => Ok(ActionType::Share),
            "download" => Ok(ActionType::Download),
            _ => Err(ParseError::new("action type", s)),
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only interaction log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInteraction {
    pub user_id: String,
    pub content_id: String,
    pub action_type: ActionType,
    pub weight: f64,
    pub created_at: DateTime<Utc>,
}

/// Which strategy produced a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyName {
    Popular,
    ContentBased,
    Collaborative,
}

impl StrategyName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyName::Popular => "popular",
            StrategyName::ContentBased => "content_based",
            StrategyName::Collaborative => "collaborative",
        }
    }
}

impl fmt::Display for StrategyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationResult {
    pub content_id: String,
    pub title: String,
    pub score: f64,
    pub strategy: StrategyName,
    pub reasons: Vec<String>,
}

/// Analytics row for an emitted recommendation. Never read back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationLogEntry {
    pub user_id: String,
    pub content_id: String,
    pub strategy: StrategyName,
    pub score: f64,
    pub reasons: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_monotonic() {
        assert!(Status::New.can_transition_to(Status::PdfOk));
        assert!(Status::New.can_transition_to(Status::VideoOk));
        assert!(Status::PdfOk.can_transition_to(Status::PdfOk));
        assert!(!Status::NblmOk.can_transition_to(Status::PdfOk));
        assert!(!Status::VideoOk.can_transition_to(Status::New));
        assert!(Status::VideoOk.can_transition_to(Status::Error));
        assert!(Status::Error.can_transition_to(Status::PdfOk));
    }

    #[test]
    fn error_remembers_failed_stage() {
        let mut record = ContentRecord::new("a", "2026-W03", ContentType::Paper);
        record.apply_transition(Status::PdfOk, None, false).unwrap();
        record
            .apply_transition(Status::Error, Some("notebook timed out"), false)
            .unwrap();
        assert_eq!(record.error_stage, Some(Status::PdfOk));
        assert_eq!(record.last_error.as_deref(), Some("notebook timed out"));

        record.reset_for_retry().unwrap();
        assert_eq!(record.status, Status::PdfOk);
        assert_eq!(record.error_stage, None);
        assert_eq!(record.retry_count, 1);
    }

    #[test]
    fn regression_is_rejected() {
        let mut record = ContentRecord::new("a", "2026-W03", ContentType::Paper);
        record.status = Status::VideoOk;
        let err = record.apply_transition(Status::New, None, false).unwrap_err();
        assert_eq!(err.from, Status::VideoOk);
        assert_eq!(record.status, Status::VideoOk);
    }

    #[test]
    fn predecessors_exclude_target() {
        assert!(Status::New.predecessors().is_empty());
        assert_eq!(
            Status::NblmOk.predecessors(),
            &[Status::New, Status::PdfOk]
        );
        assert!(Status::Error.predecessors().is_empty());
    }

    #[test]
    fn content_type_accepts_legacy_github_name() {
        assert_eq!("GITHUB".parse::<ContentType>().unwrap(), ContentType::Repository);
        assert_eq!(ContentType::from_stored("VIDEO"), ContentType::Unknown);
    }

    #[test]
    fn merge_upsert_never_clears_fields() {
        let mut record = ContentRecord::new("2601.03252", "2026-03", ContentType::Paper);
        record.title = Some("Original".into());
        record.summary = Some("Abstract".into());

        let mut upsert = ContentUpsert::new("2601.03252", "2026-03");
        upsert.title = Some("Updated".into());
        record.merge_upsert(&upsert);

        assert_eq!(record.title.as_deref(), Some("Updated"));
        assert_eq!(record.summary.as_deref(), Some("Abstract"));
    }

    #[test]
    fn merge_strategy_parses_manual_survivor() {
        assert_eq!(
            "manual:abc".parse::<MergeStrategy>().unwrap(),
            MergeStrategy::Manual {
                survivor_id: "abc".into()
            }
        );
        assert!("manual:".parse::<MergeStrategy>().is_err());
        assert!("newest".parse::<MergeStrategy>().is_err());
    }

    #[test]
    fn failed_score_carries_filter_reason() {
        let score = QualityScore::rejected("title too short".into());
        let annotation = QualityAnnotation::from(&score);
        assert!(annotation.filtered_out);
        assert_eq!(annotation.filter_reason.as_deref(), Some("title too short"));
    }
}
