//! Quality scoring for papers, repositories, and news items.
//!
//! Every content type is scored on the same 0–100 scale from its own
//! signals, combined with fixed per-type weights. A record passes when its
//! total reaches `min_quality_score`. Hard rules (a title that is too short,
//! too few stars) short-circuit to a zero score that always fails.
//!
//! Scoring is dispatched by matching on [`ContentFields`]; each variant's
//! fields implement [`Scorer`].

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dedup::normalize_arxiv_id;
use crate::models::{
    ContentFields, ContentRecord, NewsFields, PaperFields, QualityScore, RepositoryFields,
};

const NEUTRAL_SCORE: f64 = 50.0;
const WEIGHT_TOLERANCE: f64 = 1e-6;

// ============ Configuration ============

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PaperWeights {
    pub citation: f64,
    pub venue: f64,
    pub recency: f64,
    pub author: f64,
}

impl Default for PaperWeights {
    fn default() -> Self {
        Self {
            citation: 0.2,
            venue: 0.3,
            recency: 0.4,
            author: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RepositoryWeights {
    pub stars: f64,
    pub language: f64,
    pub description: f64,
}

impl Default for RepositoryWeights {
    fn default() -> Self {
        Self {
            stars: 0.5,
            language: 0.3,
            description: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NewsWeights {
    pub rank: f64,
    pub source: f64,
}

impl Default for NewsWeights {
    fn default() -> Self {
        Self {
            rank: 0.6,
            source: 0.4,
        }
    }
}

/// Thresholds, weights, and lookup tables for the quality filter.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_quality_score: f64,
    pub min_github_stars: i64,
    pub paper_weights: PaperWeights,
    pub repository_weights: RepositoryWeights,
    pub news_weights: NewsWeights,
    /// News source name (lowercase) → trust weight in `[0, 1]`.
    pub source_weights: BTreeMap<String, f64>,
    pub default_source_weight: f64,
    /// Language name → score in `[0, 100]`. Matched case-insensitively.
    pub language_scores: BTreeMap<String, f64>,
    pub default_language_score: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        let source_weights = [("zhihu", 0.9), ("baidu", 0.85), ("weibo", 0.8)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let language_scores = [
            ("Python", 100.0),
            ("JavaScript", 95.0),
            ("TypeScript", 95.0),
            ("Go", 90.0),
            ("Rust", 90.0),
            ("Java", 85.0),
            ("C++", 85.0),
            ("C", 80.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            min_quality_score: 60.0,
            min_github_stars: 100,
            paper_weights: PaperWeights::default(),
            repository_weights: RepositoryWeights::default(),
            news_weights: NewsWeights::default(),
            source_weights,
            default_source_weight: 0.7,
            language_scores,
            default_language_score: 70.0,
        }
    }
}

impl QualityConfig {
    /// Reject out-of-range thresholds and weight groups that do not sum to 1.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.min_quality_score) {
            bail!("quality.min_quality_score must be within 0..=100");
        }
        if self.min_github_stars < 0 {
            bail!("quality.min_github_stars must be >= 0");
        }

        let p = &self.paper_weights;
        check_weights(
            "quality.paper_weights",
            &[p.citation, p.venue, p.recency, p.author],
        )?;
        let r = &self.repository_weights;
        check_weights(
            "quality.repository_weights",
            &[r.stars, r.language, r.description],
        )?;
        let n = &self.news_weights;
        check_weights("quality.news_weights", &[n.rank, n.source])?;

        for (name, weight) in &self.source_weights {
            if !(0.0..=1.0).contains(weight) {
                bail!("quality.source_weights.{} must be within 0..=1", name);
            }
        }
        if !(0.0..=1.0).contains(&self.default_source_weight) {
            bail!("quality.default_source_weight must be within 0..=1");
        }
        for (name, score) in &self.language_scores {
            if !(0.0..=100.0).contains(score) {
                bail!("quality.language_scores.{} must be within 0..=100", name);
            }
        }
        if !(0.0..=100.0).contains(&self.default_language_score) {
            bail!("quality.default_language_score must be within 0..=100");
        }
        Ok(())
    }

    fn source_weight(&self, source: &str) -> f64 {
        self.source_weights
            .get(&source.trim().to_lowercase())
            .copied()
            .unwrap_or(self.default_source_weight)
    }

    fn language_score(&self, language: &str) -> f64 {
        self.language_scores
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(language.trim()))
            .map(|(_, score)| *score)
            .unwrap_or(self.default_language_score)
    }
}

pub(crate) fn check_weights(key: &str, weights: &[f64]) -> Result<()> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        bail!("{} must be non-negative", key);
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        bail!("{} must sum to 1.0 (got {:.4})", key, sum);
    }
    Ok(())
}

// ============ Scorers ============

/// One scoring function per content variant.
pub trait Scorer {
    /// Score as of `today` (used for recency).
    fn score(&self, config: &QualityConfig, today: NaiveDate) -> QualityScore;
}

fn finish(
    config: &QualityConfig,
    total: f64,
    (citation, venue, recency): (f64, f64, f64),
    reasons: Vec<String>,
) -> QualityScore {
    let total_score = total.clamp(0.0, 100.0);
    QualityScore {
        total_score,
        citation_score: citation,
        venue_score: venue,
        recency_score: recency,
        reasons,
        passed: total_score >= config.min_quality_score,
    }
}

impl Scorer for PaperFields {
    fn score(&self, config: &QualityConfig, today: NaiveDate) -> QualityScore {
        let title = self.title.as_deref().map(str::trim).unwrap_or("");
        let title_len = title.chars().count();
        if title_len < 10 {
            return QualityScore::rejected(format!(
                "title missing or too short ({title_len} chars)"
            ));
        }

        let mut reasons = Vec::new();
        let citation = 0.0;
        reasons.push("no citation data (new paper)".to_string());

        let has_link = [&self.pdf_url, &self.hf_url]
            .iter()
            .any(|u| u.as_deref().is_some_and(|s| !s.trim().is_empty()));
        let mut venue = if has_link {
            reasons.push("has paper link".to_string());
            60.0
        } else {
            reasons.push("missing PDF and HF links".to_string());
            30.0
        };

        let recency = match paper_age_months(self, today) {
            Some(months) if months <= 6 => {
                reasons.push(format!("recent paper ({} months old)", months.max(0)));
                100.0
            }
            Some(months) => {
                reasons.push(format!("older paper ({months} months old)"));
                (100.0 - 5.0 * (months - 6) as f64).max(0.0)
            }
            None => {
                reasons.push("publication date unknown".to_string());
                NEUTRAL_SCORE
            }
        };

        if title_len > 50 {
            venue += 10.0;
            reasons.push("descriptive title".to_string());
        }

        let author = NEUTRAL_SCORE;
        let w = &config.paper_weights;
        let total =
            citation * w.citation + venue * w.venue + recency * w.recency + author * w.author;
        finish(config, total, (citation, venue, recency), reasons)
    }
}

/// Months between the arXiv `YYMM` prefix and `today`. Negative for ids
/// dated in the future.
fn paper_age_months(paper: &PaperFields, today: NaiveDate) -> Option<i64> {
    let arxiv_id = normalize_arxiv_id(&format!("arxiv.org/abs/{}", paper.content_id.trim()))
        .or_else(|| paper.pdf_url.as_deref().and_then(normalize_arxiv_id))
        .or_else(|| paper.hf_url.as_deref().and_then(normalize_arxiv_id))?;

    let yy: i64 = arxiv_id.get(0..2)?.parse().ok()?;
    let mm: i64 = arxiv_id.get(2..4)?.parse().ok()?;
    if !(1..=12).contains(&mm) {
        return None;
    }

    let paper_months = (2000 + yy) * 12 + mm;
    let now_months = today.year() as i64 * 12 + today.month() as i64;
    Some(now_months - paper_months)
}

impl Scorer for RepositoryFields {
    fn score(&self, config: &QualityConfig, _today: NaiveDate) -> QualityScore {
        let stars = self.stars.unwrap_or(0);
        if stars < config.min_github_stars {
            return QualityScore::rejected(format!(
                "too few stars ({stars} < {})",
                config.min_github_stars
            ));
        }

        let mut reasons = Vec::new();

        let ratio = (stars as f64 / 100.0).max(0.1);
        let stars_score = (50.0 + 10.0 * ratio.log10()).clamp(0.0, 100.0);
        reasons.push(format!("stars: {stars} (score {stars_score:.1})"));

        let language = self.language.as_deref().unwrap_or("unknown");
        let language_score = config.language_score(language);
        reasons.push(format!("language: {language} (score {language_score:.0})"));

        let described = self
            .description
            .as_deref()
            .is_some_and(|d| d.trim().chars().count() > 20);
        let description_score = if described {
            reasons.push("detailed description".to_string());
            100.0
        } else {
            reasons.push("missing or short description".to_string());
            NEUTRAL_SCORE
        };

        let w = &config.repository_weights;
        let total = stars_score * w.stars + language_score * w.language + description_score * w.description;
        finish(
            config,
            total,
            (stars_score, language_score, description_score),
            reasons,
        )
    }
}

impl Scorer for NewsFields {
    fn score(&self, config: &QualityConfig, _today: NaiveDate) -> QualityScore {
        let mut reasons = Vec::new();

        let rank_score = match self.rank {
            Some(rank) if rank <= 10 => {
                reasons.push(format!("top 10 trending (#{rank})"));
                100.0
            }
            Some(rank) if rank <= 20 => {
                reasons.push(format!("top 20 trending (#{rank})"));
                80.0
            }
            Some(rank) if rank <= 50 => {
                reasons.push(format!("top 50 trending (#{rank})"));
                60.0
            }
            Some(rank) => {
                reasons.push(format!("trending #{rank}"));
                (100 - rank).max(0) as f64
            }
            None => {
                reasons.push("rank unknown".to_string());
                NEUTRAL_SCORE
            }
        };

        let source = self.source.as_deref().unwrap_or("unknown");
        let weight = config.source_weight(source);
        let source_score = weight * 100.0;
        reasons.push(format!("source: {source} (weight {weight:.2})"));

        let w = &config.news_weights;
        let total = rank_score * w.rank + source_score * w.source;
        finish(config, total, (rank_score, source_score, 100.0), reasons)
    }
}

// ============ Filter ============

/// Dispatches records to their variant's [`Scorer`].
#[derive(Debug, Clone, Default)]
pub struct QualityFilter {
    config: QualityConfig,
}

impl QualityFilter {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Score `fields` as of today (UTC).
    pub fn evaluate(&self, fields: &ContentFields) -> QualityScore {
        self.evaluate_at(fields, Utc::now().date_naive())
    }

    /// Score `fields` as of `today`.
    pub fn evaluate_at(&self, fields: &ContentFields, today: NaiveDate) -> QualityScore {
        match fields {
            ContentFields::Paper(p) => p.score(&self.config, today),
            ContentFields::Repository(r) => r.score(&self.config, today),
            ContentFields::News(n) => n.score(&self.config, today),
            ContentFields::Unknown => {
                warn!("unknown content type; using neutral quality score");
                QualityScore {
                    total_score: NEUTRAL_SCORE,
                    citation_score: 0.0,
                    venue_score: 0.0,
                    recency_score: 0.0,
                    reasons: vec!["unknown content type".to_string()],
                    passed: NEUTRAL_SCORE >= self.config.min_quality_score,
                }
            }
        }
    }

    pub fn evaluate_record(&self, record: &ContentRecord) -> QualityScore {
        self.evaluate(&ContentFields::from(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
    }

    fn filter() -> QualityFilter {
        QualityFilter::default()
    }

    fn paper(id: &str, title: &str, pdf_url: Option<&str>) -> ContentFields {
        ContentFields::Paper(PaperFields {
            content_id: id.to_string(),
            title: Some(title.to_string()),
            pdf_url: pdf_url.map(str::to_string),
            hf_url: None,
        })
    }

    fn repo(stars: i64, language: &str, description: &str) -> ContentFields {
        ContentFields::Repository(RepositoryFields {
            name: "owner/project".into(),
            stars: Some(stars),
            language: Some(language.into()),
            description: Some(description.into()),
        })
    }

    fn news(rank: Option<i64>, source: &str) -> ContentFields {
        ContentFields::News(NewsFields {
            title: Some("headline".into()),
            rank,
            source: Some(source.into()),
        })
    }

    #[test]
    fn test_short_title_hard_fails() {
        let score = filter().evaluate_at(
            &paper("2603.01234", "Short", Some("https://arxiv.org/abs/2603.01234")),
            today(),
        );
        assert_eq!(score.total_score, 0.0);
        assert!(!score.passed);
        assert_eq!(score.reasons.len(), 1);
    }

    #[test]
    fn test_recent_paper_with_link_passes() {
        let score = filter().evaluate_at(
            &paper(
                "2602.01234",
                "Sparse mixture of experts at scale",
                Some("https://arxiv.org/pdf/2602.01234.pdf"),
            ),
            today(),
        );
        // 0*0.2 + 60*0.3 + 100*0.4 + 50*0.1
        assert!((score.total_score - 63.0).abs() < 1e-9, "{}", score.total_score);
        assert_eq!(score.venue_score, 60.0);
        assert_eq!(score.recency_score, 100.0);
        assert!(score.passed);
    }

    #[test]
    fn test_recency_decays_after_six_months() {
        // 2025-03 → 2026-03 is 12 months: 100 - 5*(12-6) = 70.
        let score = filter().evaluate_at(
            &paper("2503.00001", "A year old paper on retrieval", None),
            today(),
        );
        assert_eq!(score.recency_score, 70.0);
        assert_eq!(score.venue_score, 30.0);

        let ancient = filter().evaluate_at(
            &paper("1706.03762", "Attention Is All You Need", None),
            today(),
        );
        assert_eq!(ancient.recency_score, 0.0);
        assert!(!ancient.passed);
    }

    #[test]
    fn test_unparseable_arxiv_date_is_neutral() {
        let score = filter().evaluate_at(
            &paper("my-blog-post", "Notes on efficient inference", Some("https://example.com/a.pdf")),
            today(),
        );
        assert_eq!(score.recency_score, 50.0);
    }

    #[test]
    fn test_long_title_bonus() {
        let title = "An extremely detailed title that goes well beyond fifty characters";
        let score = filter().evaluate_at(&paper("2603.00002", title, None), today());
        assert_eq!(score.venue_score, 40.0);
        assert!(score.reasons.iter().any(|r| r == "descriptive title"));
    }

    #[test]
    fn test_repository_below_min_stars_fails() {
        let score = filter().evaluate_at(&repo(99, "Python", "a long enough description here"), today());
        assert_eq!(score.total_score, 0.0);
        assert!(!score.passed);
    }

    #[test]
    fn test_popular_python_repository_passes() {
        let score = filter().evaluate_at(
            &repo(50_000, "Python", "Fast inference engine for transformer models"),
            today(),
        );
        assert!(score.passed);
        assert!(score.total_score >= 60.0);
        assert_eq!(score.venue_score, 100.0);
        assert_eq!(score.recency_score, 100.0);
    }

    #[test]
    fn test_stars_score_is_log_scaled() {
        let at_100 = filter().evaluate_at(&repo(100, "Python", ""), today());
        assert!((at_100.citation_score - 50.0).abs() < 1e-9);
        let at_10k = filter().evaluate_at(&repo(10_000, "Python", ""), today());
        assert!((at_10k.citation_score - 70.0).abs() < 1e-9);
        let huge = filter().evaluate_at(&repo(10_i64.pow(12), "Python", ""), today());
        assert_eq!(huge.citation_score, 100.0);
    }

    #[test]
    fn test_unknown_language_uses_default() {
        let score = filter().evaluate_at(&repo(1000, "COBOL", ""), today());
        assert_eq!(score.venue_score, 70.0);
        let lower = filter().evaluate_at(&repo(1000, "rust", ""), today());
        assert_eq!(lower.venue_score, 90.0);
    }

    #[test]
    fn test_news_rank_bands() {
        let f = filter();
        assert_eq!(f.evaluate_at(&news(Some(3), "zhihu"), today()).citation_score, 100.0);
        assert_eq!(f.evaluate_at(&news(Some(15), "zhihu"), today()).citation_score, 80.0);
        assert_eq!(f.evaluate_at(&news(Some(45), "zhihu"), today()).citation_score, 60.0);
        assert_eq!(f.evaluate_at(&news(Some(70), "zhihu"), today()).citation_score, 30.0);
        assert_eq!(f.evaluate_at(&news(Some(150), "zhihu"), today()).citation_score, 0.0);
        assert_eq!(f.evaluate_at(&news(None, "zhihu"), today()).citation_score, 50.0);
    }

    #[test]
    fn test_news_source_weights() {
        let score = filter().evaluate_at(&news(Some(1), "Zhihu"), today());
        // 100*0.6 + 90*0.4
        assert!((score.total_score - 96.0).abs() < 1e-9);
        let unknown = filter().evaluate_at(&news(Some(1), "blog"), today());
        assert!((unknown.venue_score - 70.0).abs() < 1e-9);
        assert_eq!(unknown.recency_score, 100.0);
    }

    #[test]
    fn test_unknown_type_is_neutral() {
        let score = filter().evaluate_at(&ContentFields::Unknown, today());
        assert_eq!(score.total_score, 50.0);
        assert_eq!(score.reasons, vec!["unknown content type".to_string()]);
        assert!(!score.passed);
    }

    #[test]
    fn test_default_config_is_valid() {
        QualityConfig::default().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        let mut config = QualityConfig::default();
        config.news_weights.rank = 0.9;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("quality.news_weights"), "{err}");
    }
}
