//! Personalized recommendation over evaluated, non-duplicate content.
//!
//! Four strategies:
//!
//! - **popular**: weighted sum of quality, recency, and citation sub-scores.
//! - **similar**: cosine similarity of title+summary embeddings, or plain
//!   title similarity when no model is available.
//! - **collaborative**: content endorsed (favorited or shared) by other
//!   users who endorsed the same things as this user.
//! - **hybrid**: picks among the above by how much history the user has.
//!
//! Only records that passed the quality filter and were not merged away
//! are ever recommended.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{
    ActionType, ContentRecord, RecommendationLogEntry, RecommendationResult, StrategyName,
    UserInteraction,
};
use crate::quality::check_weights;
use crate::similarity::{cosine_similarity, title_similarity, FallbackNotice, SimilarityModel};
use crate::store::{ListFilter, ListOrder, Store};

/// Sub-score threshold for a "high X" reason on popular results.
const HIGHLIGHT_SCORE: f64 = 80.0;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RecommendConfig {
    pub popular_quality_weight: f64,
    pub popular_recency_weight: f64,
    pub popular_citation_weight: f64,
    /// Below this many interactions a user gets popularity only.
    pub new_user_threshold: usize,
    /// At or above this many interactions collaborative results are blended in.
    pub active_user_threshold: usize,
    pub min_similarity: f64,
    pub title_fallback_min_similarity: f64,
    pub similar_candidate_limit: usize,
    pub title_fallback_candidate_limit: usize,
    /// How many of the user's top endorsements seed collaborative filtering.
    pub liked_history_limit: usize,
    pub default_user: String,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            popular_quality_weight: 0.6,
            popular_recency_weight: 0.3,
            popular_citation_weight: 0.1,
            new_user_threshold: 5,
            active_user_threshold: 20,
            min_similarity: 0.5,
            title_fallback_min_similarity: 0.3,
            similar_candidate_limit: 100,
            title_fallback_candidate_limit: 50,
            liked_history_limit: 10,
            default_user: "default".to_string(),
        }
    }
}

impl RecommendConfig {
    pub fn validate(&self) -> Result<()> {
        check_weights(
            "recommend.popular_*_weight",
            &[
                self.popular_quality_weight,
                self.popular_recency_weight,
                self.popular_citation_weight,
            ],
        )?;
        if self.active_user_threshold <= self.new_user_threshold {
            bail!("recommend.active_user_threshold must exceed recommend.new_user_threshold");
        }
        if !(0.0..=1.0).contains(&self.min_similarity) {
            bail!("recommend.min_similarity must be within 0..=1");
        }
        if !(0.0..=1.0).contains(&self.title_fallback_min_similarity) {
            bail!("recommend.title_fallback_min_similarity must be within 0..=1");
        }
        if self.similar_candidate_limit == 0 || self.title_fallback_candidate_limit == 0 {
            bail!("recommend candidate limits must be > 0");
        }
        if self.liked_history_limit == 0 {
            bail!("recommend.liked_history_limit must be > 0");
        }
        if self.default_user.trim().is_empty() {
            bail!("recommend.default_user must not be empty");
        }
        Ok(())
    }
}

/// Recommendations for one user.
pub struct Recommender<'a> {
    store: &'a dyn Store,
    model: Arc<dyn SimilarityModel>,
    config: RecommendConfig,
    user_id: String,
    fallback: FallbackNotice,
}

impl<'a> Recommender<'a> {
    pub fn new(
        store: &'a dyn Store,
        model: Arc<dyn SimilarityModel>,
        config: RecommendConfig,
        user_id: &str,
    ) -> Self {
        Self {
            store,
            model,
            config,
            user_id: user_id.to_string(),
            fallback: FallbackNotice::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn seen_content(&self) -> Result<HashSet<String>> {
        Ok(self
            .store
            .user_interactions(&self.user_id)
            .await?
            .into_iter()
            .map(|i| i.content_id)
            .collect())
    }

    /// Rank evaluated records by the weighted popularity score.
    pub async fn recommend_popular(
        &self,
        period: Option<&str>,
        limit: usize,
        exclude_seen: bool,
    ) -> Result<Vec<RecommendationResult>> {
        let seen = if exclude_seen {
            self.seen_content().await?
        } else {
            HashSet::new()
        };

        let records = self
            .store
            .list(&ListFilter::eligible().period(period))
            .await?;

        let mut results: Vec<RecommendationResult> = records
            .iter()
            .filter(|r| r.quality_score.is_some() && !seen.contains(&r.content_id))
            .map(|r| self.popular_result(r))
            .collect();

        sort_by_score(&mut results);
        results.truncate(limit);
        debug!(user = %self.user_id, count = results.len(), "popular recommendations");
        Ok(results)
    }

    fn popular_result(&self, record: &ContentRecord) -> RecommendationResult {
        let quality = record.quality_score.unwrap_or(0.0);
        let recency = record.recency_score.unwrap_or(0.0);
        let citation = record.citation_score.unwrap_or(0.0);
        let score = quality * self.config.popular_quality_weight
            + recency * self.config.popular_recency_weight
            + citation * self.config.popular_citation_weight;

        let mut reasons = Vec::new();
        if quality >= HIGHLIGHT_SCORE {
            reasons.push(format!("high quality ({quality:.0})"));
        }
        if recency >= HIGHLIGHT_SCORE {
            reasons.push("recently published".to_string());
        }
        if citation >= HIGHLIGHT_SCORE {
            reasons.push("highly cited".to_string());
        }
        if reasons.is_empty() {
            reasons.push("overall pick".to_string());
        }

        RecommendationResult {
            content_id: record.content_id.clone(),
            title: record.title_or_empty().to_string(),
            score,
            strategy: StrategyName::Popular,
            reasons,
        }
    }

    /// Records similar to `content_id`. Unknown ids yield an empty list.
    ///
    /// `min_similarity` defaults to the configured threshold. Without a usable
    /// model, titles are compared instead and the lower fallback threshold
    /// applies.
    pub async fn recommend_similar(
        &self,
        content_id: &str,
        limit: usize,
        min_similarity: Option<f64>,
    ) -> Result<Vec<RecommendationResult>> {
        let Some(target) = self.store.get(content_id).await? else {
            return Ok(Vec::new());
        };

        let use_model = self.model.is_available();
        let cap = if use_model {
            self.config.similar_candidate_limit
        } else {
            self.config.title_fallback_candidate_limit
        };
        let candidates: Vec<ContentRecord> = self
            .store
            .list(&ListFilter::eligible().order(ListOrder::QualityDesc))
            .await?
            .into_iter()
            .filter(|r| r.content_id != target.content_id && !r.title_or_empty().trim().is_empty())
            .take(cap)
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let semantic = if use_model {
            self.semantic_scores(&target, &candidates)
        } else {
            self.fallback.warn_once(&format!(
                "embedding model '{}' unavailable; similar recommendations use title similarity",
                self.model.name()
            ));
            None
        };

        let mut results = Vec::new();
        match semantic {
            Some(scores) => {
                let threshold = min_similarity.unwrap_or(self.config.min_similarity);
                let target_title: String = target.title_or_empty().chars().take(30).collect();
                for (candidate, sim) in candidates.iter().zip(scores) {
                    if sim >= threshold {
                        results.push(RecommendationResult {
                            content_id: candidate.content_id.clone(),
                            title: candidate.title_or_empty().to_string(),
                            score: sim,
                            strategy: StrategyName::ContentBased,
                            reasons: vec![format!(
                                "similar to \"{}\" ({:.0}%)",
                                target_title,
                                sim * 100.0
                            )],
                        });
                    }
                }
            }
            None => {
                let threshold = self.config.title_fallback_min_similarity;
                for candidate in &candidates {
                    let sim = title_similarity(target.title_or_empty(), candidate.title_or_empty());
                    if sim >= threshold {
                        results.push(RecommendationResult {
                            content_id: candidate.content_id.clone(),
                            title: candidate.title_or_empty().to_string(),
                            score: sim,
                            strategy: StrategyName::ContentBased,
                            reasons: vec![format!("similar title ({:.0}%)", sim * 100.0)],
                        });
                    }
                }
            }
        }

        sort_by_score(&mut results);
        results.truncate(limit);
        Ok(results)
    }

    /// Cosine similarity of each candidate to the target, or `None` if the
    /// model failed.
    fn semantic_scores(&self, target: &ContentRecord, candidates: &[ContentRecord]) -> Option<Vec<f64>> {
        let texts: Vec<String> = std::iter::once(target)
            .chain(candidates.iter())
            .map(embedding_text)
            .collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

        match self.model.embed(&refs) {
            Ok(vectors) if vectors.len() == refs.len() => {
                let (target_vec, rest) = vectors.split_first()?;
                Some(
                    rest.iter()
                        .map(|v| cosine_similarity(target_vec, v) as f64)
                        .collect(),
                )
            }
            Ok(_) => {
                self.fallback
                    .warn_once("embedding model returned the wrong number of vectors; using title similarity");
                None
            }
            Err(e) => {
                self.fallback
                    .warn_once(&format!("{e}; similar recommendations use title similarity"));
                None
            }
        }
    }

    /// "Users who endorsed what you endorsed also endorsed..."
    ///
    /// Returns an empty list when the user has no endorsements or nobody
    /// else shares them.
    pub async fn recommend_collaborative(&self, limit: usize) -> Result<Vec<RecommendationResult>> {
        let mine = self.store.user_interactions(&self.user_id).await?;
        if mine.is_empty() {
            info!(user = %self.user_id, "no interaction history for collaborative filtering");
            return Ok(Vec::new());
        }
        let seen: HashSet<&str> = mine.iter().map(|i| i.content_id.as_str()).collect();

        let mut liked: HashMap<&str, f64> = HashMap::new();
        for i in mine.iter().filter(|i| i.action_type.is_endorsement()) {
            let best = liked.entry(i.content_id.as_str()).or_insert(f64::MIN);
            *best = best.max(i.weight);
        }
        let mut liked: Vec<(&str, f64)> = liked.into_iter().collect();
        liked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        liked.truncate(self.config.liked_history_limit);
        if liked.is_empty() {
            info!(user = %self.user_id, "no favorites or shares for collaborative filtering");
            return Ok(Vec::new());
        }
        let liked_ids: Vec<String> = liked.iter().map(|(id, _)| id.to_string()).collect();

        let peers: Vec<String> = self
            .store
            .endorsements_for_content(&liked_ids)
            .await?
            .into_iter()
            .map(|i| i.user_id)
            .filter(|u| u != &self.user_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if peers.is_empty() {
            info!(user = %self.user_id, "no similar users found");
            return Ok(Vec::new());
        }

        struct Support<'i> {
            users: HashSet<&'i str>,
            weight_sum: f64,
            count: usize,
        }

        let endorsements = self.store.endorsements_by_users(&peers).await?;
        let mut support: BTreeMap<&str, Support> = BTreeMap::new();
        for i in &endorsements {
            if seen.contains(i.content_id.as_str()) {
                continue;
            }
            let entry = support.entry(i.content_id.as_str()).or_insert_with(|| Support {
                users: HashSet::new(),
                weight_sum: 0.0,
                count: 0,
            });
            entry.users.insert(i.user_id.as_str());
            entry.weight_sum += i.weight;
            entry.count += 1;
        }

        let mut ranked: Vec<(&str, usize, f64)> = support
            .into_iter()
            .map(|(id, s)| (id, s.users.len(), s.weight_sum / s.count as f64))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| b.2.total_cmp(&a.2))
                .then_with(|| a.0.cmp(b.0))
        });

        let mut results = Vec::new();
        for (content_id, users, avg_weight) in ranked {
            if results.len() >= limit {
                break;
            }
            let Some(record) = self.store.get(content_id).await? else {
                continue;
            };
            if record.filtered_out || record.merged_into.is_some() {
                continue;
            }
            results.push(RecommendationResult {
                content_id: record.content_id.clone(),
                title: record.title_or_empty().to_string(),
                score: avg_weight,
                strategy: StrategyName::Collaborative,
                reasons: vec![format!("{users} similar users also liked this")],
            });
        }
        Ok(results)
    }

    /// Pick a strategy mix from the user's interaction volume.
    pub async fn recommend_hybrid(
        &self,
        period: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RecommendationResult>> {
        let interaction_count = self.store.user_interactions(&self.user_id).await?.len();

        let combined = if interaction_count < self.config.new_user_threshold {
            info!(user = %self.user_id, interaction_count, "new user, using popular strategy");
            let mut popular = self
                .recommend_popular(period, limit.saturating_mul(2), false)
                .await?;
            popular.truncate(limit);
            popular
        } else if interaction_count < self.config.active_user_threshold {
            info!(user = %self.user_id, interaction_count, "returning user, using popular strategy");
            self.recommend_popular(period, limit, true).await?
        } else {
            info!(user = %self.user_id, interaction_count, "active user, blending collaborative and popular");
            let mut collaborative = self.recommend_collaborative(limit.div_ceil(2)).await?;
            let remaining = limit.saturating_sub(collaborative.len());
            let popular = self.recommend_popular(period, remaining, true).await?;
            collaborative.extend(popular);
            collaborative
        };

        let mut seen = HashSet::new();
        let mut results: Vec<RecommendationResult> = combined
            .into_iter()
            .filter(|r| seen.insert(r.content_id.clone()))
            .collect();
        sort_by_score(&mut results);
        results.truncate(limit);
        Ok(results)
    }

    /// Append one interaction. `weight` defaults from the action type and
    /// must be positive when supplied.
    pub async fn track_interaction(
        &self,
        content_id: &str,
        action_type: ActionType,
        weight: Option<f64>,
    ) -> Result<UserInteraction> {
        let weight = match weight {
            Some(w) if !w.is_finite() || w <= 0.0 => {
                bail!("interaction weight must be a positive number, got {}", w)
            }
            Some(w) => w,
            None => action_type.default_weight(),
        };

        let interaction = UserInteraction {
            user_id: self.user_id.clone(),
            content_id: content_id.to_string(),
            action_type,
            weight,
            created_at: Utc::now(),
        };
        self.store.record_interaction(&interaction).await?;
        info!(
            user = %self.user_id,
            content_id,
            action = %action_type,
            weight,
            "tracked interaction"
        );
        Ok(interaction)
    }

    pub async fn record_view(&self, content_id: &str) -> Result<UserInteraction> {
        self.track_interaction(content_id, ActionType::View, None).await
    }

    pub async fn record_favorite(&self, content_id: &str) -> Result<UserInteraction> {
        self.track_interaction(content_id, ActionType::Favorite, None).await
    }

    pub async fn record_share(&self, content_id: &str) -> Result<UserInteraction> {
        self.track_interaction(content_id, ActionType::Share, None).await
    }

    /// Append `result` to the recommendation log.
    pub async fn save_recommendation(&self, result: &RecommendationResult) -> Result<()> {
        let entry = RecommendationLogEntry {
            user_id: self.user_id.clone(),
            content_id: result.content_id.clone(),
            strategy: result.strategy,
            score: result.score,
            reasons: result.reasons.clone(),
            created_at: Utc::now(),
        };
        self.store.save_recommendation(&entry).await
    }
}

fn embedding_text(record: &ContentRecord) -> String {
    format!(
        "{} {}",
        record.title_or_empty(),
        record.summary.as_deref().unwrap_or("")
    )
    .trim()
    .to_string()
}

/// Score descending, then `content_id` ascending.
fn sort_by_score(results: &mut [RecommendationResult]) {
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.content_id.cmp(&b.content_id))
    });
}
