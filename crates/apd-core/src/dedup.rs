//! Duplicate detection over a batch of content records.
//!
//! Each pair of not-yet-assigned records runs through a three-tier cascade,
//! stopping at the first tier that matches:
//!
//! 1. **Exact URL**: both primary URLs normalize to the same source id
//!    (arXiv id, GitHub repo slug, or stripped URL). Score `1.0`.
//! 2. **Title similarity**: [`title_similarity`] at or above
//!    `title_similarity_threshold`.
//! 3. **Semantic similarity**: cosine similarity of summary embeddings at or
//!    above `semantic_similarity_threshold`. Only when requested and both
//!    records have a summary. Without a usable model the summaries are
//!    compared with [`title_similarity`] instead.
//!
//! Canonical selection is first-seen-wins: records are visited in input
//! order and each unassigned record claims every later unassigned record
//! that matches it. The deduplicator never mutates records; merging a
//! group is the separate [`merge`] step.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::models::{ContentRecord, DetectionMethod, DuplicateGroup, MergeStrategy};
use crate::similarity::{
    cosine_similarity, normalize_title, title_similarity, FallbackNotice, SimilarityModel,
};

static ARXIV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:arxiv\.org/(?:abs|pdf)|huggingface\.co/papers)/(\d{4}\.\d{4,5})")
        .expect("valid regex")
});

static GITHUB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)github\.com/([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)").expect("valid regex")
});

/// Deduplication thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DedupConfig {
    pub title_similarity_threshold: f64,
    pub semantic_similarity_threshold: f64,
    pub merge_strategy: String,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            title_similarity_threshold: 0.85,
            semantic_similarity_threshold: 0.90,
            merge_strategy: "keep_first".to_string(),
        }
    }
}

/// Output of one [`Deduplicator::find_duplicates`] run.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupResult {
    pub groups: Vec<DuplicateGroup>,
    pub unique_count: usize,
    pub total_count: usize,
}

impl DedupResult {
    pub fn duplicates_removed(&self) -> usize {
        self.groups.iter().map(|g| g.duplicate_ids.len()).sum()
    }

    pub fn stats(&self) -> DedupStats {
        let mut by_method = BTreeMap::new();
        for method in [
            DetectionMethod::ExactUrl,
            DetectionMethod::TitleSimilarity,
            DetectionMethod::SemanticSimilarity,
        ] {
            by_method.insert(method.as_str().to_string(), 0);
        }
        for group in &self.groups {
            *by_method
                .entry(group.detection_method.as_str().to_string())
                .or_insert(0) += 1;
        }

        let removed = self.duplicates_removed();
        DedupStats {
            total: self.total_count,
            unique: self.unique_count,
            groups: self.groups.len(),
            duplicates_removed: removed,
            deduplication_rate: if self.total_count > 0 {
                removed as f64 / self.total_count as f64
            } else {
                0.0
            },
            detection_methods: by_method,
        }
    }
}

/// Summary numbers for a dedup run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DedupStats {
    pub total: usize,
    pub unique: usize,
    pub groups: usize,
    pub duplicates_removed: usize,
    pub deduplication_rate: f64,
    /// Groups per detection method, keyed by the method's wire name.
    pub detection_methods: BTreeMap<String, usize>,
}

/// The three-tier duplicate detector.
pub struct Deduplicator {
    config: DedupConfig,
    model: Arc<dyn SimilarityModel>,
    fallback: FallbackNotice,
}

impl Deduplicator {
    pub fn new(config: DedupConfig, model: Arc<dyn SimilarityModel>) -> Self {
        Self {
            config,
            model,
            fallback: FallbackNotice::new(),
        }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Partition `records` into duplicate groups.
    ///
    /// Records sharing a `content_id` with an earlier record in the batch
    /// are ignored, so `total_count` counts distinct ids.
    pub fn find_duplicates(&self, records: &[ContentRecord], use_semantic: bool) -> DedupResult {
        let mut seen_ids = HashSet::new();
        let batch: Vec<&ContentRecord> = records
            .iter()
            .filter(|r| seen_ids.insert(r.content_id.as_str()))
            .collect();

        info!(records = batch.len(), use_semantic, "starting deduplication");

        let source_ids: Vec<Option<String>> = batch
            .iter()
            .map(|r| r.primary_url().and_then(normalize_source_id))
            .collect();
        let titles: Vec<String> = batch.iter().map(|r| normalize_title(r.title_or_empty())).collect();
        let embeddings = if use_semantic {
            self.embed_summaries(&batch)
        } else {
            None
        };

        let mut assigned = vec![false; batch.len()];
        let mut groups = Vec::new();

        for i in 0..batch.len() {
            if assigned[i] {
                continue;
            }

            let mut duplicate_ids = Vec::new();
            let mut scores = BTreeMap::new();
            let mut method = None;

            for j in (i + 1)..batch.len() {
                if assigned[j] {
                    continue;
                }

                let matched = self.compare(
                    (batch[i], &source_ids[i], &titles[i]),
                    (batch[j], &source_ids[j], &titles[j]),
                    use_semantic,
                    embeddings.as_ref().map(|e| (&e[i], &e[j])),
                );

                if let Some((score, m)) = matched {
                    debug!(
                        canonical = %batch[i].content_id,
                        duplicate = %batch[j].content_id,
                        method = %m,
                        score,
                        "duplicate found"
                    );
                    assigned[j] = true;
                    duplicate_ids.push(batch[j].content_id.clone());
                    scores.insert(batch[j].content_id.clone(), score);
                    method = Some(m);
                }
            }

            if let Some(detection_method) = method {
                assigned[i] = true;
                groups.push(DuplicateGroup {
                    group_id: group_id_for(&batch[i].content_id),
                    canonical_id: batch[i].content_id.clone(),
                    duplicate_ids,
                    similarity_scores: scores,
                    detection_method,
                    survivor_id: None,
                    created_at: Utc::now(),
                });
            }
        }

        let total_count = batch.len();
        let removed: usize = groups.iter().map(|g| g.duplicate_ids.len()).sum();
        info!(
            total = total_count,
            groups = groups.len(),
            removed,
            "deduplication complete"
        );

        DedupResult {
            groups,
            unique_count: total_count - removed,
            total_count,
        }
    }

    /// Run the cascade on one pair. Returns the score and the tier that matched.
    fn compare(
        &self,
        (a, a_source, a_title): (&ContentRecord, &Option<String>, &String),
        (b, b_source, b_title): (&ContentRecord, &Option<String>, &String),
        use_semantic: bool,
        embeddings: Option<(&Option<Vec<f32>>, &Option<Vec<f32>>)>,
    ) -> Option<(f64, DetectionMethod)> {
        if let (Some(x), Some(y)) = (a_source, b_source) {
            if x == y {
                return Some((1.0, DetectionMethod::ExactUrl));
            }
        }

        if !a_title.is_empty() && !b_title.is_empty() {
            let sim = title_similarity(a_title, b_title);
            if sim >= self.config.title_similarity_threshold {
                return Some((sim, DetectionMethod::TitleSimilarity));
            }
        }

        if !use_semantic {
            return None;
        }
        let (summary_a, summary_b) = match (non_empty(&a.summary), non_empty(&b.summary)) {
            (Some(x), Some(y)) => (x, y),
            _ => return None,
        };

        let sim = match embeddings {
            Some((Some(va), Some(vb))) => cosine_similarity(va, vb) as f64,
            _ => title_similarity(summary_a, summary_b),
        };
        if sim >= self.config.semantic_similarity_threshold {
            return Some((sim, DetectionMethod::SemanticSimilarity));
        }
        None
    }

    /// Embed every non-empty summary in one call. `None` means the model
    /// could not be used and the caller should fall back.
    fn embed_summaries(&self, batch: &[&ContentRecord]) -> Option<Vec<Option<Vec<f32>>>> {
        if !self.model.is_available() {
            self.fallback.warn_once(&format!(
                "embedding model '{}' unavailable; semantic dedup falls back to text similarity",
                self.model.name()
            ));
            return None;
        }

        let indexed: Vec<(usize, &str)> = batch
            .iter()
            .enumerate()
            .filter_map(|(idx, r)| non_empty(&r.summary).map(|s| (idx, s)))
            .collect();
        if indexed.is_empty() {
            return Some(vec![None; batch.len()]);
        }

        let texts: Vec<&str> = indexed.iter().map(|(_, s)| *s).collect();
        match self.model.embed(&texts) {
            Ok(vectors) if vectors.len() == texts.len() => {
                let mut out = vec![None; batch.len()];
                for ((idx, _), vector) in indexed.into_iter().zip(vectors) {
                    out[idx] = Some(vector);
                }
                Some(out)
            }
            Ok(vectors) => {
                self.fallback.warn_once(&format!(
                    "embedding model '{}' returned {} vectors for {} texts; falling back to text similarity",
                    self.model.name(),
                    vectors.len(),
                    texts.len()
                ));
                None
            }
            Err(e) => {
                self.fallback
                    .warn_once(&format!("{e}; semantic dedup falls back to text similarity"));
                None
            }
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Stable group id for a canonical record: `dup_` plus 8 hex digits.
pub fn group_id_for(canonical_id: &str) -> String {
    let digest = Sha256::digest(canonical_id.as_bytes());
    let hex = format!("{:x}", digest);
    format!("dup_{}", &hex[..8])
}

/// Extract the arXiv id from an arXiv or HuggingFace papers URL.
pub fn normalize_arxiv_id(url: &str) -> Option<String> {
    ARXIV_RE
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Normalize a URL to a canonical source identifier.
///
/// arXiv mirrors (`abs`, `pdf`, `export.`) and HuggingFace paper pages map
/// to `arxiv:<id>`; GitHub URLs map to `github:<owner>/<repo>`; anything
/// else is lowercased with scheme, `www.`, query, fragment, and trailing
/// slash removed.
pub fn normalize_source_id(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    if let Some(id) = normalize_arxiv_id(url) {
        return Some(format!("arxiv:{id}"));
    }

    if let Some(caps) = GITHUB_RE.captures(url) {
        let owner = caps[1].to_lowercase();
        let repo = caps[2].to_lowercase();
        let repo = repo.strip_suffix(".git").unwrap_or(&repo);
        return Some(format!("github:{owner}/{repo}"));
    }

    let lowered = url.to_lowercase();
    let without_scheme = lowered
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(&lowered);
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);
    let end = without_www.find(['?', '#']).unwrap_or(without_www.len());
    let stripped = without_www[..end].trim_end_matches('/');

    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

/// Pick the surviving record of `group`.
///
/// Pure: looks members up in `records` and never mutates anything.
/// `KeepHighestQuality` treats unevaluated records as `0.0` and prefers
/// the earlier member on ties. `Manual` returns `None` when the chosen id
/// is not a member.
pub fn merge<'a>(
    group: &DuplicateGroup,
    records: &'a [ContentRecord],
    strategy: &MergeStrategy,
) -> Option<&'a ContentRecord> {
    let by_id: HashMap<&str, &ContentRecord> =
        records.iter().map(|r| (r.content_id.as_str(), r)).collect();
    let members: Vec<&ContentRecord> = group
        .member_ids()
        .filter_map(|id| by_id.get(id).copied())
        .collect();

    match strategy {
        MergeStrategy::KeepFirst => by_id
            .get(group.canonical_id.as_str())
            .copied()
            .or_else(|| members.first().copied()),
        MergeStrategy::KeepHighestQuality => {
            let mut best: Option<&ContentRecord> = None;
            for record in members {
                let score = record.quality_score.unwrap_or(0.0);
                match best {
                    Some(current) if current.quality_score.unwrap_or(0.0) >= score => {}
                    _ => best = Some(record),
                }
            }
            best
        }
        MergeStrategy::Manual { survivor_id } => members
            .into_iter()
            .find(|r| &r.content_id == survivor_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;
    use crate::similarity::{ModelError, NoModel};

    fn paper(id: &str, title: &str, pdf_url: Option<&str>) -> ContentRecord {
        let mut r = ContentRecord::new(id, "2026-W03", ContentType::Paper);
        r.title = Some(title.to_string());
        r.pdf_url = pdf_url.map(str::to_string);
        r
    }

    fn dedup() -> Deduplicator {
        Deduplicator::new(DedupConfig::default(), Arc::new(NoModel))
    }

    /// Maps each text to a fixed vector by its first word.
    struct KeywordModel;

    impl SimilarityModel for KeywordModel {
        fn name(&self) -> &str {
            "keyword"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
            Ok(texts
                .iter()
                .map(|t| match t.split_whitespace().next() {
                    Some("graphs") => vec![1.0, 0.0],
                    Some("networks") => vec![0.99, 0.05],
                    _ => vec![0.0, 1.0],
                })
                .collect())
        }
    }

    struct BrokenModel;

    impl SimilarityModel for BrokenModel {
        fn name(&self) -> &str {
            "broken"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn embed(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
            Err(ModelError::Inference("onnx session crashed".into()))
        }
    }

    #[test]
    fn test_normalize_arxiv_id_variants() {
        for url in [
            "https://arxiv.org/abs/2601.03252",
            "https://arxiv.org/pdf/2601.03252.pdf",
            "http://export.arxiv.org/pdf/2601.03252v2",
            "https://huggingface.co/papers/2601.03252",
        ] {
            assert_eq!(normalize_arxiv_id(url).as_deref(), Some("2601.03252"), "{url}");
        }
        assert_eq!(normalize_arxiv_id("https://example.com/paper.pdf"), None);
    }

    #[test]
    fn test_normalize_source_id_github_and_generic() {
        assert_eq!(
            normalize_source_id("https://github.com/Rust-Lang/Rust.git").as_deref(),
            Some("github:rust-lang/rust")
        );
        assert_eq!(
            normalize_source_id("https://www.Example.com/post/1/?ref=feed").as_deref(),
            Some("example.com/post/1")
        );
        assert_eq!(normalize_source_id("   "), None);
    }

    #[test]
    fn test_exact_url_match_across_mirrors() {
        let a = paper("a", "Scaling laws for sparse experts", Some("https://arxiv.org/abs/2601.03252"));
        let b = paper("b", "Completely different wording here", Some("https://arxiv.org/pdf/2601.03252.pdf"));

        let result = dedup().find_duplicates(&[a, b], false);
        assert_eq!(result.groups.len(), 1);
        let group = &result.groups[0];
        assert_eq!(group.canonical_id, "a");
        assert_eq!(group.duplicate_ids, vec!["b".to_string()]);
        assert_eq!(group.detection_method, DetectionMethod::ExactUrl);
        assert_eq!(group.similarity_scores["b"], 1.0);
        assert_eq!(result.unique_count, 1);
        assert_eq!(result.total_count, 2);
    }

    #[test]
    fn test_title_match_ignores_case_and_punctuation() {
        let a = paper("a", "Attention Is All You Need", None);
        let b = paper("b", "attention is all you need!", None);
        let result = dedup().find_duplicates(&[a, b], false);
        assert_eq!(result.groups.len(), 1);
        assert_eq!(result.groups[0].detection_method, DetectionMethod::TitleSimilarity);
    }

    #[test]
    fn test_first_seen_wins_and_no_overlap() {
        let records = vec![
            paper("a", "Mixture of depths for efficient transformers", None),
            paper("b", "Unrelated work on protein folding", None),
            paper("c", "Mixture of Depths for Efficient Transformers", None),
            paper("d", "unrelated work on protein folding", None),
            paper("e", "mixture of depths for efficient transformers.", None),
        ];
        let result = dedup().find_duplicates(&records, false);

        assert_eq!(result.groups.len(), 2);
        assert_eq!(result.groups[0].canonical_id, "a");
        assert_eq!(result.groups[0].duplicate_ids, vec!["c", "e"]);
        assert_eq!(result.groups[1].canonical_id, "b");
        assert_eq!(result.groups[1].duplicate_ids, vec!["d"]);

        let mut members = HashSet::new();
        for group in &result.groups {
            assert!(!group.duplicate_ids.contains(&group.canonical_id));
            for id in group.member_ids() {
                assert!(members.insert(id.to_string()), "{id} in two groups");
            }
        }
        assert_eq!(
            result.unique_count + result.duplicates_removed(),
            result.total_count
        );
    }

    #[test]
    fn test_missing_fields_never_match() {
        let mut a = ContentRecord::new("a", "2026-W03", ContentType::Paper);
        a.title = None;
        let mut b = ContentRecord::new("b", "2026-W03", ContentType::Paper);
        b.title = Some("".into());
        let result = dedup().find_duplicates(&[a, b], true);
        assert!(result.groups.is_empty());
        assert_eq!(result.unique_count, 2);
    }

    #[test]
    fn test_repeated_ids_counted_once() {
        let a = paper("a", "Some title for a paper", None);
        let result = dedup().find_duplicates(&[a.clone(), a], false);
        assert!(result.groups.is_empty());
        assert_eq!(result.total_count, 1);
    }

    #[test]
    fn test_semantic_tier_with_model() {
        let mut a = paper("a", "Learning on graphs at scale", None);
        a.summary = Some("graphs are everywhere".into());
        let mut b = paper("b", "Scalable message passing", None);
        b.summary = Some("networks of nodes and edges".into());
        let mut c = paper("c", "Protein structure prediction", None);
        c.summary = Some("folding proteins".into());

        let d = Deduplicator::new(DedupConfig::default(), Arc::new(KeywordModel));
        let result = d.find_duplicates(&[a.clone(), b.clone(), c.clone()], true);
        assert_eq!(result.groups.len(), 1);
        assert_eq!(result.groups[0].duplicate_ids, vec!["b"]);
        assert_eq!(
            result.groups[0].detection_method,
            DetectionMethod::SemanticSimilarity
        );

        let without = d.find_duplicates(&[a, b, c], false);
        assert!(without.groups.is_empty());
    }

    #[test]
    fn test_semantic_tier_degrades_when_model_fails() {
        let mut a = paper("a", "First title about things", None);
        a.summary = Some("We study sparse attention for long documents.".into());
        let mut b = paper("b", "Second heading on stuff", None);
        b.summary = Some("We study sparse attention for long documents".into());

        let d = Deduplicator::new(DedupConfig::default(), Arc::new(BrokenModel));
        let result = d.find_duplicates(&[a, b], true);
        assert_eq!(result.groups.len(), 1);
        assert_eq!(
            result.groups[0].detection_method,
            DetectionMethod::SemanticSimilarity
        );
    }

    #[test]
    fn test_group_id_is_stable() {
        assert_eq!(group_id_for("2601.03252"), group_id_for("2601.03252"));
        assert!(group_id_for("x").starts_with("dup_"));
        assert_eq!(group_id_for("x").len(), 12);
    }

    #[test]
    fn test_merge_strategies() {
        let mut a = paper("a", "t1 long enough", None);
        a.quality_score = Some(70.0);
        let mut b = paper("b", "t2 long enough", None);
        b.quality_score = Some(85.0);
        let c = paper("c", "t3 long enough", None);
        let records = vec![a, b, c];

        let group = DuplicateGroup {
            group_id: group_id_for("a"),
            canonical_id: "a".into(),
            duplicate_ids: vec!["b".into(), "c".into()],
            similarity_scores: BTreeMap::new(),
            detection_method: DetectionMethod::TitleSimilarity,
            survivor_id: None,
            created_at: Utc::now(),
        };

        assert_eq!(
            merge(&group, &records, &MergeStrategy::KeepFirst).map(|r| r.content_id.as_str()),
            Some("a")
        );
        assert_eq!(
            merge(&group, &records, &MergeStrategy::KeepHighestQuality)
                .map(|r| r.content_id.as_str()),
            Some("b")
        );
        assert_eq!(
            merge(
                &group,
                &records,
                &MergeStrategy::Manual {
                    survivor_id: "c".into()
                }
            )
            .map(|r| r.content_id.as_str()),
            Some("c")
        );
        assert!(merge(
            &group,
            &records,
            &MergeStrategy::Manual {
                survivor_id: "zzz".into()
            }
        )
        .is_none());
    }

    #[test]
    fn test_stats() {
        let a = paper("a", "Attention Is All You Need", Some("https://arxiv.org/abs/1706.03762"));
        let b = paper("b", "Other", Some("https://arxiv.org/pdf/1706.03762"));
        let c = paper("c", "Diffusion beats GANs on image synthesis", None);
        let d = paper("d", "diffusion beats gans on image synthesis", None);
        let stats = dedup().find_duplicates(&[a, b, c, d], false).stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.unique, 2);
        assert_eq!(stats.groups, 2);
        assert_eq!(stats.duplicates_removed, 2);
        assert!((stats.deduplication_rate - 0.5).abs() < 1e-9);
        assert_eq!(stats.detection_methods["exact_url"], 1);
        assert_eq!(stats.detection_methods["title_similarity"], 1);
        assert_eq!(stats.detection_methods["semantic_similarity"], 0);
    }
}
