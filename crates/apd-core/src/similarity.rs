//! Similarity primitives shared by the deduplicator and the recommender.
//!
//! Defines the [`SimilarityModel`] capability that embedding backends
//! implement, a [`NoModel`] stand-in for when no backend is configured, and
//! the pure syntactic helpers ([`normalize_title`], [`title_similarity`],
//! [`cosine_similarity`]) used directly and as the fallback when no model
//! is available.
//!
//! Concrete model implementations (fastembed) live in the `apd` app crate.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Weight of the edit-distance ratio in [`title_similarity`].
pub const EDIT_RATIO_WEIGHT: f64 = 0.6;
/// Weight of the word-set Jaccard ratio in [`title_similarity`].
pub const JACCARD_WEIGHT: f64 = 0.4;

/// Why an embedding could not be produced.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("embedding model unavailable: {0}")]
    Unavailable(String),
    #[error("embedding inference failed: {0}")]
    Inference(String),
}

/// A sentence-embedding backend.
///
/// Implementations are created by the application and injected into the
/// [`Deduplicator`](crate::dedup::Deduplicator) and
/// [`Recommender`](crate::recommend::Recommender). Callers must treat any
/// error as a signal to fall back to [`title_similarity`], never as fatal.
pub trait SimilarityModel: Send + Sync {
    /// Model identifier, for logs.
    fn name(&self) -> &str;

    /// Whether [`embed`](SimilarityModel::embed) can be expected to succeed.
    fn is_available(&self) -> bool;

    /// Embed each text. The result has one vector per input, in order.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError>;
}

/// The no-model variant: always unavailable, so callers use the syntactic
/// fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoModel;

impl SimilarityModel for NoModel {
    fn name(&self) -> &str {
        "none"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn embed(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        Err(ModelError::Unavailable("no embedding model configured".into()))
    }
}

/// Emits a degradation warning at most once per owner.
#[derive(Debug, Default)]
pub struct FallbackNotice {
    warned: AtomicBool,
}

impl FallbackNotice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log `message` as a warning the first time this is called.
    /// Returns whether the warning was emitted.
    pub fn warn_once(&self, message: &str) -> bool {
        if self.warned.swap(true, Ordering::Relaxed) {
            return false;
        }
        tracing::warn!("{}", message);
        true
    }
}

/// Lowercase, replace anything outside `[a-z0-9]` and whitespace with a
/// space, then collapse runs of whitespace.
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Combined title similarity in `[0.0, 1.0]`.
///
/// Identical normalized titles score exactly `1.0`. Otherwise the score is
/// `0.6 * edit_ratio + 0.4 * jaccard(words)`; if either title has no words
/// the edit ratio alone is returned.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_title(a);
    let b = normalize_title(b);

    if a == b {
        return 1.0;
    }

    let edit_ratio = strsim::normalized_levenshtein(&a, &b);

    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();
    if words_a.is_empty() || words_b.is_empty() {
        return edit_ratio;
    }

    let intersection = words_a.intersection(&words_b).count() as f64;
    let union = words_a.union(&words_b).count() as f64;
    let jaccard = intersection / union;

    EDIT_RATIO_WEIGHT * edit_ratio + JACCARD_WEIGHT * jaccard
}

/// SHA-256 of the normalized title, as lowercase hex.
pub fn title_hash(title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_title(title).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title() {
        assert_eq!(
            normalize_title("  Attention: Is ALL you-need!  "),
            "attention is all you need"
        );
        assert_eq!(normalize_title("???"), "");
    }

    #[test]
    fn test_title_similarity_case_insensitive_match() {
        let sim = title_similarity("Attention Is All You Need", "attention is all you need");
        assert_eq!(sim, 1.0);
    }

    #[test]
    fn test_title_similarity_punctuation_only_difference() {
        let sim = title_similarity("BERT: Pre-training", "bert pre training");
        assert_eq!(sim, 1.0);
    }

    #[test]
    fn test_title_similarity_prefixed_title_below_threshold() {
        let sim = title_similarity(
            "Attention Is All You Need",
            "Transformer: Attention Is All You Need",
        );
        assert!(sim > 0.7 && sim < 0.85, "got {sim}");
    }

    #[test]
    fn test_title_similarity_unrelated() {
        let sim = title_similarity("Diffusion models beat GANs", "A survey of graph databases");
        assert!(sim < 0.5, "got {sim}");
    }

    #[test]
    fn test_title_similarity_empty_side_uses_edit_ratio() {
        assert_eq!(title_similarity("", "something"), 0.0);
        assert_eq!(title_similarity("", ""), 1.0);
    }

    #[test]
    fn test_title_hash_ignores_formatting() {
        assert_eq!(title_hash("Deep Learning!"), title_hash("deep   learning"));
        assert_ne!(title_hash("Deep Learning"), title_hash("Shallow Learning"));
        assert_eq!(title_hash("x").len(), 64);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_or_empty() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_no_model_is_unavailable() {
        let model = NoModel;
        assert!(!model.is_available());
        assert!(model.embed(&["text"]).is_err());
    }

    #[test]
    fn test_fallback_notice_fires_once() {
        let notice = FallbackNotice::new();
        assert!(notice.warn_once("first"));
        assert!(!notice.warn_once("second"));
    }
}
