//! Configuration parsing and validation.
//!
//! Auto Paper Digest is configured via a TOML file (default:
//! `config/apd.toml`). Only `[db]` is required; every other section falls
//! back to its defaults.
//!
//! # Example Configuration
//!
//! ```toml
//! [db]
//! path = "./data/apd.sqlite"
//!
//! [quality]
//! min_quality_score = 60.0
//! min_github_stars = 100
//!
//! [quality.source_weights]
//! zhihu = 0.9
//!
//! [dedup]
//! title_similarity_threshold = 0.85
//! semantic_similarity_threshold = 0.90
//! merge_strategy = "keep_first"
//!
//! [recommend]
//! new_user_threshold = 5
//! active_user_threshold = 20
//!
//! [pipeline]
//! max_retries = 3
//!
//! [embedding]
//! provider = "local"            # "disabled" | "local"
//! model = "all-minilm-l6-v2"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use apd_core::dedup::DedupConfig;
use apd_core::models::MergeStrategy;
use apd_core::quality::QualityConfig;
use apd_core::recommend::RecommendConfig;

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub recommend: RecommendConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

fn default_max_retries() -> i64 {
    3
}

/// Embedding provider configuration.
///
/// `local` runs a sentence-embedding model in-process via fastembed; the
/// model files are downloaded on first use. `disabled` makes semantic
/// dedup and similar-content recommendation fall back to title similarity.
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_batch_size() -> usize {
    64
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Config {
    /// Default settings around a database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            quality: QualityConfig::default(),
            dedup: DedupConfig::default(),
            recommend: RecommendConfig::default(),
            pipeline: PipelineConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }

    /// The configured default merge strategy.
    pub fn merge_strategy(&self) -> Result<MergeStrategy> {
        self.dedup
            .merge_strategy
            .parse()
            .with_context(|| "dedup.merge_strategy is invalid")
    }

    pub fn validate(&self) -> Result<()> {
        self.quality.validate()?;
        self.recommend.validate()?;

        let d = &self.dedup;
        if !(0.0..=1.0).contains(&d.title_similarity_threshold) {
            bail!("dedup.title_similarity_threshold must be in [0.0, 1.0]");
        }
        if !(0.0..=1.0).contains(&d.semantic_similarity_threshold) {
            bail!("dedup.semantic_similarity_threshold must be in [0.0, 1.0]");
        }
        match self.merge_strategy()? {
            MergeStrategy::Manual { .. } => {
                bail!("dedup.merge_strategy must be keep_first or keep_highest_quality")
            }
            MergeStrategy::KeepFirst | MergeStrategy::KeepHighestQuality => {}
        }

        if self.pipeline.max_retries < 1 {
            bail!("pipeline.max_retries must be >= 1");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "local" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled or local.",
                other
            ),
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}
