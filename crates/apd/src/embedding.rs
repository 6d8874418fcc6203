//! Sentence-embedding backends for semantic dedup and similar-content
//! recommendation.
//!
//! | Config Value | Model |
//! |--------------|-------|
//! | `"disabled"` | [`NoModel`] (title-similarity fallback everywhere) |
//! | `"local"`    | [`FastEmbedModel`] (requires the `local-embeddings` feature) |
//!
//! The local model is loaded on first use, not at startup, so commands that
//! never compare summaries never pay for the download. A load failure is
//! remembered: the model reports itself unavailable from then on and callers
//! fall back to title similarity.

use std::sync::Arc;

use anyhow::{bail, Result};

use apd_core::similarity::{NoModel, SimilarityModel};

use crate::config::EmbeddingConfig;

/// Model names accepted by `embedding.model`.
pub const SUPPORTED_MODELS: &[&str] = &[
    "all-minilm-l6-v2",
    "bge-small-en-v1.5",
    "bge-base-en-v1.5",
    "multilingual-e5-small",
];

/// Build the configured similarity model.
pub fn create_model(config: &EmbeddingConfig) -> Result<Arc<dyn SimilarityModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(NoModel)),
        "local" => local_model(config),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(feature = "local-embeddings")]
fn local_model(config: &EmbeddingConfig) -> Result<Arc<dyn SimilarityModel>> {
    Ok(Arc::new(FastEmbedModel::new(config)?))
}

#[cfg(not(feature = "local-embeddings"))]
fn local_model(_config: &EmbeddingConfig) -> Result<Arc<dyn SimilarityModel>> {
    bail!("Local embedding provider requires the local-embeddings feature")
}

#[cfg(feature = "local-embeddings")]
pub use local::FastEmbedModel;

#[cfg(feature = "local-embeddings")]
mod local {
    use std::sync::Mutex;

    use anyhow::{bail, Result};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use tracing::{info, warn};

    use apd_core::similarity::{ModelError, SimilarityModel};

    use crate::config::EmbeddingConfig;

    fn model_for_name(name: &str) -> Result<EmbeddingModel> {
        match name {
            "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
            "multilingual-e5-small" => Ok(EmbeddingModel::MultilingualE5Small),
            other => bail!(
                "Unknown local embedding model: '{}'. Supported models: {}",
                other,
                super::SUPPORTED_MODELS.join(", ")
            ),
        }
    }

    enum LoadState {
        NotLoaded,
        Ready(Box<TextEmbedding>),
        Failed(String),
    }

    /// In-process fastembed model, loaded lazily.
    pub struct FastEmbedModel {
        name: String,
        model: EmbeddingModel,
        batch_size: usize,
        state: Mutex<LoadState>,
    }

    impl FastEmbedModel {
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            Ok(Self {
                name: config.model.clone(),
                model: model_for_name(&config.model)?,
                batch_size: config.batch_size,
                state: Mutex::new(LoadState::NotLoaded),
            })
        }
    }

    impl SimilarityModel for FastEmbedModel {
        fn name(&self) -> &str {
            &self.name
        }

        fn is_available(&self) -> bool {
            match self.state.lock() {
                Ok(state) => !matches!(*state, LoadState::Failed(_)),
                Err(_) => false,
            }
        }

        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
            let mut state = self
                .state
                .lock()
                .map_err(|_| ModelError::Unavailable("model lock poisoned".into()))?;

            if let LoadState::NotLoaded = *state {
                info!(model = %self.name, "loading embedding model");
                *state = match TextEmbedding::try_new(
                    InitOptions::new(self.model.clone()).with_show_download_progress(true),
                ) {
                    Ok(model) => LoadState::Ready(Box::new(model)),
                    Err(e) => {
                        warn!(model = %self.name, error = %e, "embedding model failed to load");
                        LoadState::Failed(e.to_string())
                    }
                };
            }

            match &mut *state {
                LoadState::Ready(model) => model
                    .embed(texts.to_vec(), Some(self.batch_size))
                    .map_err(|e| ModelError::Inference(e.to_string())),
                LoadState::Failed(reason) => Err(ModelError::Unavailable(reason.clone())),
                LoadState::NotLoaded => Err(ModelError::Unavailable("model not loaded".into())),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_unknown_model_name_rejected() {
            let config = EmbeddingConfig {
                provider: "local".to_string(),
                model: "gpt-embed".to_string(),
                batch_size: 8,
            };
            let err = FastEmbedModel::new(&config).err().unwrap().to_string();
            assert!(err.contains("Unknown local embedding model"), "{err}");
        }

        #[test]
        fn test_model_is_available_before_first_load() {
            let model = FastEmbedModel::new(&EmbeddingConfig::default()).unwrap();
            assert_eq!(model.name(), "all-minilm-l6-v2");
            assert!(model.is_available());
        }
    }
}
