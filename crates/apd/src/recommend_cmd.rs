//! `apd recommend` and `apd track`.

use anyhow::{bail, Result};

use apd_core::models::{ActionType, RecommendationResult};
use apd_core::recommend::Recommender;

use crate::config::Config;
use crate::embedding;
use crate::sqlite_store::SqliteStore;

/// Which recommendation strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Strategy {
    Popular,
    Similar,
    Collaborative,
    Hybrid,
}

#[derive(Debug, Clone)]
pub struct RecommendOptions {
    pub strategy: Strategy,
    pub user: Option<String>,
    pub period: Option<String>,
    pub content_id: Option<String>,
    pub limit: usize,
    pub exclude_seen: bool,
    pub min_similarity: Option<f64>,
    /// Append the results to the recommendation log.
    pub log: bool,
}

pub async fn run_recommend(config: &Config, options: &RecommendOptions) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let model = embedding::create_model(&config.embedding)?;
    let user = options
        .user
        .as_deref()
        .unwrap_or(&config.recommend.default_user);
    let recommender = Recommender::new(&store, model, config.recommend.clone(), user);
    let period = options.period.as_deref();

    let results = match options.strategy {
        Strategy::Popular => {
            recommender
                .recommend_popular(period, options.limit, options.exclude_seen)
                .await?
        }
        Strategy::Similar => {
            let Some(content_id) = options.content_id.as_deref() else {
                bail!("--content-id is required for the similar strategy");
            };
            recommender
                .recommend_similar(content_id, options.limit, options.min_similarity)
                .await?
        }
        Strategy::Collaborative => recommender.recommend_collaborative(options.limit).await?,
        Strategy::Hybrid => recommender.recommend_hybrid(period, options.limit).await?,
    };

    if options.log {
        for result in &results {
            recommender.save_recommendation(result).await?;
        }
    }

    print_results(&results);
    Ok(())
}

pub async fn run_track(
    config: &Config,
    user: Option<&str>,
    content_id: &str,
    action: ActionType,
    weight: Option<f64>,
) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let model = embedding::create_model(&config.embedding)?;
    let user = user.unwrap_or(&config.recommend.default_user);
    let recommender = Recommender::new(&store, model, config.recommend.clone(), user);

    let interaction = recommender
        .track_interaction(content_id, action, weight)
        .await?;
    println!(
        "{} {} {} (weight {})",
        interaction.user_id, interaction.action_type, interaction.content_id, interaction.weight
    );
    Ok(())
}

fn print_results(results: &[RecommendationResult]) {
    if results.is_empty() {
        println!("No recommendations.");
        return;
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} ({})",
            i + 1,
            result.score,
            result.title,
            result.strategy
        );
        println!("    id: {}", result.content_id);
        for reason in &result.reasons {
            println!("    - {}", reason);
        }
    }
}
