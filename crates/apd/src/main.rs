//! # Auto Paper Digest CLI (`apd`)
//!
//! ## Usage
//!
//! ```bash
//! apd --config ./config/apd.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `apd init` | Create the SQLite database and run schema migrations |
//! | `apd ingest <file.jsonl>` | Upsert and score fetcher output |
//! | `apd status` | Records per pipeline status |
//! | `apd show <id>` | Full detail of one record |
//! | `apd find "<title>"` | Exact title lookup, ignoring case and punctuation |
//! | `apd list` | List records with quality and status filters |
//! | `apd advance <id> <status>` | Move a record through the pipeline |
//! | `apd ready <status>` | Records waiting for a stage |
//! | `apd retry` | Reset errored records for another attempt |
//! | `apd evaluate` | Score records with the quality filter |
//! | `apd dedup` | Detect and persist duplicate groups |
//! | `apd merge` | Pick survivors for pending duplicate groups |
//! | `apd recommend <strategy>` | Popular, similar, collaborative, or hybrid picks |
//! | `apd track <id> <action>` | Record a user interaction |
//! | `apd stats` | Database overview |

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use apd::config;
use apd::curate;
use apd::ingest;
use apd::logging;
use apd::migrate;
use apd::recommend_cmd::{self, RecommendOptions, Strategy};
use apd::stats;
use apd::status::{self, ListOptions};
use apd_core::models::{ActionType, ContentType, MergeStrategy, Status};
use apd_core::store::ListOrder;

/// Auto Paper Digest: quality and redundancy control for harvested content.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/apd.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "apd",
    about = "Auto Paper Digest: track, score, deduplicate, and recommend harvested papers, repositories, and news",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/apd.toml")]
    config: PathBuf,

    /// Verbose logging (overrides RUST_LOG).
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Order {
    Updated,
    Quality,
    Id,
    Created,
}

impl From<Order> for ListOrder {
    fn from(order: Order) -> Self {
        match order {
            Order::Updated => ListOrder::RecentlyUpdated,
            Order::Quality => ListOrder::QualityDesc,
            Order::Id => ListOrder::ContentId,
            Order::Created => ListOrder::Created,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: only pending migrations are applied.
    Init,

    /// Upsert and score records from a JSONL file (one record per line).
    Ingest {
        /// Path to the fetcher output.
        file: PathBuf,
    },

    /// Show how many records sit at each pipeline status.
    Status {
        /// Period key: `YYYY-MM-DD` or `YYYY-Www`.
        #[arg(long)]
        period: Option<String>,
    },

    /// Print one record in full.
    Show {
        content_id: String,
    },

    /// Find records whose title matches, ignoring case and punctuation.
    Find {
        title: String,
    },

    /// List records.
    List {
        #[arg(long)]
        period: Option<String>,

        /// Only records at this status (NEW, PDF_OK, NBLM_OK, VIDEO_OK, ERROR).
        #[arg(long)]
        status: Option<Status>,

        /// Only this content type (PAPER, REPOSITORY, NEWS).
        #[arg(long = "type")]
        content_type: Option<ContentType>,

        /// Only records scored at or above this value.
        #[arg(long)]
        min_quality: Option<f64>,

        /// Hide records rejected by the quality filter.
        #[arg(long)]
        exclude_filtered: bool,

        /// Hide records merged into another.
        #[arg(long)]
        exclude_merged: bool,

        #[arg(long, value_enum, default_value = "updated")]
        order: Order,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Move a record to a new status. Regressions are rejected.
    Advance {
        content_id: String,
        status: Status,

        /// Error message to record (usually with status ERROR).
        #[arg(long)]
        error: Option<String>,

        /// Count this move as a retry.
        #[arg(long)]
        increment_retry: bool,
    },

    /// List records waiting for `target`, below the retry limit.
    Ready {
        target: Status,

        #[arg(long)]
        period: Option<String>,
    },

    /// Reset errored records to the stage they failed from.
    Retry {
        #[arg(long)]
        period: Option<String>,
    },

    /// Score records with the quality filter.
    Evaluate {
        #[arg(long)]
        period: Option<String>,

        /// Re-score records that already have a score.
        #[arg(long)]
        all: bool,
    },

    /// Detect duplicate groups and store them.
    Dedup {
        #[arg(long)]
        period: Option<String>,

        /// Skip the embedding tier.
        #[arg(long)]
        no_semantic: bool,

        /// Resolve the new groups with the configured merge strategy.
        #[arg(long)]
        merge: bool,
    },

    /// Choose survivors for pending duplicate groups.
    Merge {
        /// `keep_first`, `keep_highest_quality`, or `manual:<content_id>`.
        #[arg(long)]
        strategy: Option<MergeStrategy>,
    },

    /// Recommend content.
    Recommend {
        #[arg(value_enum)]
        strategy: Strategy,

        /// User to recommend for (defaults to `recommend.default_user`).
        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        period: Option<String>,

        /// Reference record for the similar strategy.
        #[arg(long)]
        content_id: Option<String>,

        #[arg(long, default_value = "10")]
        limit: usize,

        /// Popular strategy only: drop records the user already interacted with.
        #[arg(long)]
        exclude_seen: bool,

        /// Similar strategy only: override the similarity threshold.
        #[arg(long)]
        min_similarity: Option<f64>,

        /// Append the results to the recommendation log.
        #[arg(long)]
        log: bool,
    },

    /// Record a user interaction (view, favorite, share, download).
    Track {
        content_id: String,
        action: ActionType,

        #[arg(long)]
        user: Option<String>,

        /// Override the action's default weight.
        #[arg(long)]
        weight: Option<f64>,
    },

    /// Show database statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.debug);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { file } => {
            ingest::run_ingest(&cfg, &file).await?;
        }
        Commands::Status { period } => {
            status::run_status(&cfg, period.as_deref()).await?;
        }
        Commands::Show { content_id } => {
            status::run_show(&cfg, &content_id).await?;
        }
        Commands::Find { title } => {
            status::run_find(&cfg, &title).await?;
        }
        Commands::List {
            period,
            status,
            content_type,
            min_quality,
            exclude_filtered,
            exclude_merged,
            order,
            limit,
        } => {
            let options = ListOptions {
                period,
                status,
                content_type,
                min_quality,
                exclude_filtered,
                exclude_merged,
                order: order.into(),
                limit,
            };
            status::run_list(&cfg, &options).await?;
        }
        Commands::Advance {
            content_id,
            status,
            error,
            increment_retry,
        } => {
            status::run_advance(&cfg, &content_id, status, error.as_deref(), increment_retry)
                .await?;
        }
        Commands::Ready { target, period } => {
            status::run_ready(&cfg, period.as_deref(), target).await?;
        }
        Commands::Retry { period } => {
            status::run_retry(&cfg, period.as_deref()).await?;
        }
        Commands::Evaluate { period, all } => {
            curate::run_evaluate(&cfg, period.as_deref(), all).await?;
        }
        Commands::Dedup {
            period,
            no_semantic,
            merge,
        } => {
            curate::run_dedup(&cfg, period.as_deref(), !no_semantic, merge).await?;
        }
        Commands::Merge { strategy } => {
            curate::run_merge(&cfg, strategy).await?;
        }
        Commands::Recommend {
            strategy,
            user,
            period,
            content_id,
            limit,
            exclude_seen,
            min_similarity,
            log,
        } => {
            let options = RecommendOptions {
                strategy,
                user,
                period,
                content_id,
                limit,
                exclude_seen,
                min_similarity,
                log,
            };
            recommend_cmd::run_recommend(&cfg, &options).await?;
        }
        Commands::Track {
            content_id,
            action,
            user,
            weight,
        } => {
            recommend_cmd::run_track(&cfg, user.as_deref(), &content_id, action, weight).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
