//! Versioned schema migrations.
//!
//! The schema grew column by column as new content types and the quality,
//! dedup, and recommendation layers were added. Each step is a numbered
//! [`Migration`]; applied versions are recorded in `schema_migrations` and
//! pending ones run in order, each inside its own transaction.
//!
//! Timestamps are stored as RFC 3339 text with microsecond precision so they
//! sort lexicographically. Lists and maps are stored as JSON text.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db;

/// One schema step.
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "content",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS content (
                content_id TEXT PRIMARY KEY,
                period_id TEXT NOT NULL,
                content_type TEXT NOT NULL DEFAULT 'PAPER',
                title TEXT,
                summary TEXT,
                source_url TEXT,
                hf_url TEXT,
                pdf_url TEXT,
                pdf_path TEXT,
                video_path TEXT,
                status TEXT NOT NULL DEFAULT 'NEW',
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_content_period ON content(period_id)",
            "CREATE INDEX IF NOT EXISTS idx_content_status ON content(status)",
        ],
    },
    Migration {
        version: 2,
        name: "repository_and_news_fields",
        statements: &[
            "ALTER TABLE content ADD COLUMN github_stars INTEGER",
            "ALTER TABLE content ADD COLUMN github_language TEXT",
            "ALTER TABLE content ADD COLUMN github_description TEXT",
            "ALTER TABLE content ADD COLUMN news_source TEXT",
            "ALTER TABLE content ADD COLUMN news_rank INTEGER",
        ],
    },
    Migration {
        version: 3,
        name: "quality_fields",
        statements: &[
            "ALTER TABLE content ADD COLUMN quality_score REAL",
            "ALTER TABLE content ADD COLUMN citation_score REAL",
            "ALTER TABLE content ADD COLUMN venue_score REAL",
            "ALTER TABLE content ADD COLUMN recency_score REAL",
            "ALTER TABLE content ADD COLUMN quality_reasons TEXT NOT NULL DEFAULT '[]'",
            "ALTER TABLE content ADD COLUMN filtered_out INTEGER NOT NULL DEFAULT 0",
            "ALTER TABLE content ADD COLUMN filter_reason TEXT",
            "ALTER TABLE content ADD COLUMN evaluated_at TEXT",
            "CREATE INDEX IF NOT EXISTS idx_content_quality ON content(quality_score DESC)",
        ],
    },
    Migration {
        version: 4,
        name: "duplicate_groups",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS duplicate_groups (
                group_id TEXT PRIMARY KEY,
                canonical_id TEXT NOT NULL,
                duplicate_ids TEXT NOT NULL,
                similarity_scores TEXT NOT NULL,
                detection_method TEXT NOT NULL,
                survivor_id TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            "ALTER TABLE content ADD COLUMN merged_into TEXT",
            "ALTER TABLE content ADD COLUMN title_hash TEXT",
            "CREATE INDEX IF NOT EXISTS idx_content_title_hash ON content(title_hash)",
        ],
    },
    Migration {
        version: 5,
        name: "interactions_and_recommendations",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS user_interactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                content_id TEXT NOT NULL,
                action_type TEXT NOT NULL,
                weight REAL NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_interactions_user ON user_interactions(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_interactions_content ON user_interactions(content_id)",
            r#"
            CREATE TABLE IF NOT EXISTS recommendations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                content_id TEXT NOT NULL,
                strategy TEXT NOT NULL,
                score REAL NOT NULL,
                reasons TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        ],
    },
    Migration {
        version: 6,
        name: "error_stage",
        statements: &["ALTER TABLE content ADD COLUMN error_stage TEXT"],
    },
];

/// Connect, apply pending migrations, and close the pool.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_migrations(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply every migration newer than the recorded schema version.
/// Returns how many were applied.
pub async fn apply_migrations(pool: &SqlitePool) -> Result<usize> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current = schema_version(pool).await?;
    let mut applied = 0;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let mut tx = pool.begin().await?;
        for statement in migration.statements {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .with_context(|| {
                    format!(
                        "migration {} ({}) failed",
                        migration.version, migration.name
                    )
                })?;
        }
        sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(version = migration.version, name = migration.name, "applied migration");
        applied += 1;
    }

    Ok(applied)
}

/// Highest applied migration version, or 0 for a fresh database.
pub async fn schema_version(pool: &SqlitePool) -> Result<i64> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Latest version this build knows about.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}
