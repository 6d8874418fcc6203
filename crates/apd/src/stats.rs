//! Database statistics.
//!
//! `apd stats` gives a one-screen view of what the store holds: records per
//! content type, how many passed the quality filter, duplicate groups and
//! merges, and interaction volume.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// Per-type breakdown of record and quality counts.
struct TypeStats {
    content_type: String,
    total: i64,
    evaluated: i64,
    passed: i64,
    avg_score: Option<f64>,
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let pool = store.pool();

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content")
        .fetch_one(pool)
        .await?;
    let merged: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM content WHERE merged_into IS NOT NULL")
            .fetch_one(pool)
            .await?;
    let groups: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM duplicate_groups")
        .fetch_one(pool)
        .await?;
    let resolved: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM duplicate_groups WHERE survivor_id IS NOT NULL")
            .fetch_one(pool)
            .await?;
    let interactions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_interactions")
        .fetch_one(pool)
        .await?;
    let users: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT user_id) FROM user_interactions")
        .fetch_one(pool)
        .await?;
    let recommendations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recommendations")
        .fetch_one(pool)
        .await?;
    let version = migrate::schema_version(pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Auto Paper Digest - Database Stats");
    println!("==================================");
    println!();
    println!("  Database:        {}", config.db.path.display());
    println!("  Size:            {}", format_bytes(db_size));
    println!("  Schema version:  {}", version);
    println!();
    println!("  Records:         {}", total);
    println!("  Merged away:     {}", merged);
    println!("  Dup groups:      {} ({} resolved)", groups, resolved);
    println!("  Interactions:    {} from {} user(s)", interactions, users);
    println!("  Recommendations: {}", recommendations);

    let rows = sqlx::query(
        r#"
        SELECT
            content_type,
            COUNT(*) AS total,
            COUNT(evaluated_at) AS evaluated,
            SUM(CASE WHEN evaluated_at IS NOT NULL AND filtered_out = 0 THEN 1 ELSE 0 END) AS passed,
            AVG(quality_score) AS avg_score
        FROM content
        GROUP BY content_type
        ORDER BY total DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let type_stats: Vec<TypeStats> = rows
        .iter()
        .map(|row| TypeStats {
            content_type: row.get("content_type"),
            total: row.get("total"),
            evaluated: row.get("evaluated"),
            passed: row.get("passed"),
            avg_score: row.get("avg_score"),
        })
        .collect();

    if !type_stats.is_empty() {
        println!();
        println!("  By type:");
        println!(
            "  {:<12} {:>7} {:>10} {:>7} {:>10}",
            "TYPE", "TOTAL", "EVALUATED", "PASSED", "AVG SCORE"
        );
        println!("  {}", "-".repeat(50));
        for s in &type_stats {
            let avg = s
                .avg_score
                .map(|a| format!("{:.1}", a))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<12} {:>7} {:>10} {:>7} {:>10}",
                s.content_type, s.total, s.evaluated, s.passed, avg
            );
        }
    }

    println!();
    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
