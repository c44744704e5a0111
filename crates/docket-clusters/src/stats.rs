//! Database statistics.
//!
//! Summarises what has been imported: corpora per docket with their
//! document, similarity and phrase counts. Used by `dkc stats` to confirm
//! an import landed where expected.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::config::Config;
use crate::db;

#[derive(Debug, Serialize, PartialEq)]
pub struct CorpusStats {
    pub corpus_id: i64,
    pub docket_id: String,
    pub method: String,
    pub documents: i64,
    pub similarities: i64,
    pub phrases: i64,
    pub imported_at: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DatabaseStats {
    pub database: String,
    pub size: String,
    pub corpora: i64,
    pub documents: i64,
    pub similarities: i64,
    pub phrases: i64,
    pub by_corpus: Vec<CorpusStats>,
}

/// Gather counts for the database at `db_path`.
pub async fn collect_stats(pool: &SqlitePool, db_path: &Path) -> Result<DatabaseStats> {
    let corpora: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM corpora")
        .fetch_one(pool)
        .await?;
    let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;
    let similarities: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM similarities")
        .fetch_one(pool)
        .await?;
    let phrases: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM phrases")
        .fetch_one(pool)
        .await?;

    // Correlated counts keep the three one-to-many joins from multiplying.
    let rows = sqlx::query(
        r#"
        SELECT
            c.id, c.docket_id, c.method, c.created_at,
            (SELECT COUNT(*) FROM documents d WHERE d.corpus_id = c.id) AS doc_count,
            (SELECT COUNT(*) FROM similarities s WHERE s.corpus_id = c.id) AS sim_count,
            (SELECT COUNT(*) FROM phrases p WHERE p.corpus_id = c.id) AS phrase_count
        FROM corpora c
        ORDER BY c.docket_id, c.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut by_corpus = Vec::with_capacity(rows.len());
    for row in &rows {
        let created_at: i64 = row.try_get("created_at")?;
        by_corpus.push(CorpusStats {
            corpus_id: row.try_get("id")?,
            docket_id: row.try_get("docket_id")?,
            method: row.try_get("method")?,
            documents: row.try_get("doc_count")?,
            similarities: row.try_get("sim_count")?,
            phrases: row.try_get("phrase_count")?,
            imported_at: format_ts_iso(created_at),
        });
    }

    let db_size = std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);

    Ok(DatabaseStats {
        database: db_path.display().to_string(),
        size: format_bytes(db_size),
        corpora,
        documents,
        similarities,
        phrases,
        by_corpus,
    })
}

/// Run the stats command: query the database and print a JSON summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = collect_stats(&pool, &config.db.path).await?;
    pool.close().await;

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
