//! Database schema migrations (idempotent).
//!
//! | Table | Contents |
//! |-------|----------|
//! | `corpora` | One row per analysed docket/extraction method |
//! | `documents` | Document text and display metadata, per corpus |
//! | `similarities` | Pairwise scores, `low_document_id < high_document_id` |
//! | `phrases` | Recurring phrases mined upstream, per corpus |
//! | `phrase_occurrences` | Character ranges of each phrase per document |

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS corpora (
        id INTEGER PRIMARY KEY,
        docket_id TEXT NOT NULL,
        method TEXT NOT NULL DEFAULT 'other',
        metadata_json TEXT NOT NULL DEFAULT '{}',
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        corpus_id INTEGER NOT NULL,
        document_id INTEGER NOT NULL,
        text TEXT NOT NULL,
        title TEXT,
        submitter_name TEXT,
        submitter_organization TEXT,
        PRIMARY KEY (corpus_id, document_id),
        FOREIGN KEY (corpus_id) REFERENCES corpora(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS similarities (
        corpus_id INTEGER NOT NULL,
        low_document_id INTEGER NOT NULL,
        high_document_id INTEGER NOT NULL,
        similarity REAL NOT NULL CHECK (similarity >= 0.0 AND similarity <= 1.0),
        PRIMARY KEY (corpus_id, low_document_id, high_document_id),
        CHECK (low_document_id < high_document_id),
        FOREIGN KEY (corpus_id) REFERENCES corpora(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS phrases (
        id INTEGER PRIMARY KEY,
        corpus_id INTEGER NOT NULL,
        text TEXT NOT NULL,
        FOREIGN KEY (corpus_id) REFERENCES corpora(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS phrase_occurrences (
        phrase_id INTEGER NOT NULL,
        document_id INTEGER NOT NULL,
        start_offset INTEGER NOT NULL,
        end_offset INTEGER NOT NULL,
        CHECK (start_offset >= 0 AND start_offset <= end_offset),
        FOREIGN KEY (phrase_id) REFERENCES phrases(id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_corpora_docket ON corpora(docket_id)",
    "CREATE INDEX IF NOT EXISTS idx_similarities_score ON similarities(corpus_id, similarity)",
    "CREATE INDEX IF NOT EXISTS idx_similarities_high ON similarities(corpus_id, high_document_id)",
    "CREATE INDEX IF NOT EXISTS idx_phrases_corpus ON phrases(corpus_id)",
    "CREATE INDEX IF NOT EXISTS idx_phrase_occurrences_doc ON phrase_occurrences(document_id, phrase_id)",
];

/// Create every table and index on the configured database.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
