//! Corpus import from the upstream analysis export.
//!
//! The similarity relation, phrases and document text are produced by an
//! external pipeline and handed over as one JSON file per corpus:
//!
//! ```json
//! {
//!   "docket_id": "EPA-HQ-OAR-2009-0234",
//!   "method": "4-gram",
//!   "metadata": {"threshold": 0.5},
//!   "documents": [{"id": 1, "text": "...", "title": "...", "submitter_name": "..."}],
//!   "similarities": [[1, 2, 0.95]],
//!   "phrases": [{"text": "...", "occurrences": [{"document_id": 1, "start": 0, "end": 17}]}]
//! }
//! ```
//!
//! The whole file is written in one transaction: a file that fails
//! validation leaves no partial corpus behind.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::path::Path;

use docket_clusters_core::models::{CorpusId, CorpusMethod, DocId, Occurrence, SimilarityEdge};

use crate::config::Config;
use crate::db;

#[derive(Debug, Deserialize)]
pub struct CorpusFile {
    pub docket_id: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
    pub documents: Vec<DocumentRecord>,
    #[serde(default)]
    pub similarities: Vec<(DocId, DocId, f64)>,
    #[serde(default)]
    pub phrases: Vec<PhraseRecord>,
}

fn default_method() -> String {
    CorpusMethod::Other.as_str().to_string()
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Deserialize)]
pub struct DocumentRecord {
    pub id: DocId,
    pub text: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub submitter_name: Option<String>,
    #[serde(default)]
    pub submitter_organization: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PhraseRecord {
    pub text: String,
    pub occurrences: Vec<Occurrence>,
}

/// What one import wrote.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ImportReport {
    pub corpus_id: CorpusId,
    pub docket_id: String,
    pub method: String,
    pub documents: usize,
    pub similarities: usize,
    pub phrases: usize,
}

/// Check ids and ranges before anything touches the database. Returns the
/// canonicalised edge list.
fn validate(file: &CorpusFile) -> Result<Vec<SimilarityEdge>> {
    if file.docket_id.trim().is_empty() {
        bail!("docket_id must not be empty");
    }

    let mut ids = BTreeSet::new();
    for doc in &file.documents {
        if !ids.insert(doc.id) {
            bail!("duplicate document id {}", doc.id);
        }
    }

    let mut edges = Vec::with_capacity(file.similarities.len());
    for (a, b, score) in &file.similarities {
        let edge = SimilarityEdge::new(*a, *b, *score)
            .with_context(|| format!("invalid similarity [{}, {}, {}]", a, b, score))?;
        if !ids.contains(&edge.low) || !ids.contains(&edge.high) {
            bail!(
                "similarity [{}, {}] references a document not in the file",
                a,
                b
            );
        }
        edges.push(edge);
    }

    for phrase in &file.phrases {
        for occ in &phrase.occurrences {
            if !ids.contains(&occ.document_id) {
                bail!(
                    "phrase {:?} occurs in unknown document {}",
                    phrase.text,
                    occ.document_id
                );
            }
            if occ.start > occ.end {
                bail!(
                    "phrase {:?} has an inverted range {}..{}",
                    phrase.text,
                    occ.start,
                    occ.end
                );
            }
        }
    }

    Ok(edges)
}

/// Write one corpus file into the database as a new corpus.
pub async fn import_corpus(pool: &SqlitePool, file: &CorpusFile) -> Result<ImportReport> {
    let edges = validate(file)?;
    let method = CorpusMethod::from_parser(&file.method);
    let now = chrono::Utc::now().timestamp();

    let mut tx = pool.begin().await?;

    let corpus_id = sqlx::query(
        "INSERT INTO corpora (docket_id, method, metadata_json, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&file.docket_id)
    .bind(method.as_str())
    .bind(serde_json::to_string(&file.metadata)?)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for doc in &file.documents {
        sqlx::query(
            r#"
            INSERT INTO documents
                (corpus_id, document_id, text, title, submitter_name, submitter_organization)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(corpus_id)
        .bind(doc.id)
        .bind(&doc.text)
        .bind(&doc.title)
        .bind(&doc.submitter_name)
        .bind(&doc.submitter_organization)
        .execute(&mut *tx)
        .await?;
    }

    // A pair listed twice keeps its last score.
    for edge in &edges {
        sqlx::query(
            r#"
            INSERT INTO similarities (corpus_id, low_document_id, high_document_id, similarity)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(corpus_id, low_document_id, high_document_id)
            DO UPDATE SET similarity = excluded.similarity
            "#,
        )
        .bind(corpus_id)
        .bind(edge.low)
        .bind(edge.high)
        .bind(edge.score)
        .execute(&mut *tx)
        .await?;
    }

    for phrase in &file.phrases {
        let phrase_id = sqlx::query("INSERT INTO phrases (corpus_id, text) VALUES (?, ?)")
            .bind(corpus_id)
            .bind(&phrase.text)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        for occ in &phrase.occurrences {
            sqlx::query(
                r#"
                INSERT INTO phrase_occurrences (phrase_id, document_id, start_offset, end_offset)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(phrase_id)
            .bind(occ.document_id)
            .bind(occ.start as i64)
            .bind(occ.end as i64)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    log::info!(
        "imported corpus {} for docket {} ({} documents, {} similarities, {} phrases)",
        corpus_id,
        file.docket_id,
        file.documents.len(),
        edges.len(),
        file.phrases.len()
    );

    Ok(ImportReport {
        corpus_id,
        docket_id: file.docket_id.clone(),
        method: method.as_str().to_string(),
        documents: file.documents.len(),
        similarities: edges.len(),
        phrases: file.phrases.len(),
    })
}

/// Run the import command: read, validate, write, and print the report.
pub async fn run_import(config: &Config, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus file: {}", path.display()))?;
    let file: CorpusFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse corpus file: {}", path.display()))?;

    let pool = db::connect(config).await?;
    let report = import_corpus(&pool, &file).await?;
    pool.close().await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn pool() -> (TempDir, SqlitePool) {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("dkc.sqlite")).await.unwrap();
        crate::migrate::migrate_pool(&pool).await.unwrap();
        (tmp, pool)
    }

    fn parse(json: &str) -> CorpusFile {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn test_import_canonicalises_edges() {
        let (_tmp, pool) = pool().await;
        let file = parse(
            r#"{"docket_id": "D-1", "method": "sentence",
                "documents": [{"id": 5, "text": "a"}, {"id": 3, "text": "b"}],
                "similarities": [[5, 3, 0.7]]}"#,
        );
        let report = import_corpus(&pool, &file).await.unwrap();
        assert_eq!(report.method, "sentence");
        assert_eq!(report.similarities, 1);

        let (low, high): (i64, i64) =
            sqlx::query_as("SELECT low_document_id, high_document_id FROM similarities")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!((low, high), (3, 5));
    }

    #[tokio::test]
    async fn test_duplicate_pair_keeps_last_score() {
        let (_tmp, pool) = pool().await;
        let file = parse(
            r#"{"docket_id": "D-1",
                "documents": [{"id": 1, "text": "a"}, {"id": 2, "text": "b"}],
                "similarities": [[1, 2, 0.4], [2, 1, 0.8]]}"#,
        );
        import_corpus(&pool, &file).await.unwrap();
        let score: f64 = sqlx::query_scalar("SELECT similarity FROM similarities")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(score, 0.8);
    }

    #[tokio::test]
    async fn test_invalid_file_writes_nothing() {
        let (_tmp, pool) = pool().await;
        let file = parse(
            r#"{"docket_id": "D-1",
                "documents": [{"id": 1, "text": "a"}],
                "similarities": [[1, 9, 0.5]]}"#,
        );
        let err = import_corpus(&pool, &file).await.unwrap_err();
        assert!(err.to_string().contains("not in the file"));

        let corpora: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM corpora")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(corpora, 0);
    }

    #[test]
    fn test_validation_rejects_bad_input() {
        let dup = parse(
            r#"{"docket_id": "D", "documents": [{"id": 1, "text": ""}, {"id": 1, "text": ""}]}"#,
        );
        assert!(validate(&dup).is_err());

        let self_edge = parse(
            r#"{"docket_id": "D", "documents": [{"id": 1, "text": ""}], "similarities": [[1, 1, 0.5]]}"#,
        );
        assert!(validate(&self_edge).is_err());

        let bad_score = parse(
            r#"{"docket_id": "D", "documents": [{"id": 1, "text": ""}, {"id": 2, "text": ""}],
                "similarities": [[1, 2, 1.5]]}"#,
        );
        assert!(validate(&bad_score).is_err());

        let inverted = parse(
            r#"{"docket_id": "D", "documents": [{"id": 1, "text": "abc"}],
                "phrases": [{"text": "x", "occurrences": [{"document_id": 1, "start": 3, "end": 1}]}]}"#,
        );
        assert!(validate(&inverted).is_err());

        let blank = parse(r#"{"docket_id": " ", "documents": []}"#);
        assert!(validate(&blank).is_err());
    }
}
