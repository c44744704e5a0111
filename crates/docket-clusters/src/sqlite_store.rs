//! SQLite-backed [`SimilarityStore`] implementation.
//!
//! Id-set restrictions are sent as one JSON array parameter and expanded
//! with `json_each`, so membership is tested in bulk inside a single query
//! regardless of how many documents a cluster holds.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use docket_clusters_core::error::ClusterError;
use docket_clusters_core::models::{
    Corpus, CorpusId, CorpusMethod, DocId, DocSet, Document, DocumentMetadata, Occurrence,
    PhraseOccurrence, SimilarityEdge,
};
use docket_clusters_core::store::SimilarityStore;

/// SQLite implementation of [`SimilarityStore`].
///
/// Wraps a [`SqlitePool`] created once per process by [`crate::db::connect`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_corpus(&self, corpus_id: CorpusId) -> Result<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM corpora WHERE id = ?")
            .bind(corpus_id)
            .fetch_one(&self.pool)
            .await?;
        if count == 0 {
            return Err(ClusterError::not_found(format!("corpus {}", corpus_id)).into());
        }
        Ok(())
    }
}

fn id_array(doc_ids: &DocSet) -> Result<String> {
    Ok(serde_json::to_string(doc_ids)?)
}

fn corpus_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Corpus> {
    let method: String = row.try_get("method")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    let id: CorpusId = row.try_get("id")?;
    let metadata = serde_json::from_str(&metadata_json)
        .with_context(|| format!("corpus {} has malformed metadata_json", id))?;
    Ok(Corpus {
        id,
        docket_id: row.try_get("docket_id")?,
        method: CorpusMethod::from_parser(&method),
        metadata,
    })
}

fn metadata_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<DocumentMetadata> {
    Ok(DocumentMetadata {
        id: row.try_get("document_id")?,
        title: row.try_get("title")?,
        submitter_name: row.try_get("submitter_name")?,
        submitter_organization: row.try_get("submitter_organization")?,
    })
}

#[async_trait]
impl SimilarityStore for SqliteStore {
    async fn corpus(&self, corpus_id: CorpusId) -> Result<Option<Corpus>> {
        let row =
            sqlx::query("SELECT id, docket_id, method, metadata_json FROM corpora WHERE id = ?")
                .bind(corpus_id)
                .fetch_optional(&self.pool)
                .await?;
        row.as_ref().map(corpus_from_row).transpose()
    }

    async fn corpora_for_docket(&self, docket_id: &str) -> Result<Vec<Corpus>> {
        let rows = sqlx::query(
            r#"
            SELECT id, docket_id, method, metadata_json
            FROM corpora
            WHERE docket_id = ?
            ORDER BY id
            "#,
        )
        .bind(docket_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(corpus_from_row).collect()
    }

    async fn document_ids(&self, corpus_id: CorpusId) -> Result<Vec<DocId>> {
        self.ensure_corpus(corpus_id).await?;
        let ids: Vec<DocId> = sqlx::query_scalar(
            "SELECT document_id FROM documents WHERE corpus_id = ? ORDER BY document_id",
        )
        .bind(corpus_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn document_count(&self, corpus_id: CorpusId) -> Result<usize> {
        self.ensure_corpus(corpus_id).await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE corpus_id = ?")
            .bind(corpus_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn edges_within(
        &self,
        corpus_id: CorpusId,
        doc_ids: Option<&DocSet>,
        min_score: f64,
    ) -> Result<Vec<SimilarityEdge>> {
        self.ensure_corpus(corpus_id).await?;

        let rows = match doc_ids {
            Some(ids) if ids.is_empty() => return Ok(Vec::new()),
            Some(ids) => {
                sqlx::query(
                    r#"
                    WITH ids(id) AS (SELECT value FROM json_each(?))
                    SELECT low_document_id, high_document_id, similarity
                    FROM similarities
                    WHERE corpus_id = ?
                      AND similarity >= ?
                      AND low_document_id IN (SELECT id FROM ids)
                      AND high_document_id IN (SELECT id FROM ids)
                    ORDER BY low_document_id, high_document_id
                    "#,
                )
                .bind(id_array(ids)?)
                .bind(corpus_id)
                .bind(min_score)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT low_document_id, high_document_id, similarity
                    FROM similarities
                    WHERE corpus_id = ? AND similarity >= ?
                    ORDER BY low_document_id, high_document_id
                    "#,
                )
                .bind(corpus_id)
                .bind(min_score)
                .fetch_all(&self.pool)
                .await?
            }
        };

        log::debug!(
            "corpus {}: {} edges >= {} among {} ids",
            corpus_id,
            rows.len(),
            min_score,
            doc_ids.map_or("all".to_string(), |ids| ids.len().to_string())
        );

        rows.iter()
            .map(|row| -> Result<SimilarityEdge> {
                Ok(SimilarityEdge {
                    low: row.try_get("low_document_id")?,
                    high: row.try_get("high_document_id")?,
                    score: row.try_get("similarity")?,
                })
            })
            .collect()
    }

    async fn documents_metadata(
        &self,
        corpus_id: CorpusId,
        doc_ids: &DocSet,
    ) -> Result<Vec<DocumentMetadata>> {
        self.ensure_corpus(corpus_id).await?;
        if doc_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            WITH ids(id) AS (SELECT value FROM json_each(?))
            SELECT document_id, title, submitter_name, submitter_organization
            FROM documents
            WHERE corpus_id = ? AND document_id IN (SELECT id FROM ids)
            ORDER BY document_id
            "#,
        )
        .bind(id_array(doc_ids)?)
        .bind(corpus_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(metadata_from_row).collect()
    }

    async fn document(&self, corpus_id: CorpusId, doc_id: DocId) -> Result<Option<Document>> {
        self.ensure_corpus(corpus_id).await?;
        let row = sqlx::query(
            r#"
            SELECT document_id, text, title, submitter_name, submitter_organization
            FROM documents
            WHERE corpus_id = ? AND document_id = ?
            "#,
        )
        .bind(corpus_id)
        .bind(doc_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let text: String = row.try_get("text")?;
                Ok(Some(Document::from_full_text(&text, metadata_from_row(&row)?)))
            }
            None => Ok(None),
        }
    }

    async fn phrase_occurrences(
        &self,
        corpus_id: CorpusId,
        doc_ids: &DocSet,
    ) -> Result<Vec<PhraseOccurrence>> {
        self.ensure_corpus(corpus_id).await?;
        if doc_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            WITH ids(id) AS (SELECT value FROM json_each(?))
            SELECT p.id AS phrase_id, p.text, o.document_id, o.start_offset, o.end_offset
            FROM phrases p
            JOIN phrase_occurrences o ON o.phrase_id = p.id
            WHERE p.corpus_id = ? AND o.document_id IN (SELECT id FROM ids)
            ORDER BY p.id, o.document_id, o.start_offset
            "#,
        )
        .bind(id_array(doc_ids)?)
        .bind(corpus_id)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: BTreeMap<i64, PhraseOccurrence> = BTreeMap::new();
        for row in &rows {
            let phrase_id: i64 = row.try_get("phrase_id")?;
            let start: i64 = row.try_get("start_offset")?;
            let end: i64 = row.try_get("end_offset")?;
            let occurrence = Occurrence {
                document_id: row.try_get("document_id")?,
                start: start.max(0) as usize,
                end: end.max(0) as usize,
            };
            match grouped.get_mut(&phrase_id) {
                Some(entry) => entry.occurrences.push(occurrence),
                None => {
                    grouped.insert(
                        phrase_id,
                        PhraseOccurrence {
                            phrase_id,
                            text: row.try_get("text")?,
                            count: 0,
                            occurrences: vec![occurrence],
                        },
                    );
                }
            }
        }

        Ok(grouped
            .into_values()
            .map(|mut p| {
                p.count = p
                    .occurrences
                    .iter()
                    .map(|o| o.document_id)
                    .collect::<DocSet>()
                    .len();
                p
            })
            .collect())
    }
}
