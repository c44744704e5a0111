//! Read-only access to the persisted similarity relation.
//!
//! The [`SimilarityStore`] trait is the only I/O seam of the clustering
//! core. A store is constructed once per connection or session and passed
//! explicitly to every operation; nothing here relies on ambient state.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Corpus, CorpusId, DocId, DocSet, Document, DocumentMetadata, PhraseOccurrence, SimilarityEdge,
};

/// Abstract similarity storage backend.
///
/// All operations are read-only. Operations scoped to a corpus must fail
/// with [`ClusterError::NotFound`](crate::error::ClusterError::NotFound)
/// (wrapped in the `anyhow::Error`) when the corpus does not exist.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`corpus`](SimilarityStore::corpus) | Look up one corpus |
/// | [`corpora_for_docket`](SimilarityStore::corpora_for_docket) | All corpora built over a docket |
/// | [`document_ids`](SimilarityStore::document_ids) | Every document id of a corpus |
/// | [`edges_within`](SimilarityStore::edges_within) | Edges among an id set above a score |
/// | [`documents_metadata`](SimilarityStore::documents_metadata) | Display metadata for ids |
/// | [`document`](SimilarityStore::document) | Analysed text and metadata of one document |
/// | [`phrase_occurrences`](SimilarityStore::phrase_occurrences) | Phrase ranges within an id set |
#[async_trait]
pub trait SimilarityStore: Send + Sync {
    /// Retrieve a corpus by id.
    async fn corpus(&self, corpus_id: CorpusId) -> Result<Option<Corpus>>;

    /// All corpora whose document set is the given docket.
    async fn corpora_for_docket(&self, docket_id: &str) -> Result<Vec<Corpus>>;

    /// All document ids of a corpus, ascending.
    async fn document_ids(&self, corpus_id: CorpusId) -> Result<Vec<DocId>>;

    /// Number of documents in a corpus.
    async fn document_count(&self, corpus_id: CorpusId) -> Result<usize> {
        Ok(self.document_ids(corpus_id).await?.len())
    }

    /// Edges with score `>= min_score` whose endpoints are both in `doc_ids`
    /// (every edge of the corpus when `doc_ids` is `None`).
    ///
    /// Implementations must test membership in bulk, not issue one query
    /// per id.
    async fn edges_within(
        &self,
        corpus_id: CorpusId,
        doc_ids: Option<&DocSet>,
        min_score: f64,
    ) -> Result<Vec<SimilarityEdge>>;

    /// Display metadata for the given ids. Ids unknown to the corpus are
    /// absent from the result.
    async fn documents_metadata(
        &self,
        corpus_id: CorpusId,
        doc_ids: &DocSet,
    ) -> Result<Vec<DocumentMetadata>>;

    /// Analysed text and metadata for one document.
    async fn document(&self, corpus_id: CorpusId, doc_id: DocId) -> Result<Option<Document>>;

    /// Phrases occurring in at least one document of `doc_ids`, with their
    /// occurrences restricted to `doc_ids` and `count` = number of distinct
    /// documents of `doc_ids` containing the phrase.
    async fn phrase_occurrences(
        &self,
        corpus_id: CorpusId,
        doc_ids: &DocSet,
    ) -> Result<Vec<PhraseOccurrence>>;
}

/// Fetch a corpus or fail with `NotFound`.
pub async fn require_corpus<S: SimilarityStore + ?Sized>(
    store: &S,
    corpus_id: CorpusId,
) -> crate::error::Result<Corpus> {
    store
        .corpus(corpus_id)
        .await?
        .ok_or_else(|| crate::error::ClusterError::not_found(format!("corpus {}", corpus_id)))
}
