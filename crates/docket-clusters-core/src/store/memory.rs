//! In-memory [`SimilarityStore`] implementation for testing and fixtures.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Edge queries are a linear scan with hash-set membership tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::error::ClusterError;
use crate::models::{
    Corpus, CorpusId, DocId, DocSet, Document, DocumentMetadata, Occurrence, PhraseOccurrence,
    SimilarityEdge,
};

use super::SimilarityStore;

struct StoredDoc {
    full_text: String,
    metadata: DocumentMetadata,
}

struct StoredPhrase {
    id: i64,
    text: String,
    occurrences: Vec<Occurrence>,
}

struct StoredCorpus {
    corpus: Corpus,
    documents: BTreeMap<DocId, StoredDoc>,
    edges: HashMap<(DocId, DocId), f64>,
    phrases: Vec<StoredPhrase>,
}

/// In-memory store for tests and small fixtures.
pub struct InMemoryStore {
    corpora: RwLock<HashMap<CorpusId, StoredCorpus>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            corpora: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<CorpusId, StoredCorpus>>> {
        self.corpora
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<CorpusId, StoredCorpus>>> {
        self.corpora
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    /// Register a corpus. Replaces any existing corpus with the same id.
    pub fn insert_corpus(&self, corpus: Corpus) -> Result<()> {
        let mut corpora = self.write()?;
        corpora.insert(
            corpus.id,
            StoredCorpus {
                corpus,
                documents: BTreeMap::new(),
                edges: HashMap::new(),
                phrases: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn insert_document(
        &self,
        corpus_id: CorpusId,
        metadata: DocumentMetadata,
        full_text: &str,
    ) -> Result<()> {
        let mut corpora = self.write()?;
        let stored = corpus_mut(&mut corpora, corpus_id)?;
        stored.documents.insert(
            metadata.id,
            StoredDoc {
                full_text: full_text.to_string(),
                metadata,
            },
        );
        Ok(())
    }

    /// Insert or overwrite the edge between `a` and `b`. Both documents must
    /// already exist in the corpus.
    pub fn insert_edge(&self, corpus_id: CorpusId, a: DocId, b: DocId, score: f64) -> Result<()> {
        let edge = SimilarityEdge::new(a, b, score)?;
        let mut corpora = self.write()?;
        let stored = corpus_mut(&mut corpora, corpus_id)?;
        for id in [edge.low, edge.high] {
            if !stored.documents.contains_key(&id) {
                return Err(ClusterError::not_found(format!("document {}", id)).into());
            }
        }
        stored.edges.insert((edge.low, edge.high), edge.score);
        Ok(())
    }

    /// Record a phrase and its occurrences; returns the new phrase id.
    pub fn insert_phrase(
        &self,
        corpus_id: CorpusId,
        text: &str,
        occurrences: Vec<Occurrence>,
    ) -> Result<i64> {
        let mut corpora = self.write()?;
        let stored = corpus_mut(&mut corpora, corpus_id)?;
        let id = stored.phrases.len() as i64 + 1;
        stored.phrases.push(StoredPhrase {
            id,
            text: text.to_string(),
            occurrences,
        });
        Ok(id)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn corpus_mut(
    corpora: &mut HashMap<CorpusId, StoredCorpus>,
    corpus_id: CorpusId,
) -> Result<&mut StoredCorpus> {
    corpora
        .get_mut(&corpus_id)
        .ok_or_else(|| ClusterError::not_found(format!("corpus {}", corpus_id)).into())
}

fn corpus_ref(
    corpora: &HashMap<CorpusId, StoredCorpus>,
    corpus_id: CorpusId,
) -> Result<&StoredCorpus> {
    corpora
        .get(&corpus_id)
        .ok_or_else(|| ClusterError::not_found(format!("corpus {}", corpus_id)).into())
}

#[async_trait]
impl SimilarityStore for InMemoryStore {
    async fn corpus(&self, corpus_id: CorpusId) -> Result<Option<Corpus>> {
        let corpora = self.read()?;
        Ok(corpora.get(&corpus_id).map(|s| s.corpus.clone()))
    }

    async fn corpora_for_docket(&self, docket_id: &str) -> Result<Vec<Corpus>> {
        let corpora = self.read()?;
        let mut found: Vec<Corpus> = corpora
            .values()
            .filter(|s| s.corpus.docket_id == docket_id)
            .map(|s| s.corpus.clone())
            .collect();
        found.sort_by_key(|c| c.id);
        Ok(found)
    }

    async fn document_ids(&self, corpus_id: CorpusId) -> Result<Vec<DocId>> {
        let corpora = self.read()?;
        Ok(corpus_ref(&corpora, corpus_id)?
            .documents
            .keys()
            .copied()
            .collect())
    }

    async fn edges_within(
        &self,
        corpus_id: CorpusId,
        doc_ids: Option<&DocSet>,
        min_score: f64,
    ) -> Result<Vec<SimilarityEdge>> {
        let corpora = self.read()?;
        let stored = corpus_ref(&corpora, corpus_id)?;
        let mut edges: Vec<SimilarityEdge> = stored
            .edges
            .iter()
            .filter(|(_, score)| **score >= min_score)
            .filter(|((low, high), _)| match doc_ids {
                Some(ids) => ids.contains(low) && ids.contains(high),
                None => true,
            })
            .map(|((low, high), score)| SimilarityEdge {
                low: *low,
                high: *high,
                score: *score,
            })
            .collect();
        edges.sort_by_key(|e| (e.low, e.high));
        Ok(edges)
    }

    async fn documents_metadata(
        &self,
        corpus_id: CorpusId,
        doc_ids: &DocSet,
    ) -> Result<Vec<DocumentMetadata>> {
        let corpora = self.read()?;
        let stored = corpus_ref(&corpora, corpus_id)?;
        Ok(doc_ids
            .iter()
            .filter_map(|id| stored.documents.get(id))
            .map(|d| d.metadata.clone())
            .collect())
    }

    async fn document(&self, corpus_id: CorpusId, doc_id: DocId) -> Result<Option<Document>> {
        let corpora = self.read()?;
        let stored = corpus_ref(&corpora, corpus_id)?;
        Ok(stored
            .documents
            .get(&doc_id)
            .map(|d| Document::from_full_text(&d.full_text, d.metadata.clone())))
    }

    async fn phrase_occurrences(
        &self,
        corpus_id: CorpusId,
        doc_ids: &DocSet,
    ) -> Result<Vec<PhraseOccurrence>> {
        let corpora = self.read()?;
        let stored = corpus_ref(&corpora, corpus_id)?;
        let mut out = Vec::new();
        for phrase in &stored.phrases {
            let occurrences: Vec<Occurrence> = phrase
                .occurrences
                .iter()
                .filter(|o| doc_ids.contains(&o.document_id))
                .copied()
                .collect();
            if occurrences.is_empty() {
                continue;
            }
            let count = occurrences
                .iter()
                .map(|o| o.document_id)
                .collect::<DocSet>()
                .len();
            out.push(PhraseOccurrence {
                phrase_id: phrase.id,
                text: phrase.text.clone(),
                count,
                occurrences,
            });
        }
        Ok(out)
    }
}
