//! Centrality ranking of a document subset.
//!
//! A document's centrality within a set is the sum of its similarity to
//! every other member (absent edges contribute 0). The top-ranked document
//! is the set's exemplar.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{ClusterError, Result};
use crate::models::{CorpusId, DocId, DocSet, DocumentMetadata};
use crate::store::{require_corpus, SimilarityStore};

/// One entry of a centrality ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedDocument {
    pub id: DocId,
    /// Sum of similarity scores to the other members of the ranked set.
    pub centrality: f64,
    pub metadata: DocumentMetadata,
}

/// Order `doc_ids` by descending centrality, ties broken by ascending id.
///
/// An empty set yields an empty ranking. Ids that are not documents of the
/// corpus are rejected with `NotFound`.
pub async fn rank_by_centrality<S: SimilarityStore + ?Sized>(
    store: &S,
    corpus_id: CorpusId,
    doc_ids: &DocSet,
) -> Result<Vec<RankedDocument>> {
    require_corpus(store, corpus_id).await?;
    if doc_ids.is_empty() {
        return Ok(Vec::new());
    }

    let metadata = store.documents_metadata(corpus_id, doc_ids).await?;
    if metadata.len() != doc_ids.len() {
        let known: DocSet = metadata.iter().map(|m| m.id).collect();
        let missing: Vec<String> = doc_ids
            .difference(&known)
            .take(5)
            .map(|id| id.to_string())
            .collect();
        return Err(ClusterError::not_found(format!(
            "documents [{}] in corpus {}",
            missing.join(", "),
            corpus_id
        )));
    }

    let edges = store.edges_within(corpus_id, Some(doc_ids), 0.0).await?;
    let mut sums: HashMap<DocId, f64> = doc_ids.iter().map(|id| (*id, 0.0)).collect();
    for edge in &edges {
        if let Some(s) = sums.get_mut(&edge.low) {
            *s += edge.score;
        }
        if let Some(s) = sums.get_mut(&edge.high) {
            *s += edge.score;
        }
    }

    let mut ranked: Vec<RankedDocument> = metadata
        .into_iter()
        .map(|m| RankedDocument {
            id: m.id,
            centrality: sums.get(&m.id).copied().unwrap_or(0.0),
            metadata: m,
        })
        .collect();
    sort_by_centrality(&mut ranked);
    Ok(ranked)
}

/// Centrality descending, then id ascending.
pub fn sort_by_centrality(ranked: &mut [RankedDocument]) {
    ranked.sort_by(|a, b| {
        b.centrality
            .partial_cmp(&a.centrality)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::worked_example;

    #[tokio::test]
    async fn test_worked_example_order() {
        let (store, ids) = worked_example();
        let set = DocSet::from([ids.a, ids.b, ids.c]);
        let ranked = rank_by_centrality(&store, 1, &set).await.unwrap();
        let order: Vec<DocId> = ranked.iter().map(|r| r.id).collect();
        assert_eq!(order, vec![ids.a, ids.b, ids.c]);
        assert!((ranked[0].centrality - 1.77).abs() < 1e-9);
        assert!((ranked[1].centrality - 1.55).abs() < 1e-9);
        assert!((ranked[2].centrality - 1.42).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_set() {
        let (store, _) = worked_example();
        let ranked = rank_by_centrality(&store, 1, &DocSet::new()).await.unwrap();
        assert!(ranked.is_empty());
    }

    #[tokio::test]
    async fn test_isolated_members_rank_last_with_zero() {
        let (store, ids) = worked_example();
        // A-D has no direct edge; B-D has none either.
        let set = DocSet::from([ids.b, ids.d]);
        let ranked = rank_by_centrality(&store, 1, &set).await.unwrap();
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|r| r.centrality == 0.0));
        // tie broken by ascending id
        assert_eq!(ranked[0].id, ids.b);
    }

    #[tokio::test]
    async fn test_idempotent_on_sorted_input() {
        let (store, ids) = worked_example();
        let set = DocSet::from([ids.a, ids.b, ids.c, ids.d]);
        let first = rank_by_centrality(&store, 1, &set).await.unwrap();
        let mut again = first.clone();
        sort_by_centrality(&mut again);
        assert_eq!(first, again);
        let second = rank_by_centrality(&store, 1, &set).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unknown_document() {
        let (store, ids) = worked_example();
        let set = DocSet::from([ids.a, 404]);
        let err = rank_by_centrality(&store, 1, &set).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("404"));
    }
}
