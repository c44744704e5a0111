//! Connected components of the similarity graph at a single cutoff.
//!
//! # Algorithm
//!
//! 1. Index the candidate ids (default: every document of the corpus).
//! 2. Fetch edges among the candidates with score `>= cutoff` in one store call.
//! 3. Union-find with path compression and union by rank over the edges.
//! 4. Components of size >= 2 become [`Cluster`]s named by their minimum id;
//!    singletons are counted as unclustered.
//!
//! Runs in `O(E α(V) + V log V)` and allocates one slot per candidate.

use std::collections::{BTreeMap, HashMap};

use crate::error::{validate_cutoff, Result};
use crate::models::{
    sort_clusters, Cluster, ClusterStats, Clustering, CorpusId, DocId, DocSet, SimilarityEdge,
};
use crate::store::{require_corpus, SimilarityStore};

/// Disjoint-set forest over dense indices.
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    /// Returns `true` if `a` and `b` were in different sets.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }
}

/// Partition `ids` into clusters using `edges`.
///
/// Edges with an endpoint outside `ids` are ignored, so callers may pass a
/// superset of the relevant edges. Returned clusters are ordered by size
/// (desc), then name (asc).
pub fn partition<'a, I>(ids: &DocSet, edges: I) -> Vec<Cluster>
where
    I: IntoIterator<Item = &'a SimilarityEdge>,
{
    let index: HashMap<DocId, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let ordered: Vec<DocId> = ids.iter().copied().collect();
    let mut uf = UnionFind::new(ordered.len());

    for edge in edges {
        if let (Some(&a), Some(&b)) = (index.get(&edge.low), index.get(&edge.high)) {
            uf.union(a, b);
        }
    }

    let mut components: BTreeMap<usize, DocSet> = BTreeMap::new();
    for (i, id) in ordered.iter().enumerate() {
        let root = uf.find(i);
        components.entry(root).or_default().insert(*id);
    }

    let mut clusters: Vec<Cluster> = components
        .into_values()
        .filter_map(Cluster::from_members)
        .collect();
    sort_clusters(&mut clusters);
    clusters
}

/// Cluster `candidates` (or the whole corpus) at `cutoff`.
pub async fn clusters<S: SimilarityStore + ?Sized>(
    store: &S,
    corpus_id: CorpusId,
    candidates: Option<&DocSet>,
    cutoff: f64,
) -> Result<Clustering> {
    validate_cutoff(cutoff)?;
    require_corpus(store, corpus_id).await?;

    let owned;
    let ids: &DocSet = match candidates {
        Some(ids) => ids,
        None => {
            owned = store.document_ids(corpus_id).await?.into_iter().collect::<DocSet>();
            &owned
        }
    };

    let edges = store.edges_within(corpus_id, candidates, cutoff).await?;
    log::debug!(
        "corpus {}: partitioning {} documents over {} edges at cutoff {}",
        corpus_id,
        ids.len(),
        edges.len(),
        cutoff
    );

    let clusters = partition(ids, &edges);
    let clustered: usize = clusters.iter().map(Cluster::size).sum();
    Ok(Clustering {
        cutoff,
        clusters,
        stats: ClusterStats {
            clustered,
            unclustered: ids.len() - clustered,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::worked_example;
    use pretty_assertions::assert_eq;

    fn members(c: &Clustering) -> Vec<Vec<DocId>> {
        c.clusters
            .iter()
            .map(|c| c.members().iter().copied().collect())
            .collect()
    }

    #[test]
    fn test_union_find_basic() {
        let mut uf = UnionFind::new(5);
        assert!(uf.union(0, 1));
        assert!(uf.union(3, 4));
        assert!(!uf.union(1, 0));
        assert_eq!(uf.find(0), uf.find(1));
        assert_ne!(uf.find(0), uf.find(3));
        assert!(uf.union(1, 4));
        assert_eq!(uf.find(0), uf.find(3));
    }

    #[test]
    fn test_partition_ignores_foreign_edges() {
        let edges = vec![
            SimilarityEdge::new(1, 2, 0.9).unwrap(),
            SimilarityEdge::new(2, 50, 0.9).unwrap(),
        ];
        let clusters = partition(&DocSet::from([1, 2, 3]), &edges);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members(), &DocSet::from([1, 2]));
    }

    #[tokio::test]
    async fn test_worked_example_at_090() {
        let (store, ids) = worked_example();
        let c = clusters(&store, 1, None, 0.9).await.unwrap();
        assert_eq!(members(&c), vec![vec![ids.a, ids.b]]);
        assert_eq!(c.stats, ClusterStats { clustered: 2, unclustered: 2 });
    }

    #[tokio::test]
    async fn test_worked_example_at_050_is_connected_through_path() {
        let (store, ids) = worked_example();
        let c = clusters(&store, 1, None, 0.5).await.unwrap();
        assert_eq!(members(&c), vec![vec![ids.a, ids.b, ids.c, ids.d]]);
        assert_eq!(c.clusters[0].name(), ids.a);
        assert_eq!(c.stats.unclustered, 0);
    }

    #[tokio::test]
    async fn test_restricted_candidates() {
        let (store, ids) = worked_example();
        let candidates = DocSet::from([ids.b, ids.c, ids.d]);
        let c = clusters(&store, 1, Some(&candidates), 0.5).await.unwrap();
        assert_eq!(members(&c), vec![vec![ids.b, ids.c, ids.d]]);
        let c = clusters(&store, 1, Some(&candidates), 0.6).await.unwrap();
        assert_eq!(members(&c), vec![vec![ids.b, ids.c]]);
        assert_eq!(c.stats.unclustered, 1);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let (store, _) = worked_example();
        for cutoff in [0.0, 0.55, 0.6, 0.82, 0.9, 1.0] {
            let first = clusters(&store, 1, None, cutoff).await.unwrap();
            let second = clusters(&store, 1, None, cutoff).await.unwrap();
            assert_eq!(first, second);
        }
    }

    #[tokio::test]
    async fn test_partition_property() {
        let (store, _) = worked_example();
        let all: DocSet = store.document_ids(1).await.unwrap().into_iter().collect();
        for cutoff in [0.5, 0.6, 0.7, 0.8, 0.9] {
            let c = clusters(&store, 1, None, cutoff).await.unwrap();
            let mut seen = DocSet::new();
            for cluster in &c.clusters {
                for m in cluster.members() {
                    assert!(seen.insert(*m), "document {} in two clusters", m);
                }
            }
            assert!(seen.is_subset(&all));
            assert_eq!(seen.len() + c.stats.unclustered, all.len());
        }
    }

    #[tokio::test]
    async fn test_monotonic_refinement() {
        let (store, _) = worked_example();
        let cutoffs = [0.5, 0.55, 0.6, 0.7, 0.82, 0.9, 0.95];
        for pair in cutoffs.windows(2) {
            let loose = clusters(&store, 1, None, pair[0]).await.unwrap();
            let tight = clusters(&store, 1, None, pair[1]).await.unwrap();
            for t in &tight.clusters {
                assert!(
                    loose.clusters.iter().any(|l| t.members().is_subset(l.members())),
                    "cluster {:?} at {} not contained at {}",
                    t.members(),
                    pair[1],
                    pair[0]
                );
            }
        }
    }

    #[tokio::test]
    async fn test_invalid_cutoff_and_unknown_corpus() {
        let (store, _) = worked_example();
        assert!(matches!(
            clusters(&store, 1, None, 1.5).await,
            Err(crate::error::ClusterError::InvalidParameter(_))
        ));
        assert!(clusters(&store, 42, None, 0.5).await.unwrap_err().is_not_found());
    }
}
