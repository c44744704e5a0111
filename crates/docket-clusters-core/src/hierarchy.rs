//! Multi-cutoff cluster dendrogram.
//!
//! # Algorithm
//!
//! 1. Cluster the whole corpus at the loosest cutoff; clusters with at least
//!    `min_cluster_size` members become top-level nodes.
//! 2. For each further cutoff, fetch the edges among the union of the
//!    previous level's members in one store call, bucket them by owning
//!    node, and re-partition every node independently (rayon fan-out over
//!    siblings, joined before the next level). Qualifying sub-clusters
//!    become children; members that land in none are dropped.
//! 3. A branch ends when the cutoffs run out or a node has no qualifying
//!    sub-cluster.
//! 4. Optionally attach up to `phrase_limit` distinguishing phrases per node
//!    (one batched phrase query per level).
//!
//! Depth is bounded by the number of cutoffs and the tree is grown level by
//! level from an arena, so there is no recursion over the store.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use serde::{Serialize, Serializer};

use crate::cancel::CancelToken;
use crate::error::{validate_cutoffs, ClusterError, Result};
use crate::models::{
    Cluster, ClusterStats, CorpusId, DocId, DocSet, PhraseOccurrence, SimilarityEdge,
};
use crate::navigate::{self, TraceEntry};
use crate::partition::{self, partition};
use crate::store::{require_corpus, SimilarityStore};

/// Phrases attached to each node when requested.
pub const DEFAULT_PHRASE_LIMIT: usize = 5;

/// Default share of the corpus a cluster must reach to enter the hierarchy.
pub const DEFAULT_MIN_CLUSTER_FRACTION: f64 = 0.005;

/// `max(2, round(total × fraction))`.
pub fn min_cluster_size_for(total_documents: usize, fraction: f64) -> usize {
    let scaled = (total_documents as f64 * fraction).round();
    if scaled.is_finite() && scaled > 2.0 {
        scaled as usize
    } else {
        2
    }
}

/// Distinguishing phrases of a node.
///
/// `NotComputed` is distinct from `Computed(vec![])`: phrase mining is
/// opt-in per build, and an empty list means "mined, nothing found".
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Phrases {
    #[default]
    NotComputed,
    Computed(Vec<String>),
}

impl Phrases {
    pub fn as_slice(&self) -> Option<&[String]> {
        match self {
            Phrases::NotComputed => None,
            Phrases::Computed(p) => Some(p),
        }
    }
}

impl Serialize for Phrases {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.as_slice().serialize(serializer)
    }
}

/// One cluster at one cutoff, with its sub-clusters at the next cutoff.
///
/// Fields are private: children can only be attached through
/// [`attach_children`](Self::attach_children), which enforces the nesting
/// invariants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchyNode {
    cutoff: f64,
    name: DocId,
    size: usize,
    members: DocSet,
    phrases: Phrases,
    children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    /// A childless node for `cluster` at `cutoff`.
    pub fn new(cutoff: f64, cluster: Cluster) -> Self {
        let name = cluster.name();
        let members = cluster.into_members();
        Self {
            cutoff,
            name,
            size: members.len(),
            members,
            phrases: Phrases::NotComputed,
            children: Vec::new(),
        }
    }

    pub fn with_phrases(mut self, phrases: Phrases) -> Self {
        self.phrases = phrases;
        self
    }

    /// Attach children, rejecting any child whose cutoff is not strictly
    /// greater than this node's, whose members are not a subset of this
    /// node's, or that overlaps a sibling.
    pub fn attach_children(&mut self, children: Vec<HierarchyNode>) -> Result<()> {
        let mut seen = DocSet::new();
        for child in &children {
            if child.cutoff <= self.cutoff {
                return Err(ClusterError::invalid(format!(
                    "child {} cutoff {} is not above parent {} cutoff {}",
                    child.name, child.cutoff, self.name, self.cutoff
                )));
            }
            if !child.members.is_subset(&self.members) {
                return Err(ClusterError::invalid(format!(
                    "child {} has members outside parent {}",
                    child.name, self.name
                )));
            }
            if !seen.is_disjoint(&child.members) {
                return Err(ClusterError::invalid(format!(
                    "child {} overlaps a sibling under parent {}",
                    child.name, self.name
                )));
            }
            seen.extend(child.members.iter().copied());
        }
        self.children = children;
        Ok(())
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Representative id (lowest member).
    pub fn name(&self) -> DocId {
        self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn members(&self) -> &DocSet {
        &self.members
    }

    pub fn contains(&self, doc: DocId) -> bool {
        self.members.contains(&doc)
    }

    pub fn phrases(&self) -> &Phrases {
        &self.phrases
    }

    pub fn children(&self) -> &[HierarchyNode] {
        &self.children
    }
}

/// Parameters of one hierarchy build.
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyParams {
    /// Strictly ascending, each in `[0, 1]`.
    pub cutoffs: Vec<f64>,
    /// Clusters smaller than this are pruned; values below 2 act as 2.
    pub min_cluster_size: usize,
    pub compute_phrases: bool,
    pub phrase_limit: usize,
}

impl HierarchyParams {
    pub fn new(cutoffs: Vec<f64>, min_cluster_size: usize) -> Self {
        Self {
            cutoffs,
            min_cluster_size,
            compute_phrases: false,
            phrase_limit: DEFAULT_PHRASE_LIMIT,
        }
    }

    pub fn with_phrases(mut self, compute: bool) -> Self {
        self.compute_phrases = compute;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_cutoffs(&self.cutoffs)
    }

    pub fn effective_min_size(&self) -> usize {
        self.min_cluster_size.max(2)
    }
}

/// A built dendrogram plus clustered/unclustered counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hierarchy {
    pub corpus_id: CorpusId,
    pub cutoffs: Vec<f64>,
    pub min_cluster_size: usize,
    /// Top-level nodes at `cutoffs[0]`, by size (desc) then name (asc).
    pub nodes: Vec<HierarchyNode>,
    pub stats: ClusterStats,
}

impl Hierarchy {
    pub fn find_node(&self, doc: DocId, cutoff: f64) -> Option<&HierarchyNode> {
        navigate::find_node(&self.nodes, doc, cutoff)
    }

    pub fn trace_doc(&self, doc: DocId) -> Vec<TraceEntry> {
        navigate::trace_doc(&self.nodes, doc)
    }

    pub fn largest(&self) -> Option<&HierarchyNode> {
        self.nodes.first()
    }
}

struct Pending {
    level: usize,
    cluster: Cluster,
    parent: Option<usize>,
    phrases: Phrases,
}

/// Build the dendrogram for `corpus_id`.
///
/// Parameters are validated before the store is touched. A tripped
/// `cancel` token aborts with [`ClusterError::Cancelled`] and nothing is
/// returned.
pub async fn build_hierarchy<S: SimilarityStore + ?Sized>(
    store: &S,
    corpus_id: CorpusId,
    params: &HierarchyParams,
    cancel: &CancelToken,
) -> Result<Hierarchy> {
    params.validate()?;
    cancel.check()?;
    require_corpus(store, corpus_id).await?;

    let min_size = params.effective_min_size();
    let total = store.document_count(corpus_id).await?;

    let top = partition::clusters(store, corpus_id, None, params.cutoffs[0]).await?;
    let mut arena: Vec<Pending> = top
        .clusters
        .into_iter()
        .filter(|c| c.size() >= min_size)
        .map(|cluster| Pending {
            level: 0,
            cluster,
            parent: None,
            phrases: Phrases::NotComputed,
        })
        .collect();
    let mut frontier: Vec<usize> = (0..arena.len()).collect();
    if params.compute_phrases {
        attach_phrases(store, corpus_id, &mut arena, &frontier, params.phrase_limit).await?;
    }
    log::debug!(
        "corpus {}: {} top-level clusters at cutoff {}",
        corpus_id,
        frontier.len(),
        params.cutoffs[0]
    );

    for (level, &cutoff) in params.cutoffs.iter().enumerate().skip(1) {
        if frontier.is_empty() {
            break;
        }
        cancel.check()?;

        let union: DocSet = frontier
            .iter()
            .flat_map(|&i| arena[i].cluster.members().iter().copied())
            .collect();
        let edges = store.edges_within(corpus_id, Some(&union), cutoff).await?;

        let splits = split_level(&arena, &frontier, &edges, min_size, cancel);
        cancel.check()?;

        let mut next = Vec::new();
        for (&parent, children) in frontier.iter().zip(splits) {
            for cluster in children {
                arena.push(Pending {
                    level,
                    cluster,
                    parent: Some(parent),
                    phrases: Phrases::NotComputed,
                });
                next.push(arena.len() - 1);
            }
        }
        if params.compute_phrases {
            attach_phrases(store, corpus_id, &mut arena, &next, params.phrase_limit).await?;
        }
        log::debug!(
            "corpus {}: level {} (cutoff {}) has {} nodes from {} edges",
            corpus_id,
            level,
            cutoff,
            next.len(),
            edges.len()
        );
        frontier = next;
    }

    let nodes = assemble(arena, &params.cutoffs)?;
    let clustered: usize = nodes.iter().map(HierarchyNode::size).sum();
    Ok(Hierarchy {
        corpus_id,
        cutoffs: params.cutoffs.clone(),
        min_cluster_size: min_size,
        nodes,
        stats: ClusterStats {
            clustered,
            unclustered: total.saturating_sub(clustered),
        },
    })
}

/// Re-partition every frontier node over its own edges, in parallel.
fn split_level(
    arena: &[Pending],
    frontier: &[usize],
    edges: &[SimilarityEdge],
    min_size: usize,
    cancel: &CancelToken,
) -> Vec<Vec<Cluster>> {
    let owner: HashMap<DocId, usize> = frontier
        .iter()
        .enumerate()
        .flat_map(|(pos, &i)| arena[i].cluster.members().iter().map(move |m| (*m, pos)))
        .collect();

    let mut buckets: Vec<Vec<&SimilarityEdge>> = vec![Vec::new(); frontier.len()];
    for edge in edges {
        if let (Some(&a), Some(&b)) = (owner.get(&edge.low), owner.get(&edge.high)) {
            if a == b {
                buckets[a].push(edge);
            }
        }
    }

    frontier
        .par_iter()
        .zip(buckets.par_iter())
        .map(|(&i, bucket)| {
            if cancel.is_cancelled() {
                return Vec::new();
            }
            partition(arena[i].cluster.members(), bucket.iter().copied())
                .into_iter()
                .filter(|c| c.size() >= min_size)
                .collect()
        })
        .collect()
}

async fn attach_phrases<S: SimilarityStore + ?Sized>(
    store: &S,
    corpus_id: CorpusId,
    arena: &mut [Pending],
    level: &[usize],
    limit: usize,
) -> Result<()> {
    if level.is_empty() {
        return Ok(());
    }
    let union: DocSet = level
        .iter()
        .flat_map(|&i| arena[i].cluster.members().iter().copied())
        .collect();
    let phrases = store.phrase_occurrences(corpus_id, &union).await?;
    for &i in level {
        let top = top_phrases(&phrases, arena[i].cluster.members(), limit);
        arena[i].phrases = Phrases::Computed(top);
    }
    Ok(())
}

/// The `limit` phrases found in the most members of `members`.
///
/// Ordered by number of member documents containing the phrase (desc),
/// then phrase length in characters (desc), then text (asc).
pub fn top_phrases(phrases: &[PhraseOccurrence], members: &DocSet, limit: usize) -> Vec<String> {
    // The same text may come from several phrase rows; keep its best count.
    let mut best: BTreeMap<&str, usize> = BTreeMap::new();
    for p in phrases {
        let docs: DocSet = p
            .occurrences
            .iter()
            .map(|o| o.document_id)
            .filter(|d| members.contains(d))
            .collect();
        if docs.is_empty() {
            continue;
        }
        let count = best.entry(p.text.as_str()).or_insert(0);
        *count = (*count).max(docs.len());
    }

    let mut scored: Vec<(usize, &str)> = best.into_iter().map(|(text, n)| (n, text)).collect();
    scored.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then(b.1.chars().count().cmp(&a.1.chars().count()))
            .then(a.1.cmp(b.1))
    });
    scored
        .into_iter()
        .take(limit)
        .map(|(_, text)| text.to_string())
        .collect()
}

fn assemble(arena: Vec<Pending>, cutoffs: &[f64]) -> Result<Vec<HierarchyNode>> {
    let mut child_ids: Vec<Vec<usize>> = vec![Vec::new(); arena.len()];
    let mut roots = Vec::new();
    for (i, p) in arena.iter().enumerate() {
        match p.parent {
            Some(parent) => child_ids[parent].push(i),
            None => roots.push(i),
        }
    }

    // Children are always pushed after their parent, so walking the arena
    // backwards builds every child before it is attached.
    let mut built: Vec<Option<HierarchyNode>> = (0..arena.len()).map(|_| None).collect();
    for (i, p) in arena.into_iter().enumerate().rev() {
        let mut node = HierarchyNode::new(cutoffs[p.level], p.cluster).with_phrases(p.phrases);
        let children: Vec<HierarchyNode> = child_ids[i]
            .iter()
            .filter_map(|c| built[*c].take())
            .collect();
        node.attach_children(children)?;
        built[i] = Some(node);
    }

    Ok(roots.into_iter().filter_map(|r| built[r].take()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Corpus, CorpusMethod, DocumentMetadata, Occurrence};
    use crate::store::memory::InMemoryStore;
    use crate::testing::{worked_example, WorkedIds};
    use pretty_assertions::assert_eq;

    const CUTOFFS: [f64; 5] = [0.5, 0.6, 0.7, 0.8, 0.9];

    fn cluster(ids: &[DocId]) -> Cluster {
        Cluster::from_members(ids.iter().copied().collect()).unwrap()
    }

    fn chain(node: &HierarchyNode) -> Vec<(f64, Vec<DocId>)> {
        let mut out = vec![(node.cutoff(), node.members().iter().copied().collect())];
        if let Some(child) = node.children().first() {
            out.extend(chain(child));
        }
        out
    }

    #[tokio::test]
    async fn test_worked_example_hierarchy() {
        let (store, WorkedIds { a, b, c, d }) = worked_example();
        let params = HierarchyParams::new(CUTOFFS.to_vec(), 2);
        let h = build_hierarchy(&store, 1, &params, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(h.nodes.len(), 1);
        let top = &h.nodes[0];
        assert_eq!(top.size(), 4);
        assert_eq!(top.name(), a);
        assert_eq!(
            chain(top),
            vec![
                (0.5, vec![a, b, c, d]),
                (0.6, vec![a, b, c]),
                (0.7, vec![a, b, c]),
                (0.8, vec![a, b, c]),
                (0.9, vec![a, b]),
            ]
        );
        let mut node = top;
        while let Some(child) = node.children().first() {
            assert_eq!(node.children().len(), 1);
            node = child;
        }
        assert_eq!(node.cutoff(), 0.9);
        assert!(node.children().is_empty());
        assert_eq!(h.stats, ClusterStats { clustered: 4, unclustered: 0 });
        assert_eq!(top.phrases(), &Phrases::NotComputed);
    }

    /// Two families at 0.5: {1,2,3,4} splits into {1,2} and {3,4} at 0.9,
    /// {5,..,9} splits into {7,8,9} and {5,6}.
    fn two_families() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .insert_corpus(Corpus {
                id: 1,
                docket_id: "FWS-R9-ES-2011-0104".into(),
                method: CorpusMethod::FourGram,
                metadata: serde_json::json!({}),
            })
            .unwrap();
        for id in 1..=9 {
            let metadata = DocumentMetadata {
                id,
                title: None,
                submitter_name: None,
                submitter_organization: None,
            };
            store.insert_document(1, metadata, "text").unwrap();
        }
        for (a, b, score) in [
            (1, 2, 0.95),
            (3, 4, 0.95),
            (2, 3, 0.60),
            (5, 6, 0.92),
            (7, 8, 0.95),
            (8, 9, 0.93),
            (6, 7, 0.70),
        ] {
            store.insert_edge(1, a, b, score).unwrap();
        }
        store
    }

    fn child_members(node: &HierarchyNode) -> Vec<Vec<DocId>> {
        node.children()
            .iter()
            .map(|c| c.members().iter().copied().collect())
            .collect()
    }

    #[tokio::test]
    async fn test_siblings_split_independently() {
        let store = two_families();
        let params = HierarchyParams::new(vec![0.5, 0.9], 2);
        let h = build_hierarchy(&store, 1, &params, &CancelToken::new())
            .await
            .unwrap();

        let tops: Vec<(DocId, usize)> = h.nodes.iter().map(|n| (n.name(), n.size())).collect();
        assert_eq!(tops, vec![(5, 5), (1, 4)]);

        assert_eq!(child_members(&h.nodes[0]), vec![vec![7, 8, 9], vec![5, 6]]);
        assert_eq!(child_members(&h.nodes[1]), vec![vec![1, 2], vec![3, 4]]);
        for top in &h.nodes {
            for child in top.children() {
                assert_eq!(child.cutoff(), 0.9);
                assert!(child.children().is_empty());
            }
        }
        assert_eq!(h.stats, ClusterStats { clustered: 9, unclustered: 0 });
        assert_eq!(h.trace_doc(8).iter().map(|e| e.size).collect::<Vec<_>>(), vec![5, 3]);
    }

    #[tokio::test]
    async fn test_min_cluster_size_prunes() {
        let (store, WorkedIds { a, b, c, .. }) = worked_example();
        let params = HierarchyParams::new(CUTOFFS.to_vec(), 3);
        let h = build_hierarchy(&store, 1, &params, &CancelToken::new())
            .await
            .unwrap();
        let top = &h.nodes[0];
        assert_eq!(
            chain(top).last().unwrap(),
            &(0.8, vec![a, b, c]),
            "the two-member 0.9 cluster is below the minimum size"
        );
    }

    #[tokio::test]
    async fn test_no_top_level_clusters() {
        let (store, _) = worked_example();
        let params = HierarchyParams::new(vec![0.99], 2);
        let h = build_hierarchy(&store, 1, &params, &CancelToken::new())
            .await
            .unwrap();
        assert!(h.nodes.is_empty());
        assert_eq!(h.stats, ClusterStats { clustered: 0, unclustered: 4 });
    }

    #[tokio::test]
    async fn test_phrases_when_requested() {
        let (store, WorkedIds { a, b, c, d }) = worked_example();
        store
            .insert_phrase(
                1,
                "clean air act",
                vec![
                    Occurrence { document_id: a, start: 0, end: 5 },
                    Occurrence { document_id: b, start: 0, end: 5 },
                    Occurrence { document_id: c, start: 0, end: 5 },
                ],
            )
            .unwrap();
        store
            .insert_phrase(
                1,
                "oppose",
                vec![Occurrence { document_id: d, start: 0, end: 3 }],
            )
            .unwrap();

        let params = HierarchyParams::new(CUTOFFS.to_vec(), 2).with_phrases(true);
        let h = build_hierarchy(&store, 1, &params, &CancelToken::new())
            .await
            .unwrap();
        let top = &h.nodes[0];
        assert_eq!(
            top.phrases(),
            &Phrases::Computed(vec!["clean air act".into(), "oppose".into()])
        );
        let child = &top.children()[0];
        assert_eq!(child.phrases(), &Phrases::Computed(vec!["clean air act".into()]));
    }

    #[tokio::test]
    async fn test_invalid_params_fail_before_store_access() {
        let (store, _) = worked_example();
        let params = HierarchyParams::new(vec![0.9, 0.5], 2);
        let err = build_hierarchy(&store, 999, &params, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_unknown_corpus() {
        let (store, _) = worked_example();
        let params = HierarchyParams::new(CUTOFFS.to_vec(), 2);
        let err = build_hierarchy(&store, 999, &params, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_cancelled_build_returns_nothing() {
        let (store, _) = worked_example();
        let params = HierarchyParams::new(CUTOFFS.to_vec(), 2);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = build_hierarchy(&store, 1, &params, &cancel).await.unwrap_err();
        assert!(matches!(err, ClusterError::Cancelled));
    }

    #[test]
    fn test_attach_children_enforces_invariants() {
        let mut parent = HierarchyNode::new(0.5, cluster(&[1, 2, 3, 4]));

        let outside = HierarchyNode::new(0.6, cluster(&[4, 5]));
        assert!(parent.attach_children(vec![outside]).is_err());

        let same_level = HierarchyNode::new(0.5, cluster(&[1, 2]));
        assert!(parent.attach_children(vec![same_level]).is_err());

        let overlapping = vec![
            HierarchyNode::new(0.6, cluster(&[1, 2])),
            HierarchyNode::new(0.6, cluster(&[2, 3])),
        ];
        assert!(parent.attach_children(overlapping).is_err());

        let ok = vec![
            HierarchyNode::new(0.6, cluster(&[1, 2])),
            HierarchyNode::new(0.6, cluster(&[3, 4])),
        ];
        assert!(parent.attach_children(ok).is_ok());
        assert_eq!(parent.children().len(), 2);
    }

    #[test]
    fn test_min_cluster_size_policy() {
        assert_eq!(min_cluster_size_for(0, DEFAULT_MIN_CLUSTER_FRACTION), 2);
        assert_eq!(min_cluster_size_for(100, DEFAULT_MIN_CLUSTER_FRACTION), 2);
        assert_eq!(min_cluster_size_for(1_000, DEFAULT_MIN_CLUSTER_FRACTION), 5);
        assert_eq!(min_cluster_size_for(25_000, DEFAULT_MIN_CLUSTER_FRACTION), 125);
    }

    fn phrase(id: i64, text: &str, docs: &[DocId]) -> PhraseOccurrence {
        PhraseOccurrence {
            phrase_id: id,
            text: text.into(),
            count: docs.len(),
            occurrences: docs
                .iter()
                .map(|&document_id| Occurrence { document_id, start: 0, end: 1 })
                .collect(),
        }
    }

    #[test]
    fn test_top_phrases_ordering() {
        let phrases = vec![
            phrase(1, "bb", &[1, 2]),
            phrase(2, "aa", &[1, 2]),
            phrase(3, "longer", &[1, 2]),
            phrase(4, "everywhere", &[1, 2, 3]),
            phrase(5, "elsewhere", &[9]),
        ];
        let members = DocSet::from([1, 2, 3]);
        assert_eq!(
            top_phrases(&phrases, &members, 3),
            vec!["everywhere".to_string(), "longer".to_string(), "aa".to_string()]
        );
    }

    #[test]
    fn test_top_phrases_repeated_text_listed_once() {
        let phrases = vec![
            phrase(1, "clean air", &[1, 2, 3]),
            phrase(2, "rule", &[1, 2]),
            phrase(3, "clean air", &[4]),
        ];
        let members = DocSet::from([1, 2, 3, 4]);
        assert_eq!(
            top_phrases(&phrases, &members, 5),
            vec!["clean air".to_string(), "rule".to_string()]
        );
    }

    #[test]
    fn test_phrases_serialize_as_null_or_list() {
        assert_eq!(serde_json::to_string(&Phrases::NotComputed).unwrap(), "null");
        assert_eq!(
            serde_json::to_string(&Phrases::Computed(vec![])).unwrap(),
            "[]"
        );
    }
}
