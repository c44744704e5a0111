//! Core data types for Docket Clusters.
//!
//! Corpora, documents, and similarity edges are produced upstream and are
//! read-only here. [`Cluster`], [`Clustering`], and
//! [`HierarchyNode`](crate::hierarchy::HierarchyNode) are derived and
//! recomputed on demand.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{ClusterError, Result};

/// Opaque corpus identifier.
pub type CorpusId = i64;

/// Numeric document identifier, unique within a corpus.
pub type DocId = i64;

/// An ordered set of document ids. Ordered so serialized output and
/// fingerprints are stable.
pub type DocSet = BTreeSet<DocId>;

/// Only this many leading characters of a document are analysed.
pub const MAX_ANALYZED_CHARS: usize = 10_000;

/// How a corpus' similarity relation was extracted upstream.
///
/// Preference order when several corpora cover the same docket:
/// 4-gram shingling, then sentence level, then anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorpusMethod {
    #[serde(rename = "4-gram")]
    FourGram,
    Sentence,
    Other,
}

impl CorpusMethod {
    /// Lower is preferred.
    pub fn preference(self) -> u8 {
        match self {
            CorpusMethod::FourGram => 1,
            CorpusMethod::Sentence => 2,
            CorpusMethod::Other => 3,
        }
    }

    /// Parse the upstream `parser` metadata value; unknown values are `Other`.
    pub fn from_parser(parser: &str) -> Self {
        match parser {
            "4-gram" => CorpusMethod::FourGram,
            "sentence" => CorpusMethod::Sentence,
            _ => CorpusMethod::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CorpusMethod::FourGram => "4-gram",
            CorpusMethod::Sentence => "sentence",
            CorpusMethod::Other => "other",
        }
    }
}

/// An analysis scope over one docket's document set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    pub id: CorpusId,
    pub docket_id: String,
    pub method: CorpusMethod,
    /// Free-form upstream metadata (JSON object).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Display metadata for a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub id: DocId,
    pub title: Option<String>,
    pub submitter_name: Option<String>,
    pub submitter_organization: Option<String>,
}

impl DocumentMetadata {
    /// Submitter name and organization, whichever are present, joined by `", "`.
    pub fn submitter(&self) -> String {
        [&self.submitter_name, &self.submitter_organization]
            .iter()
            .filter_map(|f| f.as_deref())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A document as seen by the analysis: the analysed text prefix plus
/// display metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: DocId,
    pub text: String,
    /// The stored text was longer than [`MAX_ANALYZED_CHARS`].
    pub truncated: bool,
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Build a document from its full stored text, keeping only the
    /// analysed prefix.
    pub fn from_full_text(full_text: &str, metadata: DocumentMetadata) -> Self {
        let (text, truncated) = match full_text.char_indices().nth(MAX_ANALYZED_CHARS) {
            Some((byte_idx, _)) => (full_text[..byte_idx].to_string(), true),
            None => (full_text.to_string(), false),
        };
        Self {
            id: metadata.id,
            text,
            truncated,
            metadata,
        }
    }
}

/// One undirected similarity score, stored with `low < high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub low: DocId,
    pub high: DocId,
    pub score: f64,
}

impl SimilarityEdge {
    /// Canonicalise `(a, b)` to `(low, high)`. Self-edges and scores outside
    /// `[0, 1]` are rejected.
    pub fn new(a: DocId, b: DocId, score: f64) -> Result<Self> {
        if a == b {
            return Err(ClusterError::invalid(format!(
                "self-similarity edge for document {}",
                a
            )));
        }
        if !(0.0..=1.0).contains(&score) {
            return Err(ClusterError::invalid(format!(
                "similarity score must be in [0.0, 1.0], got {}",
                score
            )));
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { low, high, score })
    }

    pub fn touches(&self, doc: DocId) -> bool {
        self.low == doc || self.high == doc
    }
}

/// A maximal connected set of at least two documents at some cutoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    name: DocId,
    members: DocSet,
}

impl Cluster {
    /// Returns `None` for components with fewer than two members; those are
    /// unclustered, not clusters.
    pub fn from_members(members: DocSet) -> Option<Self> {
        if members.len() < 2 {
            return None;
        }
        let name = *members.iter().next()?;
        Some(Self { name, members })
    }

    /// Canonical representative: the lowest member id.
    pub fn name(&self) -> DocId {
        self.name
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn members(&self) -> &DocSet {
        &self.members
    }

    pub fn contains(&self, doc: DocId) -> bool {
        self.members.contains(&doc)
    }

    pub fn into_members(self) -> DocSet {
        self.members
    }
}

impl Serialize for Cluster {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Cluster", 3)?;
        s.serialize_field("name", &self.name)?;
        s.serialize_field("size", &self.members.len())?;
        s.serialize_field("members", &self.members)?;
        s.end()
    }
}

/// Clustered / unclustered document counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ClusterStats {
    pub clustered: usize,
    pub unclustered: usize,
}

/// A flat clustering of a candidate set at one cutoff.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clustering {
    pub cutoff: f64,
    /// Ordered by size (desc), then name (asc).
    pub clusters: Vec<Cluster>,
    pub stats: ClusterStats,
}

impl Clustering {
    /// The cluster containing `doc`, if it clusters at this cutoff.
    pub fn cluster_containing(&self, doc: DocId) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.contains(doc))
    }

    pub fn largest(&self) -> Option<&Cluster> {
        self.clusters.first()
    }
}

/// Deterministic cluster ordering: size descending, then name ascending.
pub fn sort_clusters(clusters: &mut [Cluster]) {
    clusters.sort_by(|a, b| b.size().cmp(&a.size()).then(a.name.cmp(&b.name)));
}

/// A half-open character range `[start, end)` of one phrase occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub document_id: DocId,
    pub start: usize,
    pub end: usize,
}

/// A recurring phrase and where it occurs within a document set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhraseOccurrence {
    pub phrase_id: i64,
    pub text: String,
    /// Number of distinct documents of the queried set containing the phrase.
    pub count: usize,
    pub occurrences: Vec<Occurrence>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: DocId) -> DocumentMetadata {
        DocumentMetadata {
            id,
            title: None,
            submitter_name: None,
            submitter_organization: None,
        }
    }

    #[test]
    fn test_edge_canonical_order() {
        let e = SimilarityEdge::new(9, 3, 0.4).unwrap();
        assert_eq!((e.low, e.high), (3, 9));
        assert!(e.touches(9));
        assert!(!e.touches(4));
    }

    #[test]
    fn test_edge_rejects_bad_input() {
        assert!(SimilarityEdge::new(1, 1, 0.5).is_err());
        assert!(SimilarityEdge::new(1, 2, 1.5).is_err());
        assert!(SimilarityEdge::new(1, 2, -0.1).is_err());
    }

    #[test]
    fn test_cluster_requires_two_members() {
        assert!(Cluster::from_members(DocSet::from([4])).is_none());
        let c = Cluster::from_members(DocSet::from([8, 4, 6])).unwrap();
        assert_eq!(c.name(), 4);
        assert_eq!(c.size(), 3);
    }

    #[test]
    fn test_cluster_ordering() {
        let mut clusters = vec![
            Cluster::from_members(DocSet::from([10, 11])).unwrap(),
            Cluster::from_members(DocSet::from([1, 2, 3])).unwrap(),
            Cluster::from_members(DocSet::from([5, 6])).unwrap(),
        ];
        sort_clusters(&mut clusters);
        let names: Vec<DocId> = clusters.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec![1, 5, 10]);
    }

    #[test]
    fn test_document_truncation() {
        let short = Document::from_full_text("hello", meta(1));
        assert!(!short.truncated);
        assert_eq!(short.text, "hello");

        let long_text: String = "é".repeat(MAX_ANALYZED_CHARS + 5);
        let long = Document::from_full_text(&long_text, meta(2));
        assert!(long.truncated);
        assert_eq!(long.text.chars().count(), MAX_ANALYZED_CHARS);
    }

    #[test]
    fn test_submitter_join() {
        let mut m = meta(1);
        assert_eq!(m.submitter(), "");
        m.submitter_name = Some("Jane Doe".into());
        assert_eq!(m.submitter(), "Jane Doe");
        m.submitter_organization = Some("Sierra Club".into());
        assert_eq!(m.submitter(), "Jane Doe, Sierra Club");
        m.submitter_name = Some(String::new());
        assert_eq!(m.submitter(), "Sierra Club");
    }

    #[test]
    fn test_method_preference() {
        assert!(CorpusMethod::FourGram.preference() < CorpusMethod::Sentence.preference());
        assert!(CorpusMethod::Sentence.preference() < CorpusMethod::Other.preference());
        assert_eq!(CorpusMethod::from_parser("4-gram"), CorpusMethod::FourGram);
        assert_eq!(CorpusMethod::from_parser("word2vec"), CorpusMethod::Other);
        assert_eq!(
            serde_json::to_string(&CorpusMethod::FourGram).unwrap(),
            "\"4-gram\""
        );
    }
}
