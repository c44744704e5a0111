//! Docket-level clustering operations.
//!
//! [`ClusterService`] ties the clustering core to a store, the result cache
//! and the configured defaults. Every expensive computation runs through the
//! cache and under the compute timeout; a timed-out computation trips its
//! [`CancelToken`], fails with `ComputationFailed` and is not cached.
//!
//! The docket-level operations return the shapes the docket browser
//! consumes: a cluster list with a suggested cluster/document to open
//! first, a cluster's documents in centrality order, and a document
//! highlighted against its cluster.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use docket_clusters_core::centrality::{rank_by_centrality, RankedDocument};
use docket_clusters_core::corpus::select_corpus;
use docket_clusters_core::error::{validate_cutoff, ClusterError, Result};
use docket_clusters_core::hierarchy::{
    build_hierarchy, min_cluster_size_for, Hierarchy, HierarchyNode, HierarchyParams,
};
use docket_clusters_core::highlight::{highlight, HighlightRun, Normalization};
use docket_clusters_core::models::{ClusterStats, Clustering, Corpus, CorpusId, DocId, DocSet};
use docket_clusters_core::navigate::TraceEntry;
use docket_clusters_core::partition;
use docket_clusters_core::store::SimilarityStore;
use docket_clusters_core::CancelToken;

use crate::cache::{CentralityKey, ClustersKey, HierarchyKey, ResultCache};
use crate::config::{Config, NormalizationMode};

/// Defaults applied when a request leaves a parameter out.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub default_cutoff: f64,
    pub hierarchy_cutoffs: Vec<f64>,
    pub min_cluster_fraction: f64,
    pub phrase_limit: usize,
    pub normalization: NormalizationMode,
    pub timeout: Duration,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_cutoff: config.clustering.default_cutoff,
            hierarchy_cutoffs: config.clustering.hierarchy_cutoffs.clone(),
            min_cluster_fraction: config.clustering.min_cluster_fraction,
            phrase_limit: config.clustering.phrase_limit,
            normalization: config.clustering.normalization,
            timeout: config.compute.timeout(),
        }
    }
}

/// A cluster reference in a docket listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterRef {
    pub id: DocId,
    pub size: usize,
}

/// The cluster and document a browser should open first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prepopulate {
    pub document: DocId,
    pub cluster: DocId,
    pub cutoff: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub corpus_id: CorpusId,
    pub cutoff: f64,
    pub clusters: Vec<ClusterRef>,
    pub stats: ClusterStats,
    pub prepopulate: Option<Prepopulate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchySummary {
    pub hierarchy: Hierarchy,
    pub prepopulate: Option<Prepopulate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentEntry {
    pub id: DocId,
    pub title: Option<String>,
    pub submitter: String,
    pub centrality: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterDocuments {
    pub id: DocId,
    pub cutoff: f64,
    pub documents: Vec<DocumentEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentHighlight {
    pub document: DocId,
    pub cluster: DocId,
    pub cutoff: f64,
    pub title: Option<String>,
    /// The stored text was cut to the analysed prefix.
    pub truncated: bool,
    pub runs: Vec<HighlightRun>,
    pub cluster_sizes: Vec<TraceEntry>,
}

pub struct ClusterService<S> {
    store: Arc<S>,
    cache: ResultCache,
    settings: ServiceSettings,
}

impl<S: SimilarityStore> ClusterService<S> {
    pub fn new(store: Arc<S>, cache: ResultCache, settings: ServiceSettings) -> Self {
        Self {
            store,
            cache,
            settings,
        }
    }

    pub fn from_config(store: S, config: &Config) -> Self {
        Self::new(
            Arc::new(store),
            ResultCache::new(&config.cache),
            ServiceSettings::from_config(config),
        )
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Run `work` under the compute timeout. On expiry `cancel`, if the
    /// computation watches one, is tripped, and the dropped computation
    /// leaves nothing in the cache.
    async fn bounded<T, F>(&self, what: &str, cancel: Option<&CancelToken>, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.settings.timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                if let Some(cancel) = cancel {
                    cancel.cancel();
                }
                log::warn!("{} timed out after {:?}", what, self.settings.timeout);
                Err(ClusterError::ComputationFailed(format!(
                    "{} timed out after {}s",
                    what,
                    self.settings.timeout.as_secs_f64()
                )))
            }
        }
    }

    /// The preferred corpus of a docket: 4-gram over sentence over other,
    /// lowest id among equals.
    pub async fn resolve_corpus(&self, docket_id: &str) -> Result<Corpus> {
        let store = self.store.clone();
        self.cache
            .corpora
            .get_or_try_compute(docket_id.to_string(), || async move {
                let corpora = store.corpora_for_docket(docket_id).await?;
                select_corpus(corpora).ok_or_else(|| {
                    ClusterError::not_found(format!("no corpus for docket {}", docket_id))
                })
            })
            .await
    }

    pub async fn clusters(
        &self,
        corpus_id: CorpusId,
        candidates: Option<&DocSet>,
        cutoff: f64,
    ) -> Result<Arc<Clustering>> {
        let key = ClustersKey::new(corpus_id, candidates, cutoff);
        let store = self.store.clone();
        let work = self.cache.clusters.get_or_try_compute(key, || async move {
            partition::clusters(store.as_ref(), corpus_id, candidates, cutoff)
                .await
                .map(Arc::new)
        });
        self.bounded("clustering", None, work).await
    }

    /// Build (or fetch) a hierarchy. Parameters are validated before the
    /// cache is consulted.
    pub async fn hierarchy(
        &self,
        corpus_id: CorpusId,
        params: HierarchyParams,
        cancel: &CancelToken,
    ) -> Result<Arc<Hierarchy>> {
        params.validate()?;
        let key = HierarchyKey::new(corpus_id, &params);
        let store = self.store.clone();
        let work = self.cache.hierarchies.get_or_try_compute(key, || async move {
            build_hierarchy(store.as_ref(), corpus_id, &params, cancel)
                .await
                .map(Arc::new)
        });
        self.bounded("hierarchy build", Some(cancel), work).await
    }

    pub async fn rank(
        &self,
        corpus_id: CorpusId,
        doc_ids: &DocSet,
    ) -> Result<Arc<Vec<RankedDocument>>> {
        let key = CentralityKey::new(corpus_id, doc_ids);
        let store = self.store.clone();
        let work = self.cache.centrality.get_or_try_compute(key, || async move {
            rank_by_centrality(store.as_ref(), corpus_id, doc_ids)
                .await
                .map(Arc::new)
        });
        self.bounded("centrality ranking", None, work).await
    }

    /// Hierarchy parameters with configured defaults filled in. The minimum
    /// cluster size defaults to a share of the corpus size.
    pub async fn hierarchy_params(
        &self,
        corpus_id: CorpusId,
        cutoffs: Option<Vec<f64>>,
        min_cluster_size: Option<usize>,
        compute_phrases: bool,
    ) -> Result<HierarchyParams> {
        let min_cluster_size = match min_cluster_size {
            Some(size) => size,
            None => {
                let total = self.store.document_count(corpus_id).await?;
                min_cluster_size_for(total, self.settings.min_cluster_fraction)
            }
        };
        let mut params = HierarchyParams::new(
            cutoffs.unwrap_or_else(|| self.settings.hierarchy_cutoffs.clone()),
            min_cluster_size,
        )
        .with_phrases(compute_phrases);
        params.phrase_limit = self.settings.phrase_limit;
        Ok(params)
    }

    async fn default_hierarchy(&self, corpus_id: CorpusId) -> Result<Arc<Hierarchy>> {
        let params = self.hierarchy_params(corpus_id, None, None, false).await?;
        self.hierarchy(corpus_id, params, &CancelToken::new()).await
    }

    /// NotFound unless `doc_id` is a document of the corpus.
    async fn require_document(&self, corpus_id: CorpusId, doc_id: DocId) -> Result<()> {
        let found = self
            .store
            .documents_metadata(corpus_id, &DocSet::from([doc_id]))
            .await?;
        if found.is_empty() {
            return Err(ClusterError::not_found(format!(
                "document {} in corpus {}",
                doc_id, corpus_id
            )));
        }
        Ok(())
    }

    /// The top-ranked member of `members`.
    async fn exemplar(&self, corpus_id: CorpusId, members: &DocSet) -> Result<Option<DocId>> {
        Ok(self.rank(corpus_id, members).await?.first().map(|r| r.id))
    }

    /// Flat clusters of a docket at `cutoff` (default from config).
    ///
    /// `prepopulate` names the requested document and its cluster when the
    /// document clusters, else the exemplar of the largest cluster.
    pub async fn docket_clusters(
        &self,
        docket_id: &str,
        cutoff: Option<f64>,
        prepopulate_doc: Option<DocId>,
    ) -> Result<ClusterSummary> {
        let corpus = self.resolve_corpus(docket_id).await?;
        let cutoff = cutoff.unwrap_or(self.settings.default_cutoff);
        let clustering = self.clusters(corpus.id, None, cutoff).await?;

        let mut prepopulate = prepopulate_doc.and_then(|doc| {
            clustering.cluster_containing(doc).map(|c| Prepopulate {
                document: doc,
                cluster: c.name(),
                cutoff,
            })
        });
        if prepopulate.is_none() {
            if let Some(largest) = clustering.largest() {
                if let Some(document) = self.exemplar(corpus.id, largest.members()).await? {
                    prepopulate = Some(Prepopulate {
                        document,
                        cluster: largest.name(),
                        cutoff,
                    });
                }
            }
        }

        Ok(ClusterSummary {
            corpus_id: corpus.id,
            cutoff,
            clusters: clustering
                .clusters
                .iter()
                .map(|c| ClusterRef {
                    id: c.name(),
                    size: c.size(),
                })
                .collect(),
            stats: clustering.stats,
            prepopulate,
        })
    }

    /// The docket's dendrogram. `prepopulate` uses the node containing the
    /// requested document at `cutoff`, falling back to the exemplar of the
    /// largest top-level node.
    pub async fn docket_hierarchy(
        &self,
        docket_id: &str,
        cutoffs: Option<Vec<f64>>,
        min_cluster_size: Option<usize>,
        compute_phrases: bool,
        prepopulate_doc: Option<DocId>,
        cutoff: Option<f64>,
    ) -> Result<HierarchySummary> {
        let cutoff = cutoff.unwrap_or(self.settings.default_cutoff);
        validate_cutoff(cutoff)?;
        let corpus = self.resolve_corpus(docket_id).await?;
        let params = self
            .hierarchy_params(corpus.id, cutoffs, min_cluster_size, compute_phrases)
            .await?;
        let hierarchy = self.hierarchy(corpus.id, params, &CancelToken::new()).await?;

        let mut prepopulate = prepopulate_doc.and_then(|doc| {
            hierarchy.find_node(doc, cutoff).map(|node| Prepopulate {
                document: doc,
                cluster: node.name(),
                cutoff: node.cutoff(),
            })
        });
        if prepopulate.is_none() {
            if let Some(top) = hierarchy.largest() {
                if let Some(document) = self.exemplar(corpus.id, top.members()).await? {
                    prepopulate = Some(Prepopulate {
                        document,
                        cluster: top.name(),
                        cutoff: top.cutoff(),
                    });
                }
            }
        }

        Ok(HierarchySummary {
            hierarchy: hierarchy.as_ref().clone(),
            prepopulate,
        })
    }

    /// The documents of the flat cluster containing `cluster_id` at
    /// `cutoff`, most central first.
    pub async fn cluster_documents(
        &self,
        docket_id: &str,
        cluster_id: DocId,
        cutoff: Option<f64>,
    ) -> Result<ClusterDocuments> {
        let corpus = self.resolve_corpus(docket_id).await?;
        let cutoff = cutoff.unwrap_or(self.settings.default_cutoff);
        let clustering = self.clusters(corpus.id, None, cutoff).await?;
        let cluster = clustering.cluster_containing(cluster_id).ok_or_else(|| {
            ClusterError::not_found(format!(
                "no cluster contains {} at cutoff {}",
                cluster_id, cutoff
            ))
        })?;

        let ranked = self.rank(corpus.id, cluster.members()).await?;
        Ok(ClusterDocuments {
            id: cluster.name(),
            cutoff,
            documents: ranked
                .iter()
                .map(|r| DocumentEntry {
                    id: r.id,
                    title: r.metadata.title.clone(),
                    submitter: r.metadata.submitter(),
                    centrality: r.centrality,
                })
                .collect(),
        })
    }

    /// One document of a cluster, highlighted by how widely each passage
    /// is shared within the cluster.
    pub async fn document_in_cluster(
        &self,
        docket_id: &str,
        cluster_id: DocId,
        doc_id: DocId,
        cutoff: Option<f64>,
    ) -> Result<DocumentHighlight> {
        let corpus = self.resolve_corpus(docket_id).await?;
        let cutoff = cutoff.unwrap_or(self.settings.default_cutoff);
        let clustering = self.clusters(corpus.id, None, cutoff).await?;
        let cluster = clustering
            .cluster_containing(cluster_id)
            .filter(|c| c.contains(doc_id))
            .ok_or_else(|| {
                ClusterError::not_found(format!(
                    "document {} is not in cluster {} at cutoff {}",
                    doc_id, cluster_id, cutoff
                ))
            })?;

        let document = self
            .store
            .document(corpus.id, doc_id)
            .await?
            .ok_or_else(|| ClusterError::not_found(format!("document {}", doc_id)))?;
        let phrases = self
            .store
            .phrase_occurrences(corpus.id, cluster.members())
            .await?;
        let normalization = match self.settings.normalization {
            NormalizationMode::ClusterSize => Normalization::ClusterSize(cluster.size()),
            NormalizationMode::MaxFrequency => Normalization::MaxFrequency,
        };
        let runs = highlight(&document.text, &phrases, doc_id, normalization);
        let cluster_sizes = self.default_hierarchy(corpus.id).await?.trace_doc(doc_id);

        Ok(DocumentHighlight {
            document: doc_id,
            cluster: cluster.name(),
            cutoff,
            title: document.metadata.title,
            truncated: document.truncated,
            runs,
            cluster_sizes,
        })
    }

    /// Every level of the default hierarchy at which `doc_id` clusters.
    /// Empty when the document never clusters; NotFound when it is not a
    /// document of the docket's corpus.
    pub async fn trace(&self, docket_id: &str, doc_id: DocId) -> Result<Vec<TraceEntry>> {
        let corpus = self.resolve_corpus(docket_id).await?;
        self.require_document(corpus.id, doc_id).await?;
        Ok(self.default_hierarchy(corpus.id).await?.trace_doc(doc_id))
    }

    /// The default-hierarchy node containing `doc_id` at `cutoff`.
    pub async fn node(
        &self,
        docket_id: &str,
        doc_id: DocId,
        cutoff: f64,
    ) -> Result<Option<HierarchyNode>> {
        validate_cutoff(cutoff)?;
        let corpus = self.resolve_corpus(docket_id).await?;
        self.require_document(corpus.id, doc_id).await?;
        let hierarchy = self.default_hierarchy(corpus.id).await?;
        Ok(hierarchy.find_node(doc_id, cutoff).cloned())
    }
}
