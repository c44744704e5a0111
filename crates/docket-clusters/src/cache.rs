//! In-process result cache with a fixed time-to-live and single-flight
//! computation.
//!
//! Each key maps to a slot holding a [`tokio::sync::OnceCell`]. Callers that
//! ask for the same uncomputed key share the slot, so only one of them runs
//! the computation and the rest await its result. A computation that fails,
//! times out, or is dropped leaves the cell empty: nothing is committed and
//! the next caller computes again.
//!
//! Entries expire `ttl` after the value was committed, however often they
//! are read. Capacity is bounded with LRU eviction (`lru` crate).

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

use docket_clusters_core::centrality::RankedDocument;
use docket_clusters_core::hierarchy::{Hierarchy, HierarchyParams};
use docket_clusters_core::models::{Clustering, Corpus, CorpusId, DocSet};

use crate::config::CacheConfig;

type Slot<V> = Arc<OnceCell<(Instant, V)>>;

/// A bounded, TTL-expiring, single-flight cache.
pub struct TtlCache<K, V> {
    name: &'static str,
    ttl: Duration,
    slots: Mutex<LruCache<K, Slot<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(name: &'static str, capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            ttl,
            slots: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Return the cached value for `key`, computing it with `compute` if it
    /// is absent or expired.
    pub async fn get_or_try_compute<F, Fut, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(&key);
        let (_, value) = slot
            .get_or_try_init(|| async {
                log::debug!("{} cache: computing {:?}", self.name, key);
                compute().await.map(|v| (Instant::now(), v))
            })
            .await?;
        Ok(value.clone())
    }

    /// The committed, unexpired value for `key`, if any.
    pub fn peek(&self, key: &K) -> Option<V> {
        let mut slots = self.lock();
        let (at, value) = slots.get(key)?.get()?;
        if at.elapsed() >= self.ttl {
            return None;
        }
        Some(value.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<K, Slot<V>>> {
        // The guarded map stays consistent even if a holder panicked.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The live slot for `key`, replacing an expired one.
    fn slot(&self, key: &K) -> Slot<V> {
        let mut slots = self.lock();
        if let Some(slot) = slots.get(key) {
            match slot.get() {
                Some((at, _)) if at.elapsed() >= self.ttl => {
                    log::debug!("{} cache: expired {:?}", self.name, key);
                }
                Some(_) => {
                    log::debug!("{} cache: hit {:?}", self.name, key);
                    return slot.clone();
                }
                // In flight, or a previous attempt failed.
                None => return slot.clone(),
            }
        }
        let slot: Slot<V> = Arc::new(OnceCell::new());
        slots.put(key.clone(), slot.clone());
        slot
    }
}

/// Order-independent fingerprint of a document id set (SHA-256, hex).
pub fn fingerprint(doc_ids: &DocSet) -> String {
    let mut hasher = Sha256::new();
    for id in doc_ids {
        hasher.update(id.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClustersKey {
    pub corpus_id: CorpusId,
    cutoff_bits: u64,
    candidates: Option<String>,
}

impl ClustersKey {
    pub fn new(corpus_id: CorpusId, candidates: Option<&DocSet>, cutoff: f64) -> Self {
        Self {
            corpus_id,
            cutoff_bits: cutoff.to_bits(),
            candidates: candidates.map(fingerprint),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HierarchyKey {
    pub corpus_id: CorpusId,
    cutoff_bits: Vec<u64>,
    min_cluster_size: usize,
    compute_phrases: bool,
    phrase_limit: usize,
}

impl HierarchyKey {
    pub fn new(corpus_id: CorpusId, params: &HierarchyParams) -> Self {
        Self {
            corpus_id,
            cutoff_bits: params.cutoffs.iter().map(|c| c.to_bits()).collect(),
            min_cluster_size: params.effective_min_size(),
            compute_phrases: params.compute_phrases,
            phrase_limit: params.phrase_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CentralityKey {
    pub corpus_id: CorpusId,
    doc_ids: String,
}

impl CentralityKey {
    pub fn new(corpus_id: CorpusId, doc_ids: &DocSet) -> Self {
        Self {
            corpus_id,
            doc_ids: fingerprint(doc_ids),
        }
    }
}

/// One [`TtlCache`] per cached operation.
pub struct ResultCache {
    pub corpora: TtlCache<String, Corpus>,
    pub clusters: TtlCache<ClustersKey, Arc<Clustering>>,
    pub hierarchies: TtlCache<HierarchyKey, Arc<Hierarchy>>,
    pub centrality: TtlCache<CentralityKey, Arc<Vec<RankedDocument>>>,
}

impl ResultCache {
    pub fn new(config: &CacheConfig) -> Self {
        let ttl = config.ttl();
        Self {
            corpora: TtlCache::new("corpus", config.capacity, ttl),
            clusters: TtlCache::new("clusters", config.capacity, ttl),
            hierarchies: TtlCache::new("hierarchy", config.capacity, ttl),
            centrality: TtlCache::new("centrality", config.capacity, ttl),
        }
    }
}
