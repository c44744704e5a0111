//! Query commands of the `dkc` CLI.
//!
//! Each command opens the configured database, runs one [`ClusterService`]
//! operation and prints the result as pretty JSON on stdout.

use anyhow::{Context, Result};
use serde::Serialize;

use docket_clusters_core::corpus::select_corpus;
use docket_clusters_core::models::{Corpus, CorpusId, DocId};
use docket_clusters_core::store::SimilarityStore;

use crate::config::Config;
use crate::db;
use crate::service::ClusterService;
use crate::sqlite_store::SqliteStore;

pub async fn open_service(config: &Config) -> Result<ClusterService<SqliteStore>> {
    let pool = db::connect(config).await?;
    Ok(ClusterService::from_config(SqliteStore::new(pool), config))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse a comma-separated cutoff list such as `0.5,0.7,0.9`.
pub fn parse_cutoffs(raw: &str) -> Result<Vec<f64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .with_context(|| format!("invalid cutoff {:?}", s))
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct CorpusListing {
    docket_id: String,
    preferred: Option<CorpusId>,
    corpora: Vec<Corpus>,
}

pub async fn run_corpora(config: &Config, docket_id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let corpora = store.corpora_for_docket(docket_id).await?;
    let preferred = select_corpus(corpora.clone()).map(|c| c.id);
    print_json(&CorpusListing {
        docket_id: docket_id.to_string(),
        preferred,
        corpora,
    })
}

pub async fn run_clusters(
    config: &Config,
    docket_id: &str,
    cutoff: Option<f64>,
    prepopulate: Option<DocId>,
) -> Result<()> {
    let service = open_service(config).await?;
    print_json(&service.docket_clusters(docket_id, cutoff, prepopulate).await?)
}

pub async fn run_hierarchy(
    config: &Config,
    docket_id: &str,
    cutoffs: Option<&str>,
    min_size: Option<usize>,
    phrases: bool,
    prepopulate: Option<DocId>,
    cutoff: Option<f64>,
) -> Result<()> {
    let cutoffs = cutoffs.map(parse_cutoffs).transpose()?;
    let service = open_service(config).await?;
    let summary = service
        .docket_hierarchy(docket_id, cutoffs, min_size, phrases, prepopulate, cutoff)
        .await?;
    print_json(&summary)
}

pub async fn run_cluster(
    config: &Config,
    docket_id: &str,
    cluster_id: DocId,
    cutoff: Option<f64>,
) -> Result<()> {
    let service = open_service(config).await?;
    print_json(&service.cluster_documents(docket_id, cluster_id, cutoff).await?)
}

pub async fn run_document(
    config: &Config,
    docket_id: &str,
    cluster_id: DocId,
    doc_id: DocId,
    cutoff: Option<f64>,
) -> Result<()> {
    let service = open_service(config).await?;
    print_json(
        &service
            .document_in_cluster(docket_id, cluster_id, doc_id, cutoff)
            .await?,
    )
}

pub async fn run_trace(config: &Config, docket_id: &str, doc_id: DocId) -> Result<()> {
    let service = open_service(config).await?;
    print_json(&service.trace(docket_id, doc_id).await?)
}

pub async fn run_node(config: &Config, docket_id: &str, doc_id: DocId, cutoff: f64) -> Result<()> {
    let service = open_service(config).await?;
    print_json(&service.node(docket_id, doc_id, cutoff).await?)
}
