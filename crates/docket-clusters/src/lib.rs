//! # Docket Clusters
//!
//! **Near-duplicate and form-letter discovery for regulatory dockets.**
//!
//! Public comments on a rulemaking are often thousands of copies of a few
//! form letters. Given a precomputed pairwise similarity relation over a
//! docket's documents, Docket Clusters groups documents that are connected
//! above a similarity cutoff, arranges those groups into a multi-cutoff
//! hierarchy, ranks a group's documents by centrality, and highlights the
//! passages a document shares with the rest of its group.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────┐   ┌─────────────────────┐   ┌──────────┐
//! │ Upstream    │──▶│  import  │──▶│       SQLite        │◀──│ service  │──▶ dkc (JSON)
//! │ export JSON │   │          │   │ corpora/similarities│   │ + cache  │
//! └─────────────┘   └──────────┘   └─────────────────────┘   └──────────┘
//! ```
//!
//! The clustering algorithms live in `docket-clusters-core` and only see the
//! [`store::SimilarityStore`] trait; this crate provides the SQLite store,
//! the cache, configuration and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! dkc init
//! dkc import ./export/EPA-HQ-OAR-2009-0234.json
//! dkc clusters EPA-HQ-OAR-2009-0234 --cutoff 0.8
//! dkc hierarchy EPA-HQ-OAR-2009-0234 --phrases
//! dkc document EPA-HQ-OAR-2009-0234 1201 1377
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Database schema migrations (idempotent) |
//! | [`import`] | Corpus import from the upstream JSON export |
//! | [`sqlite_store`] | `SimilarityStore` over SQLite |
//! | [`cache`] | TTL, single-flight result cache |
//! | [`service`] | Docket-level clustering operations |
//! | [`commands`] | CLI query commands |
//! | [`stats`] | Database statistics |

pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod import;
pub mod migrate;
pub mod service;
pub mod sqlite_store;
pub mod stats;

pub use docket_clusters_core::store;
pub use docket_clusters_core::{CancelToken, ClusterError};
pub use service::ClusterService;
pub use sqlite_store::SqliteStore;
