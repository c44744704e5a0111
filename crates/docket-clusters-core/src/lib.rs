//! # Docket Clusters Core
//!
//! Similarity clustering and hierarchy logic for Docket Clusters: data
//! models, the similarity store abstraction, flat partitioning, the
//! multi-cutoff hierarchy, centrality ranking, navigation queries, and
//! phrase-overlap highlighting.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Every operation
//! takes its [`store::SimilarityStore`] explicitly.

pub mod cancel;
pub mod centrality;
pub mod corpus;
pub mod error;
pub mod hierarchy;
pub mod highlight;
pub mod models;
pub mod navigate;
pub mod partition;
pub mod store;

#[cfg(test)]
mod testing;

pub use cancel::CancelToken;
pub use error::{ClusterError, Result};
