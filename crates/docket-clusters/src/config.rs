//! TOML configuration parsing and validation.
//!
//! Only `[db]` is required; every other section falls back to defaults
//! matching the values the docket views have always used (cutoff 0.9,
//! hierarchy levels 0.5..0.9, minimum cluster size 0.5% of the docket,
//! hour-long cache).
//!
//! ```toml
//! [db]
//! path = "./data/dkc.sqlite"
//!
//! [clustering]
//! default_cutoff = 0.9
//! hierarchy_cutoffs = [0.5, 0.6, 0.7, 0.8, 0.9]
//! min_cluster_fraction = 0.005
//! phrase_limit = 5
//! normalization = "cluster_size"
//!
//! [cache]
//! ttl_secs = 3600
//! capacity = 256
//!
//! [compute]
//! timeout_secs = 120
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use docket_clusters_core::error::validate_cutoffs;
use docket_clusters_core::hierarchy::{DEFAULT_MIN_CLUSTER_FRACTION, DEFAULT_PHRASE_LIMIT};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Highlight intensity scaling, as named in the config file.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMode {
    ClusterSize,
    MaxFrequency,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClusteringConfig {
    #[serde(default = "default_cutoff")]
    pub default_cutoff: f64,
    #[serde(default = "default_hierarchy_cutoffs")]
    pub hierarchy_cutoffs: Vec<f64>,
    #[serde(default = "default_min_cluster_fraction")]
    pub min_cluster_fraction: f64,
    #[serde(default = "default_phrase_limit")]
    pub phrase_limit: usize,
    #[serde(default = "default_normalization")]
    pub normalization: NormalizationMode,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            default_cutoff: default_cutoff(),
            hierarchy_cutoffs: default_hierarchy_cutoffs(),
            min_cluster_fraction: default_min_cluster_fraction(),
            phrase_limit: default_phrase_limit(),
            normalization: default_normalization(),
        }
    }
}

fn default_cutoff() -> f64 {
    0.9
}
fn default_hierarchy_cutoffs() -> Vec<f64> {
    vec![0.5, 0.6, 0.7, 0.8, 0.9]
}
fn default_min_cluster_fraction() -> f64 {
    DEFAULT_MIN_CLUSTER_FRACTION
}
fn default_phrase_limit() -> usize {
    DEFAULT_PHRASE_LIMIT
}
fn default_normalization() -> NormalizationMode {
    NormalizationMode::ClusterSize
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            capacity: default_capacity(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_ttl_secs() -> u64 {
    3600
}
fn default_capacity() -> usize {
    256
}

#[derive(Debug, Deserialize, Clone)]
pub struct ComputeConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ComputeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    120
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    let clustering = &config.clustering;
    if !(0.0..=1.0).contains(&clustering.default_cutoff) {
        anyhow::bail!("clustering.default_cutoff must be in [0.0, 1.0]");
    }
    validate_cutoffs(&clustering.hierarchy_cutoffs)
        .map_err(|e| anyhow::anyhow!("clustering.hierarchy_cutoffs: {}", e))?;
    if !(clustering.min_cluster_fraction > 0.0 && clustering.min_cluster_fraction <= 1.0) {
        anyhow::bail!("clustering.min_cluster_fraction must be in (0.0, 1.0]");
    }

    if config.cache.ttl_secs == 0 {
        anyhow::bail!("cache.ttl_secs must be >= 1");
    }
    if config.cache.capacity == 0 {
        anyhow::bail!("cache.capacity must be >= 1");
    }
    if config.compute.timeout_secs == 0 {
        anyhow::bail!("compute.timeout_secs must be >= 1");
    }

    Ok(config)
}
