//! Pipeline configuration.
//!
//! Every recognized option is an explicit field with a default, loaded
//! from an optional TOML file and overridden by CLI flags. Validation
//! happens once, up front, so later stages can trust the values.
//!
//! # Example
//!
//! ```
//! use opcluster::config::ClusterConfig;
//!
//! let mut config = ClusterConfig::default();
//! config.distance_threshold = 0.3;
//! config.validate().unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cluster::Linkage;
use crate::error::{PipelineError, Result};

/// Configuration for one clustering run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Embedding model identifier, passed opaquely to the provider.
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Dendrogram height at which flat clusters are cut.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f64,

    /// Inter-cluster distance rule for agglomerative merging.
    #[serde(default)]
    pub linkage_method: Linkage,

    /// Clusters smaller than this are flagged as small in the output.
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    /// Texts per embedding batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrent embedding batches in flight.
    #[serde(default = "default_embed_workers")]
    pub embed_workers: usize,

    /// Fatal ceiling on the per-item embedding failure rate.
    #[serde(default = "default_max_failure_rate")]
    pub max_failure_rate: f64,
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_distance_threshold() -> f64 {
    0.4
}

fn default_min_cluster_size() -> usize {
    2
}

fn default_batch_size() -> usize {
    32
}

fn default_embed_workers() -> usize {
    2
}

fn default_max_failure_rate() -> f64 {
    0.2
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            distance_threshold: default_distance_threshold(),
            linkage_method: Linkage::default(),
            min_cluster_size: default_min_cluster_size(),
            batch_size: default_batch_size(),
            embed_workers: default_embed_workers(),
            max_failure_rate: default_max_failure_rate(),
        }
    }
}

impl ClusterConfig {
    /// Load from a TOML file; absent keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: ClusterConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field against its documented range.
    pub fn validate(&self) -> Result<()> {
        if self.model_name.is_empty() {
            return Err(PipelineError::InvalidParameter {
                name: "model_name",
                message: "must not be empty".to_string(),
            });
        }
        if !self.distance_threshold.is_finite() || self.distance_threshold < 0.0 {
            return Err(PipelineError::InvalidParameter {
                name: "distance_threshold",
                message: format!(
                    "must be a finite value >= 0, got {}",
                    self.distance_threshold
                ),
            });
        }
        if self.min_cluster_size < 1 {
            return Err(PipelineError::InvalidParameter {
                name: "min_cluster_size",
                message: "must be at least 1".to_string(),
            });
        }
        if self.batch_size < 1 {
            return Err(PipelineError::InvalidParameter {
                name: "batch_size",
                message: "must be at least 1".to_string(),
            });
        }
        if self.embed_workers < 1 {
            return Err(PipelineError::InvalidParameter {
                name: "embed_workers",
                message: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.max_failure_rate) {
            return Err(PipelineError::InvalidParameter {
                name: "max_failure_rate",
                message: format!("must be within [0, 1], got {}", self.max_failure_rate),
            });
        }
        Ok(())
    }
}
