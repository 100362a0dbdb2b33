//! opcluster - semantic clustering of PR design suggestions
//!
//! Groups short free-text design suggestions, extracted earlier from
//! pull-request review threads and comments, into semantically coherent
//! clusters, producing a structured artifact for a design-decision
//! knowledge base.
//!
//! # Architecture
//!
//! The pipeline is a single batch job with strictly sequential stages:
//!
//! - [`corpus`] - flattens the nested suggestion corpus into indexed items
//! - [`embedding`] - turns item texts into fixed-dimension vectors
//!   (injected capability; FastEmbed in production, a stub in tests)
//! - [`cluster`] - cosine distance matrix, agglomerative clustering,
//!   dendrogram and flat cut
//! - [`evaluate`] - silhouette, Calinski-Harabasz and size statistics
//! - [`export`] - result assembly and atomic JSON artifacts
//! - [`pipeline`] - ties the stages together
//!
//! # Example
//!
//! ```rust,no_run
//! use opcluster::{config::ClusterConfig, corpus::SuggestionCorpus};
//! use opcluster::{embedding::FastEmbedProvider, pipeline};
//! use std::path::Path;
//!
//! # async fn example() -> opcluster::Result<()> {
//! let config = ClusterConfig::default();
//! let corpus = SuggestionCorpus::from_file(Path::new("suggestions.json"))?;
//! let provider = FastEmbedProvider::new(&config.model_name).await?;
//!
//! let output = pipeline::run(&config, &provider, &corpus).await?;
//! println!("{} clusters", output.result.clustering_info.n_clusters);
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod evaluate;
pub mod export;
pub mod pipeline;

pub use cluster::{Dendrogram, DistanceMatrix, HierarchicalClusterer, Linkage};
pub use config::ClusterConfig;
pub use corpus::{FlattenedItem, SuggestionCorpus};
pub use embedding::{EmbeddingProvider, FastEmbedProvider};
pub use error::{PipelineError, Result};
pub use evaluate::EvaluationMetrics;
pub use export::{RunResult, RunStats};
pub use pipeline::PipelineOutput;
