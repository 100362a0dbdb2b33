//! Error types for the clustering pipeline.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors produced by the clustering pipeline.
///
/// Recoverable conditions (malformed opinions, individual embedding
/// failures) are counted in [`crate::export::RunStats`] instead of
/// surfacing here; these variants are the fatal ones.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Fewer valid items than the clustering step can work with.
    #[error("cannot cluster {n_items} item(s); at least 2 valid items are required")]
    TooFewItems { n_items: usize },

    /// Embedding failures crossed the configured ceiling.
    #[error("embedding failed for {failed} of {total} items, above the {max_rate:.2} failure-rate ceiling")]
    EmbeddingFailureRate {
        failed: usize,
        total: usize,
        max_rate: f64,
    },

    /// Vectors returned by the provider do not share one dimensionality.
    #[error("embedding dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// The distance matrix contains a NaN or infinite entry.
    #[error("distance matrix contains a non-finite value at ({row}, {col})")]
    NonFiniteDistance { row: usize, col: usize },

    /// A configuration value failed validation.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        name: &'static str,
        message: String,
    },

    /// The embedding backend failed as a whole.
    #[error("embedding backend error: {0}")]
    Embedding(String),

    #[error("config file error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
