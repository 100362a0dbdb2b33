//! Distance computation and agglomerative clustering.
//!
//! [`DistanceMatrix`] holds the pairwise cosine distances,
//! [`HierarchicalClusterer`] builds a [`Dendrogram`] from them, and
//! cutting the dendrogram at a threshold yields flat cluster labels.

mod dendrogram;
mod engine;
mod matrix;

pub use dendrogram::{Dendrogram, Merge};
pub use engine::{HierarchicalClusterer, Linkage};
pub use matrix::DistanceMatrix;
