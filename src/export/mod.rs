//! Result assembly and export.
//!
//! Builds the persisted artifacts of a run: the clustering result
//! (`clustering_info` + `evaluation_metrics` + per-cluster item
//! listings) and the dendrogram tree consumed by the external
//! visualizer. Writes are all-or-nothing: content goes to a temp file in
//! the target directory and is renamed into place, so a failed
//! serialization or write never leaves a partial artifact behind.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

use crate::cluster::{Dendrogram, Linkage};
use crate::config::ClusterConfig;
use crate::corpus::{FlattenedItem, ItemMetadata};
use crate::error::Result;
use crate::evaluate::{cluster_sizes, EvaluationMetrics};

/// Run configuration echoed into the artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringInfo {
    pub timestamp: String,
    pub model_name: String,
    pub distance_threshold: f64,
    pub linkage_method: Linkage,
    pub min_cluster_size: usize,
    pub n_samples: usize,
    pub n_clusters: usize,
    pub cluster_ids: Vec<usize>,
}

/// One clustered item with its threaded-through metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterItem {
    pub index: usize,
    pub text: String,
    pub metadata: ItemMetadata,
}

/// One flat cluster and its members, sorted by item index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: usize,
    pub size: usize,
    /// Below the configured `min_cluster_size`. Membership is kept:
    /// redistributing members has no single well-defined target.
    pub small: bool,
    pub items: Vec<ClusterItem>,
}

/// Counts of recoverable conditions accumulated over the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Opinions skipped for missing both text fields.
    pub skipped_malformed: usize,
    /// Items dropped because the embedding provider failed for them.
    pub embedding_failures: usize,
    /// Items that made it into the clustering.
    pub clustered_items: usize,
}

/// The top-level artifact of one pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub clustering_info: ClusteringInfo,
    pub evaluation_metrics: EvaluationMetrics,
    pub run_stats: RunStats,
    pub clusters: BTreeMap<String, ClusterSummary>,
}

/// Assemble a [`RunResult`] from the run's pieces.
///
/// `items` and `labels` are parallel: `labels[i]` is the cluster id of
/// `items[i]`. Items are listed per cluster in index order.
pub fn assemble(
    config: &ClusterConfig,
    items: &[FlattenedItem],
    labels: &[usize],
    metrics: EvaluationMetrics,
    stats: RunStats,
) -> RunResult {
    let sizes = cluster_sizes(labels);
    let mut cluster_ids: Vec<usize> = sizes.keys().copied().collect();
    cluster_ids.sort_unstable();

    let mut clusters: BTreeMap<String, ClusterSummary> = BTreeMap::new();
    for (item, &label) in items.iter().zip(labels.iter()) {
        let summary = clusters
            .entry(format!("cluster_{label}"))
            .or_insert_with(|| ClusterSummary {
                cluster_id: label,
                size: sizes[&label],
                small: sizes[&label] < config.min_cluster_size,
                items: Vec::new(),
            });
        summary.items.push(ClusterItem {
            index: item.index,
            text: item.text.clone(),
            metadata: item.metadata.clone(),
        });
    }

    RunResult {
        clustering_info: ClusteringInfo {
            timestamp: Local::now().to_rfc3339(),
            model_name: config.model_name.clone(),
            distance_threshold: config.distance_threshold,
            linkage_method: config.linkage_method,
            min_cluster_size: config.min_cluster_size,
            n_samples: items.len(),
            n_clusters: cluster_ids.len(),
            cluster_ids,
        },
        evaluation_metrics: metrics,
        run_stats: stats,
        clusters,
    }
}

/// Serialize `value` as pretty JSON and move it into place atomically.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = NamedTempFile::new_in(dir)?;
    std::fs::write(tmp.path(), &json)?;
    tmp.persist(path).map_err(|e| e.error)?;
    info!("wrote {} ({} bytes)", path.display(), json.len());
    Ok(())
}

/// Header block of the dendrogram artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DendrogramInfo {
    pub timestamp: String,
    pub model_name: String,
    pub distance_threshold: f64,
    pub linkage_method: Linkage,
    pub n_samples: usize,
    pub n_clusters: usize,
    pub max_distance: f64,
}

/// A node of the exported merge tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeNode {
    Leaf {
        id: usize,
        sample_index: usize,
        text: String,
        metadata: ItemMetadata,
        cluster_label: usize,
        distance: f64,
        count: usize,
    },
    Internal {
        id: usize,
        distance: f64,
        count: usize,
        children: Vec<TreeNode>,
    },
}

/// The dendrogram artifact consumed by the external visualizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DendrogramTree {
    pub dendrogram_info: DendrogramInfo,
    pub tree: TreeNode,
}

/// Build the exported merge tree from a dendrogram and the flat labels.
pub fn dendrogram_tree(
    config: &ClusterConfig,
    dendro: &Dendrogram,
    items: &[FlattenedItem],
    labels: &[usize],
) -> DendrogramTree {
    let n = dendro.n_items();
    let n_clusters = cluster_sizes(labels).len();

    // Root is the last merge (scipy ids: leaves 0..n-1, merge i is n+i);
    // a single-item run has no merges and the sole leaf is the root.
    let root_id = if dendro.n_merges() > 0 {
        n + dendro.n_merges() - 1
    } else {
        0
    };
    let mut counter = 0usize;
    let tree = build_node(root_id, dendro, items, labels, &mut counter);

    DendrogramTree {
        dendrogram_info: DendrogramInfo {
            timestamp: Local::now().to_rfc3339(),
            model_name: config.model_name.clone(),
            distance_threshold: config.distance_threshold,
            linkage_method: config.linkage_method,
            n_samples: items.len(),
            n_clusters,
            max_distance: dendro.max_distance(),
        },
        tree,
    }
}

fn build_node(
    node_id: usize,
    dendro: &Dendrogram,
    items: &[FlattenedItem],
    labels: &[usize],
    counter: &mut usize,
) -> TreeNode {
    let id = *counter;
    *counter += 1;

    let n = dendro.n_items();
    if node_id < n {
        let item = &items[node_id];
        TreeNode::Leaf {
            id,
            sample_index: node_id,
            text: item.text.clone(),
            metadata: item.metadata.clone(),
            cluster_label: labels[node_id],
            distance: 0.0,
            count: 1,
        }
    } else {
        // Missing merge would be an internal invariant break; render an
        // empty subtree instead of panicking.
        match dendro.merge(node_id - n) {
            Some(merge) => {
                let left = build_node(merge.cluster_a, dendro, items, labels, counter);
                let right = build_node(merge.cluster_b, dendro, items, labels, counter);
                TreeNode::Internal {
                    id,
                    distance: merge.distance,
                    count: merge.size,
                    children: vec![left, right],
                }
            }
            None => TreeNode::Internal {
                id,
                distance: 0.0,
                count: 0,
                children: Vec::new(),
            },
        }
    }
}
