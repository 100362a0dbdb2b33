//! Clustering quality evaluation.
//!
//! Read-only summaries over the distance matrix, the embedding vectors
//! and the flat cluster labels. The silhouette score and the
//! Calinski-Harabasz index are undefined when the cluster count is 1 or
//! equals the item count; they are reported as `None` (serialized as
//! explicit `null`) rather than a sentinel value. Cluster-size
//! statistics are always defined.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::cluster::DistanceMatrix;

/// Run-level quality summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub silhouette_score: Option<f64>,
    pub calinski_harabasz_score: Option<f64>,
    pub n_clusters: usize,
    pub min_cluster_size: usize,
    pub max_cluster_size: usize,
    pub avg_cluster_size: f64,
}

/// Per-cluster cardinalities, keyed by cluster label.
pub fn cluster_sizes(labels: &[usize]) -> BTreeMap<usize, usize> {
    let mut sizes = BTreeMap::new();
    for &label in labels {
        *sizes.entry(label).or_insert(0) += 1;
    }
    sizes
}

/// Mean silhouette over all items, computed from the distance matrix.
///
/// Per item: `(b - a) / max(a, b)` with `a` the mean distance to other
/// members of its own cluster and `b` the mean distance to the nearest
/// other cluster. Items in singleton clusters contribute 0. `None`
/// unless `2 <= k <= n - 1`.
pub fn silhouette_score(matrix: &DistanceMatrix, labels: &[usize]) -> Option<f64> {
    let n = labels.len();
    let k = cluster_sizes(labels).len();
    if n < 2 || k < 2 || k >= n {
        return None;
    }

    let mut total = 0.0;
    for i in 0..n {
        // Sum and count of distances from i to every cluster.
        let mut per_cluster: BTreeMap<usize, (f64, usize)> = BTreeMap::new();
        for j in 0..n {
            if j == i {
                continue;
            }
            let entry = per_cluster.entry(labels[j]).or_insert((0.0, 0));
            entry.0 += matrix.get(i, j);
            entry.1 += 1;
        }

        let own = labels[i];
        let s = match per_cluster.get(&own) {
            Some(&(sum, count)) if count > 0 => {
                let a = sum / count as f64;
                let b = per_cluster
                    .iter()
                    .filter(|(&label, _)| label != own)
                    .map(|(_, &(sum, count))| sum / count as f64)
                    .fold(f64::INFINITY, f64::min);
                let denom = a.max(b);
                if denom > 0.0 {
                    (b - a) / denom
                } else {
                    0.0
                }
            }
            // Singleton cluster: intra-cluster distance undefined.
            _ => 0.0,
        };
        total += s;
    }
    Some(total / n as f64)
}

/// Calinski-Harabasz index: between-cluster dispersion over
/// within-cluster dispersion, scaled by degrees of freedom.
///
/// `None` under the same degenerate conditions as the silhouette; 1.0
/// when the within-cluster dispersion is exactly zero.
pub fn calinski_harabasz(vectors: &[Vec<f32>], labels: &[usize]) -> Option<f64> {
    let n = labels.len();
    let sizes = cluster_sizes(labels);
    let k = sizes.len();
    if n < 2 || k < 2 || k >= n || vectors.len() != n {
        return None;
    }
    let dim = vectors[0].len();

    let mut overall = vec![0.0f64; dim];
    for v in vectors {
        for (acc, x) in overall.iter_mut().zip(v.iter()) {
            *acc += *x as f64;
        }
    }
    for acc in overall.iter_mut() {
        *acc /= n as f64;
    }

    let mut centroids: BTreeMap<usize, Vec<f64>> = sizes
        .keys()
        .map(|&label| (label, vec![0.0f64; dim]))
        .collect();
    for (v, &label) in vectors.iter().zip(labels.iter()) {
        let centroid = centroids.get_mut(&label)?;
        for (acc, x) in centroid.iter_mut().zip(v.iter()) {
            *acc += *x as f64;
        }
    }
    for (label, centroid) in centroids.iter_mut() {
        let size = sizes[label] as f64;
        for acc in centroid.iter_mut() {
            *acc /= size;
        }
    }

    let between: f64 = centroids
        .iter()
        .map(|(label, centroid)| {
            let sq: f64 = centroid
                .iter()
                .zip(overall.iter())
                .map(|(c, o)| (c - o) * (c - o))
                .sum();
            sizes[label] as f64 * sq
        })
        .sum();

    let within: f64 = vectors
        .iter()
        .zip(labels.iter())
        .map(|(v, label)| {
            let centroid = &centroids[label];
            v.iter()
                .zip(centroid.iter())
                .map(|(x, c)| (*x as f64 - c) * (*x as f64 - c))
                .sum::<f64>()
        })
        .sum();

    if within <= 0.0 {
        return Some(1.0);
    }
    Some((between / (k - 1) as f64) / (within / (n - k) as f64))
}

/// Compute the full metric set for a clustering.
pub fn evaluate(
    matrix: &DistanceMatrix,
    vectors: &[Vec<f32>],
    labels: &[usize],
) -> EvaluationMetrics {
    let sizes = cluster_sizes(labels);
    let n_clusters = sizes.len();
    let min = sizes.values().copied().min().unwrap_or(0);
    let max = sizes.values().copied().max().unwrap_or(0);
    let avg = if n_clusters > 0 {
        labels.len() as f64 / n_clusters as f64
    } else {
        0.0
    };

    let metrics = EvaluationMetrics {
        silhouette_score: silhouette_score(matrix, labels),
        calinski_harabasz_score: calinski_harabasz(vectors, labels),
        n_clusters,
        min_cluster_size: min,
        max_cluster_size: max,
        avg_cluster_size: avg,
    };
    info!(
        "evaluation: {} clusters, silhouette {:?}, CH {:?}",
        n_clusters, metrics.silhouette_score, metrics.calinski_harabasz_score
    );
    metrics
}

/// Trivial metrics for a degenerate run (single cluster over n items).
pub fn trivial_metrics(n_items: usize) -> EvaluationMetrics {
    EvaluationMetrics {
        silhouette_score: None,
        calinski_harabasz_score: None,
        n_clusters: 1,
        min_cluster_size: n_items,
        max_cluster_size: n_items,
        avg_cluster_size: n_items as f64,
    }
}
