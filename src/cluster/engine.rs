//! Agglomerative hierarchical clustering.
//!
//! Bottom-up: every item starts as its own cluster and the two closest
//! clusters are merged until one remains, recording each merge in a
//! [`Dendrogram`]. Inter-cluster distance depends on the linkage rule:
//!
//! | Linkage  | Distance between clusters A, B                |
//! |----------|-----------------------------------------------|
//! | Single   | min pairwise distance                         |
//! | Complete | max pairwise distance                         |
//! | Average  | mean pairwise distance                        |
//! | Ward     | `(nA·nB)/(nA+nB) · ‖μA − μB‖²` (variance increase) |
//!
//! Single, complete and average are computed from the distance matrix
//! alone via Lance–Williams updates. Ward needs the raw embedding
//! vectors: it tracks a centroid per cluster and measures the increase
//! in within-cluster variance a merge would cause.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::dendrogram::Dendrogram;
use super::matrix::DistanceMatrix;
use crate::error::{PipelineError, Result};

/// Linkage rule for inter-cluster distance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Minimum pairwise distance; prone to chaining.
    Single,
    /// Maximum pairwise distance; compact clusters.
    Complete,
    /// Mean pairwise distance; balanced compromise.
    #[default]
    Average,
    /// Minimize the increase in within-cluster variance.
    Ward,
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Linkage::Single => "single",
            Linkage::Complete => "complete",
            Linkage::Average => "average",
            Linkage::Ward => "ward",
        };
        write!(f, "{s}")
    }
}

/// One active cluster during the merge loop.
struct Active {
    /// SciPy-style id: leaves 0..n-1, merge i creates n+i.
    id: usize,
    /// Lowest original member index, used for deterministic tie-breaks.
    lowest: usize,
    size: usize,
    /// Centroid of member vectors; only maintained for ward linkage.
    centroid: Vec<f64>,
}

/// Agglomerative clusterer over a precomputed distance matrix.
#[derive(Debug, Clone)]
pub struct HierarchicalClusterer {
    linkage: Linkage,
}

impl HierarchicalClusterer {
    pub fn new(linkage: Linkage) -> Self {
        Self { linkage }
    }

    /// Build the full dendrogram.
    ///
    /// `vectors` must hold one embedding per matrix row; only ward
    /// linkage reads them. Fails on fewer than 2 items or a matrix with
    /// non-finite entries. Equal-distance candidate pairs are resolved
    /// by the lower combined original member index, so the merge order
    /// is stable across runs.
    pub fn fit(&self, matrix: &DistanceMatrix, vectors: &[Vec<f32>]) -> Result<Dendrogram> {
        let n = matrix.n();
        if n < 2 {
            return Err(PipelineError::TooFewItems { n_items: n });
        }
        for i in 0..n {
            for j in 0..n {
                if !matrix.get(i, j).is_finite() {
                    return Err(PipelineError::NonFiniteDistance { row: i, col: j });
                }
            }
        }
        if self.linkage == Linkage::Ward && vectors.len() != n {
            return Err(PipelineError::InvalidParameter {
                name: "vectors",
                message: format!(
                    "ward linkage needs one vector per item, got {} for {} items",
                    vectors.len(),
                    n
                ),
            });
        }

        let mut active: Vec<Active> = (0..n)
            .map(|i| Active {
                id: i,
                lowest: i,
                size: 1,
                centroid: if self.linkage == Linkage::Ward {
                    vectors[i].iter().map(|x| *x as f64).collect()
                } else {
                    Vec::new()
                },
            })
            .collect();

        // Working inter-cluster distances, kept aligned with `active`.
        let mut dist: Vec<Vec<f64>> = match self.linkage {
            Linkage::Ward => (0..n)
                .map(|i| {
                    (0..n)
                        .map(|j| {
                            if i == j {
                                0.0
                            } else {
                                ward_delta(&active[i].centroid, 1, &active[j].centroid, 1)
                            }
                        })
                        .collect()
                })
                .collect(),
            _ => (0..n)
                .map(|i| (0..n).map(|j| matrix.get(i, j)).collect())
                .collect(),
        };

        let mut dendro = Dendrogram::new(n);

        for step in 0..(n - 1) {
            let (i, j, best) = closest_pair(&active, &dist);
            let new_size = active[i].size + active[j].size;
            dendro.add_merge(active[i].id, active[j].id, best, new_size);
            debug!(
                "merge {}: clusters {} + {} at distance {:.6}",
                step, active[i].id, active[j].id, best
            );

            // Lance-Williams updates use the pre-merge distances, so
            // compute the new row before dropping rows i and j.
            let lw_row: Vec<f64> = match self.linkage {
                Linkage::Ward => Vec::new(),
                _ => (0..active.len())
                    .filter(|&k| k != i && k != j)
                    .map(|k| {
                        let d_ik = dist[i][k];
                        let d_jk = dist[j][k];
                        match self.linkage {
                            Linkage::Single => d_ik.min(d_jk),
                            Linkage::Complete => d_ik.max(d_jk),
                            Linkage::Average => {
                                (active[i].size as f64 * d_ik + active[j].size as f64 * d_jk)
                                    / new_size as f64
                            }
                            Linkage::Ward => unreachable!(),
                        }
                    })
                    .collect(),
            };

            let merged = Active {
                id: n + step,
                lowest: active[i].lowest.min(active[j].lowest),
                size: new_size,
                centroid: if self.linkage == Linkage::Ward {
                    merge_centroids(
                        &active[i].centroid,
                        active[i].size,
                        &active[j].centroid,
                        active[j].size,
                    )
                } else {
                    Vec::new()
                },
            };

            // j > i always holds from closest_pair.
            active.remove(j);
            active.remove(i);
            dist.remove(j);
            dist.remove(i);
            for row in dist.iter_mut() {
                row.remove(j);
                row.remove(i);
            }

            let new_row: Vec<f64> = match self.linkage {
                Linkage::Ward => active
                    .iter()
                    .map(|c| ward_delta(&merged.centroid, merged.size, &c.centroid, c.size))
                    .collect(),
                _ => lw_row,
            };

            for (row, &d) in dist.iter_mut().zip(new_row.iter()) {
                row.push(d);
            }
            let mut last = new_row;
            last.push(0.0);
            dist.push(last);
            active.push(merged);
        }

        Ok(dendro)
    }
}

/// Find the closest active pair, breaking distance ties by the lower
/// combined original index (then lexicographically on the pair).
fn closest_pair(active: &[Active], dist: &[Vec<f64>]) -> (usize, usize, f64) {
    let mut best = f64::INFINITY;
    let mut best_key = (usize::MAX, usize::MAX, usize::MAX);
    let (mut bi, mut bj) = (0, 1);

    for i in 0..active.len() {
        for j in (i + 1)..active.len() {
            let d = dist[i][j];
            let lo = active[i].lowest.min(active[j].lowest);
            let hi = active[i].lowest.max(active[j].lowest);
            let key = (lo + hi, lo, hi);
            if d < best || (d == best && key < best_key) {
                best = d;
                best_key = key;
                bi = i;
                bj = j;
            }
        }
    }
    (bi, bj, best)
}

/// Ward criterion: increase in total within-cluster variance caused by
/// merging two clusters with the given centroids and sizes.
fn ward_delta(ca: &[f64], na: usize, cb: &[f64], nb: usize) -> f64 {
    let sq: f64 = ca
        .iter()
        .zip(cb.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum();
    (na as f64 * nb as f64) / (na + nb) as f64 * sq
}

fn merge_centroids(ca: &[f64], na: usize, cb: &[f64], nb: usize) -> Vec<f64> {
    let total = (na + nb) as f64;
    ca.iter()
        .zip(cb.iter())
        .map(|(a, b)| (a * na as f64 + b * nb as f64) / total)
        .collect()
}
