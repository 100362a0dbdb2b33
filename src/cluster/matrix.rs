//! Dense pairwise distance matrix.
//!
//! A row-major n×n buffer exposing exactly the operations the clustering
//! core needs. Distances are cosine: `1 − u·v / (‖u‖·‖v‖)`, clamped to
//! [0, 2] to absorb floating-point drift.

use crate::error::{PipelineError, Result};

/// Symmetric n×n matrix of pairwise distances with a zero diagonal.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    n: usize,
    data: Vec<f64>,
}

impl DistanceMatrix {
    /// An n×n matrix of zeros.
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n],
        }
    }

    /// Number of rows (= columns).
    pub fn n(&self) -> usize {
        self.n
    }

    /// Entry at (i, j).
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    /// Set both (i, j) and (j, i), preserving symmetry.
    #[inline]
    pub fn set_symmetric(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.n + j] = value;
        self.data[j * self.n + i] = value;
    }

    /// Build the cosine-distance matrix over a set of embedding vectors.
    ///
    /// All vectors must share one dimensionality. A zero vector is at
    /// maximum distance (2) from every other vector; the diagonal stays 0
    /// by convention. Any non-finite entry is rejected here so the
    /// clustering step can assume a clean matrix.
    pub fn from_embeddings(vectors: &[Vec<f32>]) -> Result<Self> {
        let n = vectors.len();
        let dim = vectors.first().map(Vec::len).unwrap_or(0);
        for v in vectors {
            if v.len() != dim {
                return Err(PipelineError::DimensionMismatch {
                    expected: dim,
                    found: v.len(),
                });
            }
        }

        let norms: Vec<f64> = vectors.iter().map(|v| norm(v)).collect();

        let mut matrix = Self::zeros(n);
        for i in 0..n {
            for j in (i + 1)..n {
                let d = cosine_distance(&vectors[i], &vectors[j], norms[i], norms[j]);
                if !d.is_finite() {
                    return Err(PipelineError::NonFiniteDistance { row: i, col: j });
                }
                matrix.set_symmetric(i, j, d);
            }
        }
        Ok(matrix)
    }
}

fn norm(v: &[f32]) -> f64 {
    v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt()
}

/// Cosine distance between two vectors with precomputed norms.
fn cosine_distance(a: &[f32], b: &[f32], norm_a: f64, norm_b: f64) -> f64 {
    // A zero vector has no direction: maximally distant from everything.
    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 2.0)
}
