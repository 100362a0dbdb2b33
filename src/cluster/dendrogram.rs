//! Dendrogram: the merge tree produced by agglomerative clustering.
//!
//! Cluster ids follow the SciPy/MATLAB convention: leaves are `0..n-1`
//! and the i-th merge creates cluster `n + i`. The dendrogram is
//! read-only once built; flat clusters are derived from it by cutting at
//! a distance threshold.

/// A single merge recorded during clustering.
#[derive(Debug, Clone, Copy)]
pub struct Merge {
    /// First child cluster id.
    pub cluster_a: usize,
    /// Second child cluster id.
    pub cluster_b: usize,
    /// Inter-cluster distance at which the merge happened.
    pub distance: f64,
    /// Size of the merged cluster.
    pub size: usize,
}

/// Merge history over n original items.
#[derive(Debug, Clone)]
pub struct Dendrogram {
    merges: Vec<Merge>,
    n_items: usize,
}

impl Dendrogram {
    /// An empty dendrogram for n items.
    pub fn new(n_items: usize) -> Self {
        Self {
            merges: Vec::with_capacity(n_items.saturating_sub(1)),
            n_items,
        }
    }

    /// Record a merge.
    pub fn add_merge(&mut self, cluster_a: usize, cluster_b: usize, distance: f64, size: usize) {
        self.merges.push(Merge {
            cluster_a,
            cluster_b,
            distance,
            size,
        });
    }

    /// Number of original items.
    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// Number of merges recorded.
    pub fn n_merges(&self) -> usize {
        self.merges.len()
    }

    /// Iterate over merges in the order they happened.
    pub fn merges(&self) -> impl Iterator<Item = &Merge> {
        self.merges.iter()
    }

    /// The merge at position `step`, if any.
    pub fn merge(&self, step: usize) -> Option<&Merge> {
        self.merges.get(step)
    }

    /// Largest merge distance, 0 when no merges happened.
    pub fn max_distance(&self) -> f64 {
        self.merges.iter().map(|m| m.distance).fold(0.0, f64::max)
    }

    /// Flat cluster labels at a distance threshold.
    ///
    /// A merge survives the cut only when its distance is within the
    /// threshold *and* both of its children survived; undoing a merge
    /// undoes everything stacked on top of it. Flat clusters are the
    /// connected components of the surviving merges.
    ///
    /// Labels are contiguous positive integers starting at 1, numbered
    /// by the lowest member index of each cluster.
    pub fn cut_at_distance(&self, threshold: f64) -> Vec<usize> {
        let n = self.n_items;
        let mut parent: Vec<usize> = (0..n).collect();

        // kept[i]: merge i survives the cut.
        let mut kept = vec![false; self.merges.len()];
        // rep[id]: one leaf contained in cluster `id`.
        let mut rep: Vec<usize> = (0..n).collect();
        rep.resize(n + self.merges.len(), 0);

        for (i, merge) in self.merges.iter().enumerate() {
            let child_kept = |id: usize| id < n || kept[id - n];
            let survives = merge.distance <= threshold
                && child_kept(merge.cluster_a)
                && child_kept(merge.cluster_b);
            kept[i] = survives;
            rep[n + i] = rep[merge.cluster_a];
            if survives {
                union(&mut parent, rep[merge.cluster_a], rep[merge.cluster_b]);
            }
        }

        // Number components 1.. by first appearance in index order, which
        // is exactly "ordered by lowest member index".
        let mut labels = vec![0usize; n];
        let mut root_to_label: Vec<Option<usize>> = vec![None; n];
        let mut next = 1usize;
        for (item, label) in labels.iter_mut().enumerate() {
            let root = find(&mut parent, item);
            *label = match root_to_label[root] {
                Some(existing) => existing,
                None => {
                    root_to_label[root] = Some(next);
                    next += 1;
                    next - 1
                }
            };
        }
        labels
    }
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]]; // path halving
        x = parent[x];
    }
    x
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        // Smaller root wins so the representative stays the lowest leaf.
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi] = lo;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_item_dendrogram() -> Dendrogram {
        // items 0,1 merge at 0.2 -> cluster 3; 3 and 2 merge at 0.9 -> 4
        let mut d = Dendrogram::new(3);
        d.add_merge(0, 1, 0.2, 2);
        d.add_merge(3, 2, 0.9, 3);
        d
    }

    #[test]
    fn cut_below_all_merges_yields_singletons() {
        let d = three_item_dendrogram();
        assert_eq!(d.cut_at_distance(0.1), vec![1, 2, 3]);
    }

    #[test]
    fn cut_between_merges_splits_once() {
        let d = three_item_dendrogram();
        assert_eq!(d.cut_at_distance(0.5), vec![1, 1, 2]);
    }

    #[test]
    fn cut_above_all_merges_yields_one_cluster() {
        let d = three_item_dendrogram();
        assert_eq!(d.cut_at_distance(1.0), vec![1, 1, 1]);
    }

    #[test]
    fn labels_are_numbered_by_lowest_member() {
        // 1,2 merge first; 0 stays single. Cluster containing 0 must
        // still get label 1 because 0 is the lowest index overall.
        let mut d = Dendrogram::new(3);
        d.add_merge(1, 2, 0.1, 2);
        d.add_merge(3, 0, 0.8, 3);
        assert_eq!(d.cut_at_distance(0.3), vec![1, 2, 2]);
    }

    #[test]
    fn undone_merge_undoes_everything_above_it() {
        // Second merge is within threshold but references the first,
        // which is not; both must be undone.
        let mut d = Dendrogram::new(3);
        d.add_merge(0, 1, 0.9, 2);
        d.add_merge(3, 2, 0.4, 3);
        assert_eq!(d.cut_at_distance(0.5), vec![1, 2, 3]);
    }

    #[test]
    fn max_distance_over_merges() {
        let d = three_item_dendrogram();
        assert!((d.max_distance() - 0.9).abs() < 1e-12);
        assert_eq!(Dendrogram::new(1).max_distance(), 0.0);
    }
}
