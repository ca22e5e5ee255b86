use rayon::prelude::*;

use crate::kmeans::euclidean;

/// Row count up to which pairwise distances are cached (8M entries, 64 MiB).
pub const DISTANCE_CACHE_MAX_ROWS: usize = 4096;

/// Pairwise Euclidean distances between embeddings.
///
/// Up to `DISTANCE_CACHE_MAX_ROWS` rows the condensed upper triangle is
/// computed once and shared by every candidate k. Larger inputs keep only the
/// points and compute each distance on demand, so memory stays linear in N.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    points: Vec<Vec<f64>>,
    upper: Option<Vec<f64>>,
    parallel: bool,
}

impl DistanceMatrix {
    pub fn new(vectors: &[Vec<f32>]) -> Self {
        Self::build(vectors, true, DISTANCE_CACHE_MAX_ROWS)
    }

    /// `parallel` controls whether rows are computed on the rayon pool, both
    /// here and in `silhouette`.
    pub fn build(vectors: &[Vec<f32>], parallel: bool, cache_max_rows: usize) -> Self {
        let points: Vec<Vec<f64>> = vectors
            .iter()
            .map(|v| v.iter().map(|x| f64::from(*x)).collect())
            .collect();
        let n = points.len();
        let upper = (n <= cache_max_rows).then(|| {
            let pts = &points;
            let row = move |i: usize| (i + 1..n).map(move |j| euclidean(&pts[i], &pts[j]));
            if parallel {
                (0..n).into_par_iter().flat_map_iter(row).collect()
            } else {
                (0..n).flat_map(row).collect()
            }
        });
        Self {
            points,
            upper,
            parallel,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_cached(&self) -> bool {
        self.upper.is_some()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        if i == j {
            return 0.0;
        }
        let Some(upper) = &self.upper else {
            return euclidean(&self.points[i], &self.points[j]);
        };
        let n = self.points.len();
        let (a, b) = if i < j { (i, j) } else { (j, i) };
        // Row a starts after the a previous rows of lengths n-1, n-2, ...
        let offset = a * (2 * n - a - 1) / 2;
        upper[offset + (b - a - 1)]
    }
}

/// Mean silhouette coefficient of a labelling.
///
/// Returns `None` when the score is undefined: fewer than two distinct
/// clusters, or as many clusters as points. Points alone in their cluster
/// score 0.
pub fn silhouette(distances: &DistanceMatrix, labels: &[usize]) -> Option<f64> {
    let n = distances.len();
    if n == 0 || labels.len() != n {
        return None;
    }
    let k = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut sizes = vec![0usize; k];
    for &l in labels {
        sizes[l] += 1;
    }
    let distinct = sizes.iter().filter(|s| **s > 0).count();
    if distinct < 2 || distinct >= n {
        return None;
    }
    let point_score = |i: usize| {
        let own = labels[i];
        if sizes[own] <= 1 {
            return 0.0;
        }
        let mut sums = vec![0f64; k];
        for j in 0..n {
            if j != i {
                sums[labels[j]] += distances.get(i, j);
            }
        }
        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 {
            (b - a) / denom
        } else {
            0.0
        }
    };
    let per_point: Vec<f64> = if distances.parallel {
        (0..n).into_par_iter().map(point_score).collect()
    } else {
        (0..n).map(point_score).collect()
    };
    Some(per_point.iter().sum::<f64>() / n as f64)
}

/// Convenience wrapper computing the distance matrix on the fly.
pub fn silhouette_score(vectors: &[Vec<f32>], labels: &[usize]) -> Option<f64> {
    silhouette(&DistanceMatrix::new(vectors), labels)
}
