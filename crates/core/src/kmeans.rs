//! Lloyd's k-means with k-means++ seeding.
//!
//! Each fit runs `n_init` independent seedings and keeps the one with the lowest
//! within-cluster sum of squares (inertia). Iteration stops once no point changes
//! cluster or `max_iter` is reached. Clusters that lose every point during an
//! update are refilled with the point farthest from its own centroid, so every
//! id in `[0, k)` ends up with at least one member.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{RegroupError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Cluster id per input vector.
    pub labels: Vec<usize>,
    /// Mean vector per cluster id.
    pub centroids: Vec<Vec<f64>>,
    pub inertia: f64,
    pub iterations: usize,
}

impl Partition {
    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    pub fn distinct_clusters(&self) -> usize {
        let mut seen = vec![false; self.k()];
        for &label in &self.labels {
            seen[label] = true;
        }
        seen.into_iter().filter(|s| *s).count()
    }

    /// Row indices of each cluster, in input order.
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.k()];
        for (idx, &label) in self.labels.iter().enumerate() {
            members[label].push(idx);
        }
        members
    }
}

#[derive(Debug, Clone)]
pub struct Kmeans {
    k: usize,
    max_iter: usize,
    n_init: usize,
    seed: Option<u64>,
}

impl Kmeans {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: 300,
            n_init: 10,
            seed: None,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter.max(1);
        self
    }

    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn fit(&self, data: &[Vec<f32>]) -> Result<Partition> {
        let n = data.len();
        if n == 0 {
            return Err(RegroupError::insufficient("k-means needs at least one vector"));
        }
        if self.k == 0 || self.k > n {
            return Err(RegroupError::insufficient(format!(
                "cannot split {n} vectors into {} clusters",
                self.k
            )));
        }
        let points: Vec<Vec<f64>> = data
            .iter()
            .map(|v| v.iter().map(|x| f64::from(*x)).collect())
            .collect();
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut best: Option<Partition> = None;
        for _ in 0..self.n_init {
            let run = self.lloyd(&points, &mut rng);
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }
        best.ok_or_else(|| RegroupError::Consistency("k-means produced no run".into()))
    }

    fn lloyd(&self, points: &[Vec<f64>], rng: &mut StdRng) -> Partition {
        let n = points.len();
        let mut centroids = self.init_centroids(points, rng);
        let mut labels = vec![usize::MAX; n];
        let mut iterations = 0;
        for _ in 0..self.max_iter {
            iterations += 1;
            let mut assigned: Vec<usize> = points
                .iter()
                .map(|point| nearest_centroid(point, &centroids).0)
                .collect();
            repair_empty_clusters(points, &mut assigned, &centroids);
            let changed = assigned != labels;
            labels = assigned;
            centroids = cluster_means(points, &labels, self.k);
            if !changed {
                break;
            }
        }
        let inertia = points
            .iter()
            .zip(&labels)
            .map(|(p, &l)| squared_distance(p, &centroids[l]))
            .sum();
        Partition {
            labels,
            centroids,
            inertia,
            iterations,
        }
    }

    fn init_centroids(&self, points: &[Vec<f64>], rng: &mut StdRng) -> Vec<Vec<f64>> {
        let n = points.len();
        let mut centroids = Vec::with_capacity(self.k);
        centroids.push(points[rng.gen_range(0..n)].clone());
        let mut closest: Vec<f64> = points
            .iter()
            .map(|p| squared_distance(p, &centroids[0]))
            .collect();
        while centroids.len() < self.k {
            let total: f64 = closest.iter().sum();
            let selected = if total <= 0.0 {
                rng.gen_range(0..n)
            } else {
                let threshold = rng.gen::<f64>() * total;
                let mut cumsum = 0.0;
                let mut selected = n - 1;
                for (j, d) in closest.iter().enumerate() {
                    cumsum += d;
                    if cumsum >= threshold && *d > 0.0 {
                        selected = j;
                        break;
                    }
                }
                selected
            };
            let centroid = points[selected].clone();
            for (d, p) in closest.iter_mut().zip(points) {
                *d = d.min(squared_distance(p, &centroid));
            }
            centroids.push(centroid);
        }
        centroids
    }
}

fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (idx, centroid) in centroids.iter().enumerate() {
        let dist = squared_distance(point, centroid);
        if dist < best.1 {
            best = (idx, dist);
        }
    }
    best
}

fn repair_empty_clusters(points: &[Vec<f64>], labels: &mut [usize], centroids: &[Vec<f64>]) {
    let k = centroids.len();
    loop {
        let mut counts = vec![0usize; k];
        for &l in labels.iter() {
            counts[l] += 1;
        }
        let Some(empty) = counts.iter().position(|c| *c == 0) else {
            return;
        };
        // Only points from clusters with more than one member may move.
        let donor = labels
            .iter()
            .enumerate()
            .filter(|&(_, &l)| counts[l] > 1)
            .map(|(i, &l)| (i, squared_distance(&points[i], &centroids[l])))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        match donor {
            Some((idx, _)) => labels[idx] = empty,
            None => return,
        }
    }
}

fn cluster_means(points: &[Vec<f64>], labels: &[usize], k: usize) -> Vec<Vec<f64>> {
    let dims = points.first().map(Vec::len).unwrap_or(0);
    let mut sums = vec![vec![0f64; dims]; k];
    let mut counts = vec![0usize; k];
    for (point, &label) in points.iter().zip(labels) {
        counts[label] += 1;
        for (acc, x) in sums[label].iter_mut().zip(point) {
            *acc += x;
        }
    }
    for (sum, count) in sums.iter_mut().zip(counts) {
        if count > 0 {
            for v in sum.iter_mut() {
                *v /= count as f64;
            }
        }
    }
    sums
}

pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    squared_distance(a, b).sqrt()
}
