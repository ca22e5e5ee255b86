use std::ops::Range;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::RegroupConfig;
use crate::error::{RegroupError, Result};
use crate::kmeans::{Kmeans, Partition};
use crate::metrics::{silhouette, DistanceMatrix, DISTANCE_CACHE_MAX_ROWS};

pub const MIN_CLUSTERS: usize = 2;
/// Exclusive upper bound on the cluster count, whatever the row count.
pub const MAX_CLUSTERS_EXCLUSIVE: usize = 12;

/// Candidate cluster counts for `n` rows: `[2, min(12, 3 + n / 5))`.
pub fn candidate_range(n: usize) -> Range<usize> {
    MIN_CLUSTERS..MAX_CLUSTERS_EXCLUSIVE.min(3 + n / 5)
}

/// One evaluated cluster count.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub k: usize,
    pub score: Option<f64>,
    pub partition: Partition,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub k: usize,
    pub score: f64,
    pub partition: Partition,
    /// Score of every evaluated k, in ascending k order.
    pub scores: Vec<(usize, Option<f64>)>,
}

#[derive(Debug, Clone)]
pub struct ClusterSelector {
    max_iter: usize,
    n_init: usize,
    seed: Option<u64>,
    parallel: bool,
}

impl Default for ClusterSelector {
    fn default() -> Self {
        Self::from_config(&RegroupConfig::default())
    }
}

impl ClusterSelector {
    pub fn from_config(config: &RegroupConfig) -> Self {
        Self {
            max_iter: config.max_iter,
            n_init: config.n_init,
            seed: config.seed,
            parallel: config.parallel,
        }
    }

    pub fn select(&self, embeddings: &[Vec<f32>]) -> Result<Selection> {
        let n = embeddings.len();
        if n < 2 {
            return Err(RegroupError::insufficient(format!(
                "clustering needs at least 2 rows, got {n}"
            )));
        }
        let range = candidate_range(n);
        let distances = DistanceMatrix::build(embeddings, self.parallel, DISTANCE_CACHE_MAX_ROWS);
        let candidates: Vec<Candidate> = if self.parallel {
            range
                .into_par_iter()
                .map(|k| self.evaluate(embeddings, &distances, k))
                .collect::<Result<_>>()?
        } else {
            range
                .map(|k| self.evaluate(embeddings, &distances, k))
                .collect::<Result<_>>()?
        };
        let scores = candidates.iter().map(|c| (c.k, c.score)).collect();
        let best = pick_best(candidates).ok_or_else(|| {
            RegroupError::insufficient(format!(
                "no candidate cluster count yields a defined separation score for {n} rows"
            ))
        })?;
        let score = best.score.unwrap_or(f64::NEG_INFINITY);
        info!(k = best.k, score, rows = n, "selected cluster count");
        Ok(Selection {
            k: best.k,
            score,
            partition: best.partition,
            scores,
        })
    }

    fn evaluate(
        &self,
        embeddings: &[Vec<f32>],
        distances: &DistanceMatrix,
        k: usize,
    ) -> Result<Candidate> {
        let seed = self.seed.map(|s| s.wrapping_add(k as u64));
        let partition = Kmeans::new(k)
            .with_max_iter(self.max_iter)
            .with_n_init(self.n_init)
            .with_seed(seed)
            .fit(embeddings)?;
        let score = silhouette(distances, &partition.labels);
        debug!(k, ?score, inertia = partition.inertia, "evaluated candidate");
        Ok(Candidate {
            k,
            score,
            partition,
        })
    }
}

/// Highest score wins; ties keep the smallest k. Unscored candidates never win.
pub fn pick_best(candidates: Vec<Candidate>) -> Option<Candidate> {
    candidates
        .into_iter()
        .filter(|c| c.score.is_some())
        .fold(None, |best: Option<Candidate>, cand| {
            let better = best
                .as_ref()
                .map_or(true, |current| cand.score > current.score);
            if better {
                Some(cand)
            } else {
                best
            }
        })
}
