use crate::error::{RegroupError, Result};
use crate::kmeans::{euclidean, Partition};

/// Per cluster id, the row index of the member closest to the cluster mean.
/// Ties go to the member that comes first in row order.
pub fn pick_representatives(embeddings: &[Vec<f32>], partition: &Partition) -> Result<Vec<usize>> {
    if embeddings.len() != partition.labels.len() {
        return Err(RegroupError::Consistency(format!(
            "{} embeddings but {} cluster labels",
            embeddings.len(),
            partition.labels.len()
        )));
    }
    partition
        .members()
        .iter()
        .enumerate()
        .map(|(cluster, members)| {
            let centroid = mean_of(embeddings, members).ok_or_else(|| {
                RegroupError::Consistency(format!("cluster {cluster} has no members"))
            })?;
            let mut best: Option<(usize, f64)> = None;
            for &idx in members {
                let point: Vec<f64> = embeddings[idx].iter().map(|x| f64::from(*x)).collect();
                let dist = euclidean(&point, &centroid);
                if best.map_or(true, |(_, d)| dist < d) {
                    best = Some((idx, dist));
                }
            }
            best.map(|(idx, _)| idx).ok_or_else(|| {
                RegroupError::Consistency(format!("cluster {cluster} has no members"))
            })
        })
        .collect()
}

fn mean_of(embeddings: &[Vec<f32>], members: &[usize]) -> Option<Vec<f64>> {
    let first = *members.first()?;
    let mut sum = vec![0f64; embeddings[first].len()];
    for &idx in members {
        for (acc, x) in sum.iter_mut().zip(&embeddings[idx]) {
            *acc += f64::from(*x);
        }
    }
    let count = members.len() as f64;
    Some(sum.into_iter().map(|v| v / count).collect())
}
