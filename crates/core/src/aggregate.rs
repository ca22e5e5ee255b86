use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RegroupError, Result};
use crate::keys::GroupKeys;
use crate::kmeans::Partition;
use crate::table::Measure;

/// Reduction declared by the value field's `agg.name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    Count,
    Max,
    Min,
    /// Anything else. Reduces like `Count` (a plain sum).
    Unknown(String),
}

impl AggregationKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "count" => AggregationKind::Count,
            "max" => AggregationKind::Max,
            "min" => AggregationKind::Min,
            other => AggregationKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AggregationKind::Count => "count",
            AggregationKind::Max => "max",
            AggregationKind::Min => "min",
            AggregationKind::Unknown(name) => name,
        }
    }

    pub fn reduce<I>(&self, values: I) -> Option<Measure>
    where
        I: IntoIterator<Item = Measure>,
    {
        let mut iter = values.into_iter();
        let first = iter.next()?;
        Some(match self {
            AggregationKind::Count | AggregationKind::Unknown(_) => iter.fold(first, Measure::add),
            AggregationKind::Max => iter.fold(first, |acc, v| {
                if v.total_cmp(&acc).is_gt() {
                    v
                } else {
                    acc
                }
            }),
            AggregationKind::Min => iter.fold(first, |acc, v| {
                if v.total_cmp(&acc).is_lt() {
                    v
                } else {
                    acc
                }
            }),
        })
    }
}

/// Re-aggregated value and membership of one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    pub id: usize,
    pub representative: String,
    pub value: Measure,
    pub members: Vec<String>,
}

pub fn aggregate_clusters(
    kind: &AggregationKind,
    keys: &GroupKeys,
    partition: &Partition,
    representatives: &[usize],
) -> Result<Vec<ClusterSummary>> {
    if let AggregationKind::Unknown(name) = kind {
        warn!(aggregation = %name, "unknown aggregation kind; summing cluster values");
    }
    let members = partition.members();
    if members.len() != representatives.len() {
        return Err(RegroupError::Consistency(format!(
            "{} clusters but {} representatives",
            members.len(),
            representatives.len()
        )));
    }
    members
        .into_iter()
        .zip(representatives)
        .enumerate()
        .map(|(id, (rows, &rep))| {
            let labels: Vec<String> = rows.iter().map(|&row| keys.labels[row].clone()).collect();
            let values = labels
                .iter()
                .map(|label| {
                    keys.value_of(label).ok_or_else(|| {
                        RegroupError::Consistency(format!("label {label:?} has no value"))
                    })
                })
                .collect::<Result<Vec<Measure>>>()?;
            let value = kind.reduce(values).ok_or_else(|| {
                RegroupError::Consistency(format!("cluster {id} has no members"))
            })?;
            let representative = keys.labels.get(rep).cloned().ok_or_else(|| {
                RegroupError::Consistency(format!("representative row {rep} out of range"))
            })?;
            Ok(ClusterSummary {
                id,
                representative,
                value,
                members: labels,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn ints(values: &[i64]) -> Vec<Measure> {
        values.iter().map(|v| Measure::Int(*v)).collect()
    }

    #[test]
    fn reductions() {
        let vals = ints(&[3, 9, 1]);
        assert_eq!(AggregationKind::Count.reduce(vals.clone()), Some(Measure::Int(13)));
        assert_eq!(AggregationKind::Max.reduce(vals.clone()), Some(Measure::Int(9)));
        assert_eq!(AggregationKind::Min.reduce(vals.clone()), Some(Measure::Int(1)));
        assert_eq!(
            AggregationKind::from_name("avg").reduce(vals),
            Some(Measure::Int(13))
        );
        assert_eq!(AggregationKind::Count.reduce(Vec::new()), None);
    }

    #[test]
    fn mixed_numbers_compare_numerically() {
        let vals = vec![Measure::Int(2), Measure::Float(2.5), Measure::Int(-1)];
        assert_eq!(AggregationKind::Max.reduce(vals.clone()), Some(Measure::Float(2.5)));
        assert_eq!(AggregationKind::Min.reduce(vals), Some(Measure::Int(-1)));
    }

    #[test]
    fn names_round_trip() {
        for name in ["count", "max", "min", "median"] {
            assert_eq!(AggregationKind::from_name(name).as_str(), name);
        }
    }

    #[test]
    fn summarises_each_cluster_in_row_order() {
        let labels: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let values: IndexMap<String, Measure> = labels
            .iter()
            .cloned()
            .zip(ints(&[1, 2, 3, 4]))
            .collect();
        let keys = GroupKeys { labels, values };
        let partition = Partition {
            labels: vec![1, 0, 1, 0],
            centroids: vec![Vec::new(); 2],
            inertia: 0.0,
            iterations: 1,
        };
        let clusters = aggregate_clusters(&AggregationKind::Max, &keys, &partition, &[3, 0]).unwrap();
        assert_eq!(clusters[0].members, vec!["b", "d"]);
        assert_eq!(clusters[0].representative, "d");
        assert_eq!(clusters[0].value, Measure::Int(4));
        assert_eq!(clusters[1].members, vec!["a", "c"]);
        assert_eq!(clusters[1].value, Measure::Int(3));
    }

    #[test]
    fn missing_value_is_a_consistency_error() {
        let keys = GroupKeys {
            labels: vec!["a".to_string(), "b".to_string()],
            values: IndexMap::new(),
        };
        let partition = Partition {
            labels: vec![0, 1],
            centroids: vec![Vec::new(); 2],
            inertia: 0.0,
            iterations: 1,
        };
        let err = aggregate_clusters(&AggregationKind::Count, &keys, &partition, &[0, 1]).unwrap_err();
        assert!(matches!(err, RegroupError::Consistency(_)));
    }
}
