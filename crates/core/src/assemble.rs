use serde_json::Value;

use crate::aggregate::ClusterSummary;
use crate::error::Result;
use crate::table::{FieldDescriptor, GroupDescriptor, Table};

/// Orders clusters by value, largest first. The sort is stable, so equal
/// values keep cluster-id order.
pub fn sort_clusters(mut clusters: Vec<ClusterSummary>) -> Vec<ClusterSummary> {
    clusters.sort_by(|a, b| b.value.total_cmp(&a.value));
    clusters
}

/// Rewrites `table` so each cluster becomes one row. Attributes other than
/// `groups`, `fields`, `columns` and `group_membership` are left alone.
pub fn assemble_table(table: &Table, clusters: Vec<ClusterSummary>) -> Result<Table> {
    let value_field = table.value_field()?.clone();
    let merged = table.merged_group_name();
    let sorted = sort_clusters(clusters);

    let mut names = Vec::with_capacity(sorted.len());
    let mut values = Vec::with_capacity(sorted.len());
    let mut membership = Vec::with_capacity(sorted.len());
    for cluster in sorted {
        names.push(Value::String(cluster.representative));
        values.push(cluster.value.to_value());
        membership.push(cluster.members);
    }

    let mut out = table.clone();
    out.columns = vec![names, values];
    out.group_membership = Some(membership);
    out.groups = vec![GroupDescriptor::named(merged.clone())];
    out.fields = vec![FieldDescriptor::string(merged), value_field];
    Ok(out)
}
