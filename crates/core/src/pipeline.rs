use tracing::{debug, info};

use crate::aggregate::{aggregate_clusters, AggregationKind, ClusterSummary};
use crate::assemble::assemble_table;
use crate::config::RegroupConfig;
use crate::embedding::{embed_labels, Embedder};
use crate::error::{RegroupError, Result};
use crate::keys::{GroupKeyBuilder, GroupKeys};
use crate::representative::pick_representatives;
use crate::selector::{ClusterSelector, Selection, MIN_CLUSTERS};
use crate::table::{Table, TablePayload};

/// Everything computed for one table, kept for callers that want more than
/// the rewritten table.
#[derive(Debug, Clone)]
pub struct RegroupOutcome {
    pub table: Table,
    pub keys: GroupKeys,
    pub selection: Selection,
    pub clusters: Vec<ClusterSummary>,
}

pub struct Regrouper<E> {
    embedder: E,
    config: RegroupConfig,
}

impl<E: Embedder> Regrouper<E> {
    pub fn new(embedder: E, config: RegroupConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { embedder, config })
    }

    pub fn config(&self) -> &RegroupConfig {
        &self.config
    }

    /// Regroups the first table of the payload; everything else passes through.
    pub fn regroup_payload(&self, mut payload: TablePayload) -> Result<TablePayload> {
        let outcome = self.regroup(payload.first_table()?)?;
        payload.tables[0] = outcome.table;
        Ok(payload)
    }

    pub fn regroup(&self, table: &Table) -> Result<RegroupOutcome> {
        let kind = aggregation_kind(table)?;
        let keys = GroupKeyBuilder::new(self.config.duplicate_labels).build(table)?;
        let n = keys.len();
        ensure_clusterable(n)?;
        debug!(rows = n, aggregation = kind.as_str(), "built group labels");

        let embeddings = embed_labels(
            &self.embedder,
            &keys.labels,
            self.config.batch_size,
            self.config.parallel && self.config.parallel_batches,
        )?;
        if embeddings.len() != n {
            return Err(RegroupError::EmbeddingService(format!(
                "requested {n} embeddings, received {}",
                embeddings.len()
            )));
        }

        let selection = ClusterSelector::from_config(&self.config).select(&embeddings)?;
        let representatives = pick_representatives(&embeddings, &selection.partition)?;
        let clusters = aggregate_clusters(&kind, &keys, &selection.partition, &representatives)?;
        check_partition(&clusters, n)?;
        let out = assemble_table(table, clusters.clone())?;
        info!(rows = n, clusters = selection.k, score = selection.score, "regrouped table");
        Ok(RegroupOutcome {
            table: out,
            keys,
            selection,
            clusters,
        })
    }

    /// Embeds and scores every candidate cluster count without rewriting anything.
    pub fn score_candidates(&self, table: &Table) -> Result<Selection> {
        let keys = GroupKeyBuilder::new(self.config.duplicate_labels).build(table)?;
        ensure_clusterable(keys.len())?;
        let embeddings = embed_labels(
            &self.embedder,
            &keys.labels,
            self.config.batch_size,
            self.config.parallel && self.config.parallel_batches,
        )?;
        ClusterSelector::from_config(&self.config).select(&embeddings)
    }
}

fn aggregation_kind(table: &Table) -> Result<AggregationKind> {
    let field = table.value_field()?;
    let agg = field.agg.as_ref().ok_or_else(|| {
        RegroupError::malformed(format!("value field {:?} has no aggregation", field.name))
    })?;
    Ok(AggregationKind::from_name(&agg.name))
}

/// Rejects tables too small to cluster before anything is sent to the
/// embedder. With two rows the only candidate is k = 2 = N, which never has a
/// defined silhouette.
fn ensure_clusterable(n: usize) -> Result<()> {
    if n <= MIN_CLUSTERS {
        return Err(RegroupError::insufficient(format!(
            "clustering needs more than {MIN_CLUSTERS} rows, got {n}"
        )));
    }
    Ok(())
}

fn check_partition(clusters: &[ClusterSummary], n: usize) -> Result<()> {
    let members: usize = clusters.iter().map(|c| c.members.len()).sum();
    if members != n || clusters.iter().any(|c| c.members.is_empty()) {
        return Err(RegroupError::Consistency(format!(
            "clusters cover {members} labels, expected {n}"
        )));
    }
    Ok(())
}
