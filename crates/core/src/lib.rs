//! Semantic regrouping of aggregated tables.
//!
//! Row labels are embedded, partitioned with k-means (cluster count chosen by
//! silhouette score), and each cluster is collapsed into one row named after
//! its most central label, with values re-aggregated under the table's own
//! aggregation.

mod aggregate;
mod assemble;
mod config;
mod embedding;
mod error;
mod keys;
mod kmeans;
mod metrics;
mod pipeline;
mod representative;
mod selector;
mod table;

pub use aggregate::{aggregate_clusters, AggregationKind, ClusterSummary};
pub use assemble::{assemble_table, sort_clusters};
pub use config::{
    DuplicatePolicy, RegroupConfig, DEFAULT_BATCH_SIZE, DEFAULT_MAX_ITER, DEFAULT_N_INIT,
    DEFAULT_SEED, MAX_BATCH_SIZE,
};
pub use embedding::{embed_labels, Embedder, HashEmbedder, HashEmbedderConfig};
pub use error::{RegroupError, Result};
pub use keys::{canonical_cell, GroupKeyBuilder, GroupKeys, LABEL_SEPARATOR};
pub use kmeans::{euclidean, squared_distance, Kmeans, Partition};
pub use metrics::{silhouette, silhouette_score, DistanceMatrix, DISTANCE_CACHE_MAX_ROWS};
pub use pipeline::{RegroupOutcome, Regrouper};
pub use representative::pick_representatives;
pub use selector::{
    candidate_range, pick_best, Candidate, ClusterSelector, Selection, MAX_CLUSTERS_EXCLUSIVE,
    MIN_CLUSTERS,
};
pub use table::{AggDescriptor, FieldDescriptor, GroupDescriptor, Measure, Table, TablePayload};
