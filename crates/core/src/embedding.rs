use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rayon::prelude::*;
use tracing::debug;

use crate::config::MAX_BATCH_SIZE;
use crate::error::{RegroupError, Result};

/// Anything that maps an ordered batch of strings to order-aligned vectors.
pub trait Embedder: Send + Sync {
    fn embed_batch(&self, inputs: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

impl<E: Embedder + ?Sized> Embedder for &E {
    fn embed_batch(&self, inputs: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        (**self).embed_batch(inputs)
    }
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn embed_batch(&self, inputs: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        (**self).embed_batch(inputs)
    }
}

/// Splits `labels` into chunks of at most `batch_size` (capped at
/// `MAX_BATCH_SIZE`), embeds each chunk and stitches the results back
/// together in input order.
pub fn embed_labels<E: Embedder + ?Sized>(
    embedder: &E,
    labels: &[String],
    batch_size: usize,
    parallel: bool,
) -> Result<Vec<Vec<f32>>> {
    if batch_size == 0 {
        return Err(RegroupError::Config("batch_size must be positive".into()));
    }
    let batch_size = batch_size.min(MAX_BATCH_SIZE);
    let batches: Vec<Vec<Vec<f32>>> = if parallel {
        labels
            .par_chunks(batch_size)
            .enumerate()
            .map(|(idx, chunk)| embed_chunk(embedder, idx, chunk))
            .collect::<Result<_>>()?
    } else {
        labels
            .chunks(batch_size)
            .enumerate()
            .map(|(idx, chunk)| embed_chunk(embedder, idx, chunk))
            .collect::<Result<_>>()?
    };
    let vectors: Vec<Vec<f32>> = batches.into_iter().flatten().collect();
    check_dimensions(&vectors)?;
    Ok(vectors)
}

fn embed_chunk<E: Embedder + ?Sized>(
    embedder: &E,
    idx: usize,
    chunk: &[String],
) -> Result<Vec<Vec<f32>>> {
    debug!(batch = idx, size = chunk.len(), "embedding batch");
    let vectors = embedder
        .embed_batch(chunk)
        .map_err(|err| RegroupError::EmbeddingService(format!("batch {idx}: {err:#}")))?;
    if vectors.len() != chunk.len() {
        return Err(RegroupError::EmbeddingService(format!(
            "batch {idx}: requested {} embeddings, received {}",
            chunk.len(),
            vectors.len()
        )));
    }
    Ok(vectors)
}

fn check_dimensions(vectors: &[Vec<f32>]) -> Result<()> {
    let Some(first) = vectors.first() else {
        return Ok(());
    };
    let dims = first.len();
    if dims == 0 {
        return Err(RegroupError::EmbeddingService(
            "provider returned zero-dimensional embeddings".into(),
        ));
    }
    if let Some(pos) = vectors.iter().position(|v| v.len() != dims) {
        return Err(RegroupError::EmbeddingService(format!(
            "embedding {pos} has {} dimensions, expected {dims}",
            vectors[pos].len()
        )));
    }
    if vectors.iter().flatten().any(|x| !x.is_finite()) {
        return Err(RegroupError::EmbeddingService(
            "provider returned non-finite embedding values".into(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct HashEmbedderConfig {
    pub dimensions: usize,
    pub seed: u64,
}

impl Default for HashEmbedderConfig {
    fn default() -> Self {
        Self {
            dimensions: 64,
            seed: 1337,
        }
    }
}

/// Offline embedder: feature-hashes lower-cased word tokens and character
/// trigrams into a fixed number of buckets.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    config: HashEmbedderConfig,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(HashEmbedderConfig::default())
    }
}

impl HashEmbedder {
    pub fn new(config: HashEmbedderConfig) -> Self {
        Self { config }
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions.max(1)
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions()];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
        {
            vector[self.bucket_for(token)] += 1.0;
            let chars: Vec<char> = token.chars().collect();
            for gram in chars.windows(3) {
                let gram: String = gram.iter().collect();
                vector[self.bucket_for(&gram)] += 0.5;
            }
        }
        normalize(&mut vector);
        vector
    }

    fn bucket_for(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        hasher.write_u64(self.config.seed);
        token.hash(&mut hasher);
        (hasher.finish() as usize) % self.dimensions()
    }
}

impl Embedder for HashEmbedder {
    fn embed_batch(&self, inputs: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(inputs.iter().map(|text| self.embed_text(text)).collect())
    }
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
        max_batch: AtomicUsize,
    }

    impl Embedder for CountingEmbedder {
        fn embed_batch(&self, inputs: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.max_batch.fetch_max(inputs.len(), Ordering::SeqCst);
            Ok(inputs
                .iter()
                .map(|s| vec![s.parse::<f32>().unwrap_or(0.0), 1.0])
                .collect())
        }
    }

    struct ShortEmbedder;

    impl Embedder for ShortEmbedder {
        fn embed_batch(&self, inputs: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(inputs.iter().skip(1).map(|_| vec![1.0]).collect())
        }
    }

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn embed_batch(&self, _inputs: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Err(anyhow::anyhow!("connection refused"))
        }
    }

    fn numbered(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn batches_preserve_order() {
        for parallel in [false, true] {
            let embedder = CountingEmbedder {
                calls: AtomicUsize::new(0),
                max_batch: AtomicUsize::new(0),
            };
            let labels = numbered(300);
            let vectors = embed_labels(&embedder, &labels, 128, parallel).unwrap();
            assert_eq!(vectors.len(), 300);
            for (i, v) in vectors.iter().enumerate() {
                assert_eq!(v[0], i as f32);
            }
            assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
            assert_eq!(embedder.max_batch.load(Ordering::SeqCst), 128);
        }
    }

    #[test]
    fn oversized_batches_are_capped() {
        let embedder = CountingEmbedder {
            calls: AtomicUsize::new(0),
            max_batch: AtomicUsize::new(0),
        };
        let vectors = embed_labels(&embedder, &numbered(300), 1000, false).unwrap();
        assert_eq!(vectors.len(), 300);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(embedder.max_batch.load(Ordering::SeqCst), MAX_BATCH_SIZE);
    }

    #[test]
    fn count_mismatch_is_a_service_error() {
        let err = embed_labels(&ShortEmbedder, &numbered(4), 128, false).unwrap_err();
        assert!(matches!(err, RegroupError::EmbeddingService(_)));
    }

    #[test]
    fn provider_failure_is_a_service_error() {
        let err = embed_labels(&FailingEmbedder, &numbered(4), 2, false).unwrap_err();
        match err {
            RegroupError::EmbeddingService(msg) => assert!(msg.contains("connection refused")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn hash_embedder_is_normalized_and_stable() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed_text("North America, Retail");
        let b = embedder.embed_text("north america, retail");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
