use std::env;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use regroup_core::{Embedder, HashEmbedder, HashEmbedderConfig};

use crate::settings::{EmbeddingProvider, EmbeddingSettings};

#[derive(Debug, Clone)]
pub enum EmbeddingBackend {
    Hash(HashEmbedder),
    Remote(RemoteEmbeddingClient),
}

#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    backend: EmbeddingBackend,
}

impl EmbeddingClient {
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        let backend = match settings.provider {
            EmbeddingProvider::Hash => EmbeddingBackend::Hash(HashEmbedder::new(HashEmbedderConfig {
                dimensions: settings.hash_dimensions,
                seed: 1337,
            })),
            provider => {
                let var = provider
                    .api_key_var()
                    .ok_or_else(|| anyhow!("{} needs no api key", provider.as_str()))?;
                let api_key = read_api_key(var)?;
                EmbeddingBackend::Remote(RemoteEmbeddingClient::new(
                    settings.base_url(),
                    settings.model(),
                    Some(api_key),
                    Duration::from_secs(settings.timeout_secs.max(1)),
                )?)
            }
        };
        Ok(Self { backend })
    }

    pub fn hash() -> Self {
        Self {
            backend: EmbeddingBackend::Hash(HashEmbedder::default()),
        }
    }

    pub fn remote(client: RemoteEmbeddingClient) -> Self {
        Self {
            backend: EmbeddingBackend::Remote(client),
        }
    }

    pub fn backend(&self) -> &EmbeddingBackend {
        &self.backend
    }

    pub fn describe(&self) -> String {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => format!("hash/{}", embedder.dimensions()),
            EmbeddingBackend::Remote(client) => format!("{}@{}", client.model, client.url),
        }
    }
}

impl Embedder for EmbeddingClient {
    fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => embedder.embed_batch(inputs),
            EmbeddingBackend::Remote(client) => client.embed_batch(inputs),
        }
    }
}

/// Client for `POST {base}/embeddings` services speaking the
/// `{"input": [...], "model": ...}` -> `{"data": [{"embedding": [...]}]}` shape
/// shared by Voyage and OpenAI.
#[derive(Debug, Clone)]
pub struct RemoteEmbeddingClient {
    http: Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl RemoteEmbeddingClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            url: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
        })
    }

    pub fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let payload = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });
        let mut request = self.http.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .with_context(|| format!("embedding request to {} failed", self.url))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!(
                "embedding service returned error (status {status}): {body}"
            ));
        }
        let parsed: EmbeddingResponse = response
            .json()
            .context("failed to decode embedding response")?;
        debug!(requested = inputs.len(), received = parsed.data.len(), "embedding response");
        order_embeddings(parsed.data, inputs.len())
    }
}

fn order_embeddings(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(anyhow!(
            "embedding service returned {} items for {expected} inputs",
            data.len()
        ));
    }
    if data.iter().all(|item| item.index.is_some()) {
        data.sort_by_key(|item| item.index);
        let in_sequence = data
            .iter()
            .enumerate()
            .all(|(pos, item)| item.index == Some(pos));
        if !in_sequence {
            return Err(anyhow!("embedding service returned inconsistent item indices"));
        }
    }
    Ok(data.into_iter().map(|item| item.embedding).collect())
}

fn read_api_key(var: &str) -> Result<String> {
    let value = env::var(var).map_err(|_| anyhow!(format!("{var} is not set")))?;
    if value.trim().is_empty() {
        return Err(anyhow!(format!("{var} is empty")));
    }
    Ok(value)
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}
