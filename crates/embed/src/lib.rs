mod client;
mod settings;

pub use client::{EmbeddingBackend, EmbeddingClient, RemoteEmbeddingClient};
pub use settings::{load_config, AppConfig, EmbeddingProvider, EmbeddingSettings, DEFAULT_CONFIG};
