use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use regroup_core::RegroupConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG: &str = "regroup.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Voyage,
    OpenAi,
    #[default]
    Hash,
}

impl EmbeddingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingProvider::Voyage => "voyage",
            EmbeddingProvider::OpenAi => "openai",
            EmbeddingProvider::Hash => "hash",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            EmbeddingProvider::Voyage => "voyage-large-2",
            EmbeddingProvider::OpenAi => "text-embedding-3-small",
            EmbeddingProvider::Hash => "hash",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            EmbeddingProvider::Voyage => "https://api.voyageai.com/v1",
            EmbeddingProvider::OpenAi => "https://api.openai.com/v1",
            EmbeddingProvider::Hash => "",
        }
    }

    pub fn api_key_var(&self) -> Option<&'static str> {
        match self {
            EmbeddingProvider::Voyage => Some("VOYAGE_API_KEY"),
            EmbeddingProvider::OpenAi => Some("OPENAI_API_KEY"),
            EmbeddingProvider::Hash => None,
        }
    }
}

impl FromStr for EmbeddingProvider {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "voyage" | "voyageai" => Ok(EmbeddingProvider::Voyage),
            "openai" => Ok(EmbeddingProvider::OpenAi),
            "hash" | "local" => Ok(EmbeddingProvider::Hash),
            other => Err(anyhow!("unknown embedding provider {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub hash_dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hash,
            model: None,
            base_url: None,
            timeout_secs: 30,
            hash_dimensions: 64,
        }
    }
}

impl EmbeddingSettings {
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(name) = env::var("REGROUP_EMBEDDING_PROVIDER") {
            self.provider = name.parse()?;
        }
        if let Ok(model) = env::var("REGROUP_EMBEDDING_MODEL") {
            self.model = Some(model);
        }
        if let Ok(url) = env::var("REGROUP_EMBEDDING_URL") {
            self.base_url = Some(url);
        }
        if let Ok(raw) = env::var("REGROUP_EMBEDDING_TIMEOUT_SECS") {
            self.timeout_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid REGROUP_EMBEDDING_TIMEOUT_SECS {raw}"))?;
        }
        Ok(self)
    }
}

/// Contents of `regroup.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub clustering: RegroupConfig,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
}

impl AppConfig {
    pub fn with_env_overrides(self) -> Result<Self> {
        Ok(Self {
            clustering: self.clustering.with_env_overrides()?,
            embedding: self.embedding.with_env_overrides()?,
        })
    }
}

/// Reads the config file if it exists, then applies environment overrides.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let config = if path.exists() {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str::<AppConfig>(&contents).map_err(|e| anyhow!("invalid config: {e}"))?
    } else {
        AppConfig::default()
    };
    config.with_env_overrides()
}
