use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegroupError {
    #[error("malformed table: {0}")]
    MalformedTable(String),
    #[error("embedding service error: {0}")]
    EmbeddingService(String),
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("internal consistency error: {0}")]
    Consistency(String),
    #[error("serde json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RegroupError>;

impl RegroupError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedTable(msg.into())
    }

    pub fn insufficient(msg: impl Into<String>) -> Self {
        Self::InsufficientData(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RegroupError::MalformedTable(_) => "malformed_table",
            RegroupError::EmbeddingService(_) => "embedding_service",
            RegroupError::InsufficientData(_) => "insufficient_data",
            RegroupError::Consistency(_) => "consistency",
            RegroupError::Json(_) => "json",
            RegroupError::Config(_) => "config",
        }
    }
}

impl From<anyhow::Error> for RegroupError {
    fn from(value: anyhow::Error) -> Self {
        Self::EmbeddingService(format!("{value:#}"))
    }
}
