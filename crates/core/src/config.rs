use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{RegroupError, Result};

/// Largest number of labels sent to the embedding provider in one call.
pub const MAX_BATCH_SIZE: usize = 128;
pub const DEFAULT_BATCH_SIZE: usize = MAX_BATCH_SIZE;
pub const DEFAULT_MAX_ITER: usize = 300;
pub const DEFAULT_N_INIT: usize = 10;
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    #[default]
    LastWins,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegroupConfig {
    pub batch_size: usize,
    pub max_iter: usize,
    pub n_init: usize,
    pub seed: Option<u64>,
    pub parallel: bool,
    pub parallel_batches: bool,
    pub duplicate_labels: DuplicatePolicy,
}

impl Default for RegroupConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_iter: DEFAULT_MAX_ITER,
            n_init: DEFAULT_N_INIT,
            seed: Some(DEFAULT_SEED),
            parallel: true,
            parallel_batches: false,
            duplicate_labels: DuplicatePolicy::LastWins,
        }
    }
}

impl RegroupConfig {
    /// Applies `REGROUP_SEED` (a number, or `none` for unseeded runs).
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(raw) = env::var("REGROUP_SEED") {
            self.seed = parse_seed(&raw)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(RegroupError::Config(format!(
                "batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        if self.max_iter == 0 {
            return Err(RegroupError::Config("max_iter must be positive".into()));
        }
        if self.n_init == 0 {
            return Err(RegroupError::Config("n_init must be positive".into()));
        }
        Ok(())
    }
}

fn parse_seed(raw: &str) -> Result<Option<u64>> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("none") || trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|_| RegroupError::Config(format!("REGROUP_SEED must be a number, got {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: RegroupConfig = toml::from_str("n_init = 3\nduplicate_labels = \"reject\"").unwrap();
        assert_eq!(cfg.n_init, 3);
        assert_eq!(cfg.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(cfg.duplicate_labels, DuplicatePolicy::Reject);
        assert_eq!(cfg.seed, Some(DEFAULT_SEED));
    }

    #[test]
    fn batch_size_must_fit_provider_limit() {
        for (batch_size, ok) in [(0, false), (1, true), (MAX_BATCH_SIZE, true), (129, false), (1000, false)] {
            let cfg = RegroupConfig {
                batch_size,
                ..RegroupConfig::default()
            };
            assert_eq!(cfg.validate().is_ok(), ok, "batch_size {batch_size}");
        }
        let cfg: RegroupConfig = toml::from_str("batch_size = 1000").unwrap();
        assert!(matches!(cfg.validate(), Err(RegroupError::Config(_))));
    }

    #[test]
    fn seed_parsing() {
        assert_eq!(parse_seed("7").unwrap(), Some(7));
        assert_eq!(parse_seed("none").unwrap(), None);
        assert!(parse_seed("abc").is_err());
    }
}
