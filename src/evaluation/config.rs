//! Evaluator configuration
//!
//! TOML file with per-field defaults; CLI flags override individual fields.

use crate::evaluation::events::{ItemId, Millis};
use crate::evaluation::feed::GroundTruthLayout;
use crate::evaluation::matcher::{
    Blacklist, MatcherConfig, OutOfOrderPolicy, UserMatchPolicy, DEFAULT_WINDOW_SIZE_MS,
};
use crate::evaluation::prediction::{DEFAULT_RECOMMENDATION_KEY, MAX_NUMBER_OF_RECOMMENDATIONS};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming the config file for `from_env`.
pub const CONFIG_PATH_ENV: &str = "EVALUATOR_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Window size (ms) a ground-truth event may precede the prediction.
    #[serde(default = "default_window_size_ms")]
    pub window_size_ms: Millis,

    /// Look-ahead (ms) past the prediction time that still confirms.
    #[serde(default)]
    pub lookahead_ms: Millis,

    /// Recommendations evaluated per prediction record.
    #[serde(default = "default_max_recommendations")]
    pub max_recommendations: usize,

    /// Key of the evaluated list under `recs.ints`.
    #[serde(default = "default_recommendation_key")]
    pub recommendation_key: String,

    #[serde(default)]
    pub user_match: UserMatchPolicy,

    #[serde(default)]
    pub out_of_order: OutOfOrderPolicy,

    /// Items that never count as confirmed.
    #[serde(default)]
    pub blacklist: Vec<ItemId>,

    /// Column layout of the ground-truth log.
    #[serde(default)]
    pub ground_truth: GroundTruthLayout,

    /// Include the response-time histogram in the report.
    #[serde(default)]
    pub histogram: bool,
}

fn default_window_size_ms() -> Millis {
    DEFAULT_WINDOW_SIZE_MS
}

fn default_max_recommendations() -> usize {
    MAX_NUMBER_OF_RECOMMENDATIONS
}

fn default_recommendation_key() -> String {
    DEFAULT_RECOMMENDATION_KEY.to_string()
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            window_size_ms: default_window_size_ms(),
            lookahead_ms: 0,
            max_recommendations: default_max_recommendations(),
            recommendation_key: default_recommendation_key(),
            user_match: UserMatchPolicy::default(),
            out_of_order: OutOfOrderPolicy::default(),
            blacklist: Vec::new(),
            ground_truth: GroundTruthLayout::default(),
            histogram: false,
        }
    }
}

impl EvaluatorConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Load from `EVALUATOR_CONFIG_PATH` if set, else defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load(path),
            Err(_) => {
                tracing::debug!("{} not set, using default evaluator config", CONFIG_PATH_ENV);
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.window_size_ms <= 0 {
            bail!("window_size_ms must be positive, got {}", self.window_size_ms);
        }
        if self.lookahead_ms < 0 {
            bail!("lookahead_ms must not be negative, got {}", self.lookahead_ms);
        }
        if self.max_recommendations == 0 {
            bail!("max_recommendations must be at least 1");
        }
        if self.recommendation_key.is_empty() {
            bail!("recommendation_key must not be empty");
        }
        Ok(())
    }

    pub fn matcher_config(&self) -> MatcherConfig {
        MatcherConfig {
            window_size_ms: self.window_size_ms,
            lookahead_ms: self.lookahead_ms,
            user_match: self.user_match,
            out_of_order: self.out_of_order,
            layout: self.ground_truth,
        }
    }

    pub fn blacklist_set(&self) -> Blacklist {
        self.blacklist.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config: EvaluatorConfig = toml::from_str("").unwrap();
        assert_eq!(config, EvaluatorConfig::default());
        assert_eq!(config.window_size_ms, 300_000);
        assert_eq!(config.max_recommendations, 3);
        assert_eq!(config.recommendation_key, "3");
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml() {
        let config: EvaluatorConfig = toml::from_str(
            r#"
            window_size_ms = 600000
            user_match = "strict"
            out_of_order = "reject"
            blacklist = [5, 7]

            [ground_truth]
            timestamp_column = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.window_size_ms, 600_000);
        assert_eq!(config.user_match, UserMatchPolicy::Strict);
        assert_eq!(config.out_of_order, OutOfOrderPolicy::Reject);
        assert!(config.blacklist_set().contains(&7));
        assert_eq!(config.ground_truth.timestamp_column, 0);
        assert_eq!(config.ground_truth.item_column, 4);

        let matcher = config.matcher_config();
        assert_eq!(matcher.window_size_ms, 600_000);
        assert_eq!(matcher.layout.timestamp_column, 0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = EvaluatorConfig::default();
        config.window_size_ms = 0;
        assert!(config.validate().is_err());

        let mut config = EvaluatorConfig::default();
        config.max_recommendations = 0;
        assert!(config.validate().is_err());

        let mut config = EvaluatorConfig::default();
        config.lookahead_ms = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evaluator.toml");
        std::fs::write(&path, "max_recommendations = 5\nhistogram = true\n").unwrap();
        let config = EvaluatorConfig::load(&path).unwrap();
        assert_eq!(config.max_recommendations, 5);
        assert!(config.histogram);
        assert!(EvaluatorConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
