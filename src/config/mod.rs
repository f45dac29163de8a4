//! Configuration module for MDAR.
//!
//! Configuration is an immutable value built once and handed to every
//! component at construction time. It is loaded from an optional TOML file and
//! then overridden from `MDAR_*` environment variables. Numeric values that do
//! not parse are coerced to 0 with a warning instead of failing the run.

mod strategy_config;
mod thresholds_config;

pub use strategy_config::{
    ApproachWeight, OrderAssociationConfig, StrategyConfig, UserHistory2Config, UserHistoryConfig,
};
pub use thresholds_config::ThresholdConfig;

use crate::domain::metrics::Reduction;
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// Main application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MdarConfig {
    #[serde(deserialize_with = "lenient_usize")]
    pub k_fold_size: usize,
    pub k_values: Vec<usize>,
    pub thresholds: ThresholdConfig,
    pub strategies: StrategyConfig,
    pub use_approach_offsets: bool,
    pub reduction: Reduction,
    /// Rules kept per head item when mined rules are persisted.
    #[serde(deserialize_with = "lenient_usize")]
    pub neighbourhood_size: usize,
    #[serde(deserialize_with = "lenient_usize")]
    pub max_rule_body: usize,
    /// The ensemble replays training orders with at least this many candidates.
    #[serde(deserialize_with = "lenient_usize")]
    pub min_training_k: usize,
}

impl Default for MdarConfig {
    fn default() -> Self {
        Self {
            k_fold_size: 3,
            k_values: vec![1, 2, 3, 4, 5, 10, 15, 20, 30, 40, 50, 75, 100],
            thresholds: ThresholdConfig::default(),
            strategies: StrategyConfig::default(),
            use_approach_offsets: true,
            reduction: Reduction::Average,
            neighbourhood_size: 20,
            max_rule_body: 3,
            min_training_k: 10,
        }
    }
}

impl MdarConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse MDAR configuration")
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Defaults overridden from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Apply `MDAR_*` overrides read through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("MDAR_K_FOLD_SIZE") {
            self.k_fold_size = coerce_usize("MDAR_K_FOLD_SIZE", &raw);
        }
        if let Some(raw) = lookup("MDAR_MIN_SUPPORT") {
            self.thresholds.min_support = coerce_f64("MDAR_MIN_SUPPORT", &raw);
        }
        if let Some(raw) = lookup("MDAR_MIN_CONFIDENCE") {
            self.thresholds.min_confidence = coerce_f64("MDAR_MIN_CONFIDENCE", &raw);
        }
        if let Some(raw) = lookup("MDAR_MIN_LIFT") {
            self.thresholds.min_lift = coerce_f64("MDAR_MIN_LIFT", &raw);
        }
        if let Some(raw) = lookup("MDAR_MINIMAL_ARHR") {
            self.thresholds.minimal_arhr = coerce_f64("MDAR_MINIMAL_ARHR", &raw);
        }
        if let Some(raw) = lookup("MDAR_K_VALUES") {
            self.k_values = parse_k_values(&raw);
        }
        if let Some(raw) = lookup("MDAR_REDUCTION") {
            self.reduction = Reduction::from_str(&raw).context("Failed to parse MDAR_REDUCTION")?;
        }
        Ok(self)
    }

    /// Largest requested k, the size the ensemble is trained for.
    pub fn max_k(&self) -> usize {
        self.k_values.iter().copied().max().unwrap_or(1)
    }
}

/// Parse a comma separated k list, coercing bad entries to 0 and dropping them.
pub fn parse_k_values(raw: &str) -> Vec<usize> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| coerce_usize("k", s))
        .filter(|&k| k > 0)
        .collect()
}

/// Parse a float setting; anything unparsable becomes 0.
pub fn coerce_f64(key: &str, raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => {
            warn!("{}: '{}' is not a number, using 0", key, raw);
            0.0
        }
    }
}

/// Parse an integer setting; anything unparsable or negative becomes 0.
pub fn coerce_usize(key: &str, raw: &str) -> usize {
    match raw.trim().parse::<usize>() {
        Ok(value) => value,
        Err(_) => {
            warn!("{}: '{}' is not a non-negative integer, using 0", key, raw);
            0
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Int(i64),
    Float(f64),
    Text(String),
}

pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Int(value) => value as f64,
        NumberOrText::Float(value) => value,
        NumberOrText::Text(raw) => coerce_f64("config", &raw),
    })
}

pub(crate) fn lenient_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_f64(deserializer).map(Some)
}

pub(crate) fn lenient_usize<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Int(value) => usize::try_from(value).unwrap_or(0),
        NumberOrText::Float(value) if value >= 0.0 => value as usize,
        NumberOrText::Float(_) => 0,
        NumberOrText::Text(raw) => coerce_usize("config", &raw),
    })
}
