//! Rule mining and ensemble thresholds.

use serde::{Deserialize, Serialize};

use super::lenient_f64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    #[serde(deserialize_with = "lenient_f64")]
    pub min_support: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub min_confidence: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub min_lift: f64,
    /// A user's own approach ranking is used only when some score exceeds this.
    #[serde(deserialize_with = "lenient_f64")]
    pub minimal_arhr: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_support: 0.02,
            min_confidence: 0.05,
            min_lift: 3.0,
            minimal_arhr: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_defaults() {
        let config = ThresholdConfig::default();
        assert_eq!(config.min_support, 0.02);
        assert_eq!(config.min_confidence, 0.05);
        assert_eq!(config.min_lift, 3.0);
        assert_eq!(config.minimal_arhr, 0.5);
    }

    #[test]
    fn test_non_numeric_threshold_becomes_zero() {
        let config: ThresholdConfig = toml::from_str("min_support = \"lots\"\nmin_lift = 2").unwrap();
        assert_eq!(config.min_support, 0.0);
        assert_eq!(config.min_lift, 2.0);
        assert_eq!(config.min_confidence, 0.05);
    }
}
