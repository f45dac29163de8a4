//! Per-strategy configuration: which approaches the ensemble blends, with
//! which importance weight, and which time attributes each strategy uses.

use crate::domain::types::{Approach, TimeFlags};
use serde::{Deserialize, Serialize};

use super::{lenient_f64, lenient_opt_f64};

/// Importance weight of one approach. The weight scales the approach's ARHR.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApproachWeight {
    pub approach: Approach,
    #[serde(default = "default_weight", deserialize_with = "lenient_f64")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl ApproachWeight {
    pub fn new(approach: Approach, weight: f64) -> Self {
        Self { approach, weight }
    }
}

/// Repeat purchase rate filters of the plain user history strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserHistory2Config {
    /// Skip users whose repeat purchase rate is below this value.
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub min_user_rpr: Option<f64>,
    /// Drop items whose repeat purchase rate is below this value.
    #[serde(deserialize_with = "lenient_opt_f64")]
    pub min_item_rpr: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Approaches in declaration order. Declaration order breaks score ties.
    pub approaches: Vec<ApproachWeight>,
    pub order_association: OrderAssociationConfig,
    pub user_history: UserHistoryConfig,
    pub time_related_time: TimeFlags,
    pub user_history2: UserHistory2Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderAssociationConfig {
    pub time: TimeFlags,
    pub use_confidence: bool,
    pub use_lift: bool,
    /// Pad short rule matches with itemset candidates of the current basket.
    pub itemset_fallback: bool,
}

/// Rule mining options of the repeat-purchase user history strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserHistoryConfig {
    pub time: TimeFlags,
    pub use_confidence: bool,
}

impl Default for UserHistoryConfig {
    fn default() -> Self {
        Self {
            time: TimeFlags::NONE,
            use_confidence: true,
        }
    }
}

impl Default for OrderAssociationConfig {
    fn default() -> Self {
        Self {
            time: TimeFlags::part_of_day(),
            use_confidence: true,
            use_lift: false,
            itemset_fallback: false,
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            approaches: Approach::ALL
                .into_iter()
                .map(|approach| ApproachWeight::new(approach, 1.0))
                .collect(),
            order_association: OrderAssociationConfig::default(),
            user_history: UserHistoryConfig::default(),
            time_related_time: TimeFlags::part_of_day_and_weekday(),
            user_history2: UserHistory2Config::default(),
        }
    }
}

impl StrategyConfig {
    /// Weight of `approach`, 1.0 when it is not listed.
    pub fn weight_for(&self, approach: Approach) -> f64 {
        self.approaches
            .iter()
            .find(|w| w.approach == approach)
            .map(|w| w.weight)
            .unwrap_or(1.0)
    }

    pub fn enabled(&self) -> Vec<Approach> {
        let mut seen = Vec::with_capacity(self.approaches.len());
        for w in &self.approaches {
            if !seen.contains(&w.approach) {
                seen.push(w.approach);
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_config_defaults() {
        let config = StrategyConfig::default();
        assert_eq!(config.enabled(), Approach::ALL.to_vec());
        assert_eq!(config.weight_for(Approach::TimeRelated), 1.0);
        assert!(config.order_association.time.part_of_day);
        assert!(!config.order_association.time.day_in_week);
        assert!(config.time_related_time.day_in_week);
        assert_eq!(config.user_history.time, TimeFlags::NONE);
        assert!(config.user_history.use_confidence);
    }

    #[test]
    fn test_duplicate_approaches_enabled_once() {
        let config = StrategyConfig {
            approaches: vec![
                ApproachWeight::new(Approach::UserHistory, 2.0),
                ApproachWeight::new(Approach::UserHistory, 0.5),
            ],
            ..StrategyConfig::default()
        };
        assert_eq!(config.enabled(), vec![Approach::UserHistory]);
        assert_eq!(config.weight_for(Approach::UserHistory), 2.0);
        assert_eq!(config.weight_for(Approach::OrderAssociation), 1.0);
    }
}
