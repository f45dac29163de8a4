//! In-memory rule cache
//!
//! Keeps the rules written by the order association strategy so they can be
//! inspected after training. Every write replaces the whole cache; per head
//! item only the best `neighbourhood_cap` rules survive, in rank order.
//!
//! A cache belongs to one training run. Concurrent folds each get their own.

use crate::domain::ports::RuleSink;
use crate::domain::rules::Rule;
use crate::domain::types::ItemId;
use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct InMemoryRuleCache {
    rules: Arc<RwLock<Vec<Rule>>>,
}

impl InMemoryRuleCache {
    pub fn new() -> Self {
        Self {
            rules: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Snapshot of the cached rules, best first.
    pub fn rules(&self) -> Vec<Rule> {
        self.rules
            .read()
            .map(|rules| rules.clone())
            .unwrap_or_default()
    }

    pub fn rules_for_head(&self, head: ItemId) -> Vec<Rule> {
        self.rules()
            .into_iter()
            .filter(|rule| rule.y == head)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.read().map(|rules| rules.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryRuleCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleSink for InMemoryRuleCache {
    fn delete_cached_rules(&self) -> Result<()> {
        self.rules
            .write()
            .map_err(|_| anyhow!("Rule cache lock poisoned"))?
            .clear();
        Ok(())
    }

    fn write_rules(&self, rules: &[Rule], neighbourhood_cap: usize) -> Result<()> {
        let mut ranked = rules.to_vec();
        ranked.sort_by(Rule::rank_cmp);

        let mut per_head: HashMap<ItemId, usize> = HashMap::new();
        ranked.retain(|rule| {
            let seen = per_head.entry(rule.y).or_insert(0);
            *seen += 1;
            *seen <= neighbourhood_cap
        });

        let mut cache = self
            .rules
            .write()
            .map_err(|_| anyhow!("Rule cache lock poisoned"))?;
        debug!(
            "Caching {} of {} rules (cap {} per head)",
            ranked.len(),
            rules.len(),
            neighbourhood_cap
        );
        *cache = ranked;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::TimeContext;

    fn rule(x: ItemId, y: ItemId, support: f64) -> Rule {
        Rule {
            x: vec![x],
            y,
            support,
            confidence: Some(0.5),
            lift: None,
            context: TimeContext::default(),
        }
    }

    #[test]
    fn test_caps_rules_per_head() {
        let cache = InMemoryRuleCache::new();
        cache
            .write_rules(
                &[
                    rule(1, 9, 0.1),
                    rule(2, 9, 0.3),
                    rule(3, 9, 0.2),
                    rule(4, 8, 0.05),
                ],
                2,
            )
            .unwrap();

        let for_nine = cache.rules_for_head(9);
        assert_eq!(for_nine.len(), 2);
        assert_eq!(for_nine[0].x, vec![2]);
        assert_eq!(for_nine[1].x, vec![3]);
        assert_eq!(cache.rules_for_head(8).len(), 1);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_delete_clears_cache() {
        let cache = InMemoryRuleCache::new();
        cache.write_rules(&[rule(1, 2, 0.1)], 10).unwrap();
        assert!(!cache.is_empty());

        cache.delete_cached_rules().unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_write_replaces_previous_rules() {
        let cache = InMemoryRuleCache::new();
        cache.write_rules(&[rule(1, 9, 0.1), rule(5, 7, 0.4)], 1).unwrap();
        cache.write_rules(&[rule(2, 9, 0.3)], 1).unwrap();

        let rules = cache.rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].x, vec![2]);
        assert!(cache.rules_for_head(7).is_empty());
    }

    #[test]
    fn test_concurrent_writers_never_exceed_cap() {
        let cache = InMemoryRuleCache::new();
        std::thread::scope(|scope| {
            for writer in 0..4u64 {
                let cache = &cache;
                scope.spawn(move || {
                    for round in 0..50u64 {
                        let rules: Vec<Rule> = (0..3)
                            .map(|x| rule(writer * 10 + x, 9, (round + x) as f64 / 100.0))
                            .collect();
                        cache.write_rules(&rules, 1).unwrap();
                    }
                });
            }
        });
        assert_eq!(cache.rules_for_head(9).len(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_cap_keeps_nothing() {
        let cache = InMemoryRuleCache::new();
        cache.write_rules(&[rule(1, 2, 0.1)], 0).unwrap();
        assert!(cache.rules().is_empty());
    }
}
