//! Association rule mining over the baskets of one partition.
//!
//! The miner takes a snapshot of the partition's baskets once and answers
//! every query from it, so recommending never goes back to the store.

use crate::domain::metrics::safe_div;
use crate::domain::partition::DataType;
use crate::domain::ports::OrderStore;
use crate::domain::rules::{ItemSelector, ItemsetCandidate, MAX_RULE_BODY, Rule};
use crate::domain::types::{ItemId, Order, OrderId, TimeContext, TimeFlags, UserId};
use anyhow::{Context, Result};
use itertools::Itertools;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// Distinct items of one order, with the order's time attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Basket {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub context: TimeContext,
    /// Sorted, deduplicated.
    pub items: Vec<ItemId>,
}

impl Basket {
    fn contains_all(&self, items: &[ItemId]) -> bool {
        items.iter().all(|item| self.items.binary_search(item).is_ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MiningParams {
    pub min_support: f64,
    pub max_body_size: usize,
    pub time: TimeFlags,
    pub use_confidence: bool,
    pub min_confidence: f64,
    pub use_lift: bool,
    pub min_lift: f64,
}

impl Default for MiningParams {
    fn default() -> Self {
        Self {
            min_support: 0.02,
            max_body_size: MAX_RULE_BODY,
            time: TimeFlags::NONE,
            use_confidence: false,
            min_confidence: 0.0,
            use_lift: false,
            min_lift: 0.0,
        }
    }
}

/// Result of a bounded itemset search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemsetSearch {
    /// Connected items, best support first, one entry per item.
    pub candidates: Vec<ItemsetCandidate>,
    /// Seed combinations actually looked up, in search order.
    pub explored: Vec<Vec<ItemId>>,
    /// Seeds whose singleton lookup found no connected item.
    pub unprosperous: BTreeSet<ItemId>,
}

type RuleKey = (Vec<ItemId>, ItemId, TimeContext);

#[derive(Debug, Clone, Default)]
pub struct RuleMiner {
    baskets: Vec<Basket>,
    /// Orders in the partition, the denominator of every support.
    total_orders: usize,
    /// Partition-wide support of every single item.
    item_supports: HashMap<ItemId, f64>,
}

impl RuleMiner {
    /// Snapshot the baskets of `data_type` from the store.
    /// Snapshot the baskets of `data_type` from the store.
    ///
    /// The order count and the single item supports come from the store.
    pub fn from_store(store: &dyn OrderStore, data_type: DataType) -> Result<Self> {
        let orders = store
            .orders(data_type)
            .with_context(|| format!("Failed to fetch {} orders for rule mining", data_type))?;
        let total_orders = store
            .order_count(data_type)
            .with_context(|| format!("Failed to count {} orders", data_type))?;

        let baskets = Self::group_baskets(&orders);
        let items: BTreeSet<ItemId> = baskets.iter().flat_map(|b| b.items.iter().copied()).collect();
        let mut item_supports = HashMap::with_capacity(items.len());
        for item in items {
            let support = store
                .support(&ItemSelector::Item(item), total_orders, data_type)
                .with_context(|| format!("Failed to fetch support of item {}", item))?;
            item_supports.insert(item, support);
        }

        Ok(Self {
            baskets,
            total_orders,
            item_supports,
        })
    }

    pub fn from_orders(orders: &[Order]) -> Self {
        let baskets = Self::group_baskets(orders);
        let total_orders = baskets.len();

        let mut counts: HashMap<ItemId, usize> = HashMap::new();
        for basket in &baskets {
            for &item in &basket.items {
                *counts.entry(item).or_insert(0) += 1;
            }
        }
        let item_supports = counts
            .into_iter()
            .map(|(item, count)| (item, count as f64 / total_orders as f64))
            .collect();

        Self {
            baskets,
            total_orders,
            item_supports,
        }
    }

    fn group_baskets(orders: &[Order]) -> Vec<Basket> {
        let mut index: HashMap<OrderId, usize> = HashMap::new();
        let mut baskets: Vec<Basket> = Vec::new();

        for order in orders {
            let slot = *index.entry(order.order_id).or_insert_with(|| {
                baskets.push(Basket {
                    order_id: order.order_id,
                    user_id: order.user_id,
                    context: order.time_context(),
                    items: Vec::new(),
                });
                baskets.len() - 1
            });
            baskets[slot].items.push(order.item_id);
        }
        for basket in &mut baskets {
            basket.items.sort_unstable();
            basket.items.dedup();
        }
        baskets
    }

    pub fn baskets(&self) -> &[Basket] {
        &self.baskets
    }

    pub fn order_count(&self) -> usize {
        self.total_orders
    }

    /// Partition-wide support of `item`, 0 when it was never bought.
    pub fn item_support(&self, item: ItemId) -> f64 {
        self.item_supports.get(&item).copied().unwrap_or(0.0)
    }

    /// Mine `body => head` rules with bodies of 1 to `max_body_size` items.
    ///
    /// Support is the number of baskets holding body and head, within the same
    /// projected time context, over all baskets of the partition. When the best
    /// rule of a body size is already below `min_support`, larger bodies are not
    /// enumerated.
    pub fn mine_rules(&self, params: &MiningParams) -> Vec<Rule> {
        let total = self.order_count();
        if total == 0 {
            return Vec::new();
        }

        let max_body = params.max_body_size.clamp(1, MAX_RULE_BODY);
        let mut rules: Vec<Rule> = Vec::new();

        for body_size in 1..=max_body {
            let rule_counts = self.count_rules(body_size, params.time);
            let mut candidates: Vec<Rule> = rule_counts
                .iter()
                .map(|((x, y, context), &count)| Rule {
                    x: x.clone(),
                    y: *y,
                    support: count as f64 / total as f64,
                    confidence: None,
                    lift: None,
                    context: *context,
                })
                .collect();
            candidates.sort_by(Rule::rank_cmp);

            let best = candidates.first().map(|r| r.support).unwrap_or(0.0);
            if best < params.min_support {
                debug!(
                    "Body size {}: best support {:.4} below {:.4}, stopping",
                    body_size, best, params.min_support
                );
                break;
            }
            candidates.retain(|r| r.support >= params.min_support);

            if params.use_confidence || params.use_lift {
                let body_counts = self.count_combinations(body_size, params.time);
                for rule in &mut candidates {
                    let body_count =
                        body_counts.get(&(rule.x.clone(), rule.context)).copied().unwrap_or(0);
                    let body_support = body_count as f64 / total as f64;
                    if params.use_confidence {
                        rule.confidence = Some(safe_div(rule.support, body_support));
                    }
                    if params.use_lift {
                        let head_support = self.item_support(rule.y);
                        rule.lift = Some(safe_div(rule.support, body_support * head_support));
                    }
                }
                candidates.retain(|r| {
                    r.confidence.is_none_or(|c| c >= params.min_confidence)
                        && r.lift.is_none_or(|l| l >= params.min_lift)
                });
            }

            debug!("Body size {}: {} rules", body_size, candidates.len());
            rules.extend(candidates);
        }

        rules.sort_by(Rule::rank_cmp);
        info!("Mined {} rules from {} orders", rules.len(), total);
        rules
    }

    /// Count baskets per (body, head, context) for bodies of `body_size` items.
    fn count_rules(&self, body_size: usize, time: TimeFlags) -> HashMap<RuleKey, usize> {
        let mut counts: HashMap<RuleKey, usize> = HashMap::new();
        for basket in &self.baskets {
            if basket.items.len() <= body_size {
                continue;
            }
            let context = basket.context.project(time);
            for &head in &basket.items {
                let rest = basket.items.iter().copied().filter(|&item| item != head);
                for body in rest.combinations(body_size) {
                    *counts.entry((body, head, context)).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    /// Count baskets per (combination, context) for combinations of `size` items.
    fn count_combinations(
        &self,
        size: usize,
        time: TimeFlags,
    ) -> HashMap<(Vec<ItemId>, TimeContext), usize> {
        let mut counts = HashMap::new();
        for basket in &self.baskets {
            let context = basket.context.project(time);
            for combo in basket.items.iter().copied().combinations(size) {
                *counts.entry((combo, context)).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Bounded apriori-style search for items bought together with `seeds`.
    ///
    /// Combinations of 1 to `max_combo_size - 1` seed items are looked up. A seed
    /// whose singleton lookup finds nothing is remembered and every later
    /// combination containing it is skipped. Only singleton failures are
    /// remembered.
    pub fn mine_itemset_candidates(&self, seeds: &[ItemId], max_combo_size: usize) -> ItemsetSearch {
        let mut seeds: Vec<ItemId> = seeds.to_vec();
        seeds.sort_unstable();
        seeds.dedup();

        let total = self.order_count();
        let max_combo_size = max_combo_size.min(MAX_RULE_BODY);
        let mut search = ItemsetSearch::default();
        if total == 0 || seeds.is_empty() {
            return search;
        }

        let mut best: HashMap<ItemId, ItemsetCandidate> = HashMap::new();
        for size in 1..max_combo_size.min(seeds.len() + 1) {
            for combo in seeds.iter().copied().combinations(size) {
                if combo.iter().any(|item| search.unprosperous.contains(item)) {
                    continue;
                }
                search.explored.push(combo.clone());

                let (body_count, connected) = self.connected_items(&combo);
                if connected.is_empty() {
                    if let [item] = combo.as_slice() {
                        search.unprosperous.insert(*item);
                    }
                    continue;
                }

                let body_support = body_count as f64 / total as f64;
                for (item, count) in connected {
                    let candidate = ItemsetCandidate {
                        item,
                        body: combo.clone(),
                        support: count as f64 / total as f64,
                        body_support,
                    };
                    match best.get(&item) {
                        Some(existing) if existing.support >= candidate.support => {}
                        _ => {
                            best.insert(item, candidate);
                        }
                    }
                }
            }
        }

        let mut candidates: Vec<ItemsetCandidate> = best.into_values().collect();
        candidates.sort_by(|a, b| b.support.total_cmp(&a.support).then_with(|| a.item.cmp(&b.item)));
        debug!(
            "Itemset search over {} seeds: {} combinations, {} candidates",
            seeds.len(),
            search.explored.len(),
            candidates.len()
        );
        search.candidates = candidates;
        search
    }

    /// Baskets holding every item of `combo`, and the other items in them with counts.
    fn connected_items(&self, combo: &[ItemId]) -> (usize, HashMap<ItemId, usize>) {
        let mut body_count = 0;
        let mut connected: HashMap<ItemId, usize> = HashMap::new();
        for basket in self.baskets.iter().filter(|b| b.contains_all(combo)) {
            body_count += 1;
            let others: HashSet<ItemId> = basket
                .items
                .iter()
                .copied()
                .filter(|item| !combo.contains(item))
                .collect();
            for item in others {
                *connected.entry(item).or_insert(0) += 1;
            }
        }
        (body_count, connected)
    }
}
