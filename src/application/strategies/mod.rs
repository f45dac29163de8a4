//! Recommendation strategies blended by the ensemble.
//!
//! Every strategy is trained once against a partition of an `OrderStore` and
//! then answers `recommend` from its own snapshot only.

mod order_association;
mod time_related;
mod user_history;
mod user_history2;

pub use order_association::OrderAssociationStrategy;
pub use time_related::TimeRelatedStrategy;
pub use user_history::UserHistoryStrategy;
pub use user_history2::UserHistory2Strategy;

use crate::application::mining::MiningParams;
use crate::config::MdarConfig;
use crate::domain::partition::DataType;
use crate::domain::ports::{OrderStore, RuleSink};
use crate::domain::rules::Rule;
use crate::domain::types::{Approach, ItemId, TimeContext, TimeFlags, UserId};
use anyhow::Result;
use std::sync::Arc;

/// Everything known about a request at the moment it is made.
#[derive(Debug, Clone, Copy)]
pub struct RecommendContext<'a> {
    pub user_id: UserId,
    /// Items already in the order being built.
    pub basket: &'a [ItemId],
    pub time: TimeContext,
    pub k: usize,
}

pub trait RecommendationStrategy: Send + Sync {
    fn approach(&self) -> Approach;

    /// Build the strategy's snapshot from `data_type` of the store.
    fn train(&mut self, store: &dyn OrderStore, data_type: DataType) -> Result<()>;

    /// At most `ctx.k` items, best first. Empty when nothing is known.
    fn recommend(&self, ctx: &RecommendContext<'_>) -> Vec<ItemId>;

    /// Whether the strategy has anything to work from for this request.
    fn is_applicable(&self, _ctx: &RecommendContext<'_>) -> bool {
        true
    }
}

/// The closed set of strategies the ensemble knows about.
#[derive(Debug, Clone)]
pub enum Recommender {
    OrderAssociation(OrderAssociationStrategy),
    UserHistory(UserHistoryStrategy),
    UserHistory2(UserHistory2Strategy),
    TimeRelated(TimeRelatedStrategy),
}

impl Recommender {
    pub fn from_config(approach: Approach, config: &MdarConfig, sink: Arc<dyn RuleSink>) -> Self {
        let strategies = &config.strategies;
        match approach {
            Approach::OrderAssociation => {
                let oa = strategies.order_association;
                let params = mining_params(config, oa.time);
                Recommender::OrderAssociation(
                    OrderAssociationStrategy::new(
                        MiningParams {
                            use_confidence: oa.use_confidence,
                            use_lift: oa.use_lift,
                            ..params
                        },
                        sink,
                        config.neighbourhood_size,
                    )
                    .with_itemset_fallback(oa.itemset_fallback),
                )
            }
            Approach::UserHistory => {
                let uh = strategies.user_history;
                Recommender::UserHistory(UserHistoryStrategy::new(MiningParams {
                    use_confidence: uh.use_confidence,
                    ..mining_params(config, uh.time)
                }))
            }
            Approach::UserHistory2 => {
                Recommender::UserHistory2(UserHistory2Strategy::new(strategies.user_history2))
            }
            Approach::TimeRelated => {
                Recommender::TimeRelated(TimeRelatedStrategy::new(strategies.time_related_time))
            }
        }
    }

    fn inner(&self) -> &dyn RecommendationStrategy {
        match self {
            Recommender::OrderAssociation(s) => s,
            Recommender::UserHistory(s) => s,
            Recommender::UserHistory2(s) => s,
            Recommender::TimeRelated(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn RecommendationStrategy {
        match self {
            Recommender::OrderAssociation(s) => s,
            Recommender::UserHistory(s) => s,
            Recommender::UserHistory2(s) => s,
            Recommender::TimeRelated(s) => s,
        }
    }
}

impl RecommendationStrategy for Recommender {
    fn approach(&self) -> Approach {
        self.inner().approach()
    }

    fn train(&mut self, store: &dyn OrderStore, data_type: DataType) -> Result<()> {
        self.inner_mut().train(store, data_type)
    }

    fn recommend(&self, ctx: &RecommendContext<'_>) -> Vec<ItemId> {
        self.inner().recommend(ctx)
    }

    fn is_applicable(&self, ctx: &RecommendContext<'_>) -> bool {
        self.inner().is_applicable(ctx)
    }
}

fn mining_params(config: &MdarConfig, time: TimeFlags) -> MiningParams {
    MiningParams {
        min_support: config.thresholds.min_support,
        max_body_size: config.max_rule_body,
        time,
        use_confidence: false,
        min_confidence: config.thresholds.min_confidence,
        use_lift: false,
        min_lift: config.thresholds.min_lift,
    }
}

/// Heads of the rules whose body shares an item with `body`, in rule order.
///
/// Scanning stops at the first matching rule whose time context disagrees with
/// `time`, and once `k` distinct heads are collected.
pub(crate) fn match_rule_heads(
    rules: &[Rule],
    body: &[ItemId],
    time: &TimeContext,
    k: usize,
) -> Vec<ItemId> {
    let mut heads: Vec<ItemId> = Vec::new();
    if body.is_empty() || k == 0 {
        return heads;
    }

    for rule in rules.iter().filter(|r| r.body_intersects(body)) {
        if !rule.context.is_compatible(time) {
            break;
        }
        if !heads.contains(&rule.y) {
            heads.push(rule.y);
            if heads.len() >= k {
                break;
            }
        }
    }
    heads
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::NoopRuleSink;
    use crate::domain::types::{Order, PartOfDay};
    use crate::infrastructure::in_memory::PartitionedOrderStore;
    use std::collections::BTreeSet;

    fn rule(x: Vec<ItemId>, y: ItemId, part_of_day: Option<PartOfDay>) -> Rule {
        Rule {
            x,
            y,
            support: 0.5,
            confidence: None,
            lift: None,
            context: TimeContext {
                part_of_day,
                ..TimeContext::default()
            },
        }
    }

    fn evening() -> TimeContext {
        TimeContext {
            part_of_day: Some(PartOfDay::Evening),
            ..TimeContext::default()
        }
    }

    #[test]
    fn test_match_rule_heads_dedups_and_caps() {
        let rules = vec![
            rule(vec![1], 5, None),
            rule(vec![9], 6, None),
            rule(vec![1, 2], 5, None),
            rule(vec![2], 7, None),
            rule(vec![2], 8, None),
        ];
        assert_eq!(match_rule_heads(&rules, &[1, 2], &evening(), 2), vec![5, 7]);
        assert_eq!(match_rule_heads(&rules, &[1, 2], &evening(), 10), vec![5, 7, 8]);
        assert!(match_rule_heads(&rules, &[], &evening(), 10).is_empty());
    }

    #[test]
    fn test_match_rule_heads_aborts_on_first_context_mismatch() {
        let rules = vec![
            rule(vec![1], 5, Some(PartOfDay::Evening)),
            rule(vec![1], 6, Some(PartOfDay::Morning)),
            rule(vec![1], 7, Some(PartOfDay::Evening)),
        ];
        assert_eq!(match_rule_heads(&rules, &[1], &evening(), 10), vec![5]);
    }

    #[test]
    fn test_user_history_from_config_mines_with_confidence() {
        let orders = [(1, 1), (1, 2), (2, 1), (2, 2)]
            .into_iter()
            .map(|(order_id, item_id)| {
                Order::new(order_id, 1, item_id, BTreeSet::new(), 1_614_969_000 + order_id as i64)
                    .unwrap()
            })
            .collect();
        let store = PartitionedOrderStore::from_orders(orders);

        let mut recommender = Recommender::from_config(
            Approach::UserHistory,
            &MdarConfig::default(),
            Arc::new(NoopRuleSink),
        );
        recommender.train(&store, DataType::Train).unwrap();

        let Recommender::UserHistory(strategy) = &recommender else {
            panic!("expected the user history strategy");
        };
        assert_eq!(strategy.rules().len(), 2);
        assert!(strategy.rules().iter().all(|r| r.confidence == Some(1.0)));
    }

    #[test]
    fn test_recommender_from_config_covers_every_approach() {
        let config = MdarConfig::default();
        for approach in Approach::ALL {
            let recommender = Recommender::from_config(approach, &config, Arc::new(NoopRuleSink));
            assert_eq!(recommender.approach(), approach);
        }
    }
}
