use super::{RecommendContext, RecommendationStrategy, match_rule_heads};
use crate::application::mining::{MiningParams, RuleMiner};
use crate::domain::partition::DataType;
use crate::domain::ports::OrderStore;
use crate::domain::rules::Rule;
use crate::domain::types::{Approach, ItemId, UserId};
use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::debug;

/// Association rules matched against the items a user keeps buying again.
#[derive(Debug, Clone)]
pub struct UserHistoryStrategy {
    params: MiningParams,
    rules: Vec<Rule>,
    /// Items each user purchased more than once, most frequent first.
    repeat_items: HashMap<UserId, Vec<ItemId>>,
}

impl UserHistoryStrategy {
    pub fn new(params: MiningParams) -> Self {
        Self {
            params,
            rules: Vec::new(),
            repeat_items: HashMap::new(),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn repeat_items(&self, user_id: UserId) -> &[ItemId] {
        self.repeat_items.get(&user_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl RecommendationStrategy for UserHistoryStrategy {
    fn approach(&self) -> Approach {
        Approach::UserHistory
    }

    fn train(&mut self, store: &dyn OrderStore, data_type: DataType) -> Result<()> {
        let miner = RuleMiner::from_store(store, data_type)?;
        self.rules = miner.mine_rules(&self.params);

        let users = store
            .user_items(data_type)
            .context("Failed to fetch user items")?;
        self.repeat_items.clear();
        for user_id in users.into_keys() {
            let repeated: Vec<ItemId> = store
                .ranked_user_items(user_id, data_type)?
                .into_iter()
                .filter(|f| f.count > 1)
                .map(|f| f.item)
                .collect();
            if !repeated.is_empty() {
                self.repeat_items.insert(user_id, repeated);
            }
        }

        debug!(
            "User history trained with {} rules, {} users with repeat purchases",
            self.rules.len(),
            self.repeat_items.len()
        );
        Ok(())
    }

    fn recommend(&self, ctx: &RecommendContext<'_>) -> Vec<ItemId> {
        match_rule_heads(&self.rules, self.repeat_items(ctx.user_id), &ctx.time, ctx.k)
    }

    fn is_applicable(&self, ctx: &RecommendContext<'_>) -> bool {
        !self.repeat_items(ctx.user_id).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Order, TimeContext};
    use crate::infrastructure::in_memory::PartitionedOrderStore;
    use std::collections::BTreeSet;

    fn order(order_id: u64, user_id: u64, item_id: u64) -> Order {
        Order::new(order_id, user_id, item_id, BTreeSet::new(), 1_614_969_000 + order_id as i64)
            .unwrap()
    }

    #[test]
    fn test_body_is_repeat_purchases_only() {
        let store = PartitionedOrderStore::from_orders(vec![
            // user 1 buys 1 twice and 3 once
            order(1, 1, 1),
            order(1, 1, 2),
            order(2, 1, 1),
            order(2, 1, 2),
            order(3, 1, 3),
            order(3, 1, 4),
            // user 2 buys everything once
            order(4, 2, 3),
            order(4, 2, 4),
        ]);
        let mut strategy = UserHistoryStrategy::new(MiningParams {
            min_support: 0.1,
            max_body_size: 1,
            ..MiningParams::default()
        });
        strategy.train(&store, DataType::Train).unwrap();

        assert_eq!(strategy.repeat_items(1), &[1, 2]);
        let ctx = RecommendContext {
            user_id: 1,
            basket: &[],
            time: TimeContext::default(),
            k: 5,
        };
        assert!(strategy.is_applicable(&ctx));
        assert_eq!(strategy.recommend(&ctx), vec![2, 1]);

        let stranger = RecommendContext { user_id: 2, ..ctx };
        assert!(!strategy.is_applicable(&stranger));
        assert!(strategy.recommend(&stranger).is_empty());
    }
}
