use super::{RecommendContext, RecommendationStrategy};
use crate::domain::partition::DataType;
use crate::domain::ports::OrderStore;
use crate::domain::types::{Approach, ItemId, TimeContext, TimeFlags};
use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
struct RankedSlice {
    context: TimeContext,
    /// Distinct items, most purchased first.
    items: Vec<ItemId>,
}

/// Recommends what sells in the same part of the day / day of the week.
#[derive(Debug, Clone)]
pub struct TimeRelatedStrategy {
    flags: TimeFlags,
    slices: Vec<RankedSlice>,
    popular: Vec<ItemId>,
}

impl TimeRelatedStrategy {
    pub fn new(flags: TimeFlags) -> Self {
        Self {
            flags,
            slices: Vec::new(),
            popular: Vec::new(),
        }
    }
}

fn rank_by_frequency(purchases: &[ItemId]) -> Vec<ItemId> {
    let mut counts: HashMap<ItemId, usize> = HashMap::new();
    for &item in purchases {
        *counts.entry(item).or_insert(0) += 1;
    }
    let mut ranked: Vec<(ItemId, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().map(|(item, _)| item).collect()
}

impl RecommendationStrategy for TimeRelatedStrategy {
    fn approach(&self) -> Approach {
        Approach::TimeRelated
    }

    fn train(&mut self, store: &dyn OrderStore, data_type: DataType) -> Result<()> {
        self.slices = store
            .all_items_by_time(self.flags, data_type)
            .context("Failed to fetch items by time")?
            .into_iter()
            .map(|slice| RankedSlice {
                context: slice.context,
                items: rank_by_frequency(&slice.items),
            })
            .collect();
        self.popular = store
            .popular_items(data_type)
            .context("Failed to fetch popular items")?
            .into_iter()
            .map(|scored| scored.item)
            .collect();

        debug!(
            "Time related trained with {} slices, {} popular items",
            self.slices.len(),
            self.popular.len()
        );
        Ok(())
    }

    fn recommend(&self, ctx: &RecommendContext<'_>) -> Vec<ItemId> {
        let wanted = ctx.time.project(self.flags);
        let mut items: Vec<ItemId> = Vec::with_capacity(ctx.k);

        for slice in self.slices.iter().filter(|s| wanted.selects(&s.context)) {
            for &item in &slice.items {
                if items.len() >= ctx.k {
                    return items;
                }
                if !items.contains(&item) {
                    items.push(item);
                }
            }
        }

        for &item in &self.popular {
            if items.len() >= ctx.k {
                break;
            }
            if !items.contains(&item) {
                items.push(item);
            }
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Order, PartOfDay};
    use crate::infrastructure::in_memory::PartitionedOrderStore;
    use std::collections::BTreeSet;

    // 2021-03-05 08:00 UTC and 18:30 UTC
    const MORNING: i64 = 1_614_931_200;
    const EVENING: i64 = 1_614_969_000;

    fn order(order_id: u64, item_id: u64, timestamp: i64) -> Order {
        Order::new(order_id, 1, item_id, BTreeSet::new(), timestamp).unwrap()
    }

    fn ctx(part_of_day: PartOfDay, k: usize) -> RecommendContext<'static> {
        RecommendContext {
            user_id: 1,
            basket: &[],
            time: TimeContext {
                part_of_day: Some(part_of_day),
                ..TimeContext::default()
            },
            k,
        }
    }

    fn trained() -> TimeRelatedStrategy {
        let store = PartitionedOrderStore::from_orders(vec![
            order(1, 1, MORNING),
            order(2, 1, MORNING + 60),
            order(3, 2, MORNING + 120),
            order(4, 3, EVENING),
            order(5, 3, EVENING + 60),
            order(6, 3, EVENING + 120),
            order(7, 4, EVENING + 180),
        ]);
        let mut strategy = TimeRelatedStrategy::new(TimeFlags::part_of_day());
        strategy.train(&store, DataType::Train).unwrap();
        strategy
    }

    #[test]
    fn test_slice_items_first_then_popular() {
        let strategy = trained();
        assert_eq!(strategy.recommend(&ctx(PartOfDay::Morning, 2)), vec![1, 2]);
        assert_eq!(strategy.recommend(&ctx(PartOfDay::Morning, 3)), vec![1, 2, 3]);
        assert_eq!(strategy.recommend(&ctx(PartOfDay::Evening, 2)), vec![3, 4]);
    }

    #[test]
    fn test_unknown_slice_falls_back_to_popularity() {
        let strategy = trained();
        assert_eq!(strategy.recommend(&ctx(PartOfDay::Night, 2)), vec![3, 1]);
    }

    #[test]
    fn test_untrained_strategy_recommends_nothing() {
        let strategy = TimeRelatedStrategy::new(TimeFlags::part_of_day());
        assert!(strategy.recommend(&ctx(PartOfDay::Night, 5)).is_empty());
    }
}
