//! In-memory order store.
//!
//! The full order history is loaded once and shared behind an `Arc`. Each fold
//! gets a `PartitionedOrderStore` that answers the data-access queries against
//! the train or test time ranges of that fold.
//!
//! # Limitations
//!
//! - The whole history must fit in RAM
//! - Every query scans the partition; nothing is indexed

use crate::domain::errors::DataAccessError;
use crate::domain::metrics::safe_div;
use crate::domain::partition::{DataType, PartitionPredicate, TimePartitioner};
use crate::domain::ports::{OrderStore, PartitionSource};
use crate::domain::rules::ItemSelector;
use crate::domain::types::{
    ItemFrequency, ItemId, Order, OrderId, ScoredItem, TimeContext, TimeFlags, TimeSlice, UserId,
};
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// The complete order history, ordered by timestamp.
#[derive(Debug, Clone, Default)]
pub struct OrderHistory {
    orders: Vec<Order>,
}

impl OrderHistory {
    pub fn new(mut orders: Vec<Order>) -> Self {
        orders.sort_by_key(|o| (o.timestamp, o.order_id));
        Self { orders }
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// `OrderStore` over one fold of an `OrderHistory`.
#[derive(Debug, Clone)]
pub struct PartitionedOrderStore {
    history: Arc<OrderHistory>,
    train: PartitionPredicate,
    test: PartitionPredicate,
}

impl PartitionedOrderStore {
    /// View of the fold currently selected on `partitioner`.
    pub fn new(history: Arc<OrderHistory>, partitioner: &TimePartitioner) -> Self {
        Self {
            history,
            train: partitioner.current(DataType::Train),
            test: partitioner.current(DataType::Test),
        }
    }

    /// View where every partition is the whole history.
    pub fn unpartitioned(history: Arc<OrderHistory>) -> Self {
        Self {
            history,
            train: PartitionPredicate::all(),
            test: PartitionPredicate::all(),
        }
    }

    pub fn from_orders(orders: Vec<Order>) -> Self {
        Self::unpartitioned(Arc::new(OrderHistory::new(orders)))
    }

    fn rows(&self, data_type: DataType) -> impl Iterator<Item = &Order> {
        let predicate = match data_type {
            DataType::Train => Some(&self.train),
            DataType::Test => Some(&self.test),
            DataType::All => None,
        };
        self.history
            .orders()
            .iter()
            .filter(move |o| predicate.is_none_or(|p| p.contains(o.timestamp)))
    }

    /// Items by the number of distinct matching orders containing them.
    fn supported_items<'a>(rows: impl Iterator<Item = &'a Order>) -> Vec<ScoredItem> {
        let mut orders: HashSet<OrderId> = HashSet::new();
        let mut holders: HashMap<ItemId, HashSet<OrderId>> = HashMap::new();
        for order in rows {
            orders.insert(order.order_id);
            holders.entry(order.item_id).or_default().insert(order.order_id);
        }

        let total = orders.len() as f64;
        let mut items: Vec<ScoredItem> = holders
            .into_iter()
            .map(|(item, holders)| ScoredItem {
                item,
                support: safe_div(holders.len() as f64, total),
            })
            .collect();
        items.sort_by(|a, b| b.support.total_cmp(&a.support).then_with(|| a.item.cmp(&b.item)));
        items
    }

    /// Σ(purchases of the same (user, item) - 1) over all purchases of the matching rows.
    fn repeat_purchase_rate<'a>(rows: impl Iterator<Item = &'a Order>) -> f64 {
        let mut counts: HashMap<(UserId, ItemId), usize> = HashMap::new();
        let mut purchases = 0usize;
        for order in rows {
            *counts.entry((order.user_id, order.item_id)).or_insert(0) += 1;
            purchases += 1;
        }
        let repeats: usize = counts.values().map(|c| c - 1).sum();
        safe_div(repeats as f64, purchases as f64)
    }
}

impl OrderStore for PartitionedOrderStore {
    fn orders(&self, data_type: DataType) -> Result<Vec<Order>> {
        Ok(self.rows(data_type).cloned().collect())
    }

    fn order_count(&self, data_type: DataType) -> Result<usize> {
        Ok(self
            .rows(data_type)
            .map(|o| o.order_id)
            .collect::<HashSet<_>>()
            .len())
    }

    fn item_count(&self, data_type: DataType) -> Result<usize> {
        Ok(self
            .rows(data_type)
            .map(|o| o.item_id)
            .collect::<HashSet<_>>()
            .len())
    }

    fn user_items(&self, data_type: DataType) -> Result<HashMap<UserId, BTreeSet<ItemId>>> {
        let mut users: HashMap<UserId, BTreeSet<ItemId>> = HashMap::new();
        for order in self.rows(data_type) {
            users.entry(order.user_id).or_default().insert(order.item_id);
        }
        Ok(users)
    }

    fn ranked_user_items(&self, user_id: UserId, data_type: DataType) -> Result<Vec<ItemFrequency>> {
        let mut counts: HashMap<ItemId, usize> = HashMap::new();
        for order in self.rows(data_type).filter(|o| o.user_id == user_id) {
            *counts.entry(order.item_id).or_insert(0) += 1;
        }
        let mut ranked: Vec<ItemFrequency> = counts
            .into_iter()
            .map(|(item, count)| ItemFrequency { item, count })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.item.cmp(&b.item)));
        Ok(ranked)
    }

    fn popular_items(&self, data_type: DataType) -> Result<Vec<ScoredItem>> {
        Ok(Self::supported_items(self.rows(data_type)))
    }

    fn items_by_time(&self, context: &TimeContext, data_type: DataType) -> Result<Vec<ScoredItem>> {
        Ok(Self::supported_items(
            self.rows(data_type)
                .filter(|o| context.selects(&o.time_context())),
        ))
    }

    fn all_items_by_time(&self, flags: TimeFlags, data_type: DataType) -> Result<Vec<TimeSlice>> {
        let mut slices: BTreeMap<TimeContext, Vec<ItemId>> = BTreeMap::new();
        for order in self.rows(data_type) {
            slices
                .entry(order.time_context().project(flags))
                .or_default()
                .push(order.item_id);
        }

        let mut slices: Vec<TimeSlice> = slices
            .into_iter()
            .map(|(context, items)| TimeSlice {
                context,
                count: items.len(),
                items,
            })
            .collect();
        // stable: equal counts keep context order
        slices.sort_by(|a, b| b.count.cmp(&a.count));
        debug!("{} time slices in {} partition", slices.len(), data_type);
        Ok(slices)
    }

    fn support(&self, selector: &ItemSelector, order_count: usize, data_type: DataType) -> Result<f64> {
        let wanted = selector.items();
        let mut baskets: HashMap<OrderId, HashSet<ItemId>> = HashMap::new();
        for order in self.rows(data_type) {
            baskets.entry(order.order_id).or_default().insert(order.item_id);
        }
        let holding = baskets
            .values()
            .filter(|items| wanted.iter().all(|item| items.contains(item)))
            .count();
        Ok(safe_div(holding as f64, order_count as f64))
    }

    fn user_repeat_purchase_rate(&self, user_id: Option<UserId>, data_type: DataType) -> Result<f64> {
        Ok(Self::repeat_purchase_rate(
            self.rows(data_type)
                .filter(|o| user_id.is_none_or(|id| o.user_id == id)),
        ))
    }

    fn item_repeat_purchase_rate(&self, item_id: Option<ItemId>, data_type: DataType) -> Result<f64> {
        Ok(Self::repeat_purchase_rate(
            self.rows(data_type)
                .filter(|o| item_id.is_none_or(|id| o.item_id == id)),
        ))
    }
}

/// Opens fold views over a shared `OrderHistory`.
#[derive(Debug, Clone)]
pub struct InMemoryPartitionSource {
    history: Arc<OrderHistory>,
}

impl InMemoryPartitionSource {
    pub fn new(history: Arc<OrderHistory>) -> Self {
        Self { history }
    }
}

impl PartitionSource for InMemoryPartitionSource {
    fn open_fold(&self, folds: usize, fold: usize) -> Result<Box<dyn OrderStore>> {
        if self.history.is_empty() {
            return Err(DataAccessError::EmptyHistory.into());
        }
        let mut partitioner = TimePartitioner::build(self.history.orders(), folds)?;
        partitioner.set_fold(fold)?;
        Ok(Box::new(PartitionedOrderStore::new(
            self.history.clone(),
            &partitioner,
        )))
    }

    fn open_all(&self) -> Result<Box<dyn OrderStore>> {
        Ok(Box::new(PartitionedOrderStore::unpartitioned(
            self.history.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::PartitionError;
    use crate::domain::types::PartOfDay;
    use approx::assert_abs_diff_eq;

    // 2021-03-05 08:00 UTC (morning, Friday) and 18:30 UTC (evening, Friday)
    const MORNING: i64 = 1_614_931_200;
    const EVENING: i64 = 1_614_969_000;

    fn order(order_id: u64, user_id: u64, item_id: u64, timestamp: i64) -> Order {
        Order::new(order_id, user_id, item_id, BTreeSet::new(), timestamp).unwrap()
    }

    fn store() -> PartitionedOrderStore {
        PartitionedOrderStore::from_orders(vec![
            order(1, 1, 10, MORNING),
            order(1, 1, 11, MORNING),
            order(2, 1, 10, MORNING + 60),
            order(3, 2, 10, EVENING),
            order(3, 2, 12, EVENING),
            order(4, 2, 12, EVENING + 60),
        ])
    }

    #[test]
    fn test_counts() {
        let store = store();
        assert_eq!(store.order_count(DataType::All).unwrap(), 4);
        assert_eq!(store.item_count(DataType::All).unwrap(), 3);
        assert_eq!(store.orders(DataType::Train).unwrap().len(), 6);
    }

    #[test]
    fn test_user_items_and_ranking() {
        let store = store();
        let users = store.user_items(DataType::All).unwrap();
        assert_eq!(users[&1], BTreeSet::from([10, 11]));

        let ranked = store.ranked_user_items(1, DataType::All).unwrap();
        assert_eq!(
            ranked,
            vec![
                ItemFrequency { item: 10, count: 2 },
                ItemFrequency { item: 11, count: 1 }
            ]
        );
    }

    #[test]
    fn test_popularity_and_support() {
        let store = store();
        let popular = store.popular_items(DataType::All).unwrap();
        assert_eq!(popular[0].item, 10);
        assert_abs_diff_eq!(popular[0].support, 0.75, epsilon = 1e-9);

        let pair = ItemSelector::from(vec![10, 12]);
        assert_abs_diff_eq!(store.support(&pair, 4, DataType::All).unwrap(), 0.25, epsilon = 1e-9);
        assert_abs_diff_eq!(store.support(&ItemSelector::Item(11), 0, DataType::All).unwrap(), 0.0);
    }

    #[test]
    fn test_items_by_time() {
        let store = store();
        let evening = TimeContext {
            part_of_day: Some(PartOfDay::Evening),
            ..TimeContext::default()
        };
        let items = store.items_by_time(&evening, DataType::All).unwrap();
        assert_eq!(items[0].item, 12);
        assert_abs_diff_eq!(items[0].support, 1.0, epsilon = 1e-9);

        let slices = store.all_items_by_time(TimeFlags::part_of_day(), DataType::All).unwrap();
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].count, 3);
        assert!(slices.iter().all(|s| s.context.day_in_week.is_none()));
    }

    #[test]
    fn test_repeat_purchase_rates() {
        let store = store();
        // (1,10) twice and (2,12) twice over 6 purchases
        assert_abs_diff_eq!(
            store.user_repeat_purchase_rate(None, DataType::All).unwrap(),
            2.0 / 6.0,
            epsilon = 1e-9
        );
        assert_abs_diff_eq!(
            store.user_repeat_purchase_rate(Some(1), DataType::All).unwrap(),
            1.0 / 3.0,
            epsilon = 1e-9
        );
        assert_abs_diff_eq!(
            store.item_repeat_purchase_rate(Some(10), DataType::All).unwrap(),
            1.0 / 3.0,
            epsilon = 1e-9
        );
        assert_eq!(store.item_repeat_purchase_rate(Some(99), DataType::All).unwrap(), 0.0);
    }

    #[test]
    fn test_fold_views_split_history() {
        let history = Arc::new(OrderHistory::new(store().orders(DataType::All).unwrap()));
        let source = InMemoryPartitionSource::new(history);

        let fold = source.open_fold(2, 0).unwrap();
        let train = fold.orders(DataType::Train).unwrap();
        let test = fold.orders(DataType::Test).unwrap();
        assert_eq!(train.len() + test.len(), 6);
        assert!(test.iter().all(|t| train.iter().all(|o| o.timestamp > t.timestamp)));

        let error = source.open_fold(2, 5).err().unwrap();
        assert_eq!(
            error.downcast_ref::<PartitionError>(),
            Some(&PartitionError::FoldOutOfRange { fold: 5, folds: 2 })
        );
    }

    #[test]
    fn test_empty_history_is_a_data_access_error() {
        let source = InMemoryPartitionSource::new(Arc::new(OrderHistory::default()));
        let error = source.open_fold(3, 0).err().unwrap();
        assert!(error.downcast_ref::<DataAccessError>().is_some());
    }
}
