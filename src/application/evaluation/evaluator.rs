use crate::application::ensemble::{BasketBuffer, Mdar};
use crate::domain::metrics::{ConfusionMatrix, EvaluationMeasures, Outcome};
use crate::domain::partition::DataType;
use crate::domain::ports::OrderStore;
use crate::domain::types::Order;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Outcome of replaying the test partition with one value of `k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub k: usize,
    pub items_count: usize,
    pub confusion_matrix: ConfusionMatrix,
    /// Requests for which the ensemble had nothing to recommend.
    pub cases_without_history: u64,
}

impl EvaluationRun {
    pub fn measures(&self) -> EvaluationMeasures {
        self.confusion_matrix.measures()
    }
}

/// Replays test orders against a trained ensemble.
pub struct Evaluator<'a> {
    ensemble: &'a Mdar,
    store: &'a dyn OrderStore,
}

impl<'a> Evaluator<'a> {
    pub fn new(ensemble: &'a Mdar, store: &'a dyn OrderStore) -> Self {
        Self { ensemble, store }
    }

    pub fn evaluate(&self, k: usize) -> Result<EvaluationRun> {
        let (orders, items_count) = self.fetch()?;
        Ok(self.replay(&orders, items_count, k))
    }

    /// One run per `k`, fetching the test partition once.
    pub fn evaluate_all(&self, k_values: &[usize]) -> Result<Vec<EvaluationRun>> {
        self.evaluate_each(k_values, |_| Ok(()))
    }

    /// Like [`Evaluator::evaluate_all`], calling `before_each` ahead of every
    /// replay. An error from `before_each` stops the remaining runs.
    pub fn evaluate_each<F>(&self, k_values: &[usize], mut before_each: F) -> Result<Vec<EvaluationRun>>
    where
        F: FnMut(usize) -> Result<()>,
    {
        let (orders, items_count) = self.fetch()?;
        let mut runs = Vec::with_capacity(k_values.len());
        for &k in k_values {
            before_each(k)?;
            runs.push(self.replay(&orders, items_count, k));
        }
        Ok(runs)
    }

    fn fetch(&self) -> Result<(Vec<Order>, usize)> {
        let orders = self
            .store
            .orders(DataType::Test)
            .context("Failed to fetch test orders")?;
        let items_count = self
            .store
            .item_count(DataType::Train)
            .context("Failed to count training items")?;
        Ok((orders, items_count))
    }

    fn replay(&self, orders: &[Order], items_count: usize, k: usize) -> EvaluationRun {
        let mut matrix = ConfusionMatrix::default();
        let mut cases_without_history = 0;
        let mut buffer = BasketBuffer::default();

        for order in orders {
            let recommendations = self.ensemble.recommend(
                order.user_id,
                buffer.before(order.order_id),
                order.time_context(),
                k,
            );
            if matrix.record(order.item_id, &recommendations, items_count as u64)
                == Outcome::NoRecommendations
            {
                cases_without_history += 1;
            }
            buffer.push(order.item_id);
        }

        info!(
            "k={}: tp={} fp={} fn={} tn={} without history={}",
            k, matrix.tp, matrix.fp, matrix.fn_, matrix.tn, cases_without_history
        );
        EvaluationRun {
            k,
            items_count,
            confusion_matrix: matrix,
            cases_without_history,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApproachWeight, MdarConfig, StrategyConfig};
    use crate::domain::partition::TimePartitioner;
    use crate::domain::ports::NoopRuleSink;
    use crate::domain::types::Approach;
    use crate::infrastructure::in_memory::{OrderHistory, PartitionedOrderStore};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn order(order_id: u64, user_id: u64, item_id: u64) -> Order {
        Order::new(order_id, user_id, item_id, BTreeSet::new(), 1_614_969_000 + order_id as i64 * 60)
            .unwrap()
    }

    #[test]
    fn test_replays_test_orders_through_the_ensemble() {
        // user 1 keeps buying item 5; user 2 only shows up in the test window
        let history = Arc::new(OrderHistory::new(vec![
            order(1, 1, 5),
            order(2, 1, 5),
            order(3, 1, 6),
            order(4, 1, 5),
            order(5, 1, 5),
            order(6, 2, 7),
        ]));
        let mut partitioner = TimePartitioner::build(history.orders(), 2).unwrap();
        partitioner.set_fold(1).unwrap();
        let store = PartitionedOrderStore::new(history, &partitioner);

        let config = MdarConfig {
            strategies: StrategyConfig {
                approaches: vec![ApproachWeight::new(Approach::UserHistory2, 1.0)],
                ..StrategyConfig::default()
            },
            ..MdarConfig::default()
        };
        let mut ensemble = Mdar::new(config, Arc::new(NoopRuleSink));
        ensemble.train(&store, 1).unwrap();

        let runs = Evaluator::new(&ensemble, &store).evaluate_all(&[1, 2]).unwrap();

        // training items are 5 and 6
        assert_eq!(runs[0].items_count, 2);
        // k=1: user 1 gets [5] and buys 5 twice; user 2 has no history
        assert_eq!(
            runs[0].confusion_matrix,
            ConfusionMatrix { tp: 2, tn: 2, fp: 0, fn_: 0 }
        );
        assert_eq!(runs[0].cases_without_history, 1);
        // k=2: user 1 gets [5, 6]
        assert_eq!(
            runs[1].confusion_matrix,
            ConfusionMatrix { tp: 2, tn: 0, fp: 2, fn_: 0 }
        );
        assert_eq!(runs[1].measures().precision, 0.5);

        let single = Evaluator::new(&ensemble, &store).evaluate(2).unwrap();
        assert_eq!(single, runs[1]);
    }

    #[test]
    fn test_evaluate_each_stops_when_callback_fails() {
        let store = PartitionedOrderStore::from_orders(vec![order(1, 1, 5), order(2, 1, 5)]);
        let mut ensemble = Mdar::new(MdarConfig::default(), Arc::new(NoopRuleSink));
        ensemble.train(&store, 1).unwrap();

        let mut seen = Vec::new();
        let result = Evaluator::new(&ensemble, &store).evaluate_each(&[1, 2, 3], |k| {
            seen.push(k);
            if k == 2 {
                anyhow::bail!("stop");
            }
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(seen, vec![1, 2]);
    }
}
