//! Time-window partitioning for k-fold cross-validation.
//!
//! Orders are split into `k` contiguous time ranges by `k - 1` boundary
//! timestamps. For fold `i` the i-th range is held out for testing and the
//! rest of the history is used for training, so a test order never sees the
//! training data of its own time window.

use crate::domain::errors::PartitionError;
use crate::domain::types::{Order, OrderId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Which view of the order history a query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Train,
    Test,
    All,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Train => write!(f, "train"),
            DataType::Test => write!(f, "test"),
            DataType::All => write!(f, "all"),
        }
    }
}

impl FromStr for DataType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "train" => Ok(DataType::Train),
            "test" => Ok(DataType::Test),
            "all" => Ok(DataType::All),
            _ => anyhow::bail!("Invalid data type: {}. Must be 'train', 'test' or 'all'", s),
        }
    }
}

/// Half-open `(low, high]` timestamp range. A missing bound is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub low: Option<Timestamp>,
    pub high: Option<Timestamp>,
}

impl TimeRange {
    pub const UNBOUNDED: TimeRange = TimeRange {
        low: None,
        high: None,
    };

    pub fn new(low: Option<Timestamp>, high: Option<Timestamp>) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, timestamp: Timestamp) -> bool {
        self.low.is_none_or(|low| timestamp > low) && self.high.is_none_or(|high| timestamp <= high)
    }
}

/// Union of time ranges selecting one partition of the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionPredicate {
    pub ranges: Vec<TimeRange>,
}

impl PartitionPredicate {
    pub fn all() -> Self {
        Self {
            ranges: vec![TimeRange::UNBOUNDED],
        }
    }

    pub fn contains(&self, timestamp: Timestamp) -> bool {
        self.ranges.iter().any(|range| range.contains(timestamp))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FoldPredicates {
    train: PartitionPredicate,
    test: PartitionPredicate,
}

/// Computes fold boundaries over the order history and the train/test
/// predicates of the selected fold.
#[derive(Debug, Clone)]
pub struct TimePartitioner {
    /// One timestamp per distinct order, ascending.
    order_timestamps: Vec<Timestamp>,
    folds: usize,
    boundaries: Vec<Timestamp>,
    fold: usize,
    predicates: FoldPredicates,
}

impl TimePartitioner {
    /// Build boundaries for `folds` partitions. `folds < 2` is clamped to 2.
    ///
    /// Boundaries are order timestamps taken every `orders / folds` orders, so
    /// rows sharing a timestamp always land in the same fold.
    pub fn build(orders: &[Order], folds: usize) -> Result<Self, PartitionError> {
        let mut seen: HashSet<OrderId> = HashSet::new();
        let mut order_timestamps: Vec<Timestamp> = orders
            .iter()
            .filter(|o| seen.insert(o.order_id))
            .map(|o| o.timestamp)
            .collect();
        order_timestamps.sort_unstable();

        Self::from_timestamps(order_timestamps, folds)
    }

    pub fn from_timestamps(
        order_timestamps: Vec<Timestamp>,
        folds: usize,
    ) -> Result<Self, PartitionError> {
        let folds = folds.max(2);
        let boundaries = Self::compute_boundaries(&order_timestamps, folds)?;
        let predicates = Self::compute_predicates(&boundaries, folds, 0)?;

        Ok(Self {
            order_timestamps,
            folds,
            boundaries,
            fold: 0,
            predicates,
        })
    }

    fn compute_boundaries(
        order_timestamps: &[Timestamp],
        folds: usize,
    ) -> Result<Vec<Timestamp>, PartitionError> {
        let orders = order_timestamps.len();
        let part_size = orders / folds;
        if part_size == 0 {
            return Err(PartitionError::NotEnoughOrders { folds, orders });
        }

        let boundaries: Vec<Timestamp> = order_timestamps
            .iter()
            .enumerate()
            .filter(|(i, _)| (i + 1) % part_size == 0)
            .map(|(_, ts)| *ts)
            .take(folds - 1)
            .collect();

        debug!(
            "Partitioned {} orders into {} folds, boundaries: {:?}",
            orders, folds, boundaries
        );

        Ok(boundaries)
    }

    fn compute_predicates(
        boundaries: &[Timestamp],
        folds: usize,
        fold: usize,
    ) -> Result<FoldPredicates, PartitionError> {
        if fold >= folds {
            return Err(PartitionError::FoldOutOfRange { fold, folds });
        }
        if boundaries.len() != folds - 1 {
            return Err(PartitionError::NotBuilt);
        }

        let at = |i: usize| Some(boundaries[i]);
        let predicates = if fold == 0 {
            FoldPredicates {
                test: single(TimeRange::new(None, at(0))),
                train: single(TimeRange::new(at(0), None)),
            }
        } else if fold == folds - 1 {
            FoldPredicates {
                test: single(TimeRange::new(at(folds - 2), None)),
                train: single(TimeRange::new(None, at(folds - 2))),
            }
        } else {
            FoldPredicates {
                test: single(TimeRange::new(at(fold - 1), at(fold))),
                train: PartitionPredicate {
                    ranges: vec![
                        TimeRange::new(None, at(fold - 1)),
                        TimeRange::new(at(fold), None),
                    ],
                },
            }
        };

        Ok(predicates)
    }

    /// Predicate of `data_type` for an arbitrary fold, without touching the cache.
    pub fn predicate(
        &self,
        fold: usize,
        data_type: DataType,
    ) -> Result<PartitionPredicate, PartitionError> {
        let predicates = Self::compute_predicates(&self.boundaries, self.folds, fold)?;
        Ok(match data_type {
            DataType::Train => predicates.train,
            DataType::Test => predicates.test,
            DataType::All => PartitionPredicate::all(),
        })
    }

    /// Cached predicate of the selected fold.
    pub fn current(&self, data_type: DataType) -> PartitionPredicate {
        match data_type {
            DataType::Train => self.predicates.train.clone(),
            DataType::Test => self.predicates.test.clone(),
            DataType::All => PartitionPredicate::all(),
        }
    }

    /// Select the held-out fold and recompute the cached predicates.
    pub fn set_fold(&mut self, fold: usize) -> Result<(), PartitionError> {
        self.predicates = Self::compute_predicates(&self.boundaries, self.folds, fold)?;
        self.fold = fold;
        Ok(())
    }

    /// Change the number of folds. Boundaries are rebuilt and fold 0 is selected.
    pub fn set_folds(&mut self, folds: usize) -> Result<(), PartitionError> {
        let folds = folds.max(2);
        let boundaries = Self::compute_boundaries(&self.order_timestamps, folds)?;
        self.predicates = Self::compute_predicates(&boundaries, folds, 0)?;
        self.boundaries = boundaries;
        self.folds = folds;
        self.fold = 0;
        Ok(())
    }

    pub fn folds(&self) -> usize {
        self.folds
    }

    pub fn fold(&self) -> usize {
        self.fold
    }

    pub fn boundaries(&self) -> &[Timestamp] {
        &self.boundaries
    }
}

fn single(range: TimeRange) -> PartitionPredicate {
    PartitionPredicate {
        ranges: vec![range],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timestamps(n: i64) -> Vec<Timestamp> {
        (1..=n).map(|i| i * 10).collect()
    }

    #[test]
    fn test_boundaries_every_part_size_orders() {
        let partitioner = TimePartitioner::from_timestamps(timestamps(9), 3).unwrap();
        assert_eq!(partitioner.boundaries(), &[30, 60]);
    }

    #[test]
    fn test_folds_clamped_to_two() {
        let partitioner = TimePartitioner::from_timestamps(timestamps(4), 1).unwrap();
        assert_eq!(partitioner.folds(), 2);
        assert_eq!(partitioner.boundaries(), &[20]);
    }

    #[test]
    fn test_edge_and_interior_folds() {
        let partitioner = TimePartitioner::from_timestamps(timestamps(9), 3).unwrap();

        let test0 = partitioner.predicate(0, DataType::Test).unwrap();
        assert_eq!(test0.ranges, vec![TimeRange::new(None, Some(30))]);
        let train0 = partitioner.predicate(0, DataType::Train).unwrap();
        assert_eq!(train0.ranges, vec![TimeRange::new(Some(30), None)]);

        let test1 = partitioner.predicate(1, DataType::Test).unwrap();
        assert_eq!(test1.ranges, vec![TimeRange::new(Some(30), Some(60))]);
        let train1 = partitioner.predicate(1, DataType::Train).unwrap();
        assert!(train1.contains(30));
        assert!(!train1.contains(40));
        assert!(train1.contains(70));

        let test2 = partitioner.predicate(2, DataType::Test).unwrap();
        assert_eq!(test2.ranges, vec![TimeRange::new(Some(60), None)]);
    }

    #[test]
    fn test_set_fold_recomputes_cache() {
        let mut partitioner = TimePartitioner::from_timestamps(timestamps(9), 3).unwrap();
        assert!(partitioner.current(DataType::Test).contains(10));

        partitioner.set_fold(2).unwrap();
        assert!(!partitioner.current(DataType::Test).contains(10));
        assert!(partitioner.current(DataType::Test).contains(90));

        partitioner.set_folds(2).unwrap();
        assert_eq!(partitioner.fold(), 0);
        assert_eq!(partitioner.boundaries(), &[40]);
    }

    #[test]
    fn test_fold_out_of_range() {
        let partitioner = TimePartitioner::from_timestamps(timestamps(9), 3).unwrap();
        assert_eq!(
            partitioner.predicate(3, DataType::Test),
            Err(PartitionError::FoldOutOfRange { fold: 3, folds: 3 })
        );
    }

    #[test]
    fn test_not_enough_orders() {
        let result = TimePartitioner::from_timestamps(timestamps(2), 3);
        assert!(matches!(
            result,
            Err(PartitionError::NotEnoughOrders { folds: 3, orders: 2 })
        ));
    }
}
