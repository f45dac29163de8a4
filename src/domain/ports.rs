//! Port interfaces to the collaborators the recommendation core depends on.
//!
//! The core never builds queries itself. Everything it knows about the order
//! history comes through `OrderStore`, scoped to a `DataType` partition of the
//! fold it was created for.

use crate::domain::metrics::{EvaluationMeasures, MeanConfusionMatrix};
use crate::domain::partition::DataType;
use crate::domain::rules::{ItemSelector, Rule};
use crate::domain::types::{
    ItemFrequency, ItemId, Order, ScoredItem, TimeContext, TimeFlags, TimeSlice, UserId,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Read access to the order history of one fold.
pub trait OrderStore: Send + Sync {
    /// Order rows of the partition, by timestamp ascending.
    fn orders(&self, data_type: DataType) -> Result<Vec<Order>>;

    /// Number of distinct orders (baskets).
    fn order_count(&self, data_type: DataType) -> Result<usize>;

    /// Number of distinct items purchased.
    fn item_count(&self, data_type: DataType) -> Result<usize>;

    /// Distinct items purchased by every user.
    fn user_items(&self, data_type: DataType) -> Result<HashMap<UserId, BTreeSet<ItemId>>>;

    /// Items purchased by `user_id`, most frequent first.
    fn ranked_user_items(&self, user_id: UserId, data_type: DataType) -> Result<Vec<ItemFrequency>>;

    /// Items by support, descending.
    fn popular_items(&self, data_type: DataType) -> Result<Vec<ScoredItem>>;

    /// Items by support among orders matching `context`, descending.
    fn items_by_time(&self, context: &TimeContext, data_type: DataType) -> Result<Vec<ScoredItem>>;

    /// Purchases grouped by the time attributes enabled in `flags`, largest slice first.
    fn all_items_by_time(&self, flags: TimeFlags, data_type: DataType) -> Result<Vec<TimeSlice>>;

    /// Fraction of `order_count` orders containing every selected item.
    fn support(&self, selector: &ItemSelector, order_count: usize, data_type: DataType) -> Result<f64>;

    /// Share of purchases that repeat an earlier (user, item) purchase.
    fn user_repeat_purchase_rate(&self, user_id: Option<UserId>, data_type: DataType) -> Result<f64>;

    fn item_repeat_purchase_rate(&self, item_id: Option<ItemId>, data_type: DataType) -> Result<f64>;
}

/// Optional persistence of mined rules.
pub trait RuleSink: Send + Sync {
    fn delete_cached_rules(&self) -> Result<()>;

    /// Replace the stored rules with `rules`, keeping at most
    /// `neighbourhood_cap` rules per head item.
    fn write_rules(&self, rules: &[Rule], neighbourhood_cap: usize) -> Result<()>;
}

/// Sink that keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRuleSink;

impl RuleSink for NoopRuleSink {
    fn delete_cached_rules(&self) -> Result<()> {
        Ok(())
    }

    fn write_rules(&self, _rules: &[Rule], _neighbourhood_cap: usize) -> Result<()> {
        Ok(())
    }
}

/// One summarised evaluation, as handed to a `ResultsSink`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub model: String,
    pub k: usize,
    pub item_count: usize,
    pub measures: EvaluationMeasures,
    pub confusion_matrix: MeanConfusionMatrix,
    pub cases_without_history: f64,
}

pub trait ResultsSink: Send + Sync {
    fn record(&self, record: &ResultRecord) -> Result<()>;
}

/// Opens the per-fold view of the history used by cross-validation.
pub trait PartitionSource: Send + Sync {
    fn open_fold(&self, folds: usize, fold: usize) -> Result<Box<dyn OrderStore>>;

    /// Store over the full history, used for catalogue-level counts.
    fn open_all(&self) -> Result<Box<dyn OrderStore>>;
}
