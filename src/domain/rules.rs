use crate::domain::types::{ItemId, TimeContext};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Largest rule body the miner will enumerate.
pub const MAX_RULE_BODY: usize = 3;

/// Association rule `x => y` mined from basket data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule body, sorted ascending, 1..=3 items.
    pub x: Vec<ItemId>,
    /// Rule head.
    pub y: ItemId,
    pub support: f64,
    pub confidence: Option<f64>,
    pub lift: Option<f64>,
    pub context: TimeContext,
}

impl Rule {
    pub fn body_intersects(&self, items: &[ItemId]) -> bool {
        self.x.iter().any(|item| items.contains(item))
    }

    /// Descending by support, then confidence, then lift. Ties break on body and head
    /// so the order is deterministic.
    pub fn rank_cmp(a: &Rule, b: &Rule) -> Ordering {
        let metric = |value: Option<f64>| value.unwrap_or(0.0);

        b.support
            .total_cmp(&a.support)
            .then_with(|| metric(b.confidence).total_cmp(&metric(a.confidence)))
            .then_with(|| metric(b.lift).total_cmp(&metric(a.lift)))
            .then_with(|| a.x.cmp(&b.x))
            .then_with(|| a.y.cmp(&b.y))
            .then_with(|| a.context.cmp(&b.context))
    }
}

/// A single item or a set of items, resolved once at the API boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemSelector {
    Item(ItemId),
    ItemSet(Vec<ItemId>),
}

impl ItemSelector {
    pub fn items(&self) -> &[ItemId] {
        match self {
            ItemSelector::Item(item) => std::slice::from_ref(item),
            ItemSelector::ItemSet(items) => items,
        }
    }
}

impl From<ItemId> for ItemSelector {
    fn from(item: ItemId) -> Self {
        ItemSelector::Item(item)
    }
}

impl From<Vec<ItemId>> for ItemSelector {
    fn from(mut items: Vec<ItemId>) -> Self {
        items.sort_unstable();
        items.dedup();
        if items.len() == 1 {
            ItemSelector::Item(items[0])
        } else {
            ItemSelector::ItemSet(items)
        }
    }
}

/// An item connected to a combination of seed items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemsetCandidate {
    pub item: ItemId,
    /// Seed combination the item was found through.
    pub body: Vec<ItemId>,
    pub support: f64,
    pub body_support: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(x: Vec<ItemId>, y: ItemId, support: f64, confidence: Option<f64>) -> Rule {
        Rule {
            x,
            y,
            support,
            confidence,
            lift: None,
            context: TimeContext::default(),
        }
    }

    #[test]
    fn test_rank_by_support_then_confidence() {
        let mut rules = vec![
            rule(vec![1], 2, 0.1, Some(0.2)),
            rule(vec![1], 3, 0.3, None),
            rule(vec![4], 5, 0.1, Some(0.9)),
        ];
        rules.sort_by(Rule::rank_cmp);

        assert_eq!(rules[0].y, 3);
        assert_eq!(rules[1].y, 5);
        assert_eq!(rules[2].y, 2);
    }

    #[test]
    fn test_selector_resolution() {
        assert_eq!(ItemSelector::from(vec![7]), ItemSelector::Item(7));
        assert_eq!(
            ItemSelector::from(vec![3, 1, 3]),
            ItemSelector::ItemSet(vec![1, 3])
        );
        assert_eq!(ItemSelector::from(9).items(), &[9]);
    }
}
