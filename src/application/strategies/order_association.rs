use super::{RecommendContext, RecommendationStrategy, match_rule_heads};
use crate::application::mining::{MiningParams, RuleMiner};
use crate::domain::partition::DataType;
use crate::domain::ports::{OrderStore, RuleSink};
use crate::domain::rules::{MAX_RULE_BODY, Rule};
use crate::domain::types::{Approach, ItemId};
use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Recommends heads of association rules whose body overlaps the current basket.
#[derive(Clone)]
pub struct OrderAssociationStrategy {
    params: MiningParams,
    sink: Arc<dyn RuleSink>,
    neighbourhood_size: usize,
    itemset_fallback: bool,
    rules: Vec<Rule>,
    /// Basket snapshot kept for the itemset fallback.
    miner: Option<RuleMiner>,
}

impl fmt::Debug for OrderAssociationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderAssociationStrategy")
            .field("params", &self.params)
            .field("neighbourhood_size", &self.neighbourhood_size)
            .field("itemset_fallback", &self.itemset_fallback)
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl OrderAssociationStrategy {
    pub fn new(params: MiningParams, sink: Arc<dyn RuleSink>, neighbourhood_size: usize) -> Self {
        Self {
            params,
            sink,
            neighbourhood_size,
            itemset_fallback: false,
            rules: Vec::new(),
            miner: None,
        }
    }

    pub fn with_itemset_fallback(mut self, enabled: bool) -> Self {
        self.itemset_fallback = enabled;
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

impl RecommendationStrategy for OrderAssociationStrategy {
    fn approach(&self) -> Approach {
        Approach::OrderAssociation
    }

    fn train(&mut self, store: &dyn OrderStore, data_type: DataType) -> Result<()> {
        let miner = RuleMiner::from_store(store, data_type)?;
        self.rules = miner.mine_rules(&self.params);

        self.sink
            .delete_cached_rules()
            .context("Failed to clear cached rules")?;
        self.sink
            .write_rules(&self.rules, self.neighbourhood_size)
            .context("Failed to write mined rules")?;

        debug!("Order association trained with {} rules", self.rules.len());
        self.miner = self.itemset_fallback.then_some(miner);
        Ok(())
    }

    fn recommend(&self, ctx: &RecommendContext<'_>) -> Vec<ItemId> {
        let mut items = match_rule_heads(&self.rules, ctx.basket, &ctx.time, ctx.k);

        if let Some(miner) = &self.miner
            && items.len() < ctx.k
            && !ctx.basket.is_empty()
        {
            let search = miner.mine_itemset_candidates(ctx.basket, MAX_RULE_BODY);
            for candidate in search.candidates {
                if items.len() >= ctx.k {
                    break;
                }
                if !items.contains(&candidate.item) {
                    items.push(candidate.item);
                }
            }
        }
        items
    }

    fn is_applicable(&self, ctx: &RecommendContext<'_>) -> bool {
        !ctx.basket.is_empty()
    }
}
