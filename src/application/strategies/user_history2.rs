use super::{RecommendContext, RecommendationStrategy};
use crate::config::UserHistory2Config;
use crate::domain::partition::DataType;
use crate::domain::ports::OrderStore;
use crate::domain::types::{Approach, ItemId, UserId};
use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::debug;

/// Recommends the user's own past purchases, most frequent first.
#[derive(Debug, Clone)]
pub struct UserHistory2Strategy {
    config: UserHistory2Config,
    history: HashMap<UserId, Vec<ItemId>>,
}

impl UserHistory2Strategy {
    pub fn new(config: UserHistory2Config) -> Self {
        Self {
            config,
            history: HashMap::new(),
        }
    }

    fn history(&self, user_id: UserId) -> &[ItemId] {
        self.history.get(&user_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl RecommendationStrategy for UserHistory2Strategy {
    fn approach(&self) -> Approach {
        Approach::UserHistory2
    }

    fn train(&mut self, store: &dyn OrderStore, data_type: DataType) -> Result<()> {
        let users = store
            .user_items(data_type)
            .context("Failed to fetch user items")?;

        let mut item_rpr: HashMap<ItemId, f64> = HashMap::new();
        self.history.clear();
        for user_id in users.into_keys() {
            if let Some(min_rpr) = self.config.min_user_rpr
                && store.user_repeat_purchase_rate(Some(user_id), data_type)? < min_rpr
            {
                continue;
            }

            let mut items = Vec::new();
            for frequency in store.ranked_user_items(user_id, data_type)? {
                if let Some(min_rpr) = self.config.min_item_rpr {
                    let rpr = match item_rpr.get(&frequency.item) {
                        Some(rpr) => *rpr,
                        None => {
                            let rpr = store.item_repeat_purchase_rate(Some(frequency.item), data_type)?;
                            item_rpr.insert(frequency.item, rpr);
                            rpr
                        }
                    };
                    if rpr < min_rpr {
                        continue;
                    }
                }
                items.push(frequency.item);
            }
            if !items.is_empty() {
                self.history.insert(user_id, items);
            }
        }

        debug!("User history 2 trained for {} users", self.history.len());
        Ok(())
    }

    fn recommend(&self, ctx: &RecommendContext<'_>) -> Vec<ItemId> {
        self.history(ctx.user_id).iter().copied().take(ctx.k).collect()
    }

    fn is_applicable(&self, ctx: &RecommendContext<'_>) -> bool {
        !self.history(ctx.user_id).is_empty()
    }
}
