use super::allocation::{allocate_slots, rotation_offset};
use super::hit_model::{HitModel, HitRecorder};
use crate::application::strategies::{RecommendContext, RecommendationStrategy, Recommender};
use crate::config::MdarConfig;
use crate::domain::partition::DataType;
use crate::domain::ports::{OrderStore, RuleSink};
use crate::domain::types::{Approach, ItemId, OrderId, TimeContext, UserId};
use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Multi-strategy ensemble blending the configured recommenders by their
/// observed hit statistics.
pub struct Mdar {
    config: MdarConfig,
    recommenders: Vec<Recommender>,
    model: HitModel,
}

impl fmt::Debug for Mdar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mdar")
            .field("approaches", &self.approaches())
            .field("model", &self.model)
            .finish()
    }
}

/// Items of the order currently being replayed, cleared when the order changes.
#[derive(Debug, Default)]
pub(crate) struct BasketBuffer {
    order_id: Option<OrderId>,
    items: Vec<ItemId>,
}

impl BasketBuffer {
    /// Items bought earlier in `order_id`, starting a new basket when the order changes.
    pub(crate) fn before(&mut self, order_id: OrderId) -> &[ItemId] {
        if self.order_id != Some(order_id) {
            self.order_id = Some(order_id);
            self.items.clear();
        }
        &self.items
    }

    pub(crate) fn push(&mut self, item: ItemId) {
        self.items.push(item);
    }
}

impl Mdar {
    pub fn new(config: MdarConfig, sink: Arc<dyn RuleSink>) -> Self {
        let recommenders = config
            .strategies
            .enabled()
            .into_iter()
            .map(|approach| Recommender::from_config(approach, &config, sink.clone()))
            .collect();
        Self {
            config,
            recommenders,
            model: HitModel::default(),
        }
    }

    pub fn approaches(&self) -> Vec<Approach> {
        self.recommenders.iter().map(|r| r.approach()).collect()
    }

    pub fn model(&self) -> &HitModel {
        &self.model
    }

    /// Train every strategy on the train partition, then replay the training
    /// orders to learn how well each strategy predicts the next item.
    ///
    /// An approach that cannot serve a replayed row records nothing for it.
    ///
    /// The replay asks for at least `min_training_k` candidates.
    pub fn train(&mut self, store: &dyn OrderStore, k: usize) -> Result<()> {
        let started = Instant::now();
        let k = k.max(self.config.min_training_k);

        for recommender in &mut self.recommenders {
            let approach = recommender.approach();
            recommender
                .train(store, DataType::Train)
                .with_context(|| format!("Failed to train {}", approach))?;
        }

        let orders = store
            .orders(DataType::Train)
            .context("Failed to fetch training orders")?;
        let mut recorder = HitRecorder::default();
        let mut buffer = BasketBuffer::default();
        for order in &orders {
            let ctx = RecommendContext {
                user_id: order.user_id,
                basket: buffer.before(order.order_id),
                time: order.time_context(),
                k,
            };
            for recommender in &self.recommenders {
                if !recommender.is_applicable(&ctx) {
                    continue;
                }
                let recommendations = recommender.recommend(&ctx);
                let rank = recommendations
                    .iter()
                    .position(|&item| item == order.item_id)
                    .map(|i| i + 1)
                    .unwrap_or(0);
                recorder.record(order.user_id, order.item_id, recommender.approach(), rank);
            }
            buffer.push(order.item_id);
        }

        let strategies = &self.config.strategies;
        self.model = recorder.finish(|approach| strategies.weight_for(approach));

        info!(
            "Trained ensemble on {} order rows in {:.2?}, global order: {:?}",
            orders.len(),
            started.elapsed(),
            self.model.global_order(&self.approaches())
        );
        Ok(())
    }

    /// Up to `k` recommendations for `user_id`, grouped by approach priority.
    ///
    /// Slots an approach leaves empty are filled afterwards from the unused
    /// candidates of every approach, again in priority order.
    pub fn recommend(
        &self,
        user_id: UserId,
        basket: &[ItemId],
        time: TimeContext,
        k: usize,
    ) -> Vec<ItemId> {
        let mut output: Vec<ItemId> = Vec::with_capacity(k);
        if k == 0 {
            return output;
        }

        let order = self.model.approach_order(
            user_id,
            &self.approaches(),
            self.config.thresholds.minimal_arhr,
        );
        let scores: Vec<f64> = order.iter().map(|(_, score)| *score).collect();
        let slots = allocate_slots(&scores, k);
        let ctx = RecommendContext {
            user_id,
            basket,
            time,
            k,
        };

        let mut lists: Vec<Vec<ItemId>> = Vec::with_capacity(slots.len());
        for ((approach, _), slots) in order.into_iter().zip(slots) {
            if slots == 0 || output.len() >= k {
                continue;
            }
            let Some(recommender) = self.recommender(approach) else {
                continue;
            };
            if !recommender.is_applicable(&ctx) {
                continue;
            }

            let candidates = recommender.recommend(&ctx);
            let offset = if self.config.use_approach_offsets {
                rotation_offset(candidates.len(), slots, self.model.mcv(user_id, approach))
            } else {
                0
            };

            let mut taken = 0;
            for &item in candidates.iter().skip(offset) {
                if taken >= slots || output.len() >= k {
                    break;
                }
                if !output.contains(&item) {
                    output.push(item);
                    taken += 1;
                }
            }
            debug!("{}: {} of {} slots filled", approach, taken, slots);
            lists.push(candidates);
        }

        for item in lists.into_iter().flatten() {
            if output.len() >= k {
                break;
            }
            if !output.contains(&item) {
                output.push(item);
            }
        }
        output
    }

    fn recommender(&self, approach: Approach) -> Option<&Recommender> {
        self.recommenders.iter().find(|r| r.approach() == approach)
    }
}
