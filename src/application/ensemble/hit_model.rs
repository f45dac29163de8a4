use crate::domain::metrics::ApproachStats;
use crate::domain::types::{Approach, ItemId, UserId};
use std::collections::{BTreeMap, HashMap};

pub type StatsByApproach = BTreeMap<Approach, ApproachStats>;

/// Hit ranks recorded while replaying the training orders.
#[derive(Debug, Clone, Default)]
pub struct HitRecorder {
    user: HashMap<UserId, BTreeMap<Approach, Vec<usize>>>,
    item: HashMap<ItemId, BTreeMap<Approach, Vec<usize>>>,
    global: BTreeMap<Approach, Vec<usize>>,
}

impl HitRecorder {
    /// Record one hit rank (1-based, 0 for a miss) against the user, the item and the global bucket.
    pub fn record(&mut self, user_id: UserId, item_id: ItemId, approach: Approach, rank: usize) {
        self.user
            .entry(user_id)
            .or_default()
            .entry(approach)
            .or_default()
            .push(rank);
        self.item
            .entry(item_id)
            .or_default()
            .entry(approach)
            .or_default()
            .push(rank);
        self.global.entry(approach).or_default().push(rank);
    }

    /// Derive the stats, scaling each approach's ARHR by `weight`.
    pub fn finish<F>(self, weight: F) -> HitModel
    where
        F: Fn(Approach) -> f64,
    {
        let derive = |ranks: BTreeMap<Approach, Vec<usize>>| -> StatsByApproach {
            ranks
                .into_iter()
                .map(|(approach, ranks)| {
                    (approach, ApproachStats::from_ranks(&ranks).weighted(weight(approach)))
                })
                .collect()
        };

        HitModel {
            user: self.user.into_iter().map(|(id, r)| (id, derive(r))).collect(),
            item: self.item.into_iter().map(|(id, r)| (id, derive(r))).collect(),
            global: derive(self.global),
        }
    }
}

/// Per-user, per-item and global approach statistics of a trained ensemble.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HitModel {
    user: HashMap<UserId, StatsByApproach>,
    item: HashMap<ItemId, StatsByApproach>,
    global: StatsByApproach,
}

impl HitModel {
    pub fn user_stats(&self, user_id: UserId) -> Option<&StatsByApproach> {
        self.user.get(&user_id)
    }

    pub fn item_stats(&self, item_id: ItemId) -> Option<&StatsByApproach> {
        self.item.get(&item_id)
    }

    pub fn global_stats(&self) -> &StatsByApproach {
        &self.global
    }

    /// `declared` approaches by global score, descending. Ties keep declaration order.
    pub fn global_order(&self, declared: &[Approach]) -> Vec<(Approach, f64)> {
        rank(declared, &self.global)
    }

    /// Approach order for one user.
    ///
    /// The user's own ranking is used when one of its scores exceeds
    /// `minimal_arhr`; approaches it does not list are appended in global order.
    /// Otherwise the global order is used as is.
    pub fn approach_order(
        &self,
        user_id: UserId,
        declared: &[Approach],
        minimal_arhr: f64,
    ) -> Vec<(Approach, f64)> {
        let global = self.global_order(declared);
        let Some(stats) = self.user_stats(user_id) else {
            return global;
        };
        if !stats.values().any(|s| s.arhr > minimal_arhr) {
            return global;
        }

        let listed: Vec<Approach> = declared
            .iter()
            .copied()
            .filter(|a| stats.contains_key(a))
            .collect();
        let mut order = rank(&listed, stats);
        for (approach, score) in global {
            if !listed.contains(&approach) {
                order.push((approach, score));
            }
        }
        order
    }

    /// Most common hit rank of `approach` for the user, else globally, else 1.
    pub fn mcv(&self, user_id: UserId, approach: Approach) -> usize {
        self.user_stats(user_id)
            .and_then(|stats| stats.get(&approach))
            .or_else(|| self.global.get(&approach))
            .map(|stats| stats.mcv)
            .unwrap_or(1)
    }
}

fn rank(approaches: &[Approach], stats: &StatsByApproach) -> Vec<(Approach, f64)> {
    let mut ranked: Vec<(Approach, f64)> = approaches
        .iter()
        .map(|&a| (a, stats.get(&a).map(|s| s.arhr).unwrap_or(0.0)))
        .collect();
    // sort_by is stable
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}
