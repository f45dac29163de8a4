use crate::domain::types::ItemId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ratio that degrades to 0 instead of NaN/inf on an empty denominator.
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// How per-fold results are reduced into one summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// Arithmetic mean of every measure and confusion cell.
    #[default]
    Average,
    /// The fold with the highest F1.
    Best,
}

impl std::str::FromStr for Reduction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "average" => Ok(Reduction::Average),
            "best" => Ok(Reduction::Best),
            _ => anyhow::bail!("Invalid reduction: {}. Must be 'average' or 'best'", s),
        }
    }
}

/// What a single recommendation request turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Hit,
    Miss,
    NoRecommendations,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: u64,
    pub tn: u64,
    pub fp: u64,
    pub fn_: u64,
}

impl ConfusionMatrix {
    /// Account one recommendation list against the item actually purchased.
    ///
    /// `items_count` is the size of the catalogue the list was drawn from. Empty
    /// lists leave the matrix untouched.
    pub fn record(&mut self, item: ItemId, recommendations: &[ItemId], items_count: u64) -> Outcome {
        if recommendations.is_empty() {
            return Outcome::NoRecommendations;
        }

        let len = recommendations.len() as u64;
        if recommendations.contains(&item) {
            self.tp += 1;
            self.fp += len - 1;
            self.tn += items_count.saturating_sub(len);
            Outcome::Hit
        } else {
            self.fn_ += 1;
            self.fp += len;
            self.tn += items_count.saturating_sub(len + 1);
            Outcome::Miss
        }
    }

    pub fn measures(&self) -> EvaluationMeasures {
        EvaluationMeasures::from_counts(self.tp as f64, self.tn as f64, self.fp as f64, self.fn_ as f64)
    }
}

/// Confusion matrix cells reduced across folds; averages may be fractional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanConfusionMatrix {
    pub tp: f64,
    pub tn: f64,
    pub fp: f64,
    pub fn_: f64,
}

impl From<ConfusionMatrix> for MeanConfusionMatrix {
    fn from(m: ConfusionMatrix) -> Self {
        Self {
            tp: m.tp as f64,
            tn: m.tn as f64,
            fp: m.fp as f64,
            fn_: m.fn_ as f64,
        }
    }
}

/// IR measures derived from a confusion matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMeasures {
    pub precision: f64,
    pub recall: f64,
    pub fallout: f64,
    pub specificity: f64,
    pub f1: f64,
}

impl EvaluationMeasures {
    pub fn from_counts(tp: f64, tn: f64, fp: f64, fn_: f64) -> Self {
        let precision = safe_div(tp, tp + fp);
        let recall = safe_div(tp, tp + fn_);

        Self {
            precision,
            recall,
            fallout: safe_div(fp, fp + tn),
            specificity: safe_div(tn, tn + fp),
            f1: safe_div(2.0 * precision * recall, precision + recall),
        }
    }
}

/// Hit statistics of one approach for one subject (user, item or global).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApproachStats {
    /// Most common hit rank; 1 when misses dominate.
    pub mcv: usize,
    /// Average reciprocal hit rank, possibly scaled by the approach weight.
    pub arhr: f64,
}

impl Default for ApproachStats {
    fn default() -> Self {
        Self { mcv: 1, arhr: 0.0 }
    }
}

impl ApproachStats {
    /// Derive stats from hit ranks (1-based, 0 for a miss).
    pub fn from_ranks(ranks: &[usize]) -> Self {
        if ranks.is_empty() {
            return Self::default();
        }

        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for &rank in ranks {
            *counts.entry(rank).or_insert(0) += 1;
        }
        // BTreeMap iterates ascending, so ties resolve to the smallest rank.
        let mode = counts
            .iter()
            .fold((0, 0), |best, (&rank, &count)| {
                if count > best.1 { (rank, count) } else { best }
            })
            .0;

        let reciprocal_sum: f64 = ranks
            .iter()
            .filter(|&&rank| rank > 0)
            .map(|&rank| 1.0 / rank as f64)
            .sum();

        Self {
            mcv: if mode == 0 { 1 } else { mode },
            arhr: reciprocal_sum / ranks.len() as f64,
        }
    }

    pub fn weighted(mut self, weight: f64) -> Self {
        self.arhr *= weight;
        self
    }
}
