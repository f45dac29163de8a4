use super::evaluator::EvaluationRun;
use crate::domain::metrics::{EvaluationMeasures, MeanConfusionMatrix, Reduction};
use serde::{Deserialize, Serialize};

/// Evaluation runs of one `k` reduced across folds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub k: usize,
    /// Number of fold runs the result was reduced from.
    pub folds: usize,
    pub measures: EvaluationMeasures,
    pub confusion_matrix: MeanConfusionMatrix,
    pub cases_without_history: f64,
}

/// Collects per-fold runs and reduces them into one result.
#[derive(Debug, Clone, Default)]
pub struct ResultsAggregator {
    runs: Vec<EvaluationRun>,
}

impl ResultsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, run: EvaluationRun) {
        self.runs.push(run);
    }

    pub fn runs(&self) -> &[EvaluationRun] {
        &self.runs
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// `None` when no run was collected.
    pub fn reduce(&self, reduction: Reduction) -> Option<AggregatedResult> {
        match reduction {
            Reduction::Average => self.average(),
            Reduction::Best => self.best(),
        }
    }

    /// Arithmetic mean of every measure and every confusion cell.
    pub fn average(&self) -> Option<AggregatedResult> {
        let first = self.runs.first()?;
        let n = self.runs.len() as f64;

        let mut measures = EvaluationMeasures::default();
        let mut matrix = MeanConfusionMatrix::default();
        let mut cases_without_history = 0.0;
        for run in &self.runs {
            let m = run.measures();
            measures.precision += m.precision;
            measures.recall += m.recall;
            measures.fallout += m.fallout;
            measures.specificity += m.specificity;
            measures.f1 += m.f1;

            let cells = MeanConfusionMatrix::from(run.confusion_matrix);
            matrix.tp += cells.tp;
            matrix.tn += cells.tn;
            matrix.fp += cells.fp;
            matrix.fn_ += cells.fn_;
            cases_without_history += run.cases_without_history as f64;
        }

        Some(AggregatedResult {
            k: first.k,
            folds: self.runs.len(),
            measures: EvaluationMeasures {
                precision: measures.precision / n,
                recall: measures.recall / n,
                fallout: measures.fallout / n,
                specificity: measures.specificity / n,
                f1: measures.f1 / n,
            },
            confusion_matrix: MeanConfusionMatrix {
                tp: matrix.tp / n,
                tn: matrix.tn / n,
                fp: matrix.fp / n,
                fn_: matrix.fn_ / n,
            },
            cases_without_history: cases_without_history / n,
        })
    }

    /// The run with the highest F1; the earliest one on ties.
    pub fn best(&self) -> Option<AggregatedResult> {
        let best = self.runs.iter().reduce(|best, run| {
            if run.measures().f1 > best.measures().f1 {
                run
            } else {
                best
            }
        })?;

        Some(AggregatedResult {
            k: best.k,
            folds: self.runs.len(),
            measures: best.measures(),
            confusion_matrix: best.confusion_matrix.into(),
            cases_without_history: best.cases_without_history as f64,
        })
    }
}
