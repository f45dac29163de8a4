//! Replaying held-out orders against trained ensembles and reducing the
//! results across folds.

mod cross_validation;
mod evaluator;
mod results;

pub use cross_validation::{
    CrossValidationReport, CrossValidationRunner, FoldResult, MODEL_NAME, RuleSinkFactory,
};
pub use evaluator::{EvaluationRun, Evaluator};
pub use results::{AggregatedResult, ResultsAggregator};
