use super::evaluator::{EvaluationRun, Evaluator};
use super::results::{AggregatedResult, ResultsAggregator};
use crate::application::ensemble::Mdar;
use crate::config::MdarConfig;
use crate::domain::partition::DataType;
use crate::domain::ports::{NoopRuleSink, PartitionSource, ResultRecord, ResultsSink, RuleSink};
use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

pub const MODEL_NAME: &str = "mdar";

/// Runs of one fold, one per requested `k`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoldResult {
    pub fold: usize,
    pub runs: Vec<EvaluationRun>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossValidationReport {
    pub folds: Vec<FoldResult>,
    /// One reduced result per `k`, in the order the k values were requested.
    pub summaries: Vec<AggregatedResult>,
    /// Distinct items over the whole history.
    pub item_count: usize,
}

/// Builds the rule sink of one fold from its index.
pub type RuleSinkFactory = Box<dyn Fn(usize) -> Arc<dyn RuleSink> + Send + Sync>;

/// Time-aware k-fold cross-validation of the ensemble.
///
/// Folds are independent: each opens its own partition view, trains its own
/// ensemble against its own rule sink and evaluates it. They run on the rayon
/// pool and are merged only once every fold has finished. A failing fold, or a
/// cancellation, discards the results of all folds.
///
/// The cancellation flag is cleared when [`CrossValidationRunner::run`]
/// returns, so a runner can be run again.
///
/// # Example
///
/// ```no_run
/// use mdar::application::evaluation::CrossValidationRunner;
/// use mdar::config::MdarConfig;
/// use mdar::infrastructure::InMemoryRuleCache;
/// use mdar::infrastructure::in_memory::{InMemoryPartitionSource, OrderHistory};
/// use std::sync::Arc;
///
/// # fn example(history: OrderHistory) -> anyhow::Result<()> {
/// let source = Arc::new(InMemoryPartitionSource::new(Arc::new(history)));
/// let runner = CrossValidationRunner::new(MdarConfig::default(), source)
///     .with_rule_sinks(|_fold| Arc::new(InMemoryRuleCache::new()));
/// let report = runner.run()?;
/// for summary in &report.summaries {
///     println!("k={} f1={:.4}", summary.k, summary.measures.f1);
/// }
/// # Ok(())
/// # }
/// ```
pub struct CrossValidationRunner {
    config: MdarConfig,
    source: Arc<dyn PartitionSource>,
    rule_sinks: RuleSinkFactory,
    results_sinks: Vec<Arc<dyn ResultsSink>>,
    cancelled: Arc<AtomicBool>,
}

impl CrossValidationRunner {
    pub fn new(config: MdarConfig, source: Arc<dyn PartitionSource>) -> Self {
        Self {
            config,
            source,
            rule_sinks: Box::new(|_| -> Arc<dyn RuleSink> { Arc::new(NoopRuleSink) }),
            results_sinks: Vec::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Give every fold the rule sink built by `factory`. Folds train
    /// concurrently, so sinks shared between folds see interleaved writes.
    pub fn with_rule_sinks<F>(mut self, factory: F) -> Self
    where
        F: Fn(usize) -> Arc<dyn RuleSink> + Send + Sync + 'static,
    {
        self.rule_sinks = Box::new(factory);
        self
    }

    pub fn with_results_sink(mut self, sink: Arc<dyn ResultsSink>) -> Self {
        self.results_sinks.push(sink);
        self
    }

    /// Flag that stops the current run before the next fold or k starts.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn folds(&self) -> usize {
        self.config.k_fold_size.max(2)
    }

    pub fn run(&self) -> Result<CrossValidationReport> {
        let result = self.cross_validate();
        self.cancelled.store(false, Ordering::SeqCst);
        result
    }

    fn cross_validate(&self) -> Result<CrossValidationReport> {
        let folds = self.folds();
        info!(
            "Cross-validating over {} folds, k values {:?}",
            folds, self.config.k_values
        );

        let fold_results: Vec<FoldResult> = (0..folds)
            .into_par_iter()
            .map(|fold| {
                self.run_fold(folds, fold).inspect_err(|e| {
                    warn!("Fold {} failed: {:#}", fold, e);
                    self.cancelled.store(true, Ordering::SeqCst);
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let all = self.source.open_all().context("Failed to open full history")?;
        let item_count = all
            .item_count(DataType::All)
            .context("Failed to count items")?;

        let summaries = self.summarize(&fold_results);
        for summary in &summaries {
            let record = ResultRecord {
                model: MODEL_NAME.to_string(),
                k: summary.k,
                item_count,
                measures: summary.measures,
                confusion_matrix: summary.confusion_matrix,
                cases_without_history: summary.cases_without_history,
            };
            for sink in &self.results_sinks {
                sink.record(&record).context("Failed to record results")?;
            }
        }

        Ok(CrossValidationReport {
            folds: fold_results,
            summaries,
            item_count,
        })
    }

    fn run_fold(&self, folds: usize, fold: usize) -> Result<FoldResult> {
        self.check_cancelled()?;
        info!("Fold {}/{} started", fold + 1, folds);

        let store = self
            .source
            .open_fold(folds, fold)
            .with_context(|| format!("Failed to open fold {}", fold))?;
        let mut ensemble = Mdar::new(self.config.clone(), (self.rule_sinks)(fold));
        ensemble
            .train(store.as_ref(), self.config.max_k())
            .with_context(|| format!("Failed to train fold {}", fold))?;

        let runs = Evaluator::new(&ensemble, store.as_ref())
            .evaluate_each(&self.config.k_values, |_| self.check_cancelled())
            .with_context(|| format!("Failed to evaluate fold {}", fold))?;

        info!("Fold {}/{} finished", fold + 1, folds);
        Ok(FoldResult { fold, runs })
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            bail!("Cross-validation cancelled");
        }
        Ok(())
    }

    fn summarize(&self, fold_results: &[FoldResult]) -> Vec<AggregatedResult> {
        self.config
            .k_values
            .iter()
            .enumerate()
            .filter_map(|(i, _)| {
                let mut aggregator = ResultsAggregator::new();
                for fold in fold_results {
                    if let Some(run) = fold.runs.get(i) {
                        aggregator.add(run.clone());
                    }
                }
                aggregator.reduce(self.config.reduction)
            })
            .collect()
    }
}
