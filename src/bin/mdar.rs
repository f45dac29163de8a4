//! MDAR cross-validation driver
//!
//! Loads an order history from CSV, runs time-aware k-fold cross-validation
//! of the ensemble and prints one summary row per k.
//!
//! # Usage
//! ```sh
//! RUST_LOG=mdar=debug cargo run --bin mdar -- run --orders orders.csv --k 5,10
//! ```
//!
//! `MDAR_*` environment variables (or a `.env` file) override the config file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mdar::application::evaluation::{CrossValidationReport, CrossValidationRunner};
use mdar::config::{MdarConfig, parse_k_values};
use mdar::domain::metrics::Reduction;
use mdar::domain::ports::RuleSink;
use mdar::infrastructure::csv_loader::load_history;
use mdar::infrastructure::{
    InMemoryPartitionSource, InMemoryRuleCache, JsonLinesResultsSink, TracingResultsSink,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "Multi-strategy recommendation cross-validation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cross-validate the ensemble over an order history
    Run {
        /// CSV file with order_id,user_id,item_id,timestamp[,categories]
        #[arg(long)]
        orders: PathBuf,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of folds
        #[arg(long)]
        folds: Option<usize>,

        /// Comma-separated recommendation list sizes
        #[arg(short, long)]
        k: Option<String>,

        /// Fold reduction (average, best)
        #[arg(long)]
        reduction: Option<String>,

        /// Append results as JSON lines to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            orders,
            config,
            folds,
            k,
            reduction,
            output,
        } => {
            let mut config = match config {
                Some(path) => MdarConfig::from_toml_file(path)?,
                None => MdarConfig::default(),
            }
            .with_env_overrides()?;

            if let Some(folds) = folds {
                config.k_fold_size = folds;
            }
            if let Some(raw) = k {
                config.k_values = parse_k_values(&raw);
            }
            if let Some(raw) = reduction {
                config.reduction = Reduction::from_str(&raw)?;
            }
            if config.k_values.is_empty() {
                anyhow::bail!("No valid k values given");
            }

            let history = load_history(&orders)
                .with_context(|| format!("Failed to load orders from {:?}", orders))?;
            info!(
                "MDAR {} on {} order rows, {} folds",
                env!("CARGO_PKG_VERSION"),
                history.len(),
                config.k_fold_size
            );

            let source = Arc::new(InMemoryPartitionSource::new(Arc::new(history)));
            let runner = CrossValidationRunner::new(config, source);
            let caches: Vec<InMemoryRuleCache> =
                (0..runner.folds()).map(|_| InMemoryRuleCache::new()).collect();
            let fold_caches = caches.clone();
            let mut runner = runner
                .with_rule_sinks(move |fold| -> Arc<dyn RuleSink> {
                    Arc::new(fold_caches.get(fold).cloned().unwrap_or_default())
                })
                .with_results_sink(Arc::new(TracingResultsSink));
            if let Some(path) = output {
                runner = runner.with_results_sink(Arc::new(JsonLinesResultsSink::create(path)?));
            }

            let report = runner.run()?;
            for (fold, cache) in caches.iter().enumerate() {
                info!("Fold {} cached {} association rules", fold + 1, cache.len());
            }
            print_report(&report);
        }
    }
    Ok(())
}

fn print_report(report: &CrossValidationReport) {
    println!("{}", "=".repeat(80));
    println!(
        "{} folds, {} items",
        report.folds.len(),
        report.item_count
    );
    println!(
        "{:>5} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "k", "precision", "recall", "fallout", "specif.", "f1", "no hist."
    );
    println!("{}", "-".repeat(80));
    for summary in &report.summaries {
        let m = &summary.measures;
        println!(
            "{:>5} {:>10.4} {:>10.4} {:>10.6} {:>10.4} {:>10.4} {:>10.1}",
            summary.k,
            m.precision,
            m.recall,
            m.fallout,
            m.specificity,
            m.f1,
            summary.cases_without_history
        );
    }
    println!("{}", "=".repeat(80));
}
