//! Results sinks: structured tracing output and a JSON-lines file.

use crate::domain::ports::{ResultRecord, ResultsSink};
use anyhow::{Context, Result, anyhow};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

/// Logs every record as tracing fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingResultsSink;

impl ResultsSink for TracingResultsSink {
    fn record(&self, record: &ResultRecord) -> Result<()> {
        let m = &record.measures;
        let cm = &record.confusion_matrix;
        info!(
            model = %record.model,
            k = record.k,
            item_count = record.item_count,
            cases_without_history = record.cases_without_history,
            tp = cm.tp,
            fp = cm.fp,
            fn_ = cm.fn_,
            tn = cm.tn,
            precision = m.precision,
            recall = m.recall,
            fallout = m.fallout,
            specificity = m.specificity,
            f1 = m.f1,
            "Evaluation result"
        );
        Ok(())
    }
}

/// Appends one JSON object per record to a file.
#[derive(Debug)]
pub struct JsonLinesResultsSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesResultsSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open results file {:?}", path))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultsSink for JsonLinesResultsSink {
    fn record(&self, record: &ResultRecord) -> Result<()> {
        let line = serde_json::to_string(record).context("Failed to serialize result")?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("Results file lock poisoned"))?;
        writeln!(file, "{}", line)
            .with_context(|| format!("Failed to write to {:?}", self.path))?;
        file.flush()?;
        Ok(())
    }
}
