//! Batch runner
//!
//! Feeds a list of image paths through the orchestrator with bounded
//! concurrency and tallies the outcomes. A persistence failure aborts the
//! batch; every other failure is counted and the batch continues.

use crate::error::PipelineResult;
use crate::models::{ImageStatus, ResultRecord};
use crate::services::orchestrator::AnalysisOrchestrator;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Per-image failure surfaced in the batch summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchError {
    pub path: String,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    /// Analyzed during this run and ended `completed`
    pub completed: usize,
    /// Already `completed`; served from the store
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<BatchError>,
    pub elapsed_ms: u64,
}

impl BatchSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    fn tally(&mut self, record: &ResultRecord) {
        let info = &record.processing_info;
        match info.status {
            ImageStatus::Completed if info.deduplicated => self.skipped += 1,
            ImageStatus::Completed => self.completed += 1,
            _ => {
                self.failed += 1;
                self.errors.push(BatchError {
                    path: record.file_info.path.clone(),
                    messages: info.errors.iter().map(|e| e.message.clone()).collect(),
                });
            }
        }
    }
}

pub struct BatchRunner {
    orchestrator: Arc<AnalysisOrchestrator>,
    concurrency: usize,
}

impl BatchRunner {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>, concurrency: usize) -> Self {
        Self {
            orchestrator,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(&self, paths: Vec<PathBuf>) -> PipelineResult<BatchSummary> {
        self.run_with(paths, |_| {}).await
    }

    /// Process `paths`, handing each finished record to `on_record` in
    /// completion order
    pub async fn run_with<F>(&self, paths: Vec<PathBuf>, mut on_record: F) -> PipelineResult<BatchSummary>
    where
        F: FnMut(&ResultRecord),
    {
        let started = Instant::now();
        let mut summary = BatchSummary {
            total: paths.len(),
            ..Default::default()
        };

        tracing::info!(
            images = summary.total,
            concurrency = self.concurrency,
            "Starting batch"
        );

        let orchestrator = &self.orchestrator;
        let mut results = stream::iter(paths)
            .map(|path| async move {
                let outcome = orchestrator.process(&path).await;
                (path, outcome)
            })
            .buffer_unordered(self.concurrency);

        while let Some((path, outcome)) = results.next().await {
            let record = match outcome {
                Ok(record) => record,
                Err(err) => {
                    tracing::error!(
                        path = %path.display(),
                        "Aborting batch on fatal error: {}",
                        err
                    );
                    return Err(err);
                }
            };
            summary.tally(&record);
            on_record(&record);
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            total = summary.total,
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed,
            elapsed_ms = summary.elapsed_ms,
            "Batch finished"
        );

        Ok(summary)
    }
}
