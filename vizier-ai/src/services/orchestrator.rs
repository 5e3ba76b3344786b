//! Analysis orchestrator
//!
//! Drives one image through a processing pass:
//! 1. Fingerprint, upsert into the job store, skip if already `completed`
//! 2. Mark `processing`
//! 3. Preprocess; on failure mark `failed` and return a partial record
//! 4. Fan out every configured analyzer/variant call, appending each
//!    outcome as it arrives
//! 5. `completed` if at least one call succeeded, otherwise `failed`
//! 6. Assemble the result record from the newest entry per variant
//!
//! Only persistence errors escape [`AnalysisOrchestrator::process`]; every
//! other failure is recorded in the returned record.

use crate::config::AnalysisConfig;
use crate::db::JobStore;
use crate::error::{CallFailure, FailureKind, PipelineError, PipelineResult};
use crate::models::result_record::{directory_of, file_name_of};
use crate::models::{AnalysisTask, AnalyzerTarget, ErrorEntry, ImageStatus, Outcome, ResultRecord};
use crate::services::analyzer_client::RetryingAnalyzerClient;
use crate::services::api_log::ApiLogger;
use crate::services::fingerprinter::ContentFingerprinter;
use crate::services::image_preprocessor::ImagePreprocessor;
use crate::services::llm_client::LlmEndpoint;
use crate::services::visual_client::VisualClassifierEndpoint;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

type InFlight = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Per-image analysis pipeline
pub struct AnalysisOrchestrator {
    config: Arc<AnalysisConfig>,
    store: JobStore,
    fingerprinter: ContentFingerprinter,
    preprocessor: ImagePreprocessor,
    clients: HashMap<AnalyzerTarget, RetryingAnalyzerClient>,
    in_flight: InFlight,
}

impl AnalysisOrchestrator {
    /// Build one client per analyzer target: the visual classifier and
    /// each configured LLM model
    pub fn new(
        config: Arc<AnalysisConfig>,
        store: JobStore,
        api_log: Option<Arc<ApiLogger>>,
    ) -> PipelineResult<Self> {
        let mut clients = HashMap::new();

        if let Some(visual) = &config.visual {
            let client = RetryingAnalyzerClient::new(
                Arc::new(VisualClassifierEndpoint::new(visual)),
                config.retry.clone(),
                visual.timeout,
            )?;
            clients.insert(AnalyzerTarget::Visual, client);
        }

        for llm in &config.llm {
            let client = RetryingAnalyzerClient::new(
                Arc::new(LlmEndpoint::new(llm, config.catalog.clone())),
                config.retry.clone(),
                llm.timeout,
            )?;
            let target = AnalyzerTarget::Llm(llm.key.clone());
            tracing::debug!(analyzer = %target, title = %llm.title, model = %llm.model, "LLM model configured");
            clients.insert(target, client);
        }

        if let Some(logger) = api_log {
            for client in clients.values_mut() {
                *client = client.clone().with_api_log(logger.clone());
            }
        }

        let preprocessor = ImagePreprocessor::new(config.preprocess.clone())
            .with_perceptual_hashes(config.perceptual_hashes);

        Ok(Self {
            config,
            store,
            fingerprinter: ContentFingerprinter::new(),
            preprocessor,
            clients,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run one processing pass for `path`
    pub async fn process(&self, path: &Path) -> PipelineResult<ResultRecord> {
        let started = Instant::now();

        let fingerprint = match self.fingerprinter.fingerprint_file(path).await {
            Ok(fp) => fp,
            Err(err) => {
                tracing::warn!(path = %path.display(), "Cannot fingerprint image: {}", err);
                return Ok(ResultRecord::unstored(path, &err));
            }
        };

        // Serialize passes over the same content within this process
        let _lease = self.acquire_fingerprint(&fingerprint.digest).await;

        self.process_fingerprinted(path, &fingerprint.digest, fingerprint.byte_size, started)
            .await
    }

    async fn process_fingerprinted(
        &self,
        path: &Path,
        fingerprint: &str,
        byte_size: u64,
        started: Instant,
    ) -> PipelineResult<ResultRecord> {
        let filename = file_name_of(path);
        let directory = directory_of(path);

        let upsert = self
            .store
            .upsert_image(fingerprint, &filename, directory.as_deref(), byte_size)
            .await?;
        let image_id = upsert.image_id;

        if !self.config.force_reprocess && self.store.is_completed(fingerprint).await? {
            tracing::info!(
                path = %path.display(),
                fingerprint,
                "Image already analyzed, skipping"
            );
            return self.assemble(path, image_id, Vec::new(), true).await;
        }

        if !upsert.inserted {
            tracing::info!(
                path = %path.display(),
                fingerprint,
                previous_status = %upsert.status,
                "Reprocessing known image"
            );
        }

        self.store.set_status(image_id, ImageStatus::Processing).await?;

        let prepared = match self.preprocessor.prepare(path).await {
            Ok(prepared) => prepared,
            Err(err) => {
                tracing::warn!(path = %path.display(), fingerprint, "Preprocessing failed: {}", err);
                self.store.set_status(image_id, ImageStatus::Failed).await?;
                self.store
                    .record_processing_time(image_id, started.elapsed().as_millis() as u64)
                    .await?;
                let errors = vec![ErrorEntry::from_pipeline_error(&err)];
                return self.assemble(path, image_id, errors, false).await;
            }
        };

        self.store.record_metadata(image_id, &prepared.metadata).await?;
        if let Some(hashes) = &prepared.metadata.perceptual_hashes {
            self.store.record_perceptual_hashes(image_id, hashes).await?;
        }

        let successes = self.run_tasks(image_id, &prepared.payload).await?;

        let status = if successes > 0 {
            ImageStatus::Completed
        } else {
            ImageStatus::Failed
        };
        self.store.set_status(image_id, status).await?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.store.record_processing_time(image_id, elapsed_ms).await?;

        tracing::info!(
            path = %path.display(),
            fingerprint,
            status = %status,
            successes,
            tasks = self.config.tasks.len(),
            elapsed_ms,
            "Image processed"
        );

        self.assemble(path, image_id, Vec::new(), false).await
    }

    /// Dispatch every task concurrently and append each outcome as it
    /// completes. Returns the number of successful calls.
    async fn run_tasks(&self, image_id: Uuid, payload: &str) -> PipelineResult<usize> {
        let mut pending: FuturesUnordered<_> = self
            .config
            .tasks
            .iter()
            .map(|task| self.run_task(task, payload))
            .collect();

        let mut successes = 0;
        while let Some((task, outcome)) = pending.next().await {
            let (outcome_kind, body) = match outcome {
                Ok(body) => {
                    successes += 1;
                    (Outcome::Success, body)
                }
                Err(failure) => {
                    tracing::warn!(
                        image_id = %image_id,
                        task = %task,
                        "Analyzer variant failed: {}",
                        failure
                    );
                    (Outcome::Error, failure.to_envelope())
                }
            };

            let variant = task.variant();
            self.store
                .append_result(image_id, task.kind(), Some(&variant), outcome_kind, &body)
                .await
                .map_err(PipelineError::Persistence)?;
        }

        Ok(successes)
    }

    async fn run_task<'a>(
        &'a self,
        task: &'a AnalysisTask,
        payload: &'a str,
    ) -> (&'a AnalysisTask, Result<serde_json::Value, CallFailure>) {
        let outcome = match self.clients.get(&task.target()) {
            Some(client) => client.call(task, payload).await,
            None => Err(CallFailure {
                kind: FailureKind::InvalidRequest,
                attempts: 0,
                detail: format!("No client configured for {}", task.target()),
            }),
        };
        (task, outcome)
    }

    async fn assemble(
        &self,
        path: &Path,
        image_id: Uuid,
        image_errors: Vec<ErrorEntry>,
        deduplicated: bool,
    ) -> PipelineResult<ResultRecord> {
        let image = self.store.get_image_by_id(image_id).await?.ok_or_else(|| {
            PipelineError::Persistence(vizier_common::Error::NotFound(format!("Image {}", image_id)))
        })?;
        let latest = self.store.latest_results(image_id).await?;
        Ok(ResultRecord::assemble(path, &image, &latest, image_errors, deduplicated))
    }

    /// Wait for exclusive use of `fingerprint` within this process.
    ///
    /// The lease is registered before waiting, so a pass cancelled while
    /// queued or while running still clears its map entry.
    async fn acquire_fingerprint(&self, fingerprint: &str) -> FingerprintLease<'_> {
        let lock = {
            let mut locks = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(fingerprint.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };

        let mut lease = FingerprintLease {
            in_flight: &self.in_flight,
            fingerprint: fingerprint.to_string(),
            lock: Some(lock.clone()),
            guard: None,
        };
        lease.guard = Some(lock.lock_owned().await);
        lease
    }

    #[cfg(test)]
    fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Exclusive claim on one fingerprint, released on drop
struct FingerprintLease<'a> {
    in_flight: &'a InFlight,
    fingerprint: String,
    lock: Option<Arc<tokio::sync::Mutex<()>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FingerprintLease<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        drop(self.lock.take());

        let mut locks = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = locks.get(&self.fingerprint) {
            // Only the map holds it: no pass is waiting
            if Arc::strong_count(lock) == 1 {
                locks.remove(&self.fingerprint);
            }
        }
    }
}
