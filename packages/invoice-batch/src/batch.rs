//! Bulk processing controller.
//!
//! The `BulkProcessor` drives a batch of uploaded invoices through the
//! Brain's background extraction pipeline:
//!
//! 1. Submit storage keys and correlate the returned result ids
//! 2. Poll statuses on an interval until every job is terminal
//! 3. Hydrate extracted data for completed jobs
//!
//! Polling is bounded: transient poll failures back off and retry, too many
//! consecutive failures or an overall deadline abort the run, and a
//! `CancellationToken` stops it at the next await point. Job state survives
//! an aborted run so callers can still report partial progress.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use brain_client::{
    BrainClient, BulkInvoiceRequest, ExtractedInvoiceData, InitialProcessingResponse,
    ProcessingStatusRequest, ProcessingStatusResponse,
};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{BatchEvent, BatchSummary};
use crate::job::{JobStatus, ProcessingJob};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The slice of the Brain API a bulk run needs.
///
/// `BrainClient` is the production implementation; tests script their own.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Submit a batch for background extraction.
    async fn start_bulk_extraction(
        &self,
        request: BulkInvoiceRequest,
    ) -> brain_client::Result<InitialProcessingResponse>;

    /// Check statuses for in-flight result ids.
    async fn check_processing_status(
        &self,
        request: ProcessingStatusRequest,
    ) -> brain_client::Result<ProcessingStatusResponse>;

    /// Fetch extracted data for one invoice.
    async fn fetch_invoice(&self, storage_key: &str)
        -> brain_client::Result<ExtractedInvoiceData>;
}

#[async_trait]
impl ExtractionBackend for BrainClient {
    async fn start_bulk_extraction(
        &self,
        request: BulkInvoiceRequest,
    ) -> brain_client::Result<InitialProcessingResponse> {
        self.bulk_extract_invoice_data(request.storage_keys).await
    }

    async fn check_processing_status(
        &self,
        request: ProcessingStatusRequest,
    ) -> brain_client::Result<ProcessingStatusResponse> {
        BrainClient::check_processing_status(self, request.result_ids).await
    }

    async fn fetch_invoice(
        &self,
        storage_key: &str,
    ) -> brain_client::Result<ExtractedInvoiceData> {
        self.extract_invoice_data(storage_key).await
    }
}

#[async_trait]
impl<B: ExtractionBackend + ?Sized> ExtractionBackend for Arc<B> {
    async fn start_bulk_extraction(
        &self,
        request: BulkInvoiceRequest,
    ) -> brain_client::Result<InitialProcessingResponse> {
        (**self).start_bulk_extraction(request).await
    }

    async fn check_processing_status(
        &self,
        request: ProcessingStatusRequest,
    ) -> brain_client::Result<ProcessingStatusResponse> {
        (**self).check_processing_status(request).await
    }

    async fn fetch_invoice(
        &self,
        storage_key: &str,
    ) -> brain_client::Result<ExtractedInvoiceData> {
        (**self).fetch_invoice(storage_key).await
    }
}

/// Errors that abort a bulk run.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The bulk submission call failed; every job is marked failed.
    #[error("bulk submission failed: {0}")]
    Submission(String),
    /// The backend acknowledged a different number of jobs than submitted,
    /// so result ids cannot be matched to storage keys.
    #[error("backend returned {received} result ids for {submitted} storage keys")]
    Correlation { submitted: usize, received: usize },
    /// Too many consecutive status polls failed.
    #[error("{attempts} consecutive status polls failed, last error: {last_error}")]
    PollRetriesExhausted { attempts: u32, last_error: String },
    /// The run outlived the configured deadline.
    #[error("batch did not finish within {0:?}")]
    TimedOut(Duration),
    /// The caller cancelled the run.
    #[error("batch run cancelled")]
    Cancelled,
}

/// Configuration for the polling loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between status checks.
    pub interval: Duration,
    /// Hard cap on total run time.
    pub max_elapsed: Duration,
    /// Consecutive poll failures tolerated before giving up.
    pub max_consecutive_failures: u32,
    /// Retry delay after the first failed poll.
    pub backoff_base: Duration,
    /// Retry delay cap.
    pub backoff_max: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_elapsed: Duration::from_secs(30 * 60),
            max_consecutive_failures: 5,
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(60),
        }
    }
}

impl PollConfig {
    /// Delay before the next poll after `failures` consecutive failures.
    /// Doubles per failure, capped at `backoff_max`.
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        let delay = self.backoff_base.saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.backoff_max)
    }
}

/// Drives a batch of invoices from submission to settlement.
///
/// The processor owns the job table. After a run (successful or not),
/// `jobs()` reflects the final per-invoice state.
pub struct BulkProcessor<B: ExtractionBackend> {
    backend: B,
    config: PollConfig,
    events: Option<broadcast::Sender<BatchEvent>>,
    jobs: Vec<ProcessingJob>,
    completion_emitted: bool,
}

impl<B: ExtractionBackend> BulkProcessor<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, PollConfig::default())
    }

    pub fn with_config(backend: B, config: PollConfig) -> Self {
        Self {
            backend,
            config,
            events: None,
            jobs: Vec::new(),
            // No batch yet, nothing to announce
            completion_emitted: true,
        }
    }

    /// Current per-invoice state, in submission order.
    pub fn jobs(&self) -> &[ProcessingJob] {
        &self.jobs
    }

    /// Subscribe to progress events. May be called multiple times; all
    /// receivers see the same events.
    pub fn subscribe(&mut self) -> broadcast::Receiver<BatchEvent> {
        match &self.events {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
                self.events = Some(sender);
                receiver
            }
        }
    }

    /// Submit a batch for background extraction and correlate result ids.
    ///
    /// Resets the job table to one `Pending` job per storage key, in order.
    /// If submission fails, or the backend returns a result id count that
    /// does not match the submitted keys, every job is marked failed.
    pub async fn submit(&mut self, storage_keys: &[String]) -> Result<(), BatchError> {
        self.jobs = storage_keys
            .iter()
            .map(|key| ProcessingJob::new(key.clone()))
            .collect();
        self.completion_emitted = false;

        let request = BulkInvoiceRequest {
            storage_keys: storage_keys.to_vec(),
        };
        let resp = match self.backend.start_bulk_extraction(request).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "bulk submission failed");
                self.fail_all(&format!("bulk submission failed: {}", e));
                return Err(BatchError::Submission(e.to_string()));
            }
        };

        if resp.result_ids.len() != self.jobs.len() {
            let err = BatchError::Correlation {
                submitted: self.jobs.len(),
                received: resp.result_ids.len(),
            };
            warn!(error = %err, "bulk submission could not be correlated");
            self.fail_all(&err.to_string());
            return Err(err);
        }

        info!(count = self.jobs.len(), message = %resp.message, "bulk extraction submitted");
        for (job, result_id) in self.jobs.iter_mut().zip(resp.result_ids) {
            job.result_id = Some(result_id);
        }
        Ok(())
    }

    /// Poll statuses until every job is terminal.
    ///
    /// Returns the terminal tally, or an error when the run is cancelled,
    /// exceeds `max_elapsed`, or too many consecutive polls fail. Job state
    /// reached so far is preserved on error.
    pub async fn poll_until_settled(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<BatchSummary, BatchError> {
        let started = Instant::now();
        let deadline = started + self.config.max_elapsed;
        let mut consecutive_failures: u32 = 0;
        let mut delay = self.config.interval;

        loop {
            if self.is_settled() {
                return Ok(self.finish(started));
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(BatchError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(BatchError::TimedOut(self.config.max_elapsed));
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let result_ids: Vec<String> = self
                .jobs
                .iter()
                .filter(|job| !job.status.is_terminal())
                .filter_map(|job| job.result_id.clone())
                .collect();
            let request = ProcessingStatusRequest { result_ids };

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(BatchError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(BatchError::TimedOut(self.config.max_elapsed));
                }
                result = self.backend.check_processing_status(request) => result,
            };

            match result {
                Ok(resp) => {
                    consecutive_failures = 0;
                    delay = self.config.interval;
                    self.apply_statuses(&resp.statuses);
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(attempt = consecutive_failures, error = %e, "status poll failed");
                    self.emit(BatchEvent::PollFailed {
                        attempt: consecutive_failures,
                        error: e.to_string(),
                    });
                    if consecutive_failures >= self.config.max_consecutive_failures {
                        return Err(BatchError::PollRetriesExhausted {
                            attempts: consecutive_failures,
                            last_error: e.to_string(),
                        });
                    }
                    delay = self.config.backoff_delay(consecutive_failures);
                }
            }
        }
    }

    /// Fetch extracted data for completed jobs that do not have it yet.
    /// Returns the number hydrated; fetch failures are logged and skipped.
    pub async fn hydrate_completed(&mut self) -> usize {
        let mut hydrated = 0;
        for job in &mut self.jobs {
            if job.status != JobStatus::Completed || job.data.is_some() {
                continue;
            }
            match self.backend.fetch_invoice(&job.storage_key).await {
                Ok(data) => {
                    job.data = Some(data);
                    hydrated += 1;
                }
                Err(e) => {
                    warn!(storage_key = %job.storage_key, error = %e, "failed to hydrate invoice data");
                }
            }
        }
        hydrated
    }

    /// Run a batch end-to-end: submit, poll until settled, hydrate.
    pub async fn process(
        &mut self,
        storage_keys: &[String],
        cancel: CancellationToken,
    ) -> Result<BatchSummary, BatchError> {
        self.submit(storage_keys).await?;
        let summary = self.poll_until_settled(cancel).await?;
        let hydrated = self.hydrate_completed().await;
        debug!(hydrated, "hydrated completed invoices");
        Ok(summary)
    }

    fn is_settled(&self) -> bool {
        self.jobs.iter().all(|job| job.status.is_terminal())
    }

    fn finish(&mut self, started: Instant) -> BatchSummary {
        let summary = self.summarize(started.elapsed());
        if !self.completion_emitted {
            self.completion_emitted = true;
            info!(
                completed = summary.completed,
                failed = summary.failed,
                not_found = summary.not_found,
                "Bulk processing complete"
            );
            self.emit(BatchEvent::BatchCompleted {
                summary: summary.clone(),
            });
        }
        summary
    }

    fn summarize(&self, elapsed: Duration) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.jobs.len(),
            elapsed_ms: elapsed.as_millis() as u64,
            ..Default::default()
        };
        for job in &self.jobs {
            match job.status {
                JobStatus::Completed => summary.completed += 1,
                JobStatus::Failed => summary.failed += 1,
                JobStatus::NotFound => summary.not_found += 1,
                _ => {}
            }
        }
        summary
    }

    fn apply_statuses(&mut self, statuses: &HashMap<String, String>) {
        let mut changed = Vec::new();
        for job in &mut self.jobs {
            let Some(result_id) = job.result_id.as_deref() else {
                continue;
            };
            // Ids absent from the response stay as they are
            let Some(raw) = statuses.get(result_id) else {
                continue;
            };
            let Some(next) = JobStatus::parse(raw) else {
                debug!(result_id, status = %raw, "ignoring unknown status");
                continue;
            };
            let error = match next {
                JobStatus::Failed => Some(
                    statuses
                        .get(&format!("{}_error", result_id))
                        .cloned()
                        .unwrap_or_else(|| "Processing failed in background".to_string()),
                ),
                JobStatus::NotFound => {
                    Some("Processing job record not found in backend.".to_string())
                }
                _ => None,
            };
            if job.apply_status(next, error) {
                debug!(storage_key = %job.storage_key, status = %job.status, "job status changed");
                changed.push(BatchEvent::JobUpdated {
                    storage_key: job.storage_key.clone(),
                    status: job.status,
                });
            }
        }
        for event in changed {
            self.emit(event);
        }
    }

    fn fail_all(&mut self, message: &str) {
        let mut events = Vec::new();
        for job in &mut self.jobs {
            job.fail(message);
            events.push(BatchEvent::JobUpdated {
                storage_key: job.storage_key.clone(),
                status: job.status,
            });
        }
        for event in events {
            self.emit(event);
        }
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }
}
