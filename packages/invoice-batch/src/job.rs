//! Per-invoice job state for a bulk processing run.

use brain_client::ExtractedInvoiceData;
use serde::{Deserialize, Serialize};

/// Lifecycle of one invoice inside a bulk run.
///
/// `Completed`, `Failed` and `NotFound` are terminal. A job never leaves a
/// terminal state, whatever later status checks report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Placeholder before a batch is submitted.
    Initial,
    /// Submitted, waiting for the backend to pick it up.
    Pending,
    /// The backend is extracting this invoice.
    Processing,
    /// Extraction finished.
    Completed,
    /// Extraction failed.
    Failed,
    /// The backend has no record for this result id.
    NotFound,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::NotFound)
    }

    /// Parse a status string from the wire. Unknown strings map to `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initial" => Some(JobStatus::Initial),
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "not_found" => Some(JobStatus::NotFound),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Initial => "initial",
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One invoice tracked through a bulk run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    /// Storage key of the uploaded file.
    pub storage_key: String,
    /// Result id issued at submission. `None` until submission succeeds.
    pub result_id: Option<String>,
    pub status: JobStatus,
    /// Extracted fields, hydrated after completion.
    pub data: Option<ExtractedInvoiceData>,
    /// Failure message for failed or not-found jobs.
    pub error: Option<String>,
}

impl ProcessingJob {
    pub fn new(storage_key: impl Into<String>) -> Self {
        Self {
            storage_key: storage_key.into(),
            result_id: None,
            status: JobStatus::Pending,
            data: None,
            error: None,
        }
    }

    /// Apply a reported status. Returns `true` when the job changed.
    ///
    /// Terminal jobs are immutable. Moving to `Failed` or `NotFound` records
    /// the message and drops any stale data.
    pub fn apply_status(&mut self, next: JobStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() || self.status == next {
            return false;
        }
        self.status = next;
        match next {
            JobStatus::Completed => {
                self.error = None;
            }
            JobStatus::Failed | JobStatus::NotFound => {
                self.error = error;
                self.data = None;
            }
            _ => {}
        }
        true
    }

    /// Mark the job failed with a batch-wide message, e.g. when submission
    /// itself fails.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(message.into());
        self.data = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_never_regresses() {
        let mut job = ProcessingJob::new("invoices/a.pdf");
        assert!(job.apply_status(JobStatus::Completed, None));
        assert!(!job.apply_status(JobStatus::Processing, None));
        assert!(!job.apply_status(JobStatus::Failed, Some("late".into())));
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
    }

    #[test]
    fn repeated_status_is_not_a_change() {
        let mut job = ProcessingJob::new("invoices/a.pdf");
        assert!(job.apply_status(JobStatus::Processing, None));
        assert!(!job.apply_status(JobStatus::Processing, None));
    }

    #[test]
    fn failure_records_message_and_drops_data() {
        let mut job = ProcessingJob::new("invoices/a.pdf");
        job.data = Some(Default::default());
        assert!(job.apply_status(JobStatus::Failed, Some("bad scan".into())));
        assert_eq!(job.error.as_deref(), Some("bad scan"));
        assert!(job.data.is_none());
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            JobStatus::Initial,
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::NotFound,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("queued"), None);
    }

    #[test]
    fn status_serializes_in_wire_form() {
        let json = serde_json::to_string(&JobStatus::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
    }
}
