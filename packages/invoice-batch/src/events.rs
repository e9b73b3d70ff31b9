//! Events emitted while a bulk run is in flight.

use serde::{Deserialize, Serialize};

use crate::job::JobStatus;

/// Progress events published by the bulk processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BatchEvent {
    /// A job moved to a new status.
    JobUpdated {
        storage_key: String,
        status: JobStatus,
    },
    /// A status poll failed; the run keeps going with backoff.
    PollFailed { attempt: u32, error: String },
    /// Every job reached a terminal state.
    BatchCompleted { summary: BatchSummary },
}

/// Terminal tally for a bulk run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub not_found: usize,
    /// Wall time from submission to settlement.
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_updated_serializes_with_wire_status() {
        let event = BatchEvent::JobUpdated {
            storage_key: "invoices/a.pdf".to_string(),
            status: JobStatus::NotFound,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("JobUpdated"));
        assert!(json.contains("invoices/a.pdf"));
        assert!(json.contains("not_found"));
    }

    #[test]
    fn batch_completed_round_trips() {
        let event = BatchEvent::BatchCompleted {
            summary: BatchSummary {
                total: 3,
                completed: 2,
                failed: 1,
                not_found: 0,
                elapsed_ms: 15_000,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: BatchEvent = serde_json::from_str(&json).unwrap();
        match back {
            BatchEvent::BatchCompleted { summary } => {
                assert_eq!(summary.total, 3);
                assert_eq!(summary.completed, 2);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
