//! Bulk invoice processing on top of the Brain API.
//!
//! The flow mirrors how waste invoices actually move through WasteWise:
//! upload produces storage keys, a bulk submission turns those into result
//! ids, a polling loop tracks each job to a terminal state, and the settled
//! batch is exported as CSV for the audit team.
//!
//! # Example
//!
//! ```rust,ignore
//! use brain_client::BrainClient;
//! use invoice_batch::{bulk_results_csv, BulkProcessor};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = BrainClient::from_env()?;
//! let mut processor = BulkProcessor::new(client);
//!
//! let summary = processor.process(&storage_keys, CancellationToken::new()).await?;
//! println!("{} of {} completed", summary.completed, summary.total);
//! std::fs::write("results.csv", bulk_results_csv(processor.jobs()))?;
//! ```

pub mod batch;
pub mod events;
pub mod export;
pub mod flags;
pub mod job;
pub mod watch;

pub use batch::{BatchError, BulkProcessor, ExtractionBackend, PollConfig};
pub use events::{BatchEvent, BatchSummary};
pub use export::{bulk_results_csv, escape_csv, DEFAULT_EXPORT_FILENAME};
pub use flags::{count_flags, FlagCount};
pub use job::{JobStatus, ProcessingJob};
pub use watch::{InvoiceChange, StatusWatcher, SummarySource};
