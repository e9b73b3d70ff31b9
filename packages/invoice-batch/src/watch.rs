//! Background watcher for invoice processing status.
//!
//! Polls the extracted-invoices listing on an interval and reports status
//! transitions over a channel. The first successful fetch only primes the
//! baseline; nothing is reported for state that existed before watching
//! began. Dropping the watcher stops the background task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use brain_client::{BrainClient, InvoiceSummary};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Source of the invoice listing the watcher polls.
#[async_trait]
pub trait SummarySource: Send + Sync {
    async fn invoice_summaries(&self) -> brain_client::Result<Vec<InvoiceSummary>>;
}

#[async_trait]
impl SummarySource for BrainClient {
    async fn invoice_summaries(&self) -> brain_client::Result<Vec<InvoiceSummary>> {
        Ok(self.get_invoice_summaries().await?.results)
    }
}

#[async_trait]
impl<S: SummarySource + ?Sized> SummarySource for Arc<S> {
    async fn invoice_summaries(&self) -> brain_client::Result<Vec<InvoiceSummary>> {
        (**self).invoice_summaries().await
    }
}

/// A processing-status transition for one invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceChange {
    pub storage_key: String,
    /// Status at the previous observation. `None` for a newly seen invoice.
    pub previous: Option<String>,
    pub status: String,
}

/// Handle to a spawned status watcher. Cancels the background task on drop;
/// use [`StatusWatcher::shutdown`] to also wait for it to finish.
pub struct StatusWatcher {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl StatusWatcher {
    /// Spawn a watcher polling `source` every `interval`. The first fetch
    /// happens immediately.
    pub fn spawn<S: SummarySource + 'static>(
        source: S,
        interval: Duration,
    ) -> (Self, mpsc::Receiver<InvoiceChange>) {
        let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            watch_loop(source, interval, task_cancel, tx).await;
        });
        (
            Self {
                cancel,
                handle: Some(handle),
            },
            rx,
        )
    }

    /// Stop the watcher and wait for the background task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for StatusWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn watch_loop<S: SummarySource>(
    source: S,
    interval: Duration,
    cancel: CancellationToken,
    tx: mpsc::Sender<InvoiceChange>,
) {
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut primed = false;
    let mut delay = Duration::ZERO;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        delay = interval;

        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = source.invoice_summaries() => result,
        };

        match result {
            Ok(summaries) => {
                for summary in summaries {
                    let Some(status) = summary.processing_status else {
                        continue;
                    };
                    let previous = seen.insert(summary.storage_key.clone(), status.clone());
                    if !primed || previous.as_deref() == Some(status.as_str()) {
                        continue;
                    }
                    let change = InvoiceChange {
                        storage_key: summary.storage_key,
                        previous,
                        status,
                    };
                    if tx.send(change).await.is_err() {
                        // Receiver gone, nothing left to notify
                        return;
                    }
                }
                primed = true;
            }
            Err(e) => warn!(error = %e, "invoice status fetch failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Serves scripted listings in order, repeating the last one.
    #[derive(Default)]
    struct ScriptedSummaries {
        responses: Mutex<VecDeque<Vec<InvoiceSummary>>>,
        last: Mutex<Vec<InvoiceSummary>>,
    }

    impl ScriptedSummaries {
        fn push(&self, summaries: Vec<InvoiceSummary>) {
            self.responses.lock().unwrap().push_back(summaries);
        }
    }

    #[async_trait]
    impl SummarySource for ScriptedSummaries {
        async fn invoice_summaries(&self) -> brain_client::Result<Vec<InvoiceSummary>> {
            match self.responses.lock().unwrap().pop_front() {
                Some(summaries) => {
                    *self.last.lock().unwrap() = summaries.clone();
                    Ok(summaries)
                }
                None => Ok(self.last.lock().unwrap().clone()),
            }
        }
    }

    fn summary(key: &str, status: &str) -> InvoiceSummary {
        InvoiceSummary {
            storage_key: key.to_string(),
            vendor_name: None,
            invoice_date: None,
            total_cost: None,
            processing_status: Some(status.to_string()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reports_status_transition_with_previous() {
        let source = Arc::new(ScriptedSummaries::default());
        source.push(vec![summary("invoices/a.pdf", "processing")]);
        source.push(vec![summary("invoices/a.pdf", "completed")]);

        let (watcher, mut rx) = StatusWatcher::spawn(Arc::clone(&source), Duration::from_secs(5));

        let change = rx.recv().await.unwrap();
        assert_eq!(change.storage_key, "invoices/a.pdf");
        assert_eq!(change.previous.as_deref(), Some("processing"));
        assert_eq!(change.status, "completed");

        watcher.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn baseline_pass_is_silent() {
        let source = Arc::new(ScriptedSummaries::default());
        source.push(vec![summary("invoices/a.pdf", "processing")]);

        let (watcher, mut rx) = StatusWatcher::spawn(Arc::clone(&source), Duration::from_secs(5));

        let waited = tokio::time::timeout(Duration::from_secs(30), rx.recv()).await;
        assert!(waited.is_err());

        watcher.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn new_invoice_reports_with_no_previous() {
        let source = Arc::new(ScriptedSummaries::default());
        source.push(vec![summary("invoices/a.pdf", "completed")]);
        source.push(vec![
            summary("invoices/a.pdf", "completed"),
            summary("invoices/b.pdf", "pending"),
        ]);

        let (watcher, mut rx) = StatusWatcher::spawn(Arc::clone(&source), Duration::from_secs(5));

        let change = rx.recv().await.unwrap();
        assert_eq!(change.storage_key, "invoices/b.pdf");
        assert!(change.previous.is_none());
        assert_eq!(change.status, "pending");

        watcher.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_watcher_stops_the_task() {
        let source = Arc::new(ScriptedSummaries::default());
        source.push(vec![summary("invoices/a.pdf", "processing")]);

        let (watcher, mut rx) = StatusWatcher::spawn(Arc::clone(&source), Duration::from_secs(5));
        drop(watcher);

        assert!(rx.recv().await.is_none());
    }
}
