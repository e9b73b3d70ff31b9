//! Pure WasteWise Brain REST API client.
//!
//! A typed client for the Brain backend. Covers invoice extraction (single
//! and bulk with background polling), contract comparison, red-flag
//! scanning, reporting, email, and the streaming audit assistant.
//!
//! # Example
//!
//! ```rust,ignore
//! use brain_client::BrainClient;
//!
//! let client = BrainClient::from_env()?;
//!
//! let ack = client
//!     .bulk_extract_invoice_data(vec!["invoices/march.pdf".into()])
//!     .await?;
//! let status = client.check_processing_status(ack.result_ids).await?;
//! println!("{:?}", status.statuses);
//! ```

pub mod error;
pub mod streaming;
pub mod types;

pub use error::{BrainError, Result};
pub use streaming::ChatStream;
pub use types::*;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Environment variable holding the Brain base URL.
pub const API_URL_VAR: &str = "WASTEWISE_API_URL";

/// Environment variable holding the optional bearer token.
pub const API_KEY_VAR: &str = "WASTEWISE_API_KEY";

#[derive(Clone)]
pub struct BrainClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl BrainClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: None,
        }
    }

    /// Build a client from `WASTEWISE_API_URL` and (optionally)
    /// `WASTEWISE_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(API_URL_VAR)
            .map_err(|_| BrainError::Config(format!("{} not set", API_URL_VAR)))?;
        let mut client = Self::new(base_url);
        client.api_key = std::env::var(API_KEY_VAR).ok();
        Ok(client)
    }

    /// Attach a bearer token sent with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, path: &str, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = self.authed(builder).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(path, status = status.as_u16(), "Brain API returned an error");
            return Err(BrainError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        path: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<T> {
        let body = self.send(path, builder).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(path, self.http.get(self.url(path))).await
    }

    async fn get_json_with<Q, T>(&self, path: &str, query: &Q) -> Result<T>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(path, self.http.get(self.url(path)).query(query))
            .await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(path, self.http.post(self.url(path)).json(body))
            .await
    }

    fn multipart_form(files: Vec<(String, Vec<u8>)>) -> reqwest::multipart::Form {
        let mut form = reqwest::multipart::Form::new();
        for (name, bytes) in files {
            form = form.part("files", reqwest::multipart::Part::bytes(bytes).file_name(name));
        }
        form
    }

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    /// Liveness probe.
    pub async fn check_health(&self) -> Result<HealthResponse> {
        self.get_json("/_healthz").await
    }

    // ------------------------------------------------------------------
    // Invoice extraction
    // ------------------------------------------------------------------

    /// Start background extraction for a batch of uploaded invoices.
    /// Returns immediately with one result id per storage key, in order.
    pub async fn bulk_extract_invoice_data(
        &self,
        storage_keys: Vec<String>,
    ) -> Result<InitialProcessingResponse> {
        tracing::debug!(count = storage_keys.len(), "Submitting bulk extraction");
        let body = BulkInvoiceRequest { storage_keys };
        self.post_json("/routes/bulk-extract-invoice-data", &body)
            .await
    }

    /// Check processing status for a batch of result ids.
    pub async fn check_processing_status(
        &self,
        result_ids: Vec<String>,
    ) -> Result<ProcessingStatusResponse> {
        let body = ProcessingStatusRequest { result_ids };
        self.post_json("/routes/check-processing-status", &body).await
    }

    /// Extract structured data from one invoice, synchronously.
    pub async fn extract_invoice_data(&self, storage_key: &str) -> Result<ExtractedInvoiceData> {
        let body = ExtractInvoiceRequest {
            storage_key: storage_key.to_string(),
        };
        self.post_json("/routes/extract-invoice-data", &body).await
    }

    /// Create a background extraction task for one invoice. Returns the
    /// result id to poll.
    pub async fn create_invoice_extraction_task(&self, storage_key: &str) -> Result<String> {
        let body = ExtractInvoiceRequest {
            storage_key: storage_key.to_string(),
        };
        self.post_json("/routes/create-invoice-extraction-task", &body)
            .await
    }

    /// Upload invoice files. Each entry is `(filename, bytes)`.
    pub async fn upload_invoices(&self, files: Vec<(String, Vec<u8>)>) -> Result<UploadResponse> {
        tracing::debug!(count = files.len(), "Uploading invoices");
        let form = Self::multipart_form(files);
        let builder = self.http.post(self.url("/routes/upload-invoices")).multipart(form);
        self.send_json("/routes/upload-invoices", builder).await
    }

    /// List previously extracted invoices.
    pub async fn get_invoice_summaries(&self) -> Result<InvoiceSummaries> {
        self.get_json("/routes/get_invoice_summaries").await
    }

    /// Fetch stored line items for one invoice.
    pub async fn get_invoice_line_items(&self, storage_key: &str) -> Result<LineItems> {
        self.get_json_with("/routes/get_invoice_line_items", &[("storage_key", storage_key)])
            .await
    }

    /// Generate a markdown analysis report for one or two invoices.
    pub async fn analyze_invoices(
        &self,
        request: InvoiceAnalysisRequest,
    ) -> Result<InvoiceAnalysisResponse> {
        self.post_json("/routes/analyze-invoices", &request).await
    }

    // ------------------------------------------------------------------
    // Contract comparison
    // ------------------------------------------------------------------

    /// Compare two contract texts and persist the result.
    pub async fn compare_contracts(
        &self,
        request: CompareContractsRequest,
    ) -> Result<CompareContractsResponse> {
        self.post_json("/routes/compare-contracts", &request).await
    }

    /// Persist a comparison produced outside the compare endpoint.
    pub async fn store_comparison_result(
        &self,
        request: StoreComparisonRequest,
    ) -> Result<StoreComparisonResponse> {
        self.post_json("/routes/store-comparison-result", &request)
            .await
    }

    /// Upload contract files to open a comparison. Each entry is
    /// `(filename, bytes)`.
    pub async fn start_comparison_upload(
        &self,
        files: Vec<(String, Vec<u8>)>,
    ) -> Result<FileUploadResponse> {
        let form = Self::multipart_form(files);
        let builder = self
            .http
            .post(self.url("/routes/analysis/start-comparison"))
            .multipart(form);
        self.send_json("/routes/analysis/start-comparison", builder)
            .await
    }

    /// Fetch one page of comparison history.
    pub async fn get_history(&self, limit: u32, offset: u32) -> Result<HistoryPage> {
        self.get_json_with("/routes/history", &[("limit", limit), ("offset", offset)])
            .await
    }

    /// Fetch one stored comparison with its line items.
    pub async fn get_comparison_details(&self, record_id: &str) -> Result<FullComparisonRecord> {
        let path = format!("/routes/history/{}", record_id);
        self.send_json(&path, self.http.get(self.url(&path))).await
    }

    /// Fetch unpaged comparison history, optionally for one user.
    pub async fn get_comparison_history(
        &self,
        user_id: Option<&str>,
    ) -> Result<ComparisonHistory> {
        let mut builder = self.http.get(self.url("/routes/get-comparison-history"));
        if let Some(user_id) = user_id {
            builder = builder.query(&[("user_id", user_id)]);
        }
        self.send_json("/routes/get-comparison-history", builder)
            .await
    }

    /// Render the shareable HTML report for a stored comparison.
    pub async fn generate_comparison_report(&self, record_id: &str) -> Result<String> {
        let path = "/routes/generate-contract-comparison-report";
        let builder = self
            .http
            .get(self.url(path))
            .query(&[("record_id", record_id)]);
        let resp = self.send(path, builder).await?;
        Ok(resp.text().await?)
    }

    // ------------------------------------------------------------------
    // Dashboard and red flags
    // ------------------------------------------------------------------

    /// Aggregate comparison metrics.
    pub async fn get_dashboard_summary(&self) -> Result<DashboardMetrics> {
        self.get_json("/routes/get-dashboard-summary").await
    }

    /// Scan structured contract terms against the red-flag rules.
    pub async fn scan_red_flags(&self, data: &ContractDataInput) -> Result<RedFlagScanResponse> {
        self.post_json("/routes/scan-red-flags", data).await
    }

    // ------------------------------------------------------------------
    // Contract tools
    // ------------------------------------------------------------------

    /// Summarize one contract in plain language.
    pub async fn summarize_contract(&self, contract_text: &str) -> Result<SummarizeContractResponse> {
        let body = SummarizeContractRequest {
            contract_text: contract_text.to_string(),
        };
        self.post_json("/routes/summarize-contract", &body).await
    }

    /// Normalize raw invoice line-item strings into standard categories.
    pub async fn normalize_invoice_items(
        &self,
        line_items: Vec<String>,
    ) -> Result<NormalizeInvoiceItemsResponse> {
        let body = NormalizeInvoiceItemsRequest { line_items };
        self.post_json("/routes/normalize-invoice-items", &body).await
    }

    /// Extract a recurring service schedule from a contract.
    pub async fn build_service_calendar(
        &self,
        contract_text: &str,
    ) -> Result<BuildServiceCalendarResponse> {
        let body = BuildServiceCalendarRequest {
            contract_text: contract_text.to_string(),
        };
        self.post_json("/routes/build-service-calendar", &body).await
    }

    // ------------------------------------------------------------------
    // Email
    // ------------------------------------------------------------------

    /// Send a plain email through the backend mailer.
    pub async fn send_plain_email(&self, request: SendEmailRequest) -> Result<SendEmailResponse> {
        self.post_json("/routes/email/send-plain-email", &request)
            .await
    }

    /// Email a report link for a stored comparison to a set of recipients.
    pub async fn send_report_link_email(
        &self,
        comparison_id: &str,
        recipients: Vec<String>,
    ) -> Result<ReportEmailAck> {
        let body = ReportLinkEmailRequest {
            comparison_id: comparison_id.to_string(),
            recipients,
        };
        self.post_json("/routes/communication/send-report-email", &body)
            .await
    }

    /// Email the rendered report PDF for a stored comparison.
    pub async fn send_report_pdf_email(
        &self,
        record_id: &str,
        recipient_email: &str,
    ) -> Result<SendEmailResponse> {
        let body = ReportEmailRequest {
            record_id: record_id.to_string(),
            recipient_email: recipient_email.to_string(),
        };
        self.post_json("/routes/report-actions/send-report-email", &body)
            .await
    }

    // ------------------------------------------------------------------
    // Chat assistant
    // ------------------------------------------------------------------

    /// List the tools the audit assistant can call.
    pub async fn list_chat_tools(&self) -> Result<ToolList> {
        self.get_json("/routes/chat/tools").await
    }

    /// Ask the audit assistant and wait for the full answer.
    pub async fn chat_query(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.post_json("/routes/chat/query", &request).await
    }

    /// Ask the audit assistant and stream the answer as it is generated.
    pub async fn chat_query_stream(&self, mut request: ChatRequest) -> Result<ChatStream> {
        request.stream = Some(true);
        let builder = self
            .http
            .post(self.url("/routes/chat/query/stream"))
            .json(&request);
        let resp = self.send("/routes/chat/query/stream", builder).await?;
        Ok(ChatStream::new(resp.bytes_stream()))
    }
}
