//! Wire types for the Brain API.
//!
//! Field names follow the backend exactly. Most extraction fields are
//! nullable on the wire because the LLM pipeline fills in whatever it can.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Liveness answer from `/_healthz`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

// ============================================================================
// Invoice extraction
// ============================================================================

/// Request body for starting background extraction of a batch of invoices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkInvoiceRequest {
    pub storage_keys: Vec<String>,
}

/// Acknowledgement for a bulk extraction request. `result_ids` are issued in
/// the same order as the submitted storage keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialProcessingResponse {
    pub result_ids: Vec<String>,
    pub message: String,
}

/// Request body for a batched status check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStatusRequest {
    pub result_ids: Vec<String>,
}

/// Map of result id to status string. A failed id may come with a companion
/// `"{result_id}_error"` entry carrying the failure message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStatusResponse {
    pub statuses: HashMap<String, String>,
}

/// Request body for single-invoice extraction and extraction-task creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractInvoiceRequest {
    pub storage_key: String,
}

/// Structured fields extracted from one invoice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedInvoiceData {
    pub score_details: Option<Value>,
    pub raw_llm_output: Option<Value>,
    pub vendor_name: Option<String>,
    pub invoice_date: Option<String>,
    pub due_date: Option<String>,
    pub service_period_start: Option<String>,
    pub service_period_end: Option<String>,
    pub service_address: Option<String>,
    pub total_cost: Option<f64>,
    #[serde(default)]
    pub line_items: Vec<ExtractedLineItem>,
    pub property_name: Option<String>,
    pub unit_count: Option<i64>,
    pub property_type: Option<String>,
    pub property_context: Option<String>,
    pub container_sizes: Option<Vec<String>>,
    pub service_frequency: Option<String>,
    pub total_yards: Option<f64>,
    pub compactor_hauls: Option<f64>,
    pub tonnage: Option<f64>,
    #[serde(default)]
    pub surcharges: Vec<InvoiceSurcharge>,
    pub raw_text: Option<String>,
    pub raw_extracted_json: Option<Value>,
    pub storage_key: Option<String>,
    /// Set when extraction finished with validation problems.
    pub error: Option<String>,
}

/// One scored service line item from an extracted invoice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedLineItem {
    pub metadata: Option<Value>,
    pub material_type: Option<String>,
    pub container_size: Option<String>,
    pub frequency: Option<String>,
    pub pickup_count: Option<f64>,
    pub total_yards: Option<f64>,
    pub line_total_cost: Option<f64>,
    pub line_description: Option<String>,
    /// Benchmark score breakdown; `overall.score` holds the 0-10 composite.
    pub score_details: Option<Value>,
    pub benchmark_flags: Option<Vec<String>>,
    pub overall_score: Option<f64>,
    pub storage_key: Option<String>,
    pub invoice_date: Option<String>,
    pub vendor_name: Option<String>,
}

/// A surcharge entry on an invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceSurcharge {
    pub description: Option<String>,
    pub amount: Option<f64>,
}

/// Result of a multi-file invoice upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub storage_keys: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// One row of the extracted-invoices listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub storage_key: String,
    pub vendor_name: Option<String>,
    pub invoice_date: Option<String>,
    pub total_cost: Option<f64>,
    pub processing_status: Option<String>,
}

/// Listing of extracted invoices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceSummaries {
    pub results: Vec<InvoiceSummary>,
}

/// A generic stored line item as returned by the line-items lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub total: Option<f64>,
    pub metadata: Option<Value>,
}

/// Line items stored for one invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItems {
    pub items: Vec<LineItem>,
}

/// Request body for the invoice analysis report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceAnalysisRequest {
    /// Structured data for one or two invoices.
    pub invoices_data: Vec<ExtractedInvoiceData>,
    pub property_name: Option<String>,
    pub property_units: Option<String>,
    pub property_city: Option<String>,
    pub property_state: Option<String>,
    pub asset_type: Option<String>,
    pub client_owner: Option<String>,
}

/// Markdown report generated from one or two invoices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceAnalysisResponse {
    pub analysis_markdown: String,
}

// ============================================================================
// Contract comparison
// ============================================================================

/// Request body for comparing two contract texts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareContractsRequest {
    pub contract_1_text: String,
    pub contract_2_text: String,
    pub file1_name: String,
    pub file2_name: String,
    pub user_id: Option<String>,
}

/// Comparison output, including the id of the stored record when the backend
/// persisted one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareContractsResponse {
    pub comparison_summary: String,
    #[serde(default)]
    pub key_differences: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub red_flags: Vec<String>,
    pub stored_record_id: Option<String>,
}

/// Request body for persisting an externally produced comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreComparisonRequest {
    pub file1_name: String,
    pub file2_name: String,
    pub contract1_text: String,
    pub contract2_text: String,
    pub comparison_summary: String,
    pub key_differences: Value,
    pub user_id: Option<String>,
    pub red_flags: Option<Value>,
    pub source_tool: Option<String>,
}

/// Acknowledgement for a stored comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreComparisonResponse {
    pub success: bool,
    pub message: String,
    pub inserted_id: Option<String>,
}

/// Result of a comparison file upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUploadResponse {
    pub message: String,
    pub stored_files: Vec<StoredFileInfo>,
    pub comparison_id: Option<String>,
}

/// A stored comparison input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFileInfo {
    pub original_filename: String,
    pub storage_key: String,
}

/// A stored comparison, without contract texts or line items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub id: String,
    pub file1_name: Option<String>,
    pub file2_name: Option<String>,
    pub comparison_summary: Option<String>,
    pub red_flags: Option<Vec<String>>,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A stored comparison with its analysis line items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullComparisonRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub file1_name: Option<String>,
    pub file2_name: Option<String>,
    pub comparison_summary: Option<String>,
    pub red_flags: Option<Vec<String>>,
    pub line_items: Option<Vec<Value>>,
}

/// One row of paged comparison history. The backend emits camelCase here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "file1Name")]
    pub file1_name: Option<String>,
    #[serde(rename = "file2Name")]
    pub file2_name: Option<String>,
    #[serde(rename = "redFlags")]
    pub red_flags: Option<Vec<String>>,
}

/// A page of comparison history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub history: Vec<HistoryItem>,
    pub total_count: i64,
}

/// Unpaged comparison history, optionally filtered by user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonHistory {
    pub history: Vec<ComparisonRecord>,
}

// ============================================================================
// Dashboard and red flags
// ============================================================================

/// Aggregate comparison metrics for the dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardMetrics {
    #[serde(default)]
    pub total_comparisons: i64,
    #[serde(default)]
    pub comparisons_with_flags: i64,
    #[serde(default)]
    pub percentage_with_flags: f64,
    #[serde(default)]
    pub total_red_flags: i64,
    #[serde(default)]
    pub average_flags_per_comparison: f64,
    #[serde(default)]
    pub top_users: Vec<TopUser>,
}

/// A user ranked by comparison count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopUser {
    pub user_id: String,
    pub comparison_count: i64,
}

/// Structured contract terms for the red-flag scanner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractDataInput {
    /// Contract duration in months.
    pub contract_term: Option<i64>,
    /// Required termination notice in days.
    pub termination_notice_period: Option<i64>,
    /// Maximum percentage for CPI-based price increases.
    pub cpi_cap: Option<f64>,
    pub auto_renewal_clause: Option<bool>,
    /// Fuel surcharge policy, e.g. "Fixed", "Capped", "Variable".
    pub fuel_surcharge: Option<String>,
}

/// One rule violation found by the red-flag scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedFlagResult {
    pub field: String,
    pub severity: String,
    pub message: String,
    pub actual_value: Value,
}

/// Red flags found in a scanned contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedFlagScanResponse {
    #[serde(default)]
    pub red_flags: Vec<RedFlagResult>,
}

// ============================================================================
// Contract tools
// ============================================================================

/// Request body for the contract summarizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeContractRequest {
    pub contract_text: String,
}

/// Plain-language contract summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeContractResponse {
    pub summary_text: String,
}

/// Request body for normalizing raw invoice line-item strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeInvoiceItemsRequest {
    pub line_items: Vec<String>,
}

/// Normalized line items plus the raw LLM output for debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeInvoiceItemsResponse {
    #[serde(default)]
    pub normalized_items: Vec<NormalizedItem>,
    pub raw_extracted_json: Option<String>,
}

/// A line item mapped onto standard service categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub original_item: String,
    pub service_type: Option<String>,
    pub container_size: Option<String>,
    pub frequency: Option<String>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub total_price: Option<f64>,
    pub notes: Option<String>,
}

/// Request body for the service calendar builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildServiceCalendarRequest {
    pub contract_text: String,
}

/// Service schedule extracted from a contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildServiceCalendarResponse {
    #[serde(default)]
    pub service_schedule: Vec<ServiceScheduleEntry>,
    pub raw_extracted_json: Option<String>,
}

/// One recurring service in a contract's schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceScheduleEntry {
    pub service_description: Option<String>,
    pub frequency: Option<String>,
    pub day_of_week: Option<String>,
    pub time_of_day: Option<String>,
    pub notes: Option<String>,
}

// ============================================================================
// Email
// ============================================================================

/// Request body for a plain email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmailRequest {
    pub recipient_email: String,
    pub subject: String,
    pub content_text: String,
    pub content_html: Option<String>,
}

/// Outcome of an email send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmailResponse {
    pub success: bool,
    pub message: String,
}

/// Request body for emailing a report link to a set of recipients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportLinkEmailRequest {
    pub comparison_id: String,
    pub recipients: Vec<String>,
}

/// Acknowledgement for a report-link email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEmailAck {
    pub message: String,
}

/// Request body for emailing a rendered report PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEmailRequest {
    pub record_id: String,
    pub recipient_email: String,
}

// ============================================================================
// Chat assistant
// ============================================================================

/// Request body for the audit assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub messages: Option<Vec<ChatMessage>>,
    pub stream: Option<bool>,
    pub instructions: Option<String>,
}

impl ChatRequest {
    /// Single-message request.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            message: Some(text.into()),
            ..Default::default()
        }
    }
}

/// One turn of assistant conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Non-streaming assistant answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Tool descriptors exposed by the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolList {
    #[serde(default)]
    pub tools: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_response_parses_error_companion_entries() {
        let json = r#"{"statuses":{"r1":"completed","r2":"failed","r2_error":"bad scan"}}"#;
        let resp: ProcessingStatusResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.statuses["r1"], "completed");
        assert_eq!(resp.statuses["r2"], "failed");
        assert_eq!(resp.statuses["r2_error"], "bad scan");
    }

    #[test]
    fn extracted_invoice_data_parses_sparse_payload() {
        let data: ExtractedInvoiceData = serde_json::from_str("{}").unwrap();
        assert!(data.vendor_name.is_none());
        assert!(data.line_items.is_empty());
        assert!(data.surcharges.is_empty());
    }

    #[test]
    fn extracted_invoice_data_parses_full_payload() {
        let json = r#"{
            "vendor_name": "Haul-Co",
            "invoice_date": "2024-03-01",
            "total_cost": 1234.5,
            "container_sizes": ["4yd", "6yd"],
            "surcharges": [{"description": "Fuel", "amount": 42.0}],
            "line_items": [{
                "material_type": "Trash",
                "line_total_cost": 300.0,
                "score_details": {"overall": {"score": 7.25}}
            }]
        }"#;
        let data: ExtractedInvoiceData = serde_json::from_str(json).unwrap();
        assert_eq!(data.vendor_name.as_deref(), Some("Haul-Co"));
        assert_eq!(data.surcharges[0].amount, Some(42.0));
        let score = data.line_items[0]
            .score_details
            .as_ref()
            .and_then(|d| d["overall"]["score"].as_f64());
        assert_eq!(score, Some(7.25));
    }

    #[test]
    fn history_item_parses_camel_case() {
        let json = r#"{
            "id": "rec-1",
            "createdAt": "2024-05-01T12:00:00Z",
            "file1Name": "a.pdf",
            "file2Name": null,
            "redFlags": ["Auto-renewal clause"]
        }"#;
        let item: HistoryItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, "rec-1");
        assert_eq!(item.file1_name.as_deref(), Some("a.pdf"));
        assert_eq!(item.red_flags.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn dashboard_metrics_defaults_missing_fields() {
        let metrics: DashboardMetrics = serde_json::from_str("{}").unwrap();
        assert_eq!(metrics.total_comparisons, 0);
        assert_eq!(metrics.percentage_with_flags, 0.0);
        assert!(metrics.top_users.is_empty());
    }

    #[test]
    fn chat_request_serializes_single_message() {
        let req = ChatRequest::message("is this surcharge normal?");
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("is this surcharge normal?"));
    }

    #[test]
    fn chat_message_helpers_set_roles() {
        assert_eq!(ChatMessage::user("hi").role, "user");
        assert_eq!(ChatMessage::assistant("hello").role, "assistant");
    }
}
