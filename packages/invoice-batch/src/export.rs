//! CSV export of settled bulk runs.
//!
//! Layout: one header row, then one row per line item of each completed
//! invoice. The first line-item row carries the invoice columns; follow-up
//! rows carry quoted-empty placeholders so the invoice reads as one visual
//! group. A completed invoice without line items still gets one row, with
//! placeholders in every line-item column.

use brain_client::{ExtractedInvoiceData, ExtractedLineItem};
use serde_json::Value;

use crate::job::{JobStatus, ProcessingJob};

pub const INVOICE_HEADERS: [&str; 15] = [
    "File Key",
    "Service Address",
    "Vendor Name",
    "Invoice Date",
    "Due Date",
    "Service Start",
    "Service End",
    "Total Cost",
    "Container Sizes",
    "Frequency",
    "Total Yards",
    "Compactor Hauls",
    "Tonnage",
    "Surcharges (JSON)",
    "Status/Error",
];

pub const LINE_ITEM_HEADERS: [&str; 11] = [
    "Line Item: Material",
    "Line Item: Container",
    "Line Item: Frequency",
    "Line Item: Pickups",
    "Line Item: Total Yards",
    "Line Item: Cost",
    "Line Item: Cost/Yard",
    "Line Item: Overall Score",
    "Line Item: Score Details (JSON)",
    "Line Item: Flags",
    "Line Item: Description",
];

/// Quoted-empty cell used as a placeholder in grouped rows.
const BLANK: &str = "\"\"";

pub const DEFAULT_EXPORT_FILENAME: &str = "wastewise_bulk_results_with_lines.csv";

/// Escape one CSV cell. Wraps in quotes only when the value contains a
/// comma, quote or newline, doubling any internal quotes.
pub fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render completed jobs as CSV. Jobs that are not completed, or completed
/// without hydrated data, are skipped.
pub fn bulk_results_csv(jobs: &[ProcessingJob]) -> String {
    let mut header: Vec<&str> = Vec::with_capacity(INVOICE_HEADERS.len() + LINE_ITEM_HEADERS.len());
    header.extend_from_slice(&INVOICE_HEADERS);
    header.extend_from_slice(&LINE_ITEM_HEADERS);

    let mut rows = vec![header.join(",")];
    for job in jobs {
        if job.status != JobStatus::Completed {
            continue;
        }
        let Some(data) = &job.data else {
            continue;
        };

        let base = invoice_cells(job, data);
        if data.line_items.is_empty() {
            let mut row = base;
            row.extend(std::iter::repeat(BLANK.to_string()).take(LINE_ITEM_HEADERS.len()));
            rows.push(row.join(","));
            continue;
        }
        for (i, item) in data.line_items.iter().enumerate() {
            let mut row = if i == 0 {
                base.clone()
            } else {
                vec![BLANK.to_string(); INVOICE_HEADERS.len()]
            };
            row.extend(line_item_cells(item));
            rows.push(row.join(","));
        }
    }
    rows.join("\n")
}

fn invoice_cells(job: &ProcessingJob, data: &ExtractedInvoiceData) -> Vec<String> {
    let status = match &data.error {
        Some(error) => format!("Error: {}", error),
        None => "Success".to_string(),
    };
    let container_sizes = data
        .container_sizes
        .as_deref()
        .unwrap_or_default()
        .join("; ");
    let surcharges = serde_json::to_string(&data.surcharges).unwrap_or_default();

    vec![
        escape_csv(&job.storage_key),
        escape_csv(data.service_address.as_deref().unwrap_or("")),
        escape_csv(data.vendor_name.as_deref().unwrap_or("")),
        escape_csv(data.invoice_date.as_deref().unwrap_or("")),
        escape_csv(data.due_date.as_deref().unwrap_or("")),
        escape_csv(data.service_period_start.as_deref().unwrap_or("")),
        escape_csv(data.service_period_end.as_deref().unwrap_or("")),
        escape_csv(&fmt_money(data.total_cost)),
        escape_csv(&container_sizes),
        escape_csv(data.service_frequency.as_deref().unwrap_or("")),
        escape_csv(&fmt_number(data.total_yards)),
        escape_csv(&fmt_number(data.compactor_hauls)),
        escape_csv(&fmt_number(data.tonnage)),
        escape_csv(&surcharges),
        escape_csv(&status),
    ]
}

fn line_item_cells(item: &ExtractedLineItem) -> Vec<String> {
    let score_json = item
        .score_details
        .as_ref()
        .map(Value::to_string)
        .unwrap_or_else(|| "{}".to_string());
    let flags = item.benchmark_flags.as_deref().unwrap_or_default().join("; ");

    vec![
        escape_csv(item.material_type.as_deref().unwrap_or("")),
        escape_csv(item.container_size.as_deref().unwrap_or("")),
        escape_csv(item.frequency.as_deref().unwrap_or("")),
        escape_csv(&fmt_number(item.pickup_count)),
        escape_csv(&fmt_number(item.total_yards)),
        escape_csv(&fmt_money(item.line_total_cost)),
        escape_csv(&fmt_cost_per_yard(item.line_total_cost, item.total_yards)),
        escape_csv(&fmt_overall_score(&item.score_details)),
        escape_csv(&score_json),
        escape_csv(&flags),
        escape_csv(item.line_description.as_deref().unwrap_or("")),
    ]
}

fn fmt_money(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

fn fmt_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn fmt_cost_per_yard(cost: Option<f64>, yards: Option<f64>) -> String {
    match (cost, yards) {
        (Some(cost), Some(yards)) if yards > 0.0 => format!("{:.2}", cost / yards),
        _ => String::new(),
    }
}

fn fmt_overall_score(score_details: &Option<Value>) -> String {
    score_details
        .as_ref()
        .and_then(|d| d.get("overall"))
        .and_then(|o| o.get("score"))
        .and_then(Value::as_f64)
        .map(|s| format!("{:.1}", s))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use brain_client::InvoiceSurcharge;

    fn completed_job(storage_key: &str, data: ExtractedInvoiceData) -> ProcessingJob {
        let mut job = ProcessingJob::new(storage_key);
        job.apply_status(JobStatus::Completed, None);
        job.data = Some(data);
        job
    }

    fn sample_line_item() -> ExtractedLineItem {
        ExtractedLineItem {
            material_type: Some("Trash".to_string()),
            container_size: Some("6yd".to_string()),
            frequency: Some("3x week".to_string()),
            pickup_count: Some(12.0),
            total_yards: Some(8.0),
            line_total_cost: Some(300.0),
            line_description: Some("MSW service".to_string()),
            score_details: serde_json::from_str(r#"{"overall":{"score":7.4}}"#).ok(),
            benchmark_flags: Some(vec![
                "High cost per yard".to_string(),
                "Fuel surcharge".to_string(),
            ]),
            ..Default::default()
        }
    }

    #[test]
    fn escape_passes_plain_values_through() {
        assert_eq!(escape_csv("Haul-Co"), "Haul-Co");
        assert_eq!(escape_csv(""), "");
    }

    #[test]
    fn escape_wraps_commas_quotes_and_newlines() {
        assert_eq!(escape_csv("12 Main St, Unit 4"), "\"12 Main St, Unit 4\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv("a\nb"), "\"a\nb\"");
    }

    #[test]
    fn header_row_has_all_columns() {
        let csv = bulk_results_csv(&[]);
        let header: Vec<&str> = csv.lines().next().unwrap().split(',').collect();
        assert_eq!(header.len(), 26);
        assert_eq!(header[0], "File Key");
        assert_eq!(header[14], "Status/Error");
        assert_eq!(header[15], "Line Item: Material");
        assert_eq!(header[25], "Line Item: Description");
    }

    #[test]
    fn skips_jobs_that_are_not_completed_with_data() {
        let pending = ProcessingJob::new("invoices/a.pdf");
        let mut failed = ProcessingJob::new("invoices/b.pdf");
        failed.apply_status(JobStatus::Failed, Some("bad scan".into()));
        let mut bare = ProcessingJob::new("invoices/c.pdf");
        bare.apply_status(JobStatus::Completed, None);

        let csv = bulk_results_csv(&[pending, failed, bare]);
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn invoice_without_line_items_gets_placeholder_columns() {
        let data = ExtractedInvoiceData {
            vendor_name: Some("Haul-Co".to_string()),
            total_cost: Some(1234.5),
            ..Default::default()
        };
        let csv = bulk_results_csv(&[completed_job("invoices/a.pdf", data)]);
        let row = csv.lines().nth(1).unwrap();

        // Comma-free test data, safe to split
        let cells: Vec<&str> = row.split(',').collect();
        assert_eq!(cells.len(), 26);
        assert_eq!(cells[0], "invoices/a.pdf");
        assert_eq!(cells[2], "Haul-Co");
        assert_eq!(cells[7], "1234.50");
        assert_eq!(cells[13], "[]");
        assert_eq!(cells[14], "Success");
        assert!(cells[15..].iter().all(|c| *c == "\"\""));
    }

    #[test]
    fn line_item_rows_group_under_one_invoice() {
        let data = ExtractedInvoiceData {
            vendor_name: Some("Haul-Co".to_string()),
            line_items: vec![sample_line_item(), sample_line_item()],
            ..Default::default()
        };
        let csv = bulk_results_csv(&[completed_job("invoices/a.pdf", data)]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);

        assert!(lines[1].starts_with("invoices/a.pdf,"));
        let placeholders = vec!["\"\""; 15].join(",");
        assert!(lines[2].starts_with(&placeholders));
        assert!(lines[2].ends_with("MSW service"));
    }

    #[test]
    fn line_item_cells_format_scores_and_costs() {
        let cells = line_item_cells(&sample_line_item());
        assert_eq!(cells[3], "12");
        assert_eq!(cells[4], "8");
        assert_eq!(cells[5], "300.00");
        assert_eq!(cells[6], "37.50");
        assert_eq!(cells[7], "7.4");
        assert_eq!(cells[8], "\"{\"\"overall\"\":{\"\"score\"\":7.4}}\"");
        assert_eq!(cells[9], "High cost per yard; Fuel surcharge");
    }

    #[test]
    fn line_item_without_cost_or_yards_renders_empty_cells() {
        let item = ExtractedLineItem::default();
        let cells = line_item_cells(&item);
        assert_eq!(cells[5], "");
        assert_eq!(cells[6], "");
        assert_eq!(cells[7], "");
        assert_eq!(cells[8], "{}");
    }

    #[test]
    fn zero_cost_is_a_real_value() {
        let item = ExtractedLineItem {
            line_total_cost: Some(0.0),
            ..Default::default()
        };
        assert_eq!(line_item_cells(&item)[5], "0.00");
    }

    #[test]
    fn zero_yards_never_divides() {
        let item = ExtractedLineItem {
            line_total_cost: Some(100.0),
            total_yards: Some(0.0),
            ..Default::default()
        };
        assert_eq!(line_item_cells(&item)[6], "");
    }

    #[test]
    fn extraction_error_lands_in_status_column() {
        let data = ExtractedInvoiceData {
            error: Some("unreadable pages".to_string()),
            ..Default::default()
        };
        let csv = bulk_results_csv(&[completed_job("invoices/a.pdf", data)]);
        assert!(csv.lines().nth(1).unwrap().contains("Error: unreadable pages"));
    }

    #[test]
    fn structured_cells_are_quoted_and_doubled() {
        let data = ExtractedInvoiceData {
            service_address: Some("12 Main St, Unit 4".to_string()),
            container_sizes: Some(vec!["4yd".to_string(), "6yd".to_string()]),
            surcharges: vec![InvoiceSurcharge {
                description: Some("Fuel".to_string()),
                amount: Some(42.0),
            }],
            ..Default::default()
        };
        let csv = bulk_results_csv(&[completed_job("invoices/a.pdf", data)]);
        let row = csv.lines().nth(1).unwrap();

        assert!(row.contains("\"12 Main St, Unit 4\""));
        assert!(row.contains("4yd; 6yd"));
        assert!(row.contains("\"[{\"\"description\"\":\"\"Fuel\"\",\"\"amount\"\":42.0}]\""));
    }
}
