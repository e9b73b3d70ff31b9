//! Command line tools for the WasteWise Brain.
//!
//! Covers the day-to-day audit workflow: upload invoices, run bulk
//! extraction to CSV, compare contracts, inspect history and dashboards,
//! and ask the audit assistant.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use brain_client::{BrainClient, ChatRequest, CompareContractsRequest, ContractDataInput};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use invoice_batch::{
    bulk_results_csv, count_flags, BatchEvent, BulkProcessor, PollConfig, StatusWatcher,
    DEFAULT_EXPORT_FILENAME,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "wastewise")]
#[command(about = "WasteWise invoice and contract tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the Brain backend is reachable
    Health,

    /// Upload invoice files and print their storage keys
    Upload { files: Vec<PathBuf> },

    /// Run bulk extraction for uploaded invoices and export CSV
    Process {
        /// Storage keys returned by upload
        keys: Vec<String>,
        /// Read additional storage keys from a file, one per line
        #[arg(long)]
        from_file: Option<PathBuf>,
        /// Output CSV path
        #[arg(long)]
        out: Option<PathBuf>,
        /// Seconds between status checks
        #[arg(long, default_value_t = 5)]
        interval: u64,
        /// Give up after this many seconds
        #[arg(long, default_value_t = 1800)]
        max_wait: u64,
    },

    /// Check processing status for result ids
    Status { result_ids: Vec<String> },

    /// List extracted invoices
    Summaries,

    /// Show stored line items for one invoice
    LineItems { storage_key: String },

    /// Compare two contract text files
    Compare {
        file1: PathBuf,
        file2: PathBuf,
        /// Attribute the comparison to a user id
        #[arg(long)]
        user: Option<String>,
    },

    /// Show comparison history
    History {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Show one stored comparison
    Show { record_id: String },

    /// Show aggregate comparison metrics
    Dashboard,

    /// Rank red flags across recent comparisons
    Flags {
        /// How many comparisons to scan
        #[arg(long, default_value_t = 200)]
        limit: u32,
    },

    /// Scan structured contract terms (a JSON file) for red flags
    Scan { file: PathBuf },

    /// Ask the audit assistant a question
    Ask {
        prompt: String,
        /// Stream the answer as it is generated
        #[arg(long)]
        stream: bool,
    },

    /// Watch invoice processing status changes
    Watch {
        /// Seconds between checks
        #[arg(long, default_value_t = 10)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,brain_client=debug,invoice_batch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let client = BrainClient::from_env().context(
        "Brain client not configured; set WASTEWISE_API_URL (and optionally WASTEWISE_API_KEY)",
    )?;

    match cli.command {
        Commands::Health => cmd_health(&client).await,
        Commands::Upload { files } => cmd_upload(&client, files).await,
        Commands::Process {
            keys,
            from_file,
            out,
            interval,
            max_wait,
        } => cmd_process(&client, keys, from_file, out, interval, max_wait).await,
        Commands::Status { result_ids } => cmd_status(&client, result_ids).await,
        Commands::Summaries => cmd_summaries(&client).await,
        Commands::LineItems { storage_key } => cmd_line_items(&client, &storage_key).await,
        Commands::Compare { file1, file2, user } => cmd_compare(&client, file1, file2, user).await,
        Commands::History { limit, offset } => cmd_history(&client, limit, offset).await,
        Commands::Show { record_id } => cmd_show(&client, &record_id).await,
        Commands::Dashboard => cmd_dashboard(&client).await,
        Commands::Flags { limit } => cmd_flags(&client, limit).await,
        Commands::Scan { file } => cmd_scan(&client, file).await,
        Commands::Ask { prompt, stream } => cmd_ask(&client, prompt, stream).await,
        Commands::Watch { interval } => cmd_watch(&client, interval).await,
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_health(client: &BrainClient) -> Result<()> {
    let health = client.check_health().await?;
    println!("{} ({})", health.status, client.base_url());
    Ok(())
}

async fn cmd_upload(client: &BrainClient, files: Vec<PathBuf>) -> Result<()> {
    if files.is_empty() {
        bail!("no files given");
    }
    let mut parts = Vec::with_capacity(files.len());
    for path in &files {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        parts.push((display_name(path), bytes));
    }
    let resp = client.upload_invoices(parts).await?;
    for key in &resp.storage_keys {
        println!("{}", key);
    }
    for error in &resp.errors {
        eprintln!("upload error: {}", error);
    }
    Ok(())
}

async fn cmd_process(
    client: &BrainClient,
    mut keys: Vec<String>,
    from_file: Option<PathBuf>,
    out: Option<PathBuf>,
    interval: u64,
    max_wait: u64,
) -> Result<()> {
    if let Some(path) = from_file {
        let listing = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        keys.extend(
            listing
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from),
        );
    }
    if keys.is_empty() {
        bail!("no storage keys given; pass them as arguments or via --from-file");
    }

    let config = PollConfig {
        interval: Duration::from_secs(interval),
        max_elapsed: Duration::from_secs(max_wait),
        ..Default::default()
    };
    let mut processor = BulkProcessor::with_config(client.clone(), config);

    let mut events = processor.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                BatchEvent::JobUpdated { storage_key, status } => {
                    println!("  {} -> {}", storage_key, status);
                }
                BatchEvent::PollFailed { attempt, error } => {
                    println!("  status check failed (attempt {}): {}", attempt, error);
                }
                BatchEvent::BatchCompleted { summary } => {
                    println!(
                        "Bulk processing complete: {}/{} completed, {} failed, {} not found",
                        summary.completed, summary.total, summary.failed, summary.not_found
                    );
                }
            }
        }
    });

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    println!("Processing {} invoices...", keys.len());
    let result = processor.process(&keys, cancel).await;
    printer.abort();

    println!();
    for job in processor.jobs() {
        let detail = match (&job.error, &job.data) {
            (Some(error), _) => format!("  ({})", error),
            (None, Some(data)) => {
                let vendor = data.vendor_name.as_deref().unwrap_or("unknown vendor");
                match data.total_cost {
                    Some(cost) => format!("  ({}, ${:.2})", vendor, cost),
                    None => format!("  ({})", vendor),
                }
            }
            _ => String::new(),
        };
        println!("{:<10} {}{}", job.status.as_str(), job.storage_key, detail);
    }

    let summary = result?;

    if processor.jobs().iter().any(|job| job.data.is_some()) {
        let path = out.unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_FILENAME));
        std::fs::write(&path, bulk_results_csv(processor.jobs()))
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("\nWrote {}", path.display());
    } else {
        println!("\nNo completed results to export.");
    }

    println!(
        "Done in {:.1}s: {}/{} completed, {} failed, {} not found",
        summary.elapsed_ms as f64 / 1000.0,
        summary.completed,
        summary.total,
        summary.failed,
        summary.not_found
    );
    Ok(())
}

async fn cmd_status(client: &BrainClient, result_ids: Vec<String>) -> Result<()> {
    if result_ids.is_empty() {
        bail!("no result ids given");
    }
    let resp = client.check_processing_status(result_ids.clone()).await?;
    for id in &result_ids {
        let status = resp.statuses.get(id).map(String::as_str).unwrap_or("unknown");
        match resp.statuses.get(&format!("{}_error", id)) {
            Some(error) => println!("{:<12} {}  ({})", status, id, error),
            None => println!("{:<12} {}", status, id),
        }
    }
    Ok(())
}

async fn cmd_summaries(client: &BrainClient) -> Result<()> {
    let listing = client.get_invoice_summaries().await?;
    if listing.results.is_empty() {
        println!("No extracted invoices.");
        return Ok(());
    }
    for row in &listing.results {
        println!(
            "{:<12} {}  {}  {}",
            row.processing_status.as_deref().unwrap_or("unknown"),
            row.storage_key,
            row.vendor_name.as_deref().unwrap_or("?"),
            row.total_cost.map(|c| format!("${:.2}", c)).unwrap_or_default()
        );
    }
    Ok(())
}

async fn cmd_line_items(client: &BrainClient, storage_key: &str) -> Result<()> {
    let listing = client.get_invoice_line_items(storage_key).await?;
    if listing.items.is_empty() {
        println!("No line items stored for {}", storage_key);
        return Ok(());
    }
    for item in &listing.items {
        let total = item.total.map(|t| format!("${:.2}", t)).unwrap_or_default();
        println!("{:<10} {}", total, item.description);
    }
    Ok(())
}

async fn cmd_compare(
    client: &BrainClient,
    file1: PathBuf,
    file2: PathBuf,
    user: Option<String>,
) -> Result<()> {
    let contract_1_text = std::fs::read_to_string(&file1)
        .with_context(|| format!("failed to read {}", file1.display()))?;
    let contract_2_text = std::fs::read_to_string(&file2)
        .with_context(|| format!("failed to read {}", file2.display()))?;

    let resp = client
        .compare_contracts(CompareContractsRequest {
            contract_1_text,
            contract_2_text,
            file1_name: display_name(&file1),
            file2_name: display_name(&file2),
            user_id: user,
        })
        .await?;

    println!("{}", resp.comparison_summary);
    if !resp.red_flags.is_empty() {
        println!("\nRed flags:");
        for flag in &resp.red_flags {
            println!("  - {}", flag);
        }
    }
    let mut categories: Vec<_> = resp.key_differences.iter().collect();
    categories.sort_by(|a, b| a.0.cmp(b.0));
    for (category, differences) in categories {
        println!("\n{}:", category);
        for difference in differences {
            println!("  - {}", difference);
        }
    }
    if let Some(id) = &resp.stored_record_id {
        println!("\nSaved as {}", id);
    }
    Ok(())
}

async fn cmd_history(client: &BrainClient, limit: u32, offset: u32) -> Result<()> {
    let page = client.get_history(limit, offset).await?;
    println!("{} comparisons total", page.total_count);
    for item in &page.history {
        println!(
            "{}  {}  {} vs {}  ({} flags)",
            item.created_at.format("%Y-%m-%d"),
            item.id,
            item.file1_name.as_deref().unwrap_or("?"),
            item.file2_name.as_deref().unwrap_or("?"),
            item.red_flags.as_deref().unwrap_or_default().len()
        );
    }
    Ok(())
}

async fn cmd_show(client: &BrainClient, record_id: &str) -> Result<()> {
    let record = client.get_comparison_details(record_id).await?;
    println!(
        "{}  {} vs {}",
        record.created_at.format("%Y-%m-%d %H:%M"),
        record.file1_name.as_deref().unwrap_or("?"),
        record.file2_name.as_deref().unwrap_or("?")
    );
    if let Some(summary) = &record.comparison_summary {
        println!("\n{}", summary);
    }
    if let Some(flags) = &record.red_flags {
        if !flags.is_empty() {
            println!("\nRed flags:");
            for flag in flags {
                println!("  - {}", flag);
            }
        }
    }
    if let Some(items) = &record.line_items {
        println!("\n{} analysis line items", items.len());
    }
    Ok(())
}

async fn cmd_dashboard(client: &BrainClient) -> Result<()> {
    let metrics = client.get_dashboard_summary().await?;
    println!("Total comparisons:      {}", metrics.total_comparisons);
    println!(
        "With red flags:         {} ({:.1}%)",
        metrics.comparisons_with_flags, metrics.percentage_with_flags
    );
    println!("Total red flags:        {}", metrics.total_red_flags);
    println!(
        "Average per comparison: {:.2}",
        metrics.average_flags_per_comparison
    );
    if !metrics.top_users.is_empty() {
        println!("\nTop users:");
        for user in &metrics.top_users {
            println!("  {:<4} {}", user.comparison_count, user.user_id);
        }
    }
    Ok(())
}

async fn cmd_flags(client: &BrainClient, limit: u32) -> Result<()> {
    let page = client.get_history(limit, 0).await?;
    let scanned = page.history.len();
    let ranked = count_flags(
        page.history
            .into_iter()
            .flat_map(|item| item.red_flags.unwrap_or_default()),
    );
    if ranked.is_empty() {
        println!("No red flags across the last {} comparisons.", scanned);
        return Ok(());
    }
    println!("Red flags across the last {} comparisons:", scanned);
    for entry in &ranked {
        println!("  {:<4} {}", entry.count, entry.flag);
    }
    Ok(())
}

async fn cmd_scan(client: &BrainClient, file: PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let data: ContractDataInput = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid contract data", file.display()))?;

    let resp = client.scan_red_flags(&data).await?;
    if resp.red_flags.is_empty() {
        println!("No red flags found.");
        return Ok(());
    }
    for flag in &resp.red_flags {
        println!("[{}] {}: {}", flag.severity, flag.field, flag.message);
    }
    Ok(())
}

async fn cmd_ask(client: &BrainClient, prompt: String, stream: bool) -> Result<()> {
    if stream {
        let mut chunks = client.chat_query_stream(ChatRequest::message(prompt)).await?;
        while let Some(chunk) = chunks.next().await {
            print!("{}", chunk?);
            std::io::stdout().flush()?;
        }
        println!();
    } else {
        let resp = client.chat_query(ChatRequest::message(prompt)).await?;
        println!("{}", resp.response);
    }
    Ok(())
}

async fn cmd_watch(client: &BrainClient, interval: u64) -> Result<()> {
    let (watcher, mut changes) =
        StatusWatcher::spawn(client.clone(), Duration::from_secs(interval));
    println!("Watching invoice processing status (ctrl-c to stop)...");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            change = changes.recv() => {
                let Some(change) = change else { break };
                match change.previous {
                    Some(previous) => {
                        println!("{}: {} -> {}", change.storage_key, previous, change.status);
                    }
                    None => println!("{}: {}", change.storage_key, change.status),
                }
            }
        }
    }
    watcher.shutdown().await;
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("file")
        .to_string()
}
