//! Scan loop status and control commands

use anyhow::Result;
use colored::Colorize;

use crate::client::{ApiClient, Publication, ScanControlResponse, ScanResult, ScanStatus};
use crate::output::{
    color_confidence, color_state, print_info, print_json, print_success, print_warning,
    OutputFormat,
};

pub(crate) const SCAN_PATH: &[&str] = &["api", "v1", "scan"];
pub(crate) const PAUSE_PATH: &[&str] = &["api", "v1", "scan", "pause"];
pub(crate) const RESUME_PATH: &[&str] = &["api", "v1", "scan", "resume"];

fn print_status(status: &ScanStatus) {
    println!("{}", "Scan Loop".bold());
    println!("  State:      {}", color_state(&status.state));
    println!("  Paused:     {}", status.paused);
    println!("  Ticks:      {}", status.tick_count);
    println!("  Generation: {}", status.generation);
    if let Some(error) = &status.fatal_error {
        println!("  Fatal:      {}", error.red());
    }
}

/// Show the scan loop state
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: ScanStatus = client.get(SCAN_PATH).await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => print_status(&status),
    }

    Ok(())
}

/// Show the most recently published result
pub async fn show_result(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let publication: Publication = client.get(&["api", "v1", "result"]).await?;

    if let OutputFormat::Json = format {
        return print_json(&publication);
    }

    match &publication.result {
        ScanResult::Empty => print_info("No product detected"),
        ScanResult::Detected {
            label,
            confidence,
            record,
            source,
        } => {
            println!("{}", record.display_name.bold());
            println!("  Price:      {}", record.price.green().bold());
            if let Some(category) = &record.category {
                println!("  Category:   {}", category);
            }
            println!("  Label:      {}", label);
            println!("  Confidence: {}", color_confidence(*confidence));
            if source == "fallback" {
                print_warning("Label has no catalog entry; showing the generic price");
            }
        }
    }
    println!(
        "  {}",
        format!(
            "generation {} at {}",
            publication.generation, publication.published_at
        )
        .dimmed()
    );

    Ok(())
}

/// Pause scanning
pub async fn pause(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response: ScanControlResponse = client.post(PAUSE_PATH).await?;
    report_control(&response, "Scanning paused", "Scanning was already paused", format)
}

/// Resume scanning
pub async fn resume(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response: ScanControlResponse = client.post(RESUME_PATH).await?;
    report_control(&response, "Scanning resumed", "Scanning was not paused", format)
}

fn report_control(
    response: &ScanControlResponse,
    changed: &str,
    unchanged: &str,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(response)?,
        OutputFormat::Table => {
            if response.changed {
                print_success(changed);
            } else {
                print_info(unchanged);
            }
            print_status(&response.status);
        }
    }
    Ok(())
}
