//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of rows
pub fn print_table<T: Tabled>(rows: &[T]) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format confidence as percentage
pub fn format_confidence(confidence: f32) -> String {
    format!("{:.0}%", confidence * 100.0)
}

/// Color a scan loop state
pub fn color_state(state: &str) -> String {
    match state {
        "running" => state.green().to_string(),
        "loading" | "idle" => state.blue().to_string(),
        "suspended" => state.yellow().to_string(),
        "stopped" => state.red().to_string(),
        _ => state.to_string(),
    }
}

/// Color confidence based on value
pub fn color_confidence(confidence: f32) -> String {
    let formatted = format_confidence(confidence);
    if confidence >= 0.95 {
        formatted.green().to_string()
    } else {
        formatted.yellow().to_string()
    }
}
