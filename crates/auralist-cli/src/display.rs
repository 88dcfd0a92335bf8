//! Terminal output for the Auralist CLI

use auralist_index::CrawlStats;
use auralist_sync::SyncStats;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Print the counters of one crawl
pub fn print_crawl_stats(stats: &CrawlStats) {
    println!();
    println!("{}", style("Index Statistics:").bold().underlined());
    println!("  Files seen: {}", style(stats.files_seen).cyan());
    println!("  Files indexed: {}", style(stats.files_indexed).green());
    println!("  Already known: {}", style(stats.files_known).yellow());
    println!("  Filtered by extension: {}", style(stats.files_filtered).dim());
    println!("  Entries skipped: {}", style(stats.entries_skipped).dim());
    if stats.paths_skipped > 0 {
        println!(
            "  Non-UTF-8 paths skipped: {}",
            style(stats.paths_skipped).red()
        );
    }
    println!(
        "  Bytes indexed: {}",
        style(format_bytes(stats.bytes_indexed)).green()
    );
    println!("  Batches: {}", style(stats.batches).cyan());
    println!(
        "  Duration: {}",
        style(format_duration(stats.duration)).blue()
    );
}

/// Print the counters of one or more sync passes
pub fn print_sync_stats(stats: &SyncStats) {
    println!();
    println!("{}", style("Sync Statistics:").bold().underlined());
    println!("  Records processed: {}", style(stats.records_seen).cyan());
    println!("  Already identical: {}", style(stats.skipped).yellow());
    println!("  Empty files created: {}", style(stats.zero_created).green());
    println!("  Cloned from old root: {}", style(stats.cloned).green());
    println!(
        "  Uploaded: {} ({} chunked)",
        style(stats.uploaded).green(),
        stats.chunked
    );
    println!(
        "  Left pending: {}",
        if stats.failed > 0 {
            style(stats.failed).red()
        } else {
            style(stats.failed).green()
        }
    );
    println!(
        "  Bytes uploaded: {}",
        style(format_bytes(stats.bytes_uploaded)).green()
    );
    println!(
        "  Duration: {}",
        style(format_duration(stats.duration)).blue()
    );
}

/// Format bytes in human-readable format
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Display a success message with proper formatting
pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green().bold(), style(message).green());
}

/// Display a warning message with proper formatting
pub fn display_warning(message: &str) {
    println!("{} {}", style("⚠").yellow().bold(), style(message).yellow());
}

/// Display an info message with proper formatting
pub fn display_info(message: &str) {
    println!("{} {}", style("ℹ").blue().bold(), style(message).blue());
}

/// Spinner shown while a long step runs
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.blue} {msg}") {
        pb.set_style(spinner_style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
