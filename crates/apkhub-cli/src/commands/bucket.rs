//! Bucket management commands

use apkhub_repo::{Engine, UpdateReport, UpdateStatus};
use console::style;
use tokio_util::sync::CancellationToken;

use super::print_json;
use crate::display;
use crate::error::{CliError, Result};
use crate::util::format_since;

/// Add a new bucket
pub fn add(engine: &Engine, name: &str, url: &str, json: bool) -> Result<()> {
    let bucket = engine.add_bucket(name, url)?;

    if json {
        return print_json(&bucket);
    }

    let kind = bucket
        .kind()
        .map(|k| k.to_string())
        .unwrap_or_else(|_| "Unknown".to_string());
    println!("\"{}\" has been added to your buckets ({})", bucket.name, kind);
    println!();
    println!("Run 'apkhub bucket update {}' to fetch its manifest", bucket.name);
    Ok(())
}

pub fn remove(engine: &Engine, name: &str, json: bool) -> Result<()> {
    let bucket = engine.remove_bucket(name)?;
    if json {
        return print_json(&bucket);
    }
    println!("\"{}\" has been removed", bucket.name);
    Ok(())
}

/// List configured buckets with their cache state
pub fn list(engine: &Engine, json: bool) -> Result<()> {
    let statuses = engine.bucket_statuses()?;

    if json {
        return print_json(&statuses);
    }

    if statuses.is_empty() {
        println!("No buckets configured.");
        println!();
        println!("Add one with: apkhub bucket add <name> <url>");
        return Ok(());
    }

    println!(
        "{:<16} {:<8} {:<6} {:<12} {}",
        "NAME", "ENABLED", "TYPE", "UPDATED", "URL"
    );
    println!("{}", "-".repeat(80));

    for status in &statuses {
        let bucket = &status.bucket;
        let kind = bucket.kind().map(|k| k.to_string()).unwrap_or_default();
        let mut updated = format_since(bucket.last_updated);
        if status.cached_at.is_some() && !status.cache_fresh {
            updated.push('*');
        }
        println!(
            "{:<16} {} {:<6} {:<12} {}",
            bucket.name,
            display::enabled(bucket.enabled, 8),
            kind,
            updated,
            bucket.url
        );
    }

    if statuses.iter().any(|s| s.cached_at.is_some() && !s.cache_fresh) {
        println!();
        println!("* cached manifest has expired; run 'apkhub update'");
    }

    Ok(())
}

pub fn set_enabled(engine: &Engine, name: &str, enabled: bool, json: bool) -> Result<()> {
    engine.set_enabled(name, enabled)?;

    if json {
        return print_json(&serde_json::json!({ "bucket": name, "enabled": enabled }));
    }

    let verb = if enabled { "enabled" } else { "disabled" };
    println!("\"{}\" has been {}", name, verb);
    Ok(())
}

/// Refresh one bucket or every enabled bucket
pub async fn update(
    engine: &Engine,
    name: Option<&str>,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let reports = match name {
        Some(name) => vec![engine.update_bucket(name, cancel).await?],
        None => engine.update_all(cancel).await?,
    };

    if json {
        print_json(&reports)?;
    } else {
        print_reports(&reports);
    }

    // A single named bucket that could not be refreshed is a failure even
    // when stale data was served.
    if name.is_some()
        && let Some(report) = reports.first()
        && report.status != UpdateStatus::Updated
    {
        let message = report
            .error
            .clone()
            .unwrap_or_else(|| format!("Bucket {} could not be refreshed", report.bucket));
        return Err(CliError::network(
            message,
            Some("Run 'apkhub health' to see which buckets are failing"),
        ));
    }

    if !json {
        println!();
        println!("{}", style("Update complete.").green());
    }
    Ok(())
}

fn print_reports(reports: &[UpdateReport]) {
    for report in reports {
        match report.status {
            UpdateStatus::Failed => println!(
                "{:<16} {}  {}",
                report.bucket,
                display::update_status(report.status),
                report.error.as_deref().unwrap_or_default()
            ),
            _ => println!(
                "{:<16} {}  {} ({} ms)",
                report.bucket,
                display::update_status(report.status),
                display::pluralize(report.packages, "package"),
                report.elapsed.as_millis()
            ),
        }
    }

    let stale = reports.iter().filter(|r| r.status == UpdateStatus::Stale).count();
    let failed = reports.iter().filter(|r| r.status == UpdateStatus::Failed).count();
    if stale + failed > 0 {
        display::warn(&format!(
            "{} of {} buckets could not be refreshed",
            stale + failed,
            reports.len()
        ));
    }
}
