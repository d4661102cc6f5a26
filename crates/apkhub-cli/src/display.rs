//! Display formatting for CLI output
//!
//! Color choices for bucket health and update results. Padding is applied
//! before styling so ANSI codes don't break column alignment.

use apkhub_repo::{HealthStatus, UpdateStatus};
use console::{StyledObject, style};

/// "1 package", "3 packages"
pub fn pluralize(count: usize, singular: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}s", count, singular)
    }
}

/// Health status padded to `width` and colored by severity
pub fn health_status(status: HealthStatus, width: usize) -> StyledObject<String> {
    let text = format!("{:<width$}", status.to_string(), width = width);
    match status {
        HealthStatus::Healthy => style(text).green(),
        HealthStatus::Degraded => style(text).yellow(),
        HealthStatus::Unhealthy => style(text).red().bold(),
        HealthStatus::Unknown => style(text).dim(),
    }
}

pub fn update_status(status: UpdateStatus) -> StyledObject<&'static str> {
    match status {
        UpdateStatus::Updated => style("updated").green(),
        UpdateStatus::Stale => style("stale").yellow(),
        UpdateStatus::Failed => style("failed").red(),
    }
}

pub fn enabled(enabled: bool, width: usize) -> StyledObject<String> {
    if enabled {
        style(format!("{:<width$}", "yes", width = width)).green()
    } else {
        style(format!("{:<width$}", "no", width = width)).dim()
    }
}

/// Print a warning line to stderr
pub fn warn(message: &str) {
    eprintln!("{} {}", style("warning:").yellow().bold(), message);
}
