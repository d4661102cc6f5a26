//! Bucket health report
//!
//! Health is tracked in memory, so each invocation probes every enabled
//! bucket first and reports what that probe observed.

use apkhub_repo::{Engine, RepoError};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::print_json;
use crate::display;
use crate::error::Result;
use crate::util::format_since;

#[derive(Serialize)]
struct HealthRow<'a> {
    bucket: &'a str,
    enabled: bool,
    #[serde(flatten)]
    health: &'a apkhub_repo::BucketHealth,
}

pub async fn run(engine: &Engine, json: bool, cancel: &CancellationToken) -> Result<()> {
    match engine.update_all(cancel).await {
        // Every bucket failing is exactly what this report is for
        Ok(_) | Err(RepoError::AllBucketsFailed { .. }) | Err(RepoError::NoEnabledBuckets) => {}
        Err(e) => return Err(e.into()),
    }

    let buckets = engine.buckets();
    let health = engine.health();

    if json {
        let rows: Vec<HealthRow<'_>> = buckets
            .iter()
            .zip(&health)
            .map(|(bucket, (_, h))| HealthRow {
                bucket: &bucket.name,
                enabled: bucket.enabled,
                health: h,
            })
            .collect();
        return print_json(&rows);
    }

    if buckets.is_empty() {
        println!("No buckets configured.");
        return Ok(());
    }

    println!(
        "{:<16} {:<10} {:<10} {:<12} {}",
        "BUCKET", "STATUS", "RESPONSE", "LAST OK", "LAST ERROR"
    );
    println!("{}", "-".repeat(80));

    for (bucket, (_, h)) in buckets.iter().zip(&health) {
        let status = if bucket.enabled {
            display::health_status(h.status, 10).to_string()
        } else {
            format!("{:<10}", "disabled")
        };
        let response = h
            .response_time_ms
            .map(|ms| format!("{} ms", ms))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16} {} {:<10} {:<12} {}",
            bucket.name,
            status,
            response,
            format_since(h.last_success),
            h.last_error.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
