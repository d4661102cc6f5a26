//! Package details

use apkhub_repo::Engine;
use console::style;
use tokio_util::sync::CancellationToken;

use super::print_json;
use crate::error::Result;
use crate::util::{format_size, truncate_hash};

pub async fn run(
    engine: &Engine,
    package_id: &str,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let package = engine.package(package_id, cancel).await?;

    if json {
        return print_json(&package);
    }

    println!("{}", style(package.display_name("en")).bold());
    println!("Package:     {}", package.package_id);
    if !package.category.is_empty() {
        println!("Category:    {}", package.category);
    }
    if let Some(description) = package.description.get("en") {
        println!("Description: {}", description);
    }
    if let Some((key, _)) = package.latest_version() {
        println!("Latest:      {}", key);
    }

    println!();
    println!(
        "{:<20} {:<12} {:<10} {:<8} {:<12} {}",
        "VERSION KEY", "VERSION", "CODE", "MIN SDK", "SIZE", "SHA256"
    );
    println!("{}", "-".repeat(86));

    for (key, version) in package.versions_by_code() {
        let size = if version.size > 0 {
            format_size(version.size)
        } else {
            "-".to_string()
        };
        let sha = if version.sha256.is_empty() {
            "-"
        } else {
            truncate_hash(&version.sha256, 16)
        };
        println!(
            "{:<20} {:<12} {:<10} {:<8} {:<12} {}",
            key, version.version, version.version_code, version.min_sdk, size, sha
        );
    }

    Ok(())
}
