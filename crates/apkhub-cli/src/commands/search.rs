//! Package search

use apkhub_repo::{Engine, SearchHit, SearchOptions};
use tokio_util::sync::CancellationToken;

use super::print_json;
use crate::display;
use crate::error::Result;

pub async fn run(
    engine: &Engine,
    query: &str,
    options: &SearchOptions,
    offline: bool,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let hits = if offline {
        engine.search_offline(query, options)?
    } else {
        engine.search(query, options, cancel).await?
    };

    if json {
        return print_json(&hits);
    }

    if hits.is_empty() {
        if query.is_empty() {
            println!("No packages found.");
        } else {
            println!("No packages found matching '{}'", query);
        }
        return Ok(());
    }

    println!("{:<36} {:<28} {:<12} {}", "PACKAGE", "NAME", "VERSION", "CATEGORY");
    println!("{}", "-".repeat(90));
    for hit in &hits {
        print_hit(hit);
    }
    println!();
    println!("{} found", display::pluralize(hits.len(), "package"));

    Ok(())
}

fn print_hit(hit: &SearchHit) {
    let package = &hit.package;
    let version = package
        .latest_version()
        .map(|(key, v)| if v.version.is_empty() { key } else { v.version.as_str() })
        .unwrap_or("-");
    let category = if package.category.is_empty() {
        "-"
    } else {
        package.category.as_str()
    };
    println!(
        "{:<36} {:<28} {:<12} {}",
        hit.package_id,
        package.display_name("en"),
        version,
        category
    );
}
