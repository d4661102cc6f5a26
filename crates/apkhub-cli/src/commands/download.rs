//! Verified package download

use apkhub_repo::{DownloadOptions, Engine};
use console::style;
use tokio_util::sync::CancellationToken;

use super::print_json;
use crate::error::Result;
use crate::util::format_size;

pub async fn run(
    engine: &Engine,
    package_id: &str,
    version: Option<&str>,
    options: &DownloadOptions,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let result = engine.download(package_id, version, options, cancel).await?;

    if json {
        return print_json(&result);
    }

    if result.reused {
        println!(
            "{} {} (already downloaded)",
            style("Verified").green(),
            result.path.display()
        );
    } else {
        println!("{} {}", style("Downloaded").green(), result.path.display());
    }
    println!("  Size:   {}", format_size(result.size));
    println!("  SHA256: {}", result.sha256);

    Ok(())
}
