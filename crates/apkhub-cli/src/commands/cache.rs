//! Manifest cache maintenance

use apkhub_repo::Engine;

use super::print_json;
use crate::error::Result;
use crate::util::{format_since, format_size};

pub fn stats(engine: &Engine, json: bool) -> Result<()> {
    let stats = engine.cache().stats()?;

    if json {
        return print_json(&stats);
    }

    println!("Cache directory: {}", engine.cache().dir().display());
    println!("Entries:         {}", stats.entries);
    println!("Expired:         {}", stats.expired_count);
    println!("Total size:      {}", format_size(stats.total_size));
    println!("Oldest entry:    {}", format_since(stats.oldest));
    println!("Newest entry:    {}", format_since(stats.newest));
    println!("Hit rate:        {:.1}%", stats.hit_rate * 100.0);
    Ok(())
}

/// Remove expired entries
pub fn clean(engine: &Engine, json: bool) -> Result<()> {
    let removed = engine.cache().clean_expired()?;
    if json {
        return print_json(&serde_json::json!({ "removed": removed }));
    }
    println!("Removed {} (expired)", entries(removed));
    Ok(())
}

pub fn clear(engine: &Engine, json: bool) -> Result<()> {
    let removed = engine.cache().clear()?;
    if json {
        return print_json(&serde_json::json!({ "removed": removed }));
    }
    println!("Removed {} from {}", entries(removed), engine.cache().dir().display());
    Ok(())
}

fn entries(count: usize) -> String {
    if count == 1 {
        "1 entry".to_string()
    } else {
        format!("{} entries", count)
    }
}
