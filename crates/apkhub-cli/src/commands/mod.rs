//! CLI command implementations

pub mod bucket;
pub mod cache;
pub mod download;
pub mod health;
pub mod info;
pub mod search;

use serde::Serialize;

use crate::error::Result;

/// Print a value as pretty JSON on stdout
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
