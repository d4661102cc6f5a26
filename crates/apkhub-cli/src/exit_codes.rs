//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Configuration error - unknown, duplicate or disabled bucket, bad URL
pub const CONFIG_ERROR: i32 = 2;

/// Network error - bucket unreachable and no cached data to fall back on
pub const NETWORK_ERROR: i32 = 3;

/// Integrity error - checksum, size or signature verification failed
pub const INTEGRITY_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Package or version not found in the merged index
pub const NOT_FOUND: i32 = 6;

/// Interrupted by the user (128 + SIGINT)
pub const INTERRUPTED: i32 = 130;
