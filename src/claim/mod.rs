pub mod error;
mod header;
pub mod manager;
pub mod payload;

use std::time::{SystemTime, UNIX_EPOCH};

// Re-export public types and functions
pub use error::ClaimError;
pub use manager::{ClaimManager, is_insecure_secret};
pub use payload::StreamClaim;

/// Development-only secret used when none is configured
pub const DEFAULT_STREAM_SECRET: &str = "change-me";

/// Default lifetime of a stream token in seconds
pub const DEFAULT_STREAM_TTL_SECS: u64 = 300;

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
