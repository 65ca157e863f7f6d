//! Wall-clock helper for event and snapshot timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall time in milliseconds since the Unix epoch.
///
/// Timestamps are observability data (log rows, `last_event`, `updated_at`),
/// not ordering authority; ordering comes from the per-session serialization
/// in the engine.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
