//! Wall-clock helpers.

use reel_engine::Timestamp;

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_ms() -> Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as Timestamp
}
