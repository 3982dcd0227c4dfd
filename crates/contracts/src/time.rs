//! Wall-clock helper.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds (f64).
///
/// Falls back to 0.0 if the system clock reports a time before the
/// epoch; every consumer treats 0.0 as "expired long ago".
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
