//! Millisecond conversions used by the scheduler.
//!
//! Offsets and progress values arrive from the service as integer
//! milliseconds while timers take [`Duration`]s; these helpers convert
//! between the two with explicit saturation instead of casts.

use std::time::Duration;

/// Extension trait for safe Duration conversions.
pub trait DurationExt {
    /// Convert duration to milliseconds as u64, saturating at `u64::MAX`.
    fn as_millis_u64(&self) -> u64;
}

impl DurationExt for Duration {
    fn as_millis_u64(&self) -> u64 {
        u64::try_from(self.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Delay from `now_ms` until `target_ms`.
///
/// Targets already in the past yield [`Duration::ZERO`] so a late line fires
/// immediately instead of producing a negative timer.
#[must_use]
pub const fn delay_until(target_ms: u64, now_ms: u64) -> Duration {
    Duration::from_millis(target_ms.saturating_sub(now_ms))
}
