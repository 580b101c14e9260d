use harvest_core::CancelSignal;
use std::time::Duration;
use tokio::time::sleep;

/// `base_ms` plus a uniform random extra of up to `jitter_ms`.
pub fn jittered_delay(base_ms: u64, jitter_ms: u64) -> Duration {
    let jitter = if jitter_ms == 0 {
        0
    } else {
        fastrand::u64(0..=jitter_ms)
    };
    Duration::from_millis(base_ms + jitter)
}

/// Sleeps for `delay` unless cancelled first. Returns `false` on cancellation.
pub async fn pause(delay: Duration, cancel: &CancelSignal) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = sleep(delay) => !cancel.is_cancelled(),
        _ = cancel.cancelled() => false,
    }
}
