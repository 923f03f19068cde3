//! Fault-injection helpers.

use std::time::Duration;

/// Poll interval used by [`block_while`] when none is configured.
pub const DEFAULT_BLOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Sleep in `interval` steps for as long as `condition` holds.
pub async fn block_while(interval: Duration, mut condition: impl FnMut() -> bool) {
    while condition() {
        tokio::time::sleep(interval).await;
    }
}

/// Sleep for `ms` milliseconds; returns immediately for 0.
pub async fn delay(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test(start_paused = true)]
    async fn block_while_polls_until_released() {
        let blocked = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&blocked);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(55)).await;
            flag.store(false, Ordering::SeqCst);
        });

        let start = tokio::time::Instant::now();
        block_while(DEFAULT_BLOCK_POLL_INTERVAL, || blocked.load(Ordering::SeqCst)).await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(55));
        assert!(waited <= Duration::from_millis(70));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_does_not_sleep() {
        let start = tokio::time::Instant::now();
        delay(0).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        delay(25).await;
        assert_eq!(start.elapsed(), Duration::from_millis(25));
    }
}
