use crate::SleepProvider;
use core::time::Duration;

/// A [`SleepProvider`] backed by Tokio's timer.
///
/// The default choice for applications built on Tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleep;

impl SleepProvider for TokioSleep {
    async fn sleep_for(dur: Duration) {
        tokio::time::sleep(dur).await;
    }
}

/// A [`SleepProvider`] that only yields to the Tokio scheduler.
///
/// Retries as soon as the runtime polls the task again. Lower latency than
/// [`TokioSleep`] when few callers race, but many racing callers end up
/// re-reading the counter in a tight loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioYield;

impl SleepProvider for TokioYield {
    async fn sleep_for(_dur: Duration) {
        tokio::task::yield_now().await;
    }
}
