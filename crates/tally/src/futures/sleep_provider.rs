use core::{future::Future, time::Duration};

/// Abstracts over how to wait between allocation attempts in async contexts.
///
/// This keeps [`AsyncAllocator`](crate::AsyncAllocator) generic over the
/// runtime it is driven by.
pub trait SleepProvider {
    /// The returned future is `Send` so allocations can run on multi-threaded
    /// executors.
    fn sleep_for(dur: Duration) -> impl Future<Output = ()> + Send;
}
