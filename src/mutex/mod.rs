//! Ticket-based async mutual exclusion
//!
//! This module provides the [`Mutex`] primitive, a FIFO lock that serializes
//! asynchronous critical sections in strict call order with a per-acquisition
//! timeout. It is a ticket lock, not a counting semaphore: acquisition order
//! is fixed the moment `lock()` or `acquire()` is *called*, before the
//! returned future is first polled.
//!
//! # Design
//!
//! The lock is an implicit chain of one-shot hand-off signals. The mutex
//! stores only the chain's tail: the signal the next acquirer must wait on.
//! Each `lock()` call atomically swaps a brand-new pending signal into the
//! tail and captures the previous one as its predecessor, then waits for the
//! predecessor to fire, racing it against a timer. Releasing fires the signal
//! this acquisition installed, unblocking whichever later call captured it.
//!
//! The chain head is created already-released, so the first acquisition
//! proceeds immediately. No slot is ever destroyed; the chain persists for
//! the mutex's lifetime.
//!
//! # Timeout hazard
//!
//! Timing out does not retract the slot a `lock()` call installed. The
//! timed-out caller never receives its [`ReleaseHandle`], so nothing can ever
//! fire that slot's signal: every acquirer queued behind it stalls until its
//! own timeout. This "fail open, never steal the lock" behavior is
//! intentional and preserved; there is no recovery path for the stuck slot.
//!
//! # Thread Safety
//!
//! The chain tail lives behind a `std::sync::Mutex` that is only held for the
//! synchronous swap, never across an `.await`. The type is `Send + Sync`;
//! wrap it in `Arc` to share across tasks.

use std::future::Future;
use std::mem;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time;
use tracing::trace;

use crate::types::LockError;

/// Default acquisition timeout: 5 minutes
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300_000);

/// Asynchronous FIFO mutex with per-acquisition timeout
///
/// Serializes critical sections in the exact order `lock()` / `acquire()`
/// were called. See the module docs for the chain design and the timeout
/// hazard.
#[derive(Debug)]
pub struct Mutex {
    /// Tail of the ticket chain: the signal the next acquirer waits on.
    ///
    /// Swapped, not extended, on every acquisition. The inner mutex is held
    /// only for the swap.
    chain: StdMutex<Arc<Notify>>,

    /// Maximum wait per acquisition
    timeout: Duration,
}

/// One-shot capability to release an acquisition
///
/// Returned by [`Mutex::lock`]. Calling [`release`](ReleaseHandle::release)
/// fires the signal this acquisition installed in the chain, unblocking the
/// next queued acquirer (if any).
///
/// Dropping the handle without calling `release` does **not** release: the
/// slot stays pending and every later acquirer stalls. [`Mutex::acquire`]
/// wraps the handle in a scope that guarantees release on every exit path;
/// use it unless you need to hold the lock across an explicit hand-off.
#[derive(Debug)]
pub struct ReleaseHandle {
    slot: Arc<Notify>,
}

impl ReleaseHandle {
    fn new(slot: Arc<Notify>) -> Self {
        Self { slot }
    }

    /// Release the acquisition, unblocking the next queued acquirer
    ///
    /// Consumes the handle; a release can only happen once.
    pub fn release(self) {
        self.slot.notify_one();
    }
}

/// Releases on drop. Used internally by `acquire` so the lock is freed on
/// every exit path, including panic and cancellation of the caller's future.
struct ReleaseOnDrop(Option<ReleaseHandle>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.release();
        }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutex {
    /// Create a new Mutex with the default 300 000 ms timeout
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a new Mutex with a custom acquisition timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        // Head of the chain: pre-notified so the first acquirer proceeds
        // immediately.
        let head = Arc::new(Notify::new());
        head.notify_one();

        Mutex {
            chain: StdMutex::new(head),
            timeout,
        }
    }

    /// The configured acquisition timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Acquire the mutex
    ///
    /// The chain swap happens synchronously, before this function returns,
    /// so acquisition order across concurrent callers is the order `lock`
    /// was called, not the order the returned futures were first polled.
    ///
    /// # Returns
    ///
    /// A future resolving to the [`ReleaseHandle`] for this acquisition once
    /// the predecessor has released.
    ///
    /// # Errors
    ///
    /// [`LockError::Timeout`] if the predecessor does not release within the
    /// configured window. The slot this call installed stays in the chain
    /// unreleased (see the module docs).
    pub fn lock(&self) -> impl Future<Output = Result<ReleaseHandle, LockError>> {
        // Install a fresh pending signal as the new tail and capture the
        // previous tail as this acquisition's predecessor.
        let slot = Arc::new(Notify::new());
        let predecessor = {
            let mut chain = self.chain.lock().unwrap_or_else(|e| e.into_inner());
            mem::replace(&mut *chain, Arc::clone(&slot))
        };
        let timeout = self.timeout;

        async move {
            match time::timeout(timeout, predecessor.notified()).await {
                Ok(()) => {
                    trace!("mutex acquired");
                    Ok(ReleaseHandle::new(slot))
                }
                Err(_elapsed) => {
                    trace!(timeout_ms = timeout.as_millis() as u64, "mutex timed out");
                    Err(LockError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
            }
        }
    }

    /// Acquire the mutex and run a function inside the critical section
    ///
    /// Equivalent to `lock()` followed by a scoped release: the acquisition
    /// is released exactly once on every exit path, whether `f`'s future
    /// returns normally, returns an error value, panics, or is cancelled
    /// after the lock was obtained.
    ///
    /// Like [`lock`](Mutex::lock), the chain swap happens at call time, so
    /// mixed `lock`/`acquire` callers enter their critical sections in call
    /// order.
    ///
    /// # Returns
    ///
    /// `f`'s output, unchanged.
    ///
    /// # Errors
    ///
    /// [`LockError::Timeout`] if the lock could not be acquired; `f` is not
    /// invoked in that case.
    pub fn acquire<F, Fut, T>(&self, f: F) -> impl Future<Output = Result<T, LockError>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let locked = self.lock();
        async move {
            let handle = locked.await?;
            let _guard = ReleaseOnDrop(Some(handle));
            Ok(f().await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_uncontended_lock_acquires_immediately() {
        let mutex = Mutex::new();
        let release = mutex.lock().await.expect("first lock should succeed");
        release.release();
    }

    #[tokio::test]
    async fn test_default_timeout_is_five_minutes() {
        let mutex = Mutex::new();
        assert_eq!(mutex.timeout(), Duration::from_millis(300_000));
    }

    #[tokio::test]
    async fn test_custom_timeout_accessor() {
        let mutex = Mutex::with_timeout(Duration::from_millis(50));
        assert_eq!(mutex.timeout(), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_release_unblocks_next_acquirer() {
        let mutex = Mutex::new();
        let first = mutex.lock().await.unwrap();
        let second = mutex.lock();
        first.release();
        let release = second.await.expect("second lock should succeed");
        release.release();
    }

    #[tokio::test]
    async fn test_acquire_returns_function_value() {
        let mutex = Mutex::new();
        let value = mutex.acquire(|| async { 42 }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_acquire_propagates_error_value_and_releases() {
        let mutex = Mutex::new();

        let result: Result<Result<(), &str>, LockError> =
            mutex.acquire(|| async { Err("application error") }).await;
        assert_eq!(result.unwrap(), Err("application error"));

        // The failed body must not leave the lock held.
        let value = mutex.acquire(|| async { "next" }).await.unwrap();
        assert_eq!(value, "next");
    }

    #[tokio::test]
    async fn test_acquire_releases_on_panic() {
        let mutex = Arc::new(Mutex::new());

        let m = Arc::clone(&mutex);
        let task = tokio::spawn(async move {
            m.acquire(|| async { panic!("boom") }).await.map(|()| ())
        });
        assert!(task.await.is_err());

        // The panicking body must not leave the lock held.
        let value = mutex.acquire(|| async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_times_out_when_never_released() {
        let mutex = Mutex::with_timeout(Duration::from_millis(50));
        let _held = mutex.lock().await.unwrap();

        let err = mutex.lock().await.expect_err("should time out");
        assert_eq!(err, LockError::Timeout { timeout_ms: 50 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_slot_stalls_later_acquirers() {
        let mutex = Mutex::with_timeout(Duration::from_millis(50));
        let held = mutex.lock().await.unwrap();

        // This acquisition times out and its slot is never released.
        let second = mutex.lock();
        // Queued behind the doomed slot.
        let third = mutex.lock();

        assert!(second.await.is_err());

        // Releasing the original holder only fires the *second* call's
        // predecessor; the third is stuck behind the second's dead slot and
        // times out as well.
        held.release();
        assert!(third.await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_sections_never_overlap() {
        let mutex = Arc::new(Mutex::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let mutex = Arc::clone(&mutex);
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            tasks.push(tokio::spawn(async move {
                mutex
                    .acquire(|| async {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_active.fetch_max(now, Ordering::SeqCst);
                        time::sleep(Duration::from_millis(1)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_ordering_matches_call_order() {
        let mutex = Arc::new(Mutex::new());
        let order = Arc::new(StdMutex::new(Vec::new()));

        let mut tasks = Vec::new();
        for i in 0..5usize {
            // The chain swap happens here, at call time, so submission order
            // is fixed before any task is spawned or polled.
            let locked = mutex.lock();
            let order = Arc::clone(&order);
            tasks.push(tokio::spawn(async move {
                let release = locked.await.unwrap();
                order.lock().unwrap().push(i);
                time::sleep(Duration::from_millis(1)).await;
                release.release();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}
