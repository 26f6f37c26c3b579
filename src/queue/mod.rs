//! Deadline/size-bounded batching queue
//!
//! This module provides the [`BatchQueue`] primitive, which buffers
//! asynchronous work items and releases them to execution in fixed-size
//! groups spaced by a minimum interval, preserving submission order.
//!
//! # Design
//!
//! Submitted jobs accumulate in a FIFO buffer. The first job that lands in an
//! idle queue arms a flush timer for `batch_ival_ms`. When the timer fires,
//! the oldest `batch_size` entries are dispatched concurrently; if a
//! remainder stays queued, a new timer is armed immediately, so a backlog
//! drains at one batch per interval without ever passing through the idle
//! state.
//!
//! # Architecture
//!
//! ```text
//! BatchQueue<T, E>
//!     └── Arc<Shared<T, E>>
//!         ├── BatchConfig            (batch_size, batch_ival_ms)
//!         └── Mutex<Inner<T, E>>
//!             ├── pending: VecDeque  (FIFO, never reordered)
//!             └── scheduler: Idle | Armed | Flushing
//! ```
//!
//! # Settlement contract
//!
//! The queue guarantees *when a job is invoked*, not when or whether it
//! settles. Each job receives a [`Responder`] and owes its submitter exactly
//! one `resolve` or `reject` call; a job that never settles leaves its
//! [`Ticket`] pending forever without affecting sibling entries.
//!
//! # Thread Safety
//!
//! The queue is cloneable and can be safely shared across async tasks; clones
//! share one buffer and scheduler. The inner state lives behind a
//! `std::sync::Mutex` that is only held for synchronous bookkeeping, never
//! across an `.await`, and never while dispatching jobs.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

use crate::types::BatchConfig;

/// Result channel handed to each queued job
///
/// The job owes its submitter exactly one settlement: [`resolve`](Self::resolve)
/// on success or [`reject`](Self::reject) on failure. Both consume the
/// responder, so settling twice is unrepresentable. Dropping the responder
/// without settling leaves the submitter's [`Ticket`] pending forever.
#[derive(Debug)]
pub struct Responder<T, E> {
    tx: oneshot::Sender<Result<T, E>>,
}

impl<T, E> Responder<T, E> {
    /// Settle the submitter's ticket with a success value
    pub fn resolve(self, value: T) {
        // The submitter may have dropped its ticket; nothing to deliver then.
        let _ = self.tx.send(Ok(value));
    }

    /// Settle the submitter's ticket with an error
    ///
    /// The error is passed through unchanged; the queue never interprets or
    /// wraps it.
    pub fn reject(self, error: E) {
        let _ = self.tx.send(Err(error));
    }
}

/// Future owed to a submitter, returned by [`BatchQueue::push`]
///
/// Settles only when the job's [`Responder`] is resolved or rejected. A
/// responder dropped without settling latches the ticket into a
/// pending-forever state rather than surfacing a channel error: the queue
/// promises invocation, not settlement.
#[derive(Debug)]
pub struct Ticket<T, E> {
    rx: Option<oneshot::Receiver<Result<T, E>>>,
}

impl<T, E> Future for Ticket<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(rx) = this.rx.as_mut() else {
            // Responder was dropped unsettled; latched pending forever.
            return Poll::Pending;
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_closed)) => {
                this.rx = None;
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Type-erased job: invoked with its responder, yields the future to run
type Job<T, E> = Box<dyn FnOnce(Responder<T, E>) -> BoxFuture<'static, ()> + Send>;

/// One submitted unit of work awaiting a batch slot
struct Entry<T, E> {
    job: Job<T, E>,
    tx: oneshot::Sender<Result<T, E>>,
}

/// Scheduler state for the flush timer
///
/// At most one flush is ever scheduled: `Armed` is entered only from `Idle`
/// (first push into an empty queue) or from `Flushing` (remainder left
/// behind). `Flushing` is only ever observed by the flush itself, which holds
/// the state lock for the whole slice-and-dispatch step.
enum SchedulerState {
    /// No pending entries, no timer
    Idle,
    /// Pending entries exist and a flush is scheduled
    Armed {
        /// When the scheduled flush fires
        deadline: Instant,
    },
    /// A flush is slicing and dispatching the current backlog
    Flushing,
}

struct Inner<T, E> {
    pending: VecDeque<Entry<T, E>>,
    scheduler: SchedulerState,
}

struct Shared<T, E> {
    config: BatchConfig,
    inner: StdMutex<Inner<T, E>>,
}

/// Deadline/size-bounded batching queue
///
/// Buffers submitted jobs and dispatches them oldest-first in groups of at
/// most `batch_size`, with at least `batch_ival_ms` between groups. Cloning
/// is cheap and clones share the same buffer and scheduler.
pub struct BatchQueue<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for BatchQueue<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> BatchQueue<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Create a new BatchQueue with the given configuration
    pub fn new(config: BatchConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                inner: StdMutex::new(Inner {
                    pending: VecDeque::new(),
                    scheduler: SchedulerState::Idle,
                }),
            }),
        }
    }

    /// The queue's configuration
    pub fn config(&self) -> &BatchConfig {
        &self.shared.config
    }

    /// Number of entries awaiting a batch slot
    pub fn len(&self) -> usize {
        self.shared.inner.lock().unwrap_or_else(|e| e.into_inner()).pending.len()
    }

    /// Whether no entries are awaiting a batch slot
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a flush timer is currently armed
    pub fn is_armed(&self) -> bool {
        self.deadline().is_some()
    }

    /// When the armed flush will fire, if one is scheduled
    pub fn deadline(&self) -> Option<Instant> {
        match self.shared.inner.lock().unwrap_or_else(|e| e.into_inner()).scheduler {
            SchedulerState::Armed { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Submit a job to the queue
    ///
    /// The job is appended to the pending buffer; if the queue was idle, a
    /// flush timer is armed for `batch_ival_ms`. `push` returns immediately
    /// and never suspends — the job is not invoked until its batch's timer
    /// fires. The buffer is unbounded: enqueueing cannot fail or exert
    /// back-pressure (a deliberate scope decision).
    ///
    /// # Returns
    ///
    /// A [`Ticket`] that settles when the job settles its [`Responder`].
    /// Jobs that never settle leave the ticket pending forever; the queue
    /// guarantees invocation order, not settlement.
    pub fn push<F, Fut>(&self, job: F) -> Ticket<T, E>
    where
        F: FnOnce(Responder<T, E>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let entry = Entry {
            job: Box::new(move |responder| job(responder).boxed()),
            tx,
        };

        {
            let mut inner = self.shared.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.pending.push_back(entry);
            trace!(pending = inner.pending.len(), "entry queued");
            if matches!(inner.scheduler, SchedulerState::Idle) {
                inner.scheduler = Shared::arm(&self.shared);
            }
        }

        Ticket { rx: Some(rx) }
    }
}

impl<T, E> Shared<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Arm the flush timer, returning the new scheduler state
    ///
    /// Called with the state lock held, from `push` (queue was idle) or from
    /// `flush` (remainder left behind); both paths uphold the one-timer
    /// invariant by only arming when no timer exists.
    fn arm(shared: &Arc<Self>) -> SchedulerState {
        let ival = shared.config.batch_ival();
        let deadline = Instant::now() + ival;
        tokio::spawn({
            let shared = Arc::clone(shared);
            async move {
                time::sleep(ival).await;
                Shared::flush(&shared);
            }
        });
        trace!(ival_ms = shared.config.batch_ival_ms, "flush timer armed");
        SchedulerState::Armed { deadline }
    }

    /// Timer-triggered flush: slice off the oldest batch and dispatch it
    ///
    /// Runs synchronously under the state lock up to the dispatch step. The
    /// batch is spawned only after the lock is dropped, so job bodies can
    /// push follow-up work without deadlocking.
    fn flush(shared: &Arc<Self>) {
        let batch = {
            let mut inner = shared.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.scheduler = SchedulerState::Flushing;

            // A stray timer can fire after the backlog was already drained.
            if inner.pending.is_empty() {
                inner.scheduler = SchedulerState::Idle;
                return;
            }

            let count = inner.pending.len().min(shared.config.batch_size);
            let batch: Vec<Entry<T, E>> = inner.pending.drain(..count).collect();

            debug!(
                dispatched = batch.len(),
                remaining = inner.pending.len(),
                "flushing batch"
            );

            // Remainder stays queued in original order and re-arms without
            // passing through Idle.
            inner.scheduler = if inner.pending.is_empty() {
                SchedulerState::Idle
            } else {
                Shared::arm(shared)
            };

            batch
        };

        // Oldest-first invocation; batch members run concurrently and their
        // completion order is unspecified.
        for entry in batch {
            let responder = Responder { tx: entry.tx };
            tokio::spawn((entry.job)(responder));
        }
    }
}
