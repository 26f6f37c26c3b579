//! Batchlock Coordination Library
//! # Overview
//!
//! This library provides two independent async coordination primitives: a
//! FIFO mutex for serializing critical sections and a batching queue that
//! releases buffered work in fixed-size, interval-spaced groups.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (BatchConfig, LockError)
//! - [`mutex`] - Ticket-based async mutual exclusion:
//!   - [`mutex::Mutex`] - FIFO lock with per-acquisition timeout
//!   - [`mutex::ReleaseHandle`] - One-shot release capability
//! - [`queue`] - Deadline/size-bounded batching:
//!   - [`queue::BatchQueue`] - FIFO work buffer with timer-driven flushes
//!   - [`queue::Responder`] - Result channel handed to each work item
//!   - [`queue::Ticket`] - Future owed to the submitter
//!
//! # Ordering Guarantees
//!
//! Both primitives order work on a single dimension: submission order.
//!
//! - **Mutex**: critical sections begin in the exact order `lock()` /
//!   `acquire()` were called, never reordered.
//! - **BatchQueue**: entries are invoked oldest-first across successive
//!   flushes; entries within one batch run concurrently with no guarantee
//!   on completion order.
//!
//! Neither primitive depends on the other; a consumer may compose them
//! (e.g. guard a batch's execution with a mutex) but the library does not
//! impose this.

// Module declarations
pub mod mutex;
pub mod queue;
pub mod types;

pub use mutex::{Mutex, ReleaseHandle};
pub use queue::{BatchQueue, Responder, Ticket};
pub use types::{BatchConfig, LockError};
