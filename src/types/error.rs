//! Error types for the coordination primitives
//!
//! This module defines the errors the library itself can produce. The set is
//! deliberately small: both primitives are thin controllers that never
//! transform or wrap caller errors. Application errors flow through
//! [`crate::mutex::Mutex::acquire`] and [`crate::queue::Responder::reject`]
//! unchanged; the only error minted here is the lock timeout.

use thiserror::Error;

/// Error type for mutex acquisition
///
/// Represents the single failure mode of [`crate::mutex::Mutex`]: the
/// acquisition timer fired before the predecessor released.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The lock could not be acquired within the configured window.
    ///
    /// This is recoverable for the caller (retry, abandon), but note that a
    /// timed-out acquisition leaves its own slot in the ticket chain
    /// unreleased: every acquirer queued behind it will stall and eventually
    /// time out as well. Retrying does not clear the stuck slot.
    #[error("lock acquisition timed out after {timeout_ms} ms")]
    Timeout {
        /// The configured timeout that elapsed, in milliseconds
        timeout_ms: u64,
    },
}
