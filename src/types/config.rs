//! Configuration for batch processing
//!
//! Controls how many queued entries a single flush may dispatch and the
//! minimum spacing between successive flushes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration for a [`crate::queue::BatchQueue`]
///
/// `batch_size` caps how many entries one flush dispatches; the remainder
/// waits for the next window. `batch_ival_ms` is the floor on flush spacing,
/// not a per-entry timeout: the timer is armed when the first entry lands in
/// an idle queue and re-armed immediately after any flush that leaves a
/// remainder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum number of entries dispatched per flush (must be > 0)
    pub batch_size: usize,
    /// Minimum interval between flushes, in milliseconds (may be 0)
    pub batch_ival_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            batch_ival_ms: 100,
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig with custom values
    ///
    /// A `batch_size` of zero is invalid (a flush could never dispatch
    /// anything); it is replaced with the default and a warning is logged.
    /// A `batch_ival_ms` of zero is valid and means "flush on the next
    /// timer tick".
    pub fn new(batch_size: usize, batch_ival_ms: u64) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(
                batch_size,
                default = default.batch_size,
                "invalid batch_size, using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        Self {
            batch_size,
            batch_ival_ms,
        }
    }

    /// The flush interval as a [`Duration`]
    pub fn batch_ival(&self) -> Duration {
        Duration::from_millis(self.batch_ival_ms)
    }
}
