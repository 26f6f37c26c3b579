//! Types module
//!
//! Contains core data structures used throughout the library.
//! This module organizes types into logical submodules:
//! - `config`: Batching configuration
//! - `error`: Error types for lock acquisition

pub mod config;
pub mod error;

pub use config::BatchConfig;
pub use error::LockError;
