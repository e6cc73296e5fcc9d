//! Core types shared by every Pandolabo layer.
//!
//! This crate provides:
//! - The error taxonomy (`ErrorKind`, `Error`) with context chaining
//! - `ErrorCollector` for aggregating failures from batched work
//! - Engine-wide constants for waits and timeline semaphores

pub mod error;

pub use error::{Error, ErrorCollector, ErrorKind, Result};

/// Engine-wide constants
pub mod constants {
    /// Timeout value meaning "block until the condition holds".
    pub const WAIT_FOREVER: u64 = u64::MAX;
    /// Signal value past which a timeline semaphore is recreated.
    pub const DEFAULT_TIMELINE_RESET_THRESHOLD: u64 = 1_000_000;
    /// Upper bound on frames recorded ahead of the presentation engine.
    pub const MAX_FRAMES_IN_FLIGHT: usize = 3;
}
