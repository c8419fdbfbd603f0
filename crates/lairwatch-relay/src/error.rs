//! Error types for the relay core.
//!
//! Transport faults on the watch path never surface here: they are retried
//! or skipped inside the relay loop. What remains is configuration that
//! would make the relay misbehave if accepted.

/// Errors raised while assembling relay components.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A configuration value is out of range.
    #[error("invalid relay config: {0}")]
    InvalidConfig(String),
}
