//! Error types for the tracker.

use thiserror::Error;

/// Errors reported to the immediate caller of the tracker.
///
/// None of these are fatal to a session: the offending frame is rejected
/// before any tracker state is touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid detection at index {index}: {reason}")]
    InvalidDetection { index: usize, reason: String },

    #[error("Frame shape mismatch: expected {expected:?}, got {got:?}")]
    FrameShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

/// Result type for tracker operations.
pub type Result<T> = std::result::Result<T, Error>;
