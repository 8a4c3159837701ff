//! Error types shared by the sample buffers and the accumulation pipeline

use crate::buffer::SampleKind;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Bad size, percentage or parameter
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation between buffers holding different element kinds
    #[error("Type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        expected: SampleKind,
        found: SampleKind,
    },

    /// Operation between buffers with different channel counts
    #[error("Shape mismatch: expected {expected} channels, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    /// Element access outside of `[0, len)`
    #[error("Offset {offset} out of range for {len} elements")]
    OutOfRange { offset: usize, len: usize },

    /// Lifecycle call that doesn't fit the current pipeline state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The receiver rejected a command or returned a short read
    #[error("Hardware failure: {0}")]
    HardwareFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
