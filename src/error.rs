//! Error type shared by buffers, work units and the dispatcher.
//!
//! Every failure is one of five kinds. Argument problems are reported on the
//! calling thread before any work is scheduled; anything that goes wrong
//! inside a work unit (including a panic) arrives as
//! [`Error::ExecutionFailure`] through whichever channel the unit was run on.

use crate::geom::Size;
use crate::limits::LimitExceeded;
use crate::pixel::BufferType;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// A failed buffer operation.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed or missing input, rejected before scheduling.
    #[error("{0}")]
    InvalidArgument(String),

    /// A region does not fit inside the buffer it addresses.
    #[error(
        "{op} (x={x}..{right}, y={y}..{bottom}) goes outside the buffer bounds (w={width}, h={height})"
    )]
    OutOfBounds {
        /// Operation that was attempted (`crop`, `set`, ...).
        op: &'static str,
        x: i64,
        y: i64,
        right: i64,
        bottom: i64,
        /// Width of the buffer.
        width: usize,
        /// Height of the buffer.
        height: usize,
    },

    /// An operand buffer has a different pixel type than the receiver.
    #[error("buffer type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: BufferType,
        actual: BufferType,
    },

    /// An operand buffer has different dimensions than the receiver.
    #[error("buffer size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: Size, actual: Size },

    /// The work unit or its delegated library call failed.
    #[error("{0}")]
    ExecutionFailure(String),
}

/// Discriminant of [`Error`], for comparing outcomes without messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    OutOfBounds,
    TypeMismatch,
    SizeMismatch,
    ExecutionFailure,
}

impl Error {
    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::OutOfBounds { .. } => ErrorKind::OutOfBounds,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            Error::ExecutionFailure(_) => ErrorKind::ExecutionFailure,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub(crate) fn execution(message: impl Into<String>) -> Self {
        Error::ExecutionFailure(message.into())
    }

    /// A limit violation noticed before scheduling.
    pub(crate) fn limit_before(err: LimitExceeded) -> Self {
        Error::InvalidArgument(err.to_string())
    }

    /// A limit violation noticed inside a running unit.
    pub(crate) fn limit_during(err: LimitExceeded) -> Self {
        Error::ExecutionFailure(err.to_string())
    }
}
