//! Error types for core buffer operations.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by core buffer construction. Region accessors treat an
/// out-of-bounds rectangle as a caller bug and panic instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Buffer length does not match the declared dimensions.
    #[error("buffer length {got} does not match {width}x{height} ({expected} expected)")]
    BufferSizeMismatch {
        /// Image width
        width: u32,
        /// Image height
        height: u32,
        /// Required element count
        expected: usize,
        /// Provided element count
        got: usize,
    },
}
