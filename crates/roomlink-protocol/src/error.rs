//! Error types for the codec layer.
//!
//! Every failure here is synchronous and final: retrying the same
//! encode/decode with the same input produces the same error. Once a
//! decode fails on a live stream, the stream position can no longer be
//! trusted, so callers above this layer tear the connection down.

/// Errors that can occur while encoding or decoding wire values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The input buffer does not have the exact size of the target type.
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A string payload does not fit in its fixed-length field.
    #[error("string too long: {actual} bytes exceeds fixed length {max}")]
    StringTooLong { max: usize, actual: usize },

    /// A fixed array was encoded with the wrong number of elements.
    #[error("array length mismatch: expected {expected} elements, got {actual}")]
    ArrayLengthMismatch { expected: usize, actual: usize },

    /// The bytes could not be turned back into a value (invalid UTF-8).
    #[error("decode failed: {0}")]
    DecodeError(String),

    /// An enum field carried a discriminant outside its declared set.
    #[error("invalid value {value} for {type_name}")]
    InvalidEnumValue { type_name: &'static str, value: u64 },
}
