//! Error types for the tag payload codec.

use thiserror::Error;

/// Errors that can occur when encoding or decoding a tag payload.
///
/// This error type is platform-agnostic and does not include
/// transport errors (those belong in tagpair-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The application value could not be serialized.
    #[error("Failed to encode tag payload: {0}")]
    Encoding(#[source] serde_json::Error),

    /// The payload bytes are not a structurally valid record.
    #[error("Failed to decode tag payload: {0}")]
    Decoding(#[source] serde_json::Error),

    /// The record parsed, but its value slot does not match the expected shape.
    #[error("Tag value does not match the expected schema: {0}")]
    Schema(#[source] serde_json::Error),

    /// The record carries no pairing key where one is required.
    #[error("Tag record has no pairing key")]
    MissingPairingKey,
}

/// Result type alias using tagpair-types' CodecError type.
pub type CodecResult<T> = std::result::Result<T, CodecError>;
