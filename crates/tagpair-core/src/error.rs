//! Error types for tagpair-core.
//!
//! This module defines every error the pairing flow can report. Errors are
//! never thrown across the event loop: each one is handed to the completion
//! callback of the operation that failed, and the coordinator stays live for
//! subsequent events.
//!
//! # Error Recovery
//!
//! The core does not retry anything on its own. The table below is a guide
//! for callers deciding what to do with a failure.
//!
//! | Error Type | Strategy | Rationale |
//! |------------|----------|-----------|
//! | [`Error::Decoding`] | Re-read the tag | Partial read or foreign tag |
//! | [`Error::Schema`] | Do not retry | Tag written by another application version |
//! | [`Error::MissingPairingKey`] | Do not retry | Tag was never paired |
//! | [`Error::Encoding`] | Do not retry | Application value cannot be serialized |
//! | [`Error::ConnectFailed`] | Retry on next discovery | Handle stays registered at `FailedToConnect` |
//! | [`Error::AlreadyInProgress`] | Wait for the pending result | A connect is already in flight |
//! | [`Error::TransportUnavailable`] | Wait for radio power | The radio reported itself unusable |
//! | [`Error::RadioTransport`] | Retry once, then check the adapter | Request could not be issued |
//! | [`Error::TagTransport`] | Retry the tag operation | Tag moved away or session ended |

use thiserror::Error;

use tagpair_types::{CodecError, ConnectionState, PeripheralId};

/// Errors that can occur while pairing with and connecting to peripherals.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Tag payload bytes do not parse as a record.
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// Tag record parsed, but its value does not match the expected shape.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Decoded record has no pairing key.
    #[error("Tag record has no pairing key")]
    MissingPairingKey,

    /// Application value cannot be serialized.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Transport-level connect failure.
    #[error("Connection to {peripheral} failed: {reason}")]
    ConnectFailed {
        /// The peripheral that failed to connect.
        peripheral: PeripheralId,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// A connect attempt for this peripheral is already in flight.
    #[error("Connection to {peripheral} already in progress")]
    AlreadyInProgress {
        /// The peripheral with the pending connect.
        peripheral: PeripheralId,
    },

    /// Operation requested while the radio is unavailable.
    #[error("Radio transport unavailable")]
    TransportUnavailable,

    /// Peripheral is not in the coordinator registry.
    #[error("Peripheral not found: {0}")]
    PeripheralNotFound(PeripheralId),

    /// Operation is not legal from the peripheral's current state.
    #[error("Invalid transition for {peripheral}: {from} -> {to}")]
    InvalidTransition {
        /// The peripheral concerned.
        peripheral: PeripheralId,
        /// Current state.
        from: ConnectionState,
        /// Requested state.
        to: ConnectionState,
    },

    /// Radio transport refused or failed to issue a request.
    #[error("Radio transport error: {0}")]
    RadioTransport(String),

    /// Tag transport failure (session, detection or write).
    #[error("Tag transport error: {0}")]
    TagTransport(String),

    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Bluetooth adapter not available or powered off.
    AdapterUnavailable,
    /// Peripheral is out of range or no longer advertising.
    OutOfRange,
    /// Connection attempt timed out in the transport.
    Timeout,
    /// Peripheral rejected the connection.
    Rejected,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterUnavailable => write!(f, "Bluetooth adapter unavailable"),
            Self::OutOfRange => write!(f, "peripheral out of range"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::Rejected => write!(f, "connection rejected by peripheral"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error {
    /// Create a connection failure with structured reason.
    pub fn connect_failed(peripheral: PeripheralId, reason: ConnectionFailureReason) -> Self {
        Self::ConnectFailed { peripheral, reason }
    }

    /// Create an already-in-progress error.
    pub fn already_in_progress(peripheral: PeripheralId) -> Self {
        Self::AlreadyInProgress { peripheral }
    }

    /// Create an invalid transition error.
    pub fn invalid_transition(
        peripheral: PeripheralId,
        from: ConnectionState,
        to: ConnectionState,
    ) -> Self {
        Self::InvalidTransition {
            peripheral,
            from,
            to,
        }
    }

    /// Create a radio transport error.
    pub fn radio_transport(message: impl Into<String>) -> Self {
        Self::RadioTransport(message.into())
    }

    /// Create a tag transport error.
    pub fn tag_transport(message: impl Into<String>) -> Self {
        Self::TagTransport(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Encoding(e) => Error::Encoding(e.to_string()),
            CodecError::Decoding(e) => Error::Decoding(e.to_string()),
            CodecError::Schema(e) => Error::Schema(e.to_string()),
            CodecError::MissingPairingKey => Error::MissingPairingKey,
            // Handle future CodecError variants (non_exhaustive)
            _ => Error::Decoding(err.to_string()),
        }
    }
}

/// Result type alias using tagpair-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connect_failed(PeripheralId::from("p-1"), ConnectionFailureReason::Timeout);
        assert_eq!(err.to_string(), "Connection to p-1 failed: connection timed out");

        let err = Error::already_in_progress(PeripheralId::from("p-1"));
        assert!(err.to_string().contains("already in progress"));

        let err = Error::invalid_transition(
            PeripheralId::from("p-1"),
            ConnectionState::Disconnecting,
            ConnectionState::Connecting,
        );
        assert_eq!(
            err.to_string(),
            "Invalid transition for p-1: disconnecting -> connecting"
        );

        assert_eq!(Error::MissingPairingKey.to_string(), "Tag record has no pairing key");
    }

    #[test]
    fn test_codec_error_conversion() {
        let err: Error = CodecError::MissingPairingKey.into();
        assert!(matches!(err, Error::MissingPairingKey));

        let codec = tagpair_types::decode::<serde_json::Value>(b"not json").unwrap_err();
        let err: Error = codec.into();
        assert!(matches!(err, Error::Decoding(_)));

        let codec =
            tagpair_types::decode::<u32>(br#"{"value":"not a number"}"#).unwrap_err();
        let err: Error = codec.into();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_btleplug_error_conversion() {
        fn _assert_from_impl<T: From<btleplug::Error>>() {}
        _assert_from_impl::<Error>();
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no tag");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
