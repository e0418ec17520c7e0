//! Error types for client and pump operations.
//!
//! Application code only ever sees [`WsError::Disconnected`],
//! [`WsError::QueueFull`] and [`WsError::EncodeFailed`] from sends, and
//! [`WsError::InvalidConfig`] from building an endpoint. The dispatcher
//! logs [`WsError::DecodeFailed`] and keeps the connection open. Everything
//! else is produced inside the duplex pump, logged, and ends the affected
//! loop.

use std::time::Duration;

use thiserror::Error;

/// Shorthand used across the crate.
pub type WsResult<T> = Result<T, WsError>;

/// Errors that can occur while serving a client connection.
#[derive(Debug, Error)]
pub enum WsError {
    /// `send`/`shutdown` was called on a client that is already torn down.
    #[error("attempt to perform send/shutdown on a disconnected client")]
    Disconnected,

    /// The outbound queue is full (only returned by `try_send`).
    #[error("outbound queue is full")]
    QueueFull,

    /// The upgrade handshake was refused.
    #[error("cannot upgrade to WebSocket: {reason}")]
    NotWebSocketRequest {
        /// First handshake requirement the request failed.
        reason: String,
    },

    /// A frame write did not complete within the write deadline.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// No pong arrived within the read deadline.
    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// An inbound message exceeded the configured read limit.
    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge {
        /// Size of the offending message.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The inbound payload could not be decoded as an envelope.
    #[error("undecodable message: {0}")]
    DecodeFailed(String),

    /// An outbound payload could not be encoded.
    #[error("unencodable message: {0}")]
    EncodeFailed(String),

    /// Invalid pump or endpoint configuration.
    #[error("invalid pump configuration: {0}")]
    InvalidConfig(String),

    /// A pump loop panicked; the panic was contained.
    #[error("loop panicked: {0}")]
    Panicked(String),

    /// Protocol or IO failure on the socket.
    #[error("websocket transport: {0}")]
    Tungstenite(#[from] tungstenite::Error),
}

impl WsError {
    /// Handshake refusal with `reason`.
    pub fn not_websocket(reason: impl Into<String>) -> Self {
        Self::NotWebSocketRequest {
            reason: reason.into(),
        }
    }

    /// Configuration rejected with `reason`.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Peer went away without anything going wrong on our side: EOF, a
    /// second close, or a reset before the closing handshake.
    pub fn is_expected_close(&self) -> bool {
        match self {
            Self::Tungstenite(e) => matches!(
                e,
                tungstenite::Error::ConnectionClosed
                    | tungstenite::Error::AlreadyClosed
                    | tungstenite::Error::Protocol(
                        tungstenite::error::ProtocolError::ResetWithoutClosingHandshake
                    )
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_message() {
        let err = WsError::Disconnected;
        assert!(err.to_string().contains("disconnected"));
        assert!(!err.is_expected_close());
    }

    #[test]
    fn test_transport_errors_name_their_limit() {
        assert!(WsError::WriteTimeout(Duration::from_secs(5)).to_string().contains("5s"));
        let err = WsError::MessageTooLarge { size: 2048, limit: 1024 };
        assert_eq!(err.to_string(), "message of 2048 bytes exceeds the 1024 byte limit");
    }

    #[test]
    fn test_capacity_error_is_not_an_expected_close() {
        let err = WsError::Tungstenite(tungstenite::Error::Capacity(
            tungstenite::error::CapacityError::MessageTooLong { size: 2, max_size: 1 },
        ));
        assert!(!err.is_expected_close());
    }

    #[test]
    fn test_decode_error_carries_cause() {
        let err = WsError::DecodeFailed("expected value".to_string());
        assert!(err.to_string().contains("expected value"));
    }

    #[test]
    fn test_expected_close() {
        assert!(WsError::Tungstenite(tungstenite::Error::ConnectionClosed).is_expected_close());
        assert!(!WsError::ReadTimeout(Duration::from_secs(1)).is_expected_close());
    }

    #[test]
    fn test_handshake_refusal_carries_reason() {
        let err = WsError::not_websocket("upgrade requires GET");
        assert!(matches!(err, WsError::NotWebSocketRequest { .. }));
        assert_eq!(err.to_string(), "cannot upgrade to WebSocket: upgrade requires GET");
    }
}
