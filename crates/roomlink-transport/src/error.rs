use roomlink_protocol::{CodecError, MessageType};

/// Errors that can occur in the transport layer.
///
/// Every variant except [`TransportError::NotConnected`] and
/// [`TransportError::Bind`] leaves the session torn down.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The TCP connection could not be established (refused, unreachable,
    /// or the connect timeout elapsed).
    #[error("failed to connect to {address}: {source}")]
    FailedToConnect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// `close` was called on a session that is already closed.
    #[error("not connected")]
    NotConnected,

    /// The session was used after it was closed or torn down.
    #[error("connection closed")]
    ConnectionClosed,

    /// A send or receive did not complete within the I/O timeout.
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// The socket failed after the connection was established.
    #[error("socket error: {0}")]
    Io(#[source] std::io::Error),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The server answered with a different message than the one awaited.
    #[error("unexpected message type {actual} (expected {expected})")]
    UnexpectedMessageType { expected: MessageType, actual: u8 },

    /// A probe socket could not be bound to the requested port.
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}
