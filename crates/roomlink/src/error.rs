//! Unified error type for the Roomlink client.

use roomlink_nat::NatError;
use roomlink_protocol::{CodecError, ErrorCode, MessageType, TransportProtocol};
use roomlink_transport::TransportError;

/// Which family an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input, rejected before any I/O.
    Validation,
    /// The byte stream could not be trusted any more.
    Protocol,
    /// The server answered with a non-Ok error code.
    Server,
    /// Connecting, sending or receiving failed.
    Transport,
    /// Gateway discovery, port mapping or reachability failed.
    NatTraversal,
    /// The call is not allowed in the client's current state.
    State,
}

/// Every error a [`ProtocolClient`](crate::ProtocolClient) call can return.
///
/// Errors that tear the session down leave the client disconnected and not
/// hosting; see [`ClientError::is_continuable`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid argument: {0}")]
    Validation(String),

    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    #[error("already hosting a room")]
    AlreadyHostingRoom,

    #[error("not hosting a room")]
    NotHostingRoom,

    /// The server rejected a request. The connection stays usable.
    #[error("server rejected {message_type} request: {code}")]
    Request {
        message_type: MessageType,
        code: ErrorCode,
    },

    #[error("failed to connect to {address}: {source}")]
    FailedToConnect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Socket failure or timeout on an established connection.
    #[error("system error: {0}")]
    System(#[source] TransportError),

    /// Undecodable or unexpected bytes from the server.
    #[error("protocol error: {0}")]
    Protocol(#[source] TransportError),

    #[error("connection closed")]
    ConnectionClosed,

    /// The server could not reach this host, even after port mapping.
    #[error("host not reachable from the server on {protocol} port {port}")]
    NotReachable {
        protocol: TransportProtocol,
        port: u16,
    },

    #[error(transparent)]
    NatTraversal(#[from] NatError),

    /// The local probe endpoint could not be opened.
    #[error("cannot probe port {port}: {source}")]
    ProbeUnavailable {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::AlreadyConnected
            | Self::NotConnected
            | Self::AlreadyHostingRoom
            | Self::NotHostingRoom => ErrorKind::State,
            Self::Request { .. } => ErrorKind::Server,
            Self::FailedToConnect { .. }
            | Self::System(_)
            | Self::ConnectionClosed => ErrorKind::Transport,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::NotReachable { .. }
            | Self::NatTraversal(_)
            | Self::ProbeUnavailable { .. } => ErrorKind::NatTraversal,
        }
    }

    /// Returns `true` if the client is still usable after this error.
    ///
    /// Non-continuable errors mean the session is gone and the caller has
    /// to connect again.
    pub fn is_continuable(&self) -> bool {
        !matches!(
            self,
            Self::FailedToConnect { .. }
                | Self::System(_)
                | Self::Protocol(_)
                | Self::ConnectionClosed
        )
    }

    /// The server's error code, for [`ClientError::Request`].
    pub fn server_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Request { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<TransportError> for ClientError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::FailedToConnect { address, source } => {
                Self::FailedToConnect { address, source }
            }
            TransportError::NotConnected => Self::NotConnected,
            TransportError::ConnectionClosed => Self::ConnectionClosed,
            TransportError::Bind { port, source } => {
                Self::ProbeUnavailable { port, source }
            }
            e @ (TransportError::Codec(_)
            | TransportError::UnexpectedMessageType { .. }) => Self::Protocol(e),
            e @ (TransportError::Timeout(_) | TransportError::Io(_)) => Self::System(e),
        }
    }
}

/// Field-level encoding failures surface as validation errors.
impl From<CodecError> for ClientError {
    fn from(error: CodecError) -> Self {
        Self::Validation(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_error() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused")
    }

    #[test]
    fn test_failed_to_connect_is_not_continuable() {
        let err: ClientError = TransportError::FailedToConnect {
            address: "127.0.0.1:1".into(),
            source: io_error(),
        }
        .into();
        assert!(matches!(err, ClientError::FailedToConnect { .. }));
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(!err.is_continuable());
        assert!(err.to_string().contains("127.0.0.1:1"));
    }

    #[test]
    fn test_socket_failures_are_fatal_system_errors() {
        let err: ClientError = TransportError::Timeout("receive").into();
        assert!(matches!(err, ClientError::System(_)));
        assert!(!err.is_continuable());

        let err: ClientError = TransportError::Io(io_error()).into();
        assert!(matches!(err, ClientError::System(_)));
    }

    #[test]
    fn test_codec_failures_are_protocol_errors() {
        let err: ClientError = TransportError::UnexpectedMessageType {
            expected: MessageType::ListRoom,
            actual: 99,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(!err.is_continuable());
    }

    #[test]
    fn test_connection_closed_is_not_continuable() {
        let err: ClientError = TransportError::ConnectionClosed.into();
        assert!(matches!(err, ClientError::ConnectionClosed));
        assert!(!err.is_continuable());
    }

    #[test]
    fn test_bind_failure_is_probe_unavailable() {
        let err: ClientError = TransportError::Bind {
            port: 53000,
            source: io_error(),
        }
        .into();
        assert!(matches!(err, ClientError::ProbeUnavailable { port: 53000, .. }));
        assert!(err.is_continuable());
        assert_eq!(err.kind(), ErrorKind::NatTraversal);
    }

    #[test]
    fn test_server_rejection_is_continuable() {
        let err = ClientError::Request {
            message_type: MessageType::JoinRoom,
            code: ErrorCode::RoomFull,
        };
        assert_eq!(err.kind(), ErrorKind::Server);
        assert!(err.is_continuable());
        assert_eq!(err.server_code(), Some(ErrorCode::RoomFull));
    }

    #[test]
    fn test_state_and_nat_errors_are_continuable() {
        for err in [
            ClientError::AlreadyHostingRoom,
            ClientError::NotHostingRoom,
            ClientError::NotConnected,
            ClientError::AlreadyConnected,
            ClientError::NotReachable {
                protocol: TransportProtocol::Udp,
                port: 53000,
            },
            ClientError::NatTraversal(NatError::NoGateway),
            ClientError::invalid("bad"),
        ] {
            assert!(err.is_continuable(), "{err} should be continuable");
            assert_eq!(err.server_code(), None);
        }
    }

    #[test]
    fn test_codec_error_becomes_validation() {
        let err: ClientError = CodecError::StringTooLong { max: 16, actual: 17 }.into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
