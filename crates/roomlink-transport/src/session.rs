//! A framed TCP session with the match-making server.
//!
//! No length prefixes are needed on this wire: the size of every message
//! follows from its type. Sending writes one contiguous frame (header and
//! body); receiving reads the fixed reply header, then exactly the body
//! size of the awaited reply type.
//!
//! Any failure after the socket is up (I/O error, timeout, undecodable or
//! unexpected frame) drops the socket. Once that happens the stream
//! position can no longer be trusted, so the session is unusable and every
//! further send/receive reports [`TransportError::ConnectionClosed`].

use std::net::SocketAddr;
use std::time::Duration;

use roomlink_protocol::{
    decode, ErrorCode, Outbound, Reply, ReplyHeader, SessionKey, WireType,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::TransportError;

/// Outcome of a reply exchange that reached the server.
///
/// `Ok(body)` when the server reported success, `Err(code)` when it
/// rejected the request. Transport failures are reported separately by the
/// outer `Result` of [`TransportSession::receive`].
pub type ReplyOutcome<R> = Result<R, ErrorCode>;

/// Owns the single TCP connection to the server.
pub struct TransportSession {
    stream: Option<TcpStream>,
    peer_addr: SocketAddr,
    io_timeout: Duration,
}

impl TransportSession {
    /// Opens a connection to `host:port`.
    ///
    /// # Errors
    /// Returns [`TransportError::FailedToConnect`] if the address does not
    /// resolve, the connection is refused, or `connect_timeout` elapses.
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let address = format!("{host}:{port}");
        let failed = |source| TransportError::FailedToConnect {
            address: address.clone(),
            source,
        };

        let stream = match tokio::time::timeout(
            connect_timeout,
            TcpStream::connect((host, port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(failed(e)),
            Err(_) => {
                return Err(failed(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timed out",
                )));
            }
        };

        stream.set_nodelay(true).map_err(failed)?;
        let peer_addr = stream.peer_addr().map_err(failed)?;
        tracing::debug!(%peer_addr, "transport connected");

        Ok(Self {
            stream: Some(stream),
            peer_addr,
            io_timeout,
        })
    }

    /// Returns `true` until the session is closed or torn down.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// The server's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Sends one request or notice as a single write.
    pub async fn send(
        &mut self,
        message: &Outbound,
        session_key: SessionKey,
    ) -> Result<(), TransportError> {
        let result = self.send_inner(message, session_key).await;
        if result.is_err() {
            self.teardown();
        }
        result
    }

    async fn send_inner(
        &mut self,
        message: &Outbound,
        session_key: SessionKey,
    ) -> Result<(), TransportError> {
        let io_timeout = self.io_timeout;
        let stream =
            self.stream.as_mut().ok_or(TransportError::ConnectionClosed)?;
        let frame = message.encode_frame(session_key)?;

        match tokio::time::timeout(io_timeout, stream.write_all(&frame)).await
        {
            Ok(Ok(())) => {
                tracing::trace!(
                    message_type = %message.message_type(),
                    bytes = frame.len(),
                    "frame sent"
                );
                Ok(())
            }
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => Err(TransportError::Timeout("send")),
        }
    }

    /// Receives exactly one reply of type `R`.
    ///
    /// The body is read off the wire even when the server reports an error,
    /// so the stream stays aligned on the next frame; it is only decoded
    /// when the error code is Ok.
    pub async fn receive<R: Reply>(
        &mut self,
    ) -> Result<ReplyOutcome<R>, TransportError> {
        let result = self.receive_inner::<R>().await;
        if result.is_err() {
            self.teardown();
        }
        result
    }

    async fn receive_inner<R: Reply>(
        &mut self,
    ) -> Result<ReplyOutcome<R>, TransportError> {
        let raw_header = self.read_exact(ReplyHeader::SIZE).await?;
        let header: ReplyHeader = decode(&raw_header)?;

        let expected = R::MESSAGE_TYPE;
        if header.message_type != expected as u8 {
            return Err(TransportError::UnexpectedMessageType {
                expected,
                actual: header.message_type,
            });
        }

        let body = self.read_exact(R::SIZE).await?;
        if !header.error_code.is_ok() {
            tracing::debug!(
                message_type = %expected,
                error_code = %header.error_code,
                "server rejected request"
            );
            return Ok(Err(header.error_code));
        }

        tracing::trace!(message_type = %expected, "reply received");
        Ok(Ok(decode(&body)?))
    }

    async fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        let io_timeout = self.io_timeout;
        let stream =
            self.stream.as_mut().ok_or(TransportError::ConnectionClosed)?;
        let mut buf = vec![0u8; len];
        if len == 0 {
            return Ok(buf);
        }
        match tokio::time::timeout(io_timeout, stream.read_exact(&mut buf)).await
        {
            Ok(Ok(_)) => Ok(buf),
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => Err(TransportError::Timeout("receive")),
        }
    }

    /// Shuts the connection down.
    ///
    /// # Errors
    /// Returns [`TransportError::NotConnected`] if the session is already
    /// closed.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        let mut stream =
            self.stream.take().ok_or(TransportError::NotConnected)?;
        if let Err(e) = stream.shutdown().await {
            tracing::debug!(error = %e, "shutdown after close failed");
        }
        tracing::debug!(peer_addr = %self.peer_addr, "transport closed");
        Ok(())
    }

    fn teardown(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!(
                peer_addr = %self.peer_addr,
                "transport torn down after failure"
            );
        }
    }
}
