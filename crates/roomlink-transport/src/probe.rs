//! Local echo endpoint used while the server tests reachability.
//!
//! The server connects (TCP) or sends a datagram (UDP) to the public port
//! announced in a connection test; the prober answers with the same bytes
//! so the server can confirm the round trip.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use roomlink_protocol::TransportProtocol;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::TransportError;

/// Largest probe payload echoed back.
pub const PROBE_BUFFER_SIZE: usize = 1024;

/// A background echo task bound to one local port.
///
/// Dropping the prober aborts the task; [`ConnectivityProber::stop`] shuts
/// it down cleanly and waits for it.
pub struct ConnectivityProber {
    protocol: TransportProtocol,
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ConnectivityProber {
    /// Binds `0.0.0.0:port` and starts echoing.
    ///
    /// For UDP only datagrams from `expected_peer` are answered. A TCP
    /// prober accepts one connection and echoes one payload.
    ///
    /// # Errors
    /// Returns [`TransportError::Bind`] if the port cannot be bound.
    pub async fn start(
        protocol: TransportProtocol,
        port: u16,
        expected_peer: IpAddr,
    ) -> Result<Self, TransportError> {
        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let bind_err = |source| TransportError::Bind { port, source };
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let (local_addr, task) = match protocol {
            TransportProtocol::Tcp => {
                let listener =
                    TcpListener::bind(bind_addr).await.map_err(bind_err)?;
                let local_addr = listener.local_addr().map_err(bind_err)?;
                (local_addr, tokio::spawn(echo_tcp(listener, shutdown_rx)))
            }
            TransportProtocol::Udp => {
                let socket = UdpSocket::bind(bind_addr).await.map_err(bind_err)?;
                let local_addr = socket.local_addr().map_err(bind_err)?;
                let task =
                    tokio::spawn(echo_udp(socket, expected_peer, shutdown_rx));
                (local_addr, task)
            }
        };

        tracing::debug!(%protocol, %local_addr, %expected_peer, "prober started");
        Ok(Self {
            protocol,
            local_addr,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// The bound address (useful when started on port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether this prober echoes TCP or UDP.
    pub fn protocol(&self) -> TransportProtocol {
        self.protocol
    }

    /// Signals the echo task to finish and waits for it.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "prober task ended abnormally");
            }
        }
        tracing::debug!(local_addr = %self.local_addr, "prober stopped");
    }
}

impl Drop for ConnectivityProber {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn echo_tcp(listener: TcpListener, mut shutdown: oneshot::Receiver<()>) {
    let (mut stream, peer) = tokio::select! {
        _ = &mut shutdown => return,
        accepted = listener.accept() => match accepted {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "probe accept failed");
                return;
            }
        },
    };

    let mut buf = [0u8; PROBE_BUFFER_SIZE];
    tokio::select! {
        _ = &mut shutdown => {}
        read = stream.read(&mut buf) => match read {
            Ok(0) => tracing::debug!(%peer, "probe peer closed without payload"),
            Ok(n) => match stream.write_all(&buf[..n]).await {
                Ok(()) => tracing::debug!(%peer, bytes = n, "tcp probe echoed"),
                Err(e) => tracing::debug!(%peer, error = %e, "tcp probe echo failed"),
            },
            Err(e) => tracing::debug!(%peer, error = %e, "tcp probe read failed"),
        },
    }
}

async fn echo_udp(
    socket: UdpSocket,
    expected_peer: IpAddr,
    mut shutdown: oneshot::Receiver<()>,
) {
    let expected_peer = expected_peer.to_canonical();
    let mut buf = [0u8; PROBE_BUFFER_SIZE];
    loop {
        tokio::select! {
            _ = &mut shutdown => return,
            received = socket.recv_from(&mut buf) => match received {
                Ok((n, from)) if from.ip().to_canonical() == expected_peer => {
                    match socket.send_to(&buf[..n], from).await {
                        Ok(_) => tracing::debug!(%from, bytes = n, "udp probe echoed"),
                        Err(e) => tracing::debug!(%from, error = %e, "udp probe echo failed"),
                    }
                }
                Ok((_, from)) => {
                    tracing::debug!(%from, "ignoring datagram from unexpected peer");
                }
                // ICMP unreachable from an earlier echo surfaces here.
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => {}
                Err(e) => {
                    tracing::warn!(error = %e, "udp probe receive failed");
                    return;
                }
            },
        }
    }
}
