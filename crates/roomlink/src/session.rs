//! Shared session state and strict turn-taking over the connection.
//!
//! The single [`TransportSession`] sits behind an async mutex. Holding the
//! lock is a *turn*: whoever holds it sends a request and reads its full
//! reply (or replies) before anyone else may write. The keep-alive task
//! takes the same lock.
//!
//! Any transport failure inside a turn tears the session down: the
//! connection is dropped, and the connected and hosting states are cleared.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{MutexGuard as StdMutexGuard, PoisonError};

use roomlink_protocol::{Outbound, PlayerTag, Reply, Request, SessionKey};
use roomlink_transport::{TransportError, TransportSession};
use tokio::sync::{Mutex, MutexGuard};

use crate::hosting::HostingRoomState;
use crate::keepalive::ActivityClock;
use crate::ClientError;

/// An authenticated connection.
pub(crate) struct Connection {
    pub(crate) transport: TransportSession,
    pub(crate) session_key: SessionKey,
}

/// State shared by the client and its keep-alive task.
pub(crate) struct Shared {
    pub(crate) connection: Mutex<Option<Connection>>,
    connected: AtomicBool,
    hosting: std::sync::Mutex<Option<HostingRoomState>>,
    player_tag: std::sync::Mutex<Option<PlayerTag>>,
    pub(crate) activity: ActivityClock,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            connection: Mutex::new(None),
            connected: AtomicBool::new(false),
            hosting: std::sync::Mutex::new(None),
            player_tag: std::sync::Mutex::new(None),
            activity: ActivityClock::new(),
        }
    }

    /// Waits for the turn lock.
    ///
    /// # Errors
    /// [`ClientError::NotConnected`] if there is no session.
    pub(crate) async fn begin(&self) -> Result<Turn<'_>, ClientError> {
        let guard = self.connection.lock().await;
        if guard.is_none() {
            return Err(ClientError::NotConnected);
        }
        Ok(Turn {
            shared: self,
            guard,
        })
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn hosting(&self) -> StdMutexGuard<'_, Option<HostingRoomState>> {
        self.hosting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn player_tag(&self) -> Option<PlayerTag> {
        *self.player_tag.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn mark_connected(&self, tag: PlayerTag) {
        *self.player_tag.lock().unwrap_or_else(PoisonError::into_inner) = Some(tag);
        *self.hosting() = None;
        self.activity.touch();
        self.connected.store(true, Ordering::Release);
    }

    pub(crate) fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
        *self.hosting() = None;
        *self.player_tag.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Exclusive use of the connection for one exchange.
pub(crate) struct Turn<'a> {
    shared: &'a Shared,
    guard: MutexGuard<'a, Option<Connection>>,
}

impl Turn<'_> {
    fn connection(&mut self) -> Result<&mut Connection, ClientError> {
        self.guard.as_mut().ok_or(ClientError::ConnectionClosed)
    }

    pub(crate) fn shared(&self) -> &Shared {
        self.shared
    }

    /// The server's IP, for filtering probe traffic.
    pub(crate) fn peer_ip(&self) -> Result<IpAddr, ClientError> {
        self.guard
            .as_ref()
            .map(|c| c.transport.peer_addr().ip())
            .ok_or(ClientError::ConnectionClosed)
    }

    pub(crate) async fn send(&mut self, message: Outbound) -> Result<(), ClientError> {
        let connection = self.connection()?;
        let key = connection.session_key;
        let result = connection.transport.send(&message, key).await;
        if let Err(e) = result {
            return Err(self.teardown(e));
        }
        self.shared.activity.touch();
        Ok(())
    }

    /// Reads one reply; a server error code becomes [`ClientError::Request`].
    pub(crate) async fn receive<R: Reply>(&mut self) -> Result<R, ClientError> {
        let connection = self.connection()?;
        let result = connection.transport.receive::<R>().await;
        match result {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(code)) => Err(ClientError::Request {
                message_type: R::MESSAGE_TYPE,
                code,
            }),
            Err(e) => Err(self.teardown(e)),
        }
    }

    pub(crate) async fn request<Q: Request>(
        &mut self,
        request: Q,
    ) -> Result<Q::Reply, ClientError> {
        self.send(request.into()).await?;
        self.receive::<Q::Reply>().await
    }

    /// Ends the session on purpose.
    pub(crate) async fn close(mut self) {
        if let Some(mut connection) = self.guard.take() {
            if let Err(e) = connection.transport.close().await {
                tracing::debug!(error = %e, "transport close failed");
            }
        }
        self.shared.mark_disconnected();
    }

    fn teardown(&mut self, error: TransportError) -> ClientError {
        if self.guard.take().is_some() {
            tracing::warn!(error = %error, "session torn down");
        }
        self.shared.mark_disconnected();
        error.into()
    }
}
