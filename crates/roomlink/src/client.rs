//! The match-making client.
//!
//! [`ProtocolClient`] is a small state machine:
//!
//! ```text
//!   Disconnected ──connect──→ Connected ──close / join / fatal error──→ Disconnected
//!                                │  ↑
//!                       create   │  │ Remove / disconnect
//!                                ↓  │
//!                            Connected + hosting
//! ```
//!
//! All methods take `&self`; wrap the client in an `Arc` to share it across
//! tasks. Concurrent calls queue on the connection and are answered in
//! order, one exchange at a time.
//!
//! ## Errors
//!
//! A server error code ([`ClientError::Request`]) leaves the session open.
//! Transport failures and malformed replies tear it down, after which
//! [`ProtocolClient::is_connected`] returns `false` and hosting state is
//! cleared. [`ClientError::is_continuable`] tells the two apart.
//!
//! ## Hosting
//!
//! The hosted room is mirrored locally from the replies and notices that
//! pass through the client. The `hosting_room*` getters read that mirror
//! and never touch the network.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use roomlink_nat::NatTraversalManager;
use roomlink_protocol::{
    AuthenticationReply, AuthenticationRequest, ConnectionTestRequest,
    CreateRoomRequest, ExternalId, JoinRoomRequest, ListRoomGroupRequest,
    ListRoomReply, ListRoomRequest, MessageType, PlayerTag, RoomGroupInfo,
    RoomId, RoomSettingFlags, RoomStatus, SessionKey, SignalingMethod,
    TransportProtocol, UpdateRoomStatusNotice, ROOM_GROUP_CAPACITY,
    ROOM_LIST_PAGE_CAPACITY,
};
use roomlink_transport::{ConnectivityProber, TransportSession};
use tokio::sync::Mutex;

use crate::config::ClientConfig;
use crate::hosting::HostingRoomState;
use crate::keepalive::{KeepAlive, KeepAliveSettings};
use crate::rooms::{
    HostedRoom, JoinedRoom, RoomList, RoomListAssembler, RoomListQuery,
    RoomSignaling,
};
use crate::session::{Connection, Shared, Turn};
use crate::{validate, ClientError};

/// Client for one match-making server connection.
pub struct ProtocolClient {
    config: ClientConfig,
    shared: Arc<Shared>,
    keep_alive: StdMutex<Option<KeepAlive>>,
    nat: Mutex<NatTraversalManager>,
}

impl ProtocolClient {
    /// Creates a client using the system's UPnP/NAT-PMP gateway.
    ///
    /// # Errors
    /// [`ClientError::Validation`] if `config` is out of range.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let nat = NatTraversalManager::with_defaults(config.nat_config());
        Self::with_nat_manager(config, nat)
    }

    /// Creates a client with a preconfigured NAT manager.
    pub fn with_nat_manager(
        config: ClientConfig,
        nat: NatTraversalManager,
    ) -> Result<Self, ClientError> {
        config
            .validate()
            .map_err(|e| ClientError::invalid(e.to_string()))?;
        Ok(Self {
            config,
            shared: Arc::new(Shared::new()),
            keep_alive: StdMutex::new(None),
            nat: Mutex::new(nat),
        })
    }

    /// The validated configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // -----------------------------------------------------------------
    // Polling
    // -----------------------------------------------------------------

    /// Returns `true` between a successful [`connect`](Self::connect) and
    /// the next close, join or fatal error.
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// The tag the server appended to this player's name.
    pub fn player_tag(&self) -> Option<PlayerTag> {
        self.shared.player_tag()
    }

    /// Returns `true` while a room created by this client is registered.
    pub fn is_hosting_room(&self) -> bool {
        self.shared.hosting().is_some()
    }

    /// A snapshot of the hosted room, if any.
    pub fn hosting_room(&self) -> Option<HostingRoomState> {
        self.shared.hosting().clone()
    }

    /// Server-assigned id of the hosted room.
    pub fn hosting_room_id(&self) -> Option<RoomId> {
        self.shared.hosting().as_ref().map(|h| h.room_id)
    }

    pub fn hosting_room_group_index(&self) -> Option<u8> {
        self.shared.hosting().as_ref().map(|h| h.group_index)
    }

    /// Flags as of the last status update sent for the hosted room.
    pub fn hosting_room_setting_flags(&self) -> Option<RoomSettingFlags> {
        self.shared.hosting().as_ref().map(|h| h.setting_flags)
    }

    // -----------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------

    /// Connects and authenticates as `player_name`.
    ///
    /// Starts the keep-alive task on success. An authentication rejection
    /// is reported as [`ClientError::Request`] and leaves the client
    /// disconnected.
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        player_name: &str,
    ) -> Result<(), ClientError> {
        if host.is_empty() {
            return Err(ClientError::invalid("server host must not be empty"));
        }
        validate::server_port(port)?;
        let player_name = validate::player_name(player_name)?;

        // A keep-alive left over from a torn-down session.
        self.stop_keep_alive().await;

        let mut slot = self.shared.connection.lock().await;
        if slot.is_some() {
            return Err(ClientError::AlreadyConnected);
        }

        let mut transport = TransportSession::connect(
            host,
            port,
            self.config.connect_timeout,
            self.config.io_timeout,
        )
        .await?;

        let request = AuthenticationRequest {
            api_version: self.config.api_version,
            player_name,
        };
        transport.send(&request.into(), SessionKey::default()).await?;
        let reply: AuthenticationReply = match transport.receive().await? {
            Ok(reply) => reply,
            Err(code) => {
                if let Err(e) = transport.close().await {
                    tracing::debug!(error = %e, "transport close failed");
                }
                return Err(ClientError::Request {
                    message_type: MessageType::Authentication,
                    code,
                });
            }
        };

        tracing::info!(
            peer_addr = %transport.peer_addr(),
            session_key = %reply.session_key,
            player_tag = %reply.player_tag,
            "connected"
        );
        *slot = Some(Connection {
            transport,
            session_key: reply.session_key,
        });
        self.shared.mark_connected(reply.player_tag);
        drop(slot);

        let keep_alive = KeepAlive::spawn(
            Arc::clone(&self.shared),
            KeepAliveSettings {
                interval: self.config.keep_alive_interval,
                poll_interval: self.config.keep_alive_poll_interval,
                initial_jitter_ms: self.config.keep_alive_initial_jitter_ms,
            },
        );
        *self.keep_alive_slot() = Some(keep_alive);
        Ok(())
    }

    /// Stops the keep-alive and closes the session.
    pub async fn close(&self) -> Result<(), ClientError> {
        // Before taking the turn lock: the keep-alive may be waiting on it.
        self.stop_keep_alive().await;
        let turn = self.shared.begin().await?;
        turn.close().await;
        tracing::info!("disconnected");
        Ok(())
    }

    fn keep_alive_slot(&self) -> std::sync::MutexGuard<'_, Option<KeepAlive>> {
        self.keep_alive.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn stop_keep_alive(&self) {
        let keep_alive = self.keep_alive_slot().take();
        if let Some(keep_alive) = keep_alive {
            keep_alive.stop().await;
        }
    }

    // -----------------------------------------------------------------
    // Rooms
    // -----------------------------------------------------------------

    /// Lists the room groups, trimmed to the count the server declares.
    pub async fn get_room_group_list(&self) -> Result<Vec<RoomGroupInfo>, ClientError> {
        let mut turn = self.shared.begin().await?;
        let reply = turn.request(ListRoomGroupRequest {}).await?;
        let count = usize::from(reply.count).min(ROOM_GROUP_CAPACITY);
        Ok(reply.entries.into_vec().into_iter().take(count).collect())
    }

    /// Registers a room hosted on `port`.
    pub async fn create_room(
        &self,
        group_index: u8,
        max_player_count: u8,
        port: u16,
        password: &str,
    ) -> Result<RoomId, ClientError> {
        validate::max_player_count(max_player_count)?;
        validate::room_port(port)?;
        let password = validate::password(password)?;

        let mut turn = self.shared.begin().await?;
        Self::ensure_not_hosting(&turn)?;
        Self::create_room_in_turn(&mut turn, group_index, max_player_count, port, password)
            .await
    }

    async fn create_room_in_turn(
        turn: &mut Turn<'_>,
        group_index: u8,
        max_player_count: u8,
        port: u16,
        password: roomlink_protocol::Password,
    ) -> Result<RoomId, ClientError> {
        let has_password = !password.as_str().is_empty();
        let reply = turn
            .request(CreateRoomRequest {
                group_index,
                password,
                max_player_count,
                signaling_method: SignalingMethod::Direct,
                port_number: port,
                external_id: ExternalId::default(),
            })
            .await?;

        *turn.shared().hosting() = Some(HostingRoomState::created(
            reply.room_id,
            group_index,
            max_player_count,
            has_password,
        ));
        tracing::info!(room_id = %reply.room_id, group_index, port, "room created");
        Ok(reply.room_id)
    }

    fn ensure_not_hosting(turn: &Turn<'_>) -> Result<(), ClientError> {
        if turn.shared().hosting().is_some() {
            return Err(ClientError::AlreadyHostingRoom);
        }
        Ok(())
    }

    /// Hosts a room only once the server has confirmed it can reach us.
    ///
    /// The default port is probed first. If the server cannot reach it, a
    /// gateway mapping is negotiated from the configured candidates and
    /// probed again; a second failure is [`ClientError::NotReachable`] and
    /// no room is created.
    pub async fn create_room_with_nat_traversal(
        &self,
        group_index: u8,
        max_player_count: u8,
        password: &str,
    ) -> Result<HostedRoom, ClientError> {
        validate::max_player_count(max_player_count)?;
        let password = validate::password(password)?;
        let protocol = self.config.hosting_protocol;
        let default_port = self.config.default_port;

        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        if self.is_hosting_room() {
            return Err(ClientError::AlreadyHostingRoom);
        }

        let (private_port, public_port) = match self
            .probe(protocol, default_port, default_port)
            .await
        {
            Ok(true) => (default_port, default_port),
            Ok(false) | Err(ClientError::ProbeUnavailable { .. }) => {
                tracing::info!(port = default_port, %protocol, "not directly reachable; trying NAT traversal");
                let (private_port, public_port) = self.map_port(protocol).await?;
                if !self.probe(protocol, private_port, public_port).await? {
                    return Err(ClientError::NotReachable {
                        protocol,
                        port: public_port,
                    });
                }
                (private_port, public_port)
            }
            Err(e) => return Err(e),
        };

        let mut turn = self.shared.begin().await?;
        Self::ensure_not_hosting(&turn)?;
        let room_id = Self::create_room_in_turn(
            &mut turn,
            group_index,
            max_player_count,
            public_port,
            password,
        )
        .await?;
        Ok(HostedRoom {
            room_id,
            private_port,
            public_port,
        })
    }

    async fn map_port(&self, protocol: TransportProtocol) -> Result<(u16, u16), ClientError> {
        let mut nat = self.nat.lock().await;
        if !nat.ensure_discovered(self.config.nat_discovery_timeout).await {
            return Err(roomlink_nat::NatError::NoGateway.into());
        }
        let public_candidates = self.config.candidate_ports();
        let private_candidates: Vec<u16> = public_candidates
            .iter()
            .copied()
            .filter(|&port| !nat.is_port_in_use(protocol, port))
            .collect();

        let mapping = nat
            .create_mapping_from_candidates(protocol, &private_candidates, &public_candidates)
            .await?;
        Ok((mapping.private.port(), mapping.public_port))
    }

    /// Removes every port mapping this client created. Returns the count.
    ///
    /// Call before shutdown; mappings otherwise outlive the process.
    pub async fn release_port_mappings(&self) -> usize {
        self.nat.lock().await.release_all().await
    }

    /// Asks the server to reach this host on `port` and reports whether it
    /// got through.
    pub async fn connection_test(
        &self,
        protocol: TransportProtocol,
        port: u16,
    ) -> Result<bool, ClientError> {
        validate::server_port(port)?;
        self.probe(protocol, port, port).await
    }

    /// Listens on `private_port` while the server probes `public_port`.
    ///
    /// The listener is stopped before returning on every path.
    async fn probe(
        &self,
        protocol: TransportProtocol,
        private_port: u16,
        public_port: u16,
    ) -> Result<bool, ClientError> {
        let mut turn = self.shared.begin().await?;
        Self::ensure_not_hosting(&turn)?;
        let peer_ip = turn.peer_ip()?;

        let prober = ConnectivityProber::start(protocol, private_port, peer_ip).await?;
        let result = turn
            .request(ConnectionTestRequest {
                protocol,
                port: public_port,
            })
            .await;
        prober.stop().await;

        let succeeded = result?.succeeded;
        tracing::debug!(%protocol, private_port, public_port, succeeded, "connection test finished");
        Ok(succeeded)
    }

    /// Lists rooms, reading every page the server sends for the query.
    pub async fn get_room_list(&self, query: &RoomListQuery) -> Result<RoomList, ClientError> {
        if query.count == 0 {
            return Err(ClientError::invalid("room count must be at least 1"));
        }
        let search_name = validate::search_name(&query.search_name)?;

        let mut turn = self.shared.begin().await?;
        let first = turn
            .request(ListRoomRequest {
                group_index: query.group_index,
                start_index: query.start_index,
                count: query.count,
                sort_kind: query.sort_kind,
                search_target_flags: query.search_target_flags,
                search_full_name: query.search_full_name,
                search_name,
                search_tag: query.search_tag,
            })
            .await?;

        let mut assembler = RoomListAssembler::new(&first);
        let pages = assembler.page_count(ROOM_LIST_PAGE_CAPACITY);
        assembler.absorb(first);
        // Later pages are already in flight. A page carrying an error code
        // still has to be read off the stream before the call returns.
        let mut page_error = None;
        for index in 1..pages {
            match turn.receive::<ListRoomReply>().await {
                Ok(page) => assembler.absorb(page),
                Err(e @ ClientError::Request { .. }) => {
                    tracing::warn!(page = index, error = %e, "room list page rejected");
                    if page_error.is_none() {
                        page_error = Some(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
        if let Some(e) = page_error {
            return Err(e);
        }
        let list = assembler.finish();
        tracing::debug!(pages, rooms = list.rooms.len(), "room list received");
        Ok(list)
    }

    /// Joins a room. The session ends on success.
    pub async fn join_room(
        &self,
        group_index: u8,
        room_id: RoomId,
        password: &str,
    ) -> Result<JoinedRoom, ClientError> {
        let password = validate::password(password)?;

        let mut turn = self.shared.begin().await?;
        Self::ensure_not_hosting(&turn)?;
        let reply = turn
            .request(JoinRoomRequest {
                group_index,
                room_id,
                password,
            })
            .await?;

        let signaling = match reply.signaling_method {
            SignalingMethod::Direct => RoomSignaling::Endpoint((&reply.endpoint).into()),
            SignalingMethod::ExternalId => {
                let bytes = reply.external_id.as_bytes();
                let len = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                RoomSignaling::ExternalId(bytes[..len].to_vec())
            }
        };

        turn.close().await;
        self.stop_keep_alive().await;
        tracing::info!(%room_id, ?signaling, "joined room; session closed");
        Ok(JoinedRoom { room_id, signaling })
    }

    /// Tells the server about the hosted room's status.
    ///
    /// Sent as a notice: the server never answers, so a rejection cannot be
    /// observed. The local state is updated optimistically and dropped on
    /// [`RoomStatus::Remove`].
    pub async fn update_hosting_room_status(
        &self,
        status: RoomStatus,
        current_player_count: Option<u8>,
    ) -> Result<(), ClientError> {
        let mut turn = self.shared.begin().await?;
        let (room_id, max_player_count) = {
            let hosting = turn.shared().hosting();
            let state = hosting.as_ref().ok_or(ClientError::NotHostingRoom)?;
            (state.room_id, state.max_player_count)
        };
        if let Some(count) = current_player_count {
            if count > max_player_count {
                return Err(ClientError::invalid(format!(
                    "current player count {count} exceeds maximum {max_player_count}"
                )));
            }
        }

        turn.send(
            UpdateRoomStatusNotice {
                room_id,
                status,
                current_player_count_changed: current_player_count.is_some(),
                current_player_count: current_player_count.unwrap_or_default(),
            }
            .into(),
        )
        .await?;

        let mut hosting = turn.shared().hosting();
        let still_hosting = hosting
            .as_mut()
            .is_some_and(|state| state.apply(status, current_player_count));
        if !still_hosting {
            *hosting = None;
            tracing::info!(%room_id, "room removed");
        }
        Ok(())
    }
}
