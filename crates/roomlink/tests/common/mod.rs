//! Shared fixtures: a scripted match-making server and an in-memory gateway.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use roomlink::nat::{
    GatewayKind, GatewayProvider, LocalNetwork, NatConfig, NatError, NatGateway,
    NatTraversalManager, NetworkInfo, PortMapping,
};
use roomlink::protocol::{
    decode, encode, AuthenticationReply, AuthenticationRequest, ConnectionTestRequest,
    CreateRoomRequest, ErrorCode, JoinRoomRequest, ListRoomGroupRequest, ListRoomRequest,
    Message, MessageType, PlayerTag, ReplyHeader, RequestHeader, SessionKey,
    TransportProtocol, UpdateRoomStatusNotice, WireType,
};
use roomlink::{ClientConfig, ProtocolClient, DYNAMIC_PORTS};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

pub const SESSION_KEY: SessionKey = SessionKey(0x1234);
pub const PLAYER_TAG: PlayerTag = PlayerTag(7);
pub const GATEWAY_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
pub const HOST_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);
pub const OTHER_HOST_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 30);
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

// =========================================================================
// Client fixtures
// =========================================================================

/// Short timeouts and a keep-alive that stays quiet during a test.
pub fn test_config() -> ClientConfig {
    ClientConfig {
        connect_timeout: Duration::from_secs(2),
        io_timeout: Duration::from_secs(2),
        keep_alive_interval: Duration::from_secs(60),
        keep_alive_poll_interval: Duration::from_millis(20),
        keep_alive_initial_jitter_ms: 0,
        nat_discovery_timeout: Duration::from_millis(200),
        ..Default::default()
    }
}

/// Routes client logs to the test output. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A client whose NAT manager never finds a gateway.
pub fn client(config: ClientConfig) -> ProtocolClient {
    init_tracing();
    let nat = NatTraversalManager::new(vec![], home_network(), NatConfig::default());
    ProtocolClient::with_nat_manager(config, nat).expect("config should be valid")
}

/// Connects `client` to a fresh mock server and completes authentication.
pub async fn connected(client: &ProtocolClient) -> MockServer {
    let (listener, port) = listener().await;
    let accept = tokio::spawn(async move { MockServer::accept(&listener).await });
    let connect = client.connect("127.0.0.1", port, "alice");

    let (server, result) = tokio::join!(
        async {
            let mut server = accept.await.expect("accept task");
            let (header, request): (_, AuthenticationRequest) = server.expect_request().await;
            assert_eq!(header.message_type, MessageType::Authentication);
            assert_eq!(request.player_name.as_str(), "alice");
            server
                .reply(&AuthenticationReply {
                    api_version: request.api_version,
                    session_key: SESSION_KEY,
                    player_tag: PLAYER_TAG,
                })
                .await;
            server
        },
        connect
    );
    result.expect("should connect");
    server
}

pub async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
    let port = listener.local_addr().expect("should have addr").port();
    (listener, port)
}

/// `count` distinct UDP ports in the dynamic range that are free right now.
pub fn free_dynamic_udp_ports(count: usize) -> Vec<u16> {
    let mut held = Vec::new();
    for _ in 0..10_000 {
        if held.len() == count {
            break;
        }
        let socket = std::net::UdpSocket::bind("0.0.0.0:0").expect("should bind");
        let port = socket.local_addr().expect("should have addr").port();
        if DYNAMIC_PORTS.contains(&port) {
            held.push(socket);
        }
    }
    assert_eq!(held.len(), count, "not enough free dynamic ports");
    held.iter()
        .map(|s| s.local_addr().expect("should have addr").port())
        .collect()
}

// =========================================================================
// Mock server
// =========================================================================

/// The server side of one client connection, driven by the test.
pub struct MockServer {
    stream: TcpStream,
}

impl MockServer {
    pub async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = listener.accept().await.expect("should accept");
        Self { stream }
    }

    /// Reads one request frame, sizing the body by its message type.
    pub async fn read_frame(&mut self) -> (RequestHeader, Vec<u8>) {
        let mut raw = [0u8; RequestHeader::SIZE];
        tokio::time::timeout(READ_TIMEOUT, self.stream.read_exact(&mut raw))
            .await
            .expect("request should arrive")
            .expect("should read header");
        let header: RequestHeader = decode(&raw).expect("header decodes");

        let mut body = vec![0u8; body_size(header.message_type)];
        tokio::time::timeout(READ_TIMEOUT, self.stream.read_exact(&mut body))
            .await
            .expect("body should arrive")
            .expect("should read body");
        (header, body)
    }

    /// Reads one request and decodes its body as `Q`.
    pub async fn expect_request<Q: Message>(&mut self) -> (RequestHeader, Q) {
        let (header, body) = self.read_frame().await;
        assert_eq!(header.message_type, Q::MESSAGE_TYPE);
        (header, decode(&body).expect("body decodes"))
    }

    /// Asserts nothing arrives for `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        let mut byte = [0u8; 1];
        let read = tokio::time::timeout(window, self.stream.read(&mut byte)).await;
        assert!(read.is_err(), "client wrote while it should have waited");
    }

    /// Asserts the client closed its end.
    pub async fn expect_closed(&mut self) {
        let mut byte = [0u8; 1];
        let read = tokio::time::timeout(READ_TIMEOUT, self.stream.read(&mut byte))
            .await
            .expect("close should be observed");
        assert!(matches!(read, Ok(0) | Err(_)), "expected end of stream");
    }

    pub async fn reply<R: Message>(&mut self, body: &R) {
        self.reply_with_code(ErrorCode::Ok, body).await;
    }

    /// Replies with an error code. The body is still sent in full.
    pub async fn reply_error<R: Message + Default>(&mut self, code: ErrorCode) {
        self.reply_with_code(code, &R::default()).await;
    }

    async fn reply_with_code<R: Message>(&mut self, error_code: ErrorCode, body: &R) {
        let mut frame = encode(&ReplyHeader {
            message_type: R::MESSAGE_TYPE as u8,
            error_code,
        })
        .expect("header encodes");
        frame.extend(encode(body).expect("body encodes"));
        self.stream.write_all(&frame).await.expect("should write");
    }
}

fn body_size(message_type: MessageType) -> usize {
    match message_type {
        MessageType::Authentication => AuthenticationRequest::SIZE,
        MessageType::ListRoomGroup => ListRoomGroupRequest::SIZE,
        MessageType::CreateRoom => CreateRoomRequest::SIZE,
        MessageType::ListRoom => ListRoomRequest::SIZE,
        MessageType::JoinRoom => JoinRoomRequest::SIZE,
        MessageType::UpdateRoomStatus => UpdateRoomStatusNotice::SIZE,
        MessageType::ConnectionTest => ConnectionTestRequest::SIZE,
        MessageType::KeepAlive => 0,
    }
}

/// Sends a UDP probe to `127.0.0.1:port` and reports whether it came back.
pub async fn probe_udp(port: u16) -> bool {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("should bind");
    let payload = b"roomlink-probe";
    socket
        .send_to(payload, (Ipv4Addr::LOCALHOST, port))
        .await
        .expect("should send");
    let mut buf = [0u8; 64];
    match tokio::time::timeout(Duration::from_millis(500), socket.recv_from(&mut buf)).await {
        Ok(Ok((n, _))) => &buf[..n] == payload,
        _ => false,
    }
}

// =========================================================================
// In-memory gateway
// =========================================================================

#[derive(Default)]
pub struct GatewayState {
    pub table: Mutex<Vec<PortMapping>>,
}

impl GatewayState {
    /// Private port the gateway forwards `public_port` to, if any.
    pub fn forward(&self, protocol: TransportProtocol, public_port: u16) -> Option<u16> {
        self.table
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.protocol == protocol && m.public_port == public_port)
            .map(|m| m.private.port())
    }
}

struct MockGateway(Arc<GatewayState>);

#[async_trait]
impl NatGateway for MockGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Upnp
    }

    fn gateway_ip(&self) -> Ipv4Addr {
        GATEWAY_IP
    }

    async fn external_ip(&self) -> Result<IpAddr, NatError> {
        Ok(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)))
    }

    async fn list_mappings(&self) -> Result<Vec<PortMapping>, NatError> {
        Ok(self.0.table.lock().unwrap().clone())
    }

    async fn add_mapping(&self, mapping: &PortMapping, _lease: Duration) -> Result<(), NatError> {
        self.0.table.lock().unwrap().push(mapping.clone());
        Ok(())
    }

    async fn remove_mapping(
        &self,
        protocol: TransportProtocol,
        public_port: u16,
    ) -> Result<(), NatError> {
        self.0
            .table
            .lock()
            .unwrap()
            .retain(|m| !(m.protocol == protocol && m.public_port == public_port));
        Ok(())
    }
}

struct MockProvider(Arc<GatewayState>);

#[async_trait]
impl GatewayProvider for MockProvider {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Upnp
    }

    async fn discover(&self, _timeout: Duration) -> Result<Box<dyn NatGateway>, NatError> {
        Ok(Box::new(MockGateway(Arc::clone(&self.0))))
    }
}

struct MockNetwork(Vec<LocalNetwork>);

impl NetworkInfo for MockNetwork {
    fn local_networks(&self) -> Vec<LocalNetwork> {
        self.0.clone()
    }

    fn is_port_in_use(&self, _protocol: TransportProtocol, _port: u16) -> bool {
        false
    }
}

fn home_network() -> Arc<MockNetwork> {
    Arc::new(MockNetwork(vec![LocalNetwork::new(HOST_IP, 24)]))
}

/// A NAT manager backed by `state`.
pub fn nat_manager(state: &Arc<GatewayState>) -> NatTraversalManager {
    init_tracing();
    NatTraversalManager::new(
        vec![Box::new(MockProvider(Arc::clone(state)))],
        home_network(),
        NatConfig::default(),
    )
}

/// A mapping held by another machine on the LAN.
pub fn foreign_mapping(protocol: TransportProtocol, port: u16) -> PortMapping {
    PortMapping {
        protocol,
        private: SocketAddrV4::new(OTHER_HOST_IP, port),
        public_port: port,
        description: "someone else".into(),
    }
}
