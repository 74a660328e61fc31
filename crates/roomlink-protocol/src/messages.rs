//! The wire message catalog.
//!
//! Every exchange with the server is one of three roles:
//!
//! - **Request** (client → server): `RequestHeader` + body, answered by
//!   exactly one reply type (or, for room lists, a run of them).
//! - **Reply** (server → client): `ReplyHeader` + body. The body is always
//!   on the wire, but only meaningful when the header's error code is Ok.
//! - **Notice** (client → server): `RequestHeader` + body, never answered.
//!
//! The set is closed. [`Outbound`] is the sum type over everything the
//! client can send; the [`Request`] trait statically binds each request to
//! its reply body.

use std::fmt;

use crate::types::{
    ExternalId, Password, PlayerName, PlayerTag, RoomGroupInfo, RoomId,
    RoomInfo, RoomStatus, SearchTargetFlags, SessionKey, SignalingMethod,
    SortKind, TransportProtocol, WireEndpoint,
};
use crate::{
    encode_into, Buf, BufMut, BytesMut, CodecError, FixedString, FixedVec,
    WireType,
};

/// Number of room groups carried in one [`ListRoomGroupReply`].
pub const ROOM_GROUP_CAPACITY: usize = 10;
/// Number of rooms carried in one [`ListRoomReply`].
pub const ROOM_LIST_PAGE_CAPACITY: usize = 6;
/// Search names are stored in 24 bytes.
pub const SEARCH_NAME_LEN: usize = 24;

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

crate::wire_enum! {
    /// Tag identifying a message in both request and reply headers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum MessageType: u8 {
        Authentication = 1,
        ListRoomGroup = 2,
        CreateRoom = 3,
        ListRoom = 4,
        JoinRoom = 5,
        UpdateRoomStatus = 6,
        ConnectionTest = 7,
        KeepAlive = 8,
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

crate::wire_struct! {
    /// Header of every request and notice (5 bytes).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RequestHeader {
        pub message_type: MessageType,
        pub session_key: SessionKey,
    }
}

/// Header of every reply (2 bytes).
///
/// The message type is kept raw here so that the transport can report an
/// unexpected tag with its actual value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader {
    pub message_type: u8,
    pub error_code: crate::ErrorCode,
}

impl WireType for ReplyHeader {
    const SIZE: usize = 2;

    fn write_to(&self, buf: &mut impl BufMut) -> Result<(), CodecError> {
        self.message_type.write_to(buf)?;
        self.error_code.write_to(buf)
    }

    fn read_from(buf: &mut impl Buf) -> Result<Self, CodecError> {
        Ok(Self {
            message_type: u8::read_from(buf)?,
            error_code: crate::ErrorCode::read_from(buf)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// A message body with a constant type tag.
pub trait Message: WireType {
    const MESSAGE_TYPE: MessageType;
}

/// A client → server message that expects a reply.
pub trait Request: Message + Into<Outbound> {
    /// The body of the matching reply.
    type Reply: self::Reply;
}

/// A server → client reply body.
pub trait Reply: Message {}

/// A one-way client → server message.
pub trait Notice: Message + Into<Outbound> {}

macro_rules! message {
    ($ty:ident => $tag:ident) => {
        impl Message for $ty {
            const MESSAGE_TYPE: MessageType = MessageType::$tag;
        }
    };
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

crate::wire_struct! {
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct AuthenticationRequest {
        pub api_version: u16,
        pub player_name: PlayerName,
    }
}

crate::wire_struct! {
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct AuthenticationReply {
        pub api_version: u16,
        pub session_key: SessionKey,
        pub player_tag: PlayerTag,
    }
}

message!(AuthenticationRequest => Authentication);
message!(AuthenticationReply => Authentication);

impl Request for AuthenticationRequest {
    type Reply = AuthenticationReply;
}
impl Reply for AuthenticationReply {}

// ---------------------------------------------------------------------------
// Room groups
// ---------------------------------------------------------------------------

crate::wire_struct! {
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct ListRoomGroupRequest {}
}

crate::wire_struct! {
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct ListRoomGroupReply {
        /// How many leading entries are meaningful.
        pub count: u8,
        pub entries: FixedVec<RoomGroupInfo, ROOM_GROUP_CAPACITY>,
    }
}

message!(ListRoomGroupRequest => ListRoomGroup);
message!(ListRoomGroupReply => ListRoomGroup);

impl Request for ListRoomGroupRequest {
    type Reply = ListRoomGroupReply;
}
impl Reply for ListRoomGroupReply {}

// ---------------------------------------------------------------------------
// Create room
// ---------------------------------------------------------------------------

crate::wire_struct! {
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct CreateRoomRequest {
        pub group_index: u8,
        pub password: Password,
        pub max_player_count: u8,
        pub signaling_method: SignalingMethod,
        pub port_number: u16,
        pub external_id: ExternalId,
    }
}

crate::wire_struct! {
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct CreateRoomReply {
        pub room_id: RoomId,
    }
}

message!(CreateRoomRequest => CreateRoom);
message!(CreateRoomReply => CreateRoom);

impl Request for CreateRoomRequest {
    type Reply = CreateRoomReply;
}
impl Reply for CreateRoomReply {}

// ---------------------------------------------------------------------------
// List rooms
// ---------------------------------------------------------------------------

crate::wire_struct! {
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct ListRoomRequest {
        pub group_index: u8,
        pub start_index: u16,
        pub count: u16,
        pub sort_kind: SortKind,
        pub search_target_flags: SearchTargetFlags,
        pub search_full_name: bool,
        pub search_name: FixedString<SEARCH_NAME_LEN>,
        pub search_tag: PlayerTag,
    }
}

crate::wire_struct! {
    /// One page of a room list.
    ///
    /// A single request can be answered by several of these in a row; the
    /// `page_start_index` says where this page's entries belong in the
    /// reassembled list.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct ListRoomReply {
        pub total_room_count: u16,
        pub matched_room_count: u16,
        pub reply_room_count: u16,
        pub page_start_index: u16,
        pub entries: FixedVec<RoomInfo, ROOM_LIST_PAGE_CAPACITY>,
    }
}

message!(ListRoomRequest => ListRoom);
message!(ListRoomReply => ListRoom);

impl Request for ListRoomRequest {
    type Reply = ListRoomReply;
}
impl Reply for ListRoomReply {}

// ---------------------------------------------------------------------------
// Join room
// ---------------------------------------------------------------------------

crate::wire_struct! {
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct JoinRoomRequest {
        pub group_index: u8,
        pub room_id: RoomId,
        pub password: Password,
    }
}

crate::wire_struct! {
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct JoinRoomReply {
        pub signaling_method: SignalingMethod,
        pub endpoint: WireEndpoint,
        pub external_id: ExternalId,
    }
}

message!(JoinRoomRequest => JoinRoom);
message!(JoinRoomReply => JoinRoom);

impl Request for JoinRoomRequest {
    type Reply = JoinRoomReply;
}
impl Reply for JoinRoomReply {}

// ---------------------------------------------------------------------------
// Connection test
// ---------------------------------------------------------------------------

crate::wire_struct! {
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct ConnectionTestRequest {
        pub protocol: TransportProtocol,
        pub port: u16,
    }
}

crate::wire_struct! {
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct ConnectionTestReply {
        pub succeeded: bool,
    }
}

message!(ConnectionTestRequest => ConnectionTest);
message!(ConnectionTestReply => ConnectionTest);

impl Request for ConnectionTestRequest {
    type Reply = ConnectionTestReply;
}
impl Reply for ConnectionTestReply {}

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

crate::wire_struct! {
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct UpdateRoomStatusNotice {
        pub room_id: RoomId,
        pub status: RoomStatus,
        pub current_player_count_changed: bool,
        pub current_player_count: u8,
    }
}

crate::wire_struct! {
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct KeepAliveNotice {}
}

message!(UpdateRoomStatusNotice => UpdateRoomStatus);
message!(KeepAliveNotice => KeepAlive);

impl Notice for UpdateRoomStatusNotice {}
impl Notice for KeepAliveNotice {}

// ---------------------------------------------------------------------------
// Outbound — closed dispatch over everything the client sends
// ---------------------------------------------------------------------------

/// Every message the client can put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Authentication(AuthenticationRequest),
    ListRoomGroup(ListRoomGroupRequest),
    CreateRoom(CreateRoomRequest),
    ListRoom(ListRoomRequest),
    JoinRoom(JoinRoomRequest),
    ConnectionTest(ConnectionTestRequest),
    UpdateRoomStatus(UpdateRoomStatusNotice),
    KeepAlive(KeepAliveNotice),
}

impl Outbound {
    /// The header tag for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Authentication(_) => AuthenticationRequest::MESSAGE_TYPE,
            Self::ListRoomGroup(_) => ListRoomGroupRequest::MESSAGE_TYPE,
            Self::CreateRoom(_) => CreateRoomRequest::MESSAGE_TYPE,
            Self::ListRoom(_) => ListRoomRequest::MESSAGE_TYPE,
            Self::JoinRoom(_) => JoinRoomRequest::MESSAGE_TYPE,
            Self::ConnectionTest(_) => ConnectionTestRequest::MESSAGE_TYPE,
            Self::UpdateRoomStatus(_) => UpdateRoomStatusNotice::MESSAGE_TYPE,
            Self::KeepAlive(_) => KeepAliveNotice::MESSAGE_TYPE,
        }
    }

    /// Encoded body size, excluding the header.
    pub fn body_size(&self) -> usize {
        match self {
            Self::Authentication(_) => AuthenticationRequest::SIZE,
            Self::ListRoomGroup(_) => ListRoomGroupRequest::SIZE,
            Self::CreateRoom(_) => CreateRoomRequest::SIZE,
            Self::ListRoom(_) => ListRoomRequest::SIZE,
            Self::JoinRoom(_) => JoinRoomRequest::SIZE,
            Self::ConnectionTest(_) => ConnectionTestRequest::SIZE,
            Self::UpdateRoomStatus(_) => UpdateRoomStatusNotice::SIZE,
            Self::KeepAlive(_) => KeepAliveNotice::SIZE,
        }
    }

    /// Returns `true` if the server answers this message.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, Self::UpdateRoomStatus(_) | Self::KeepAlive(_))
    }

    /// Encodes header and body into one contiguous frame.
    pub fn encode_frame(
        &self,
        session_key: SessionKey,
    ) -> Result<Vec<u8>, CodecError> {
        let header = RequestHeader {
            message_type: self.message_type(),
            session_key,
        };
        let mut buf =
            BytesMut::with_capacity(RequestHeader::SIZE + self.body_size());
        encode_into(&header, &mut buf)?;
        match self {
            Self::Authentication(body) => encode_into(body, &mut buf)?,
            Self::ListRoomGroup(body) => encode_into(body, &mut buf)?,
            Self::CreateRoom(body) => encode_into(body, &mut buf)?,
            Self::ListRoom(body) => encode_into(body, &mut buf)?,
            Self::JoinRoom(body) => encode_into(body, &mut buf)?,
            Self::ConnectionTest(body) => encode_into(body, &mut buf)?,
            Self::UpdateRoomStatus(body) => encode_into(body, &mut buf)?,
            Self::KeepAlive(body) => encode_into(body, &mut buf)?,
        }
        Ok(buf.to_vec())
    }
}

macro_rules! outbound_from {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Outbound {
                fn from(body: $ty) -> Self {
                    Self::$variant(body)
                }
            }
        )*
    };
}

outbound_from! {
    AuthenticationRequest => Authentication,
    ListRoomGroupRequest => ListRoomGroup,
    CreateRoomRequest => CreateRoom,
    ListRoomRequest => ListRoom,
    JoinRoomRequest => JoinRoom,
    ConnectionTestRequest => ConnectionTest,
    UpdateRoomStatusNotice => UpdateRoomStatus,
    KeepAliveNotice => KeepAlive,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RoomSettingFlags, PLAYER_NAME_LEN};
    use crate::{decode, encode, FieldSpec, FixedBytes};

    fn schema_sum(schema: &[FieldSpec]) -> usize {
        schema.iter().map(|f| f.size).sum()
    }

    fn sample_room(id: u32) -> RoomInfo {
        RoomInfo {
            room_id: RoomId(id),
            host_name: PlayerName::from("host"),
            host_tag: PlayerTag(id as u16),
            setting_flags: RoomSettingFlags::OPEN,
            max_player_count: 4,
            current_player_count: 1,
            status: RoomStatus::Open,
        }
    }

    // =====================================================================
    // Headers
    // =====================================================================

    #[test]
    fn test_header_sizes() {
        assert_eq!(RequestHeader::SIZE, 5);
        assert_eq!(ReplyHeader::SIZE, 2);
    }

    #[test]
    fn test_request_header_layout() {
        let header = RequestHeader {
            message_type: MessageType::CreateRoom,
            session_key: SessionKey(0x0102_0304),
        };
        assert_eq!(encode(&header).unwrap(), [3, 1, 2, 3, 4]);
    }

    #[test]
    fn test_reply_header_keeps_raw_type_and_unknown_codes() {
        let header: ReplyHeader = decode(&[0xEE, 42]).unwrap();
        assert_eq!(header.message_type, 0xEE);
        assert_eq!(header.error_code, crate::ErrorCode::Other(42));
    }

    // =====================================================================
    // Schemas
    // =====================================================================

    #[test]
    fn test_every_catalog_schema_sums_to_size() {
        let catalog: &[(&str, &[FieldSpec], usize)] = &[
            ("AuthReq", AuthenticationRequest::schema(), AuthenticationRequest::SIZE),
            ("AuthRep", AuthenticationReply::schema(), AuthenticationReply::SIZE),
            ("GroupReq", ListRoomGroupRequest::schema(), ListRoomGroupRequest::SIZE),
            ("GroupRep", ListRoomGroupReply::schema(), ListRoomGroupReply::SIZE),
            ("CreateReq", CreateRoomRequest::schema(), CreateRoomRequest::SIZE),
            ("CreateRep", CreateRoomReply::schema(), CreateRoomReply::SIZE),
            ("ListReq", ListRoomRequest::schema(), ListRoomRequest::SIZE),
            ("ListRep", ListRoomReply::schema(), ListRoomReply::SIZE),
            ("JoinReq", JoinRoomRequest::schema(), JoinRoomRequest::SIZE),
            ("JoinRep", JoinRoomReply::schema(), JoinRoomReply::SIZE),
            ("TestReq", ConnectionTestRequest::schema(), ConnectionTestRequest::SIZE),
            ("TestRep", ConnectionTestReply::schema(), ConnectionTestReply::SIZE),
            ("Update", UpdateRoomStatusNotice::schema(), UpdateRoomStatusNotice::SIZE),
            ("KeepAlive", KeepAliveNotice::schema(), KeepAliveNotice::SIZE),
        ];
        for (name, schema, size) in catalog {
            assert_eq!(schema_sum(schema), *size, "{name}");
        }
    }

    #[test]
    fn test_known_body_sizes() {
        assert_eq!(AuthenticationRequest::SIZE, 2 + PLAYER_NAME_LEN);
        assert_eq!(AuthenticationReply::SIZE, 8);
        assert_eq!(ListRoomGroupRequest::SIZE, 0);
        assert_eq!(ListRoomGroupReply::SIZE, 1 + 10 * 24);
        assert_eq!(KeepAliveNotice::SIZE, 0);
        assert_eq!(UpdateRoomStatusNotice::SIZE, 7);
        assert_eq!(ConnectionTestRequest::SIZE, 3);
        assert_eq!(ListRoomReply::SIZE, 8 + 6 * RoomInfo::SIZE);
    }

    // =====================================================================
    // Outbound dispatch
    // =====================================================================

    #[test]
    fn test_outbound_frame_is_header_then_body() {
        let msg: Outbound = ConnectionTestRequest {
            protocol: TransportProtocol::Udp,
            port: 53000,
        }
        .into();
        let frame = msg.encode_frame(SessionKey(9)).unwrap();
        assert_eq!(frame.len(), RequestHeader::SIZE + 3);
        assert_eq!(&frame[..5], &[7, 0, 0, 0, 9]);
        assert_eq!(&frame[5..], &[1, 0xCF, 0x08]);
    }

    #[test]
    fn test_keep_alive_frame_is_header_only() {
        let frame = Outbound::from(KeepAliveNotice {})
            .encode_frame(SessionKey(1))
            .unwrap();
        assert_eq!(frame, [8, 0, 0, 0, 1]);
    }

    #[test]
    fn test_notices_expect_no_reply() {
        assert!(!Outbound::from(KeepAliveNotice {}).expects_reply());
        assert!(!Outbound::from(UpdateRoomStatusNotice::default()).expects_reply());
        assert!(Outbound::from(ListRoomGroupRequest {}).expects_reply());
    }

    #[test]
    fn test_outbound_frame_propagates_codec_errors() {
        let msg = Outbound::from(AuthenticationRequest {
            api_version: 1,
            player_name: PlayerName::from("x".repeat(25)),
        });
        assert!(matches!(
            msg.encode_frame(SessionKey(0)),
            Err(CodecError::StringTooLong { max: 24, actual: 25 })
        ));
    }

    // =====================================================================
    // Round trips
    // =====================================================================

    #[test]
    fn test_list_room_reply_round_trip_full_page() {
        let reply = ListRoomReply {
            total_room_count: 30,
            matched_room_count: 14,
            reply_room_count: 14,
            page_start_index: 6,
            entries: FixedVec::new((1..=6).map(sample_room).collect()),
        };
        let back: ListRoomReply = decode(&encode(&reply).unwrap()).unwrap();
        assert_eq!(back, reply);
    }

    #[test]
    fn test_group_reply_with_short_list_needs_padding() {
        let short = ListRoomGroupReply {
            count: 1,
            entries: FixedVec::new(vec![RoomGroupInfo::default()]),
        };
        assert!(matches!(
            encode(&short),
            Err(CodecError::ArrayLengthMismatch { expected: 10, actual: 1 })
        ));
        let padded = ListRoomGroupReply {
            count: 1,
            entries: FixedVec::padded(vec![RoomGroupInfo {
                name: "lobby".into(),
            }]),
        };
        let back: ListRoomGroupReply =
            decode(&encode(&padded).unwrap()).unwrap();
        assert_eq!(back.entries.as_slice()[0].name.as_str(), "lobby");
    }

    #[test]
    fn test_join_reply_round_trip() {
        let reply = JoinRoomReply {
            signaling_method: SignalingMethod::ExternalId,
            endpoint: WireEndpoint::default(),
            external_id: FixedBytes::from_slice(b"lobby-123").unwrap(),
        };
        let back: JoinRoomReply = decode(&encode(&reply).unwrap()).unwrap();
        assert_eq!(back, reply);
    }

    #[test]
    fn test_create_room_request_round_trip() {
        let req = CreateRoomRequest {
            group_index: 2,
            password: Password::from("p".repeat(16)),
            max_player_count: 8,
            signaling_method: SignalingMethod::Direct,
            port_number: 53000,
            external_id: ExternalId::default(),
        };
        let back: CreateRoomRequest = decode(&encode(&req).unwrap()).unwrap();
        assert_eq!(back, req);
    }

    // =====================================================================
    // Defaults
    // =====================================================================

    fn assert_default_encodes<T: WireType + Default>() {
        let bytes = encode(&T::default()).unwrap();
        assert_eq!(bytes.len(), T::SIZE);
    }

    #[test]
    fn test_every_catalog_default_encodes() {
        assert_default_encodes::<AuthenticationRequest>();
        assert_default_encodes::<AuthenticationReply>();
        assert_default_encodes::<ListRoomGroupRequest>();
        assert_default_encodes::<ListRoomGroupReply>();
        assert_default_encodes::<CreateRoomRequest>();
        assert_default_encodes::<CreateRoomReply>();
        assert_default_encodes::<ListRoomRequest>();
        assert_default_encodes::<ListRoomReply>();
        assert_default_encodes::<JoinRoomRequest>();
        assert_default_encodes::<JoinRoomReply>();
        assert_default_encodes::<ConnectionTestRequest>();
        assert_default_encodes::<ConnectionTestReply>();
        assert_default_encodes::<UpdateRoomStatusNotice>();
        assert_default_encodes::<KeepAliveNotice>();
    }

    #[test]
    fn test_default_room_page_is_full_of_empty_entries() {
        let page = ListRoomReply::default();
        assert_eq!(page.entries.as_slice().len(), ROOM_LIST_PAGE_CAPACITY);
        let back: ListRoomReply = decode(&encode(&page).unwrap()).unwrap();
        assert_eq!(back, page);
    }
}
